use std::collections::HashMap;

use crate::tuple::{Field, Tuple};
use crate::types::{FieldType, CHAR_SIZE, DOUBLE_SIZE, INT_SIZE};
use crate::{Result, StorageError};

/// Where one field lives inside a serialized tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldLayout {
    name: String,
    field_type: FieldType,
    offset: usize,
}

/// An immutable, ordered list of named, typed fields with a fixed byte layout.
///
/// Offsets and total length are computed once at construction. A serialized
/// tuple is exactly `length()` bytes; field `i` occupies
/// `offset_of(i)..offset_of(i) + field_type(i).size()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<FieldLayout>,
    index: HashMap<String, usize>,
    length: usize,
}

impl Schema {
    /// Fails if `types` and `names` differ in length or any name repeats.
    pub fn new<S: Into<String>>(types: Vec<FieldType>, names: Vec<S>) -> Result<Self> {
        if types.len() != names.len() {
            return Err(StorageError::SchemaLengthMismatch {
                types: types.len(),
                names: names.len(),
            });
        }

        let mut fields = Vec::with_capacity(types.len());
        let mut index = HashMap::with_capacity(types.len());
        let mut offset = 0;

        for (i, (field_type, name)) in types.into_iter().zip(names).enumerate() {
            let name = name.into();
            if index.insert(name.clone(), i).is_some() {
                return Err(StorageError::DuplicateField(name));
            }
            fields.push(FieldLayout {
                name,
                field_type,
                offset,
            });
            offset += field_type.size();
        }

        Ok(Self {
            fields,
            index,
            length: offset,
        })
    }

    /// Concatenates `first` and `second` field-wise. Names must stay unique.
    pub fn merge(first: &Schema, second: &Schema) -> Result<Schema> {
        let (types, names): (Vec<_>, Vec<_>) = first
            .fields
            .iter()
            .chain(&second.fields)
            .map(|f| (f.field_type, f.name.clone()))
            .unzip();
        Schema::new(types, names)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Serialized width of one tuple in bytes.
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn offset_of(&self, index: usize) -> Result<usize> {
        self.layout(index).map(|f| f.offset)
    }

    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| StorageError::FieldNotFound(name.to_owned()))
    }

    pub fn field_type(&self, index: usize) -> Result<FieldType> {
        self.layout(index).map(|f| f.field_type)
    }

    pub fn field_name(&self, index: usize) -> Result<&str> {
        self.layout(index).map(|f| f.name.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = (FieldType, &str)> + '_ {
        self.fields.iter().map(|f| (f.field_type, f.name.as_str()))
    }

    /// True when `tuple` has the same arity and positional types as this schema.
    pub fn compatible(&self, tuple: &Tuple) -> bool {
        self.check_compatible(tuple).is_ok()
    }

    /// Like `compatible`, but says what is wrong.
    pub fn check_compatible(&self, tuple: &Tuple) -> Result<()> {
        if tuple.len() != self.fields.len() {
            return Err(StorageError::IncompatibleTuple {
                reason: format!(
                    "expected {} fields, got {}",
                    self.fields.len(),
                    tuple.len()
                ),
            });
        }

        for (i, (layout, value)) in self.fields.iter().zip(tuple.fields()).enumerate() {
            if value.field_type() != layout.field_type {
                return Err(StorageError::IncompatibleTuple {
                    reason: format!(
                        "field {} ('{}') expected {}, got {}",
                        i,
                        layout.name,
                        layout.field_type,
                        value.field_type()
                    ),
                });
            }
        }

        Ok(())
    }

    /// Writes `tuple` into the first `length()` bytes of `buf`.
    ///
    /// Numbers are stored in host byte order. Text is cut to at most
    /// `CHAR_SIZE` bytes on a character boundary and zero padded up to it. Nothing is written unless
    /// the tuple is compatible and the buffer is large enough.
    pub fn serialize(&self, buf: &mut [u8], tuple: &Tuple) -> Result<()> {
        self.check_compatible(tuple)?;
        self.check_buffer(buf)?;

        for (layout, value) in self.fields.iter().zip(tuple.fields()) {
            let dst = &mut buf[layout.offset..layout.offset + layout.field_type.size()];
            match value {
                Field::Int(v) => dst.copy_from_slice(&v.to_ne_bytes()),
                Field::Double(v) => dst.copy_from_slice(&v.to_ne_bytes()),
                Field::Char(s) => {
                    let bytes = truncate_text(s).as_bytes();
                    dst[..bytes.len()].copy_from_slice(bytes);
                    dst[bytes.len()..].fill(0);
                }
            }
        }

        Ok(())
    }

    /// Reads a tuple back from the first `length()` bytes of `buf`.
    ///
    /// Text ends at the first zero byte or at `CHAR_SIZE`. Bytes that are not
    /// valid UTF-8 can only come from a foreign writer and decode lossily.
    pub fn deserialize(&self, buf: &[u8]) -> Result<Tuple> {
        self.check_buffer(buf)?;

        let fields = self
            .fields
            .iter()
            .map(|layout| {
                let src = &buf[layout.offset..layout.offset + layout.field_type.size()];
                match layout.field_type {
                    FieldType::Int => Field::Int(i32::from_ne_bytes(fixed::<INT_SIZE>(src))),
                    FieldType::Double => {
                        Field::Double(f64::from_ne_bytes(fixed::<DOUBLE_SIZE>(src)))
                    }
                    FieldType::Char => {
                        let len = src.iter().position(|&b| b == 0).unwrap_or(CHAR_SIZE);
                        Field::Char(String::from_utf8_lossy(&src[..len]).into_owned())
                    }
                }
            })
            .collect();

        Ok(Tuple::new(fields))
    }

    fn layout(&self, index: usize) -> Result<&FieldLayout> {
        self.fields
            .get(index)
            .ok_or(StorageError::FieldIndexOutOfRange {
                index,
                len: self.fields.len(),
            })
    }

    fn check_buffer(&self, buf: &[u8]) -> Result<()> {
        if buf.len() < self.length {
            return Err(StorageError::BufferTooSmall {
                needed: self.length,
                actual: buf.len(),
            });
        }
        Ok(())
    }
}

/// Longest prefix of `s` that fits in `CHAR_SIZE` bytes without splitting a character.
fn truncate_text(s: &str) -> &str {
    let mut n = s.len().min(CHAR_SIZE);
    while !s.is_char_boundary(n) {
        n -= 1;
    }
    &s[..n]
}

fn fixed<const N: usize>(src: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&src[..N]);
    out
}

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Width of an `Int` field on disk.
pub const INT_SIZE: usize = std::mem::size_of::<i32>();
/// Width of a `Double` field on disk.
pub const DOUBLE_SIZE: usize = std::mem::size_of::<f64>();
/// Fixed capacity of a `Char` field on disk. Longer text is truncated.
pub const CHAR_SIZE: usize = 64;

/// The column types a schema may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FieldType {
    Int,
    Double,
    Char,
}

impl FieldType {
    /// Serialized width in bytes. Every type is fixed width.
    pub const fn size(self) -> usize {
        match self {
            FieldType::Int => INT_SIZE,
            FieldType::Double => DOUBLE_SIZE,
            FieldType::Char => CHAR_SIZE,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Int => write!(f, "INT"),
            FieldType::Double => write!(f, "DOUBLE"),
            FieldType::Char => write!(f, "CHAR({})", CHAR_SIZE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_sizes() {
        assert_eq!(FieldType::Int.size(), 4);
        assert_eq!(FieldType::Double.size(), 8);
        assert_eq!(FieldType::Char.size(), 64);
    }

    #[test]
    fn test_display() {
        assert_eq!(FieldType::Int.to_string(), "INT");
        assert_eq!(FieldType::Double.to_string(), "DOUBLE");
        assert_eq!(FieldType::Char.to_string(), "CHAR(64)");
    }
}

use log::trace;

use crate::schema::Schema;
use crate::tuple::Tuple;
use crate::{Result, StorageError};

pub const PAGE_SIZE: usize = 4096;

/// Number of fixed-length slots a page of `page_size` bytes can hold.
///
/// Each slot costs `record_len` bytes plus one liveness bit, so the capacity
/// is `floor(8 * page_size / (8 * record_len + 1))`. Together with the bitmap
/// returned by [`bitmap_len`] it always fits in `page_size`. A record wider
/// than the page yields 0.
pub const fn slot_capacity(page_size: usize, record_len: usize) -> usize {
    (page_size * 8) / (record_len * 8 + 1)
}

/// Bytes taken by the liveness bitmap for `capacity` slots.
pub const fn bitmap_len(capacity: usize) -> usize {
    capacity.div_ceil(8)
}

#[repr(C, align(8))]
#[derive(Clone)]
pub struct Page {
    data: [u8; PAGE_SIZE],
}

impl Page {
    /// An all-zero page, which reads as a heap page with no live slots.
    pub fn new() -> Self {
        Self {
            data: [0; PAGE_SIZE],
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PAGE_SIZE {
            return Err(StorageError::BufferTooSmall {
                needed: PAGE_SIZE,
                actual: bytes.len(),
            });
        }
        let mut page = Self::new();
        page.data.copy_from_slice(bytes);
        Ok(page)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn checksum(&self) -> u32 {
        crc32fast::hash(&self.data)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("checksum", &format_args!("{:#010x}", self.checksum()))
            .finish()
    }
}

impl AsRef<[u8]> for Page {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl AsMut<[u8]> for Page {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// A page buffer read through a schema as an array of fixed-length slots.
///
/// Layout: a liveness bitmap of `bitmap_len(capacity)` bytes (slot `i` is
/// bit `7 - i % 8` of byte `i / 8`), then `capacity` slots of
/// `schema.length()` bytes each. Trailing bytes are unused. The bitmap is
/// authoritative: a dead slot's bytes mean nothing.
///
/// `B` is anything that views bytes, so the same type serves reads over
/// `&Page` and writes over `&mut Page`.
pub struct HeapPage<'a, B> {
    buf: B,
    schema: &'a Schema,
    capacity: usize,
    bitmap_len: usize,
}

impl<'a, B: AsRef<[u8]>> HeapPage<'a, B> {
    pub fn new(buf: B, schema: &'a Schema) -> Self {
        let capacity = slot_capacity(buf.as_ref().len(), schema.length());
        Self {
            buf,
            schema,
            capacity,
            bitmap_len: bitmap_len(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_live(&self, slot: usize) -> bool {
        slot < self.capacity && self.buf.as_ref()[slot / 8] & Self::mask(slot) != 0
    }

    pub fn live_count(&self) -> usize {
        (0..self.capacity).filter(|&s| self.is_live(s)).count()
    }

    pub fn is_full(&self) -> bool {
        self.first_free().is_none()
    }

    /// Lowest live slot, or `end()` when the page is empty.
    pub fn begin(&self) -> usize {
        self.live_from(0)
    }

    /// One past the last slot.
    pub fn end(&self) -> usize {
        self.capacity
    }

    /// Next live slot strictly after `slot`, or `end()`.
    pub fn next(&self, slot: usize) -> usize {
        self.live_from(slot.saturating_add(1))
    }

    pub fn live_slots(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.capacity).filter(move |&s| self.is_live(s))
    }

    pub fn get_tuple(&self, slot: usize) -> Result<Tuple> {
        self.check_live(slot)?;
        self.schema.deserialize(&self.buf.as_ref()[self.slot_range(slot)])
    }

    /// Logs the slot map of this page.
    #[cfg(feature = "debug")]
    pub fn debug_layout(&self) {
        log::debug!("Heap page layout:");
        log::debug!("  Record length: {} bytes", self.schema.length());
        log::debug!("  Capacity: {} slots", self.capacity);
        log::debug!("  Bitmap: {} bytes", self.bitmap_len);
        log::debug!("  Live: {:?}", self.live_slots().collect::<Vec<_>>());
    }

    fn live_from(&self, start: usize) -> usize {
        (start..self.capacity)
            .find(|&s| self.is_live(s))
            .unwrap_or(self.capacity)
    }

    fn first_free(&self) -> Option<usize> {
        (0..self.capacity).find(|&s| !self.is_live(s))
    }

    fn check_live(&self, slot: usize) -> Result<()> {
        if slot >= self.capacity {
            return Err(StorageError::SlotOutOfRange {
                slot,
                capacity: self.capacity,
            });
        }
        if !self.is_live(slot) {
            return Err(StorageError::InvalidSlot { slot });
        }
        Ok(())
    }

    fn slot_range(&self, slot: usize) -> std::ops::Range<usize> {
        let len = self.schema.length();
        let start = self.bitmap_len + slot * len;
        start..start + len
    }

    fn mask(slot: usize) -> u8 {
        1 << (7 - slot % 8)
    }
}

impl<'a, B: AsRef<[u8]> + AsMut<[u8]>> HeapPage<'a, B> {
    /// Stores `tuple` in the first dead slot and returns its index.
    ///
    /// Returns `Ok(None)` without touching the page when every slot is live.
    pub fn insert_tuple(&mut self, tuple: &Tuple) -> Result<Option<usize>> {
        self.schema.check_compatible(tuple)?;

        let Some(slot) = self.first_free() else {
            return Ok(None);
        };

        let range = self.slot_range(slot);
        self.schema.serialize(&mut self.buf.as_mut()[range], tuple)?;
        self.buf.as_mut()[slot / 8] |= Self::mask(slot);

        trace!("inserted tuple into slot {}", slot);
        Ok(Some(slot))
    }

    /// Marks `slot` dead. The slot's bytes are left as they are.
    pub fn delete_tuple(&mut self, slot: usize) -> Result<()> {
        self.check_live(slot)?;
        self.buf.as_mut()[slot / 8] &= !Self::mask(slot);

        trace!("deleted tuple in slot {}", slot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::Field;
    use crate::types::FieldType;
    use pretty_assertions::assert_eq;

    fn id_name() -> Schema {
        Schema::new(vec![FieldType::Int, FieldType::Char], vec!["id", "name"]).unwrap()
    }

    fn row(id: i32, name: &str) -> Tuple {
        Tuple::new(vec![Field::Int(id), Field::Char(name.to_owned())])
    }

    #[test]
    fn test_page_alignment() {
        assert_eq!(std::mem::align_of::<Page>(), 8);
        assert_eq!(std::mem::size_of::<Page>(), PAGE_SIZE);
    }

    #[test]
    fn test_capacity_with_slack() {
        // 68-byte records: 60 slots, 8 bitmap bytes, 8 bytes left over
        let capacity = slot_capacity(PAGE_SIZE, 68);
        assert_eq!(capacity, 60);
        assert_eq!(bitmap_len(capacity), 8);
        assert_eq!(PAGE_SIZE - bitmap_len(capacity) - capacity * 68, 8);

        assert_eq!(slot_capacity(PAGE_SIZE, 4), 992);
        assert_eq!(bitmap_len(992), 124);
    }

    #[test]
    fn test_capacity_exact_fit() {
        // one slot plus one bitmap byte fills the page exactly
        assert_eq!(slot_capacity(PAGE_SIZE, PAGE_SIZE - 1), 1);
        assert_eq!(bitmap_len(1) + (PAGE_SIZE - 1), PAGE_SIZE);

        // 8 bytes of data per bit-byte group: 8 slots of 7 bytes + 1 bitmap byte
        assert_eq!(slot_capacity(57, 7), 8);
    }

    #[test]
    fn test_capacity_never_overflows_page() {
        for record_len in 1..=PAGE_SIZE + 1 {
            let capacity = slot_capacity(PAGE_SIZE, record_len);
            assert!(bitmap_len(capacity) + capacity * record_len <= PAGE_SIZE);
            // one more slot would not fit
            let more = capacity + 1;
            assert!(bitmap_len(more) + more * record_len > PAGE_SIZE);
        }
    }

    #[test]
    fn test_capacity_zero_for_oversized_records() {
        assert_eq!(slot_capacity(PAGE_SIZE, PAGE_SIZE), 0);
        assert_eq!(slot_capacity(PAGE_SIZE, PAGE_SIZE * 2), 0);
    }

    #[test]
    fn test_zeroed_page_is_empty() {
        let schema = id_name();
        let page = Page::new();
        let heap = HeapPage::new(&page, &schema);

        assert_eq!(heap.capacity(), 60);
        assert_eq!(heap.live_count(), 0);
        assert_eq!(heap.begin(), heap.end());
        assert!(!heap.is_full());
    }

    #[test]
    fn test_insert_and_get() {
        let schema = id_name();
        let mut page = Page::new();
        let mut heap = HeapPage::new(&mut page, &schema);

        assert_eq!(heap.insert_tuple(&row(1, "a")).unwrap(), Some(0));
        assert_eq!(heap.insert_tuple(&row(2, "bb")).unwrap(), Some(1));

        assert_eq!(heap.get_tuple(0).unwrap(), row(1, "a"));
        assert_eq!(heap.get_tuple(1).unwrap(), row(2, "bb"));
        assert_eq!(heap.live_count(), 2);
        // first two bits, most significant first
        assert_eq!(page.as_bytes()[0], 0b1100_0000);
    }

    #[test]
    fn test_insert_until_full() {
        let schema = id_name();
        let mut page = Page::new();
        let mut heap = HeapPage::new(&mut page, &schema);

        for i in 0..heap.capacity() {
            assert_eq!(heap.insert_tuple(&row(i as i32, "x")).unwrap(), Some(i));
        }
        assert!(heap.is_full());

        let before = page.clone();
        let mut heap = HeapPage::new(&mut page, &schema);
        assert_eq!(heap.insert_tuple(&row(-1, "overflow")).unwrap(), None);
        assert_eq!(page.as_bytes(), before.as_bytes());
    }

    #[test]
    fn test_insert_reuses_first_free_slot() {
        let schema = id_name();
        let mut page = Page::new();
        let mut heap = HeapPage::new(&mut page, &schema);

        for i in 0..5 {
            heap.insert_tuple(&row(i, "x")).unwrap();
        }
        heap.delete_tuple(3).unwrap();
        heap.delete_tuple(1).unwrap();

        assert_eq!(heap.insert_tuple(&row(10, "y")).unwrap(), Some(1));
        assert_eq!(heap.insert_tuple(&row(11, "z")).unwrap(), Some(3));
        assert_eq!(heap.insert_tuple(&row(12, "w")).unwrap(), Some(5));
    }

    #[test]
    fn test_insert_incompatible_leaves_page_untouched() {
        let schema = id_name();
        let mut page = Page::new();
        let mut heap = HeapPage::new(&mut page, &schema);

        let bad = Tuple::new(vec![Field::Char("a".into()), Field::Int(1)]);
        assert!(matches!(
            heap.insert_tuple(&bad),
            Err(StorageError::IncompatibleTuple { .. })
        ));
        assert!(page.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_delete_errors() {
        let schema = id_name();
        let mut page = Page::new();
        let mut heap = HeapPage::new(&mut page, &schema);
        heap.insert_tuple(&row(1, "a")).unwrap();

        assert!(matches!(
            heap.delete_tuple(60),
            Err(StorageError::SlotOutOfRange { slot: 60, capacity: 60 })
        ));
        assert!(matches!(
            heap.delete_tuple(1),
            Err(StorageError::InvalidSlot { slot: 1 })
        ));

        heap.delete_tuple(0).unwrap();
        assert!(matches!(
            heap.delete_tuple(0),
            Err(StorageError::InvalidSlot { slot: 0 })
        ));
        assert!(matches!(
            heap.get_tuple(0),
            Err(StorageError::InvalidSlot { slot: 0 })
        ));
    }

    #[test]
    fn test_iteration_skips_dead_slots() {
        let schema = id_name();
        let mut page = Page::new();
        let mut heap = HeapPage::new(&mut page, &schema);

        for i in 0..10 {
            heap.insert_tuple(&row(i, "x")).unwrap();
        }
        for slot in [0, 4, 5, 9] {
            heap.delete_tuple(slot).unwrap();
        }

        let mut visited = Vec::new();
        let mut slot = heap.begin();
        while slot != heap.end() {
            visited.push(slot);
            slot = heap.next(slot);
        }

        assert_eq!(visited, vec![1, 2, 3, 6, 7, 8]);
        assert_eq!(heap.live_slots().collect::<Vec<_>>(), visited);
        assert_eq!(heap.next(heap.end()), heap.end());
        assert_eq!(heap.next(usize::MAX), heap.end());
    }

    #[test]
    fn test_zero_capacity_page_is_always_full() {
        let wide = Schema::new(
            vec![FieldType::Char; PAGE_SIZE / 64],
            (0..PAGE_SIZE / 64).map(|i| format!("c{}", i)).collect::<Vec<_>>(),
        )
        .unwrap();
        let mut page = Page::new();
        let mut heap = HeapPage::new(&mut page, &wide);

        let tuple = Tuple::new(vec![Field::Char("x".into()); PAGE_SIZE / 64]);
        assert_eq!(heap.capacity(), 0);
        assert!(heap.is_full());
        assert_eq!(heap.insert_tuple(&tuple).unwrap(), None);
        assert_eq!(heap.begin(), heap.end());
    }

    #[test]
    fn test_from_bytes() {
        let mut page = Page::new();
        page.as_bytes_mut()[10] = 7;

        let copy = Page::from_bytes(page.as_bytes()).unwrap();
        assert_eq!(copy.as_bytes(), page.as_bytes());
        assert_eq!(copy.checksum(), page.checksum());
        assert!(Page::from_bytes(&[0u8; 10]).is_err());
    }

    #[cfg(feature = "debug")]
    #[test]
    fn test_debug_layout() {
        let schema = id_name();
        let mut page = Page::new();
        let mut heap = HeapPage::new(&mut page, &schema);
        heap.insert_tuple(&row(1, "a")).unwrap();
        heap.debug_layout();
    }
}

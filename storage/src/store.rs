//! Page-addressed storage that heap files are built on.

use crate::page::Page;
use crate::{Result, StorageError};

/// A growable array of fixed-size pages.
///
/// Pages are addressed `0..page_count()`. Writing at `page_count()` appends
/// a page; writing further out is an error. Pages are never removed.
pub trait PageStore {
    fn page_count(&self) -> usize;

    /// Copies page `index` into `page`. Fails if `index >= page_count()`.
    fn read_page(&self, index: usize, page: &mut Page) -> Result<()>;

    /// Overwrites page `index`, or appends when `index == page_count()`.
    fn write_page(&mut self, index: usize, page: &Page) -> Result<()>;
}

/// Keeps every page in memory. Nothing survives a drop.
#[derive(Debug, Default, Clone)]
pub struct MemoryPageStore {
    pages: Vec<Box<Page>>,
}

impl MemoryPageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PageStore for MemoryPageStore {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn read_page(&self, index: usize, page: &mut Page) -> Result<()> {
        let stored = self.pages.get(index).ok_or(StorageError::PageOutOfRange {
            page: index,
            page_count: self.pages.len(),
        })?;
        page.as_bytes_mut().copy_from_slice(stored.as_bytes());
        Ok(())
    }

    fn write_page(&mut self, index: usize, page: &Page) -> Result<()> {
        match index.cmp(&self.pages.len()) {
            std::cmp::Ordering::Less => {
                self.pages[index].as_bytes_mut().copy_from_slice(page.as_bytes());
            }
            std::cmp::Ordering::Equal => self.pages.push(Box::new(page.clone())),
            std::cmp::Ordering::Greater => {
                return Err(StorageError::PageOutOfRange {
                    page: index,
                    page_count: self.pages.len(),
                })
            }
        }
        Ok(())
    }
}

impl<S: PageStore + ?Sized> PageStore for &mut S {
    fn page_count(&self) -> usize {
        (**self).page_count()
    }

    fn read_page(&self, index: usize, page: &mut Page) -> Result<()> {
        (**self).read_page(index, page)
    }

    fn write_page(&mut self, index: usize, page: &Page) -> Result<()> {
        (**self).write_page(index, page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(byte: u8) -> Page {
        let mut page = Page::new();
        page.as_bytes_mut().fill(byte);
        page
    }

    #[test]
    fn test_append_and_overwrite() {
        let mut store = MemoryPageStore::new();
        assert_eq!(store.page_count(), 0);

        store.write_page(0, &filled(1)).unwrap();
        store.write_page(1, &filled(2)).unwrap();
        store.write_page(0, &filled(3)).unwrap();
        assert_eq!(store.page_count(), 2);

        let mut page = Page::new();
        store.read_page(0, &mut page).unwrap();
        assert!(page.as_bytes().iter().all(|&b| b == 3));
        store.read_page(1, &mut page).unwrap();
        assert!(page.as_bytes().iter().all(|&b| b == 2));
    }

    #[test]
    fn test_out_of_range() {
        let mut store = MemoryPageStore::new();
        let mut page = Page::new();

        assert!(matches!(
            store.read_page(0, &mut page),
            Err(StorageError::PageOutOfRange { page: 0, page_count: 0 })
        ));
        assert!(matches!(
            store.write_page(1, &page),
            Err(StorageError::PageOutOfRange { page: 1, page_count: 0 })
        ));
        assert_eq!(store.page_count(), 0);
    }
}

//! Table storage spread over an append-only sequence of slotted pages.

use std::fmt;

use log::{debug, trace};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::page::{slot_capacity, HeapPage, Page, PAGE_SIZE};
use crate::schema::Schema;
use crate::store::PageStore;
use crate::tuple::Tuple;
use crate::{Result, StorageError};

/// Position of a slot in a heap file.
///
/// A locator is a plain value: resolving it always re-reads the page, and it
/// stops naming the same record once that record is deleted. The end of a
/// scan is `Locator::end(page_count)`, i.e. `(page_count, 0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Locator {
    pub page: usize,
    pub slot: usize,
}

impl Locator {
    pub const fn new(page: usize, slot: usize) -> Self {
        Self { page, slot }
    }

    /// The sentinel for a file with `page_count` pages.
    pub const fn end(page_count: usize) -> Self {
        Self::new(page_count, 0)
    }

    pub fn is_end(&self, page_count: usize) -> bool {
        self.page >= page_count
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.page, self.slot)
    }
}

/// One table: a schema plus the pages that hold its tuples.
///
/// Every operation reads the pages it needs from the store and writes back
/// what it changed. Nothing is cached between calls.
pub struct HeapFile<S> {
    store: S,
    schema: Schema,
}

impl<S: PageStore> HeapFile<S> {
    pub fn new(store: S, schema: Schema) -> Self {
        Self { store, schema }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn page_count(&self) -> usize {
        self.store.page_count()
    }

    /// Inserts into the last page, or appends a fresh page when the last one
    /// is full or the file is empty. Earlier pages are never searched.
    pub fn insert_tuple(&mut self, tuple: &Tuple) -> Result<Locator> {
        self.schema.check_compatible(tuple)?;
        if slot_capacity(PAGE_SIZE, self.schema.length()) == 0 {
            return Err(StorageError::TupleTooLarge {
                length: self.schema.length(),
                page_size: PAGE_SIZE,
            });
        }

        let page_count = self.page_count();
        let mut page = Page::new();

        if page_count > 0 {
            let last = page_count - 1;
            self.store.read_page(last, &mut page)?;
            let inserted = HeapPage::new(&mut page, &self.schema).insert_tuple(tuple)?;
            if let Some(slot) = inserted {
                self.store.write_page(last, &page)?;
                trace!("inserted tuple at ({}, {})", last, slot);
                return Ok(Locator::new(last, slot));
            }
            page = Page::new();
        }

        // An empty page always has a free slot once capacity is non-zero
        let slot = HeapPage::new(&mut page, &self.schema)
            .insert_tuple(tuple)?
            .ok_or(StorageError::TupleTooLarge {
                length: self.schema.length(),
                page_size: PAGE_SIZE,
            })?;
        self.store.write_page(page_count, &page)?;
        debug!("appended page {}", page_count);

        Ok(Locator::new(page_count, slot))
    }

    pub fn delete_tuple(&mut self, locator: Locator) -> Result<()> {
        let mut page = self.read_page(locator.page)?;
        HeapPage::new(&mut page, &self.schema).delete_tuple(locator.slot)?;
        self.store.write_page(locator.page, &page)?;

        trace!("deleted tuple at {}", locator);
        Ok(())
    }

    pub fn get_tuple(&self, locator: Locator) -> Result<Tuple> {
        let page = self.read_page(locator.page)?;
        HeapPage::new(&page, &self.schema).get_tuple(locator.slot)
    }

    /// First live slot in the file, or `end()` if there is none.
    pub fn begin(&self) -> Result<Locator> {
        self.first_live_from(0)
    }

    pub fn end(&self) -> Locator {
        Locator::end(self.page_count())
    }

    /// The live slot after `locator` in (page, slot) order, or `end()`.
    ///
    /// A locator at or past the end normalizes to `end()`.
    pub fn next(&self, locator: Locator) -> Result<Locator> {
        let page_count = self.page_count();
        if locator.is_end(page_count) {
            return Ok(Locator::end(page_count));
        }

        let page = self.read_page(locator.page)?;
        let heap = HeapPage::new(&page, &self.schema);
        let slot = heap.next(locator.slot);
        if slot != heap.end() {
            return Ok(Locator::new(locator.page, slot));
        }

        self.first_live_from(locator.page + 1)
    }

    /// Iterates over every live tuple with its locator.
    pub fn scan(&self) -> HeapScan<'_, S> {
        HeapScan {
            file: self,
            cursor: None,
            done: false,
        }
    }

    fn first_live_from(&self, start: usize) -> Result<Locator> {
        let page_count = self.page_count();
        let mut page = Page::new();

        for index in start..page_count {
            self.store.read_page(index, &mut page)?;
            let heap = HeapPage::new(&page, &self.schema);
            let slot = heap.begin();
            if slot != heap.end() {
                return Ok(Locator::new(index, slot));
            }
        }

        Ok(Locator::end(page_count))
    }

    fn read_page(&self, index: usize) -> Result<Page> {
        let page_count = self.page_count();
        if index >= page_count {
            return Err(StorageError::PageOutOfRange {
                page: index,
                page_count,
            });
        }

        let mut page = Page::new();
        self.store.read_page(index, &mut page)?;
        Ok(page)
    }
}

/// Forward scan over a [`HeapFile`], driven by `begin` and `next`.
///
/// Each step re-reads pages from the store. The scan ends at the sentinel or
/// after yielding the first error.
pub struct HeapScan<'a, S> {
    file: &'a HeapFile<S>,
    cursor: Option<Locator>,
    done: bool,
}

impl<'a, S: PageStore> HeapScan<'a, S> {
    fn advance(&mut self) -> Result<Option<(Locator, Tuple)>> {
        let locator = match self.cursor {
            None => self.file.begin()?,
            Some(current) => self.file.next(current)?,
        };
        self.cursor = Some(locator);

        if locator == self.file.end() {
            return Ok(None);
        }

        let tuple = self.file.get_tuple(locator)?;
        Ok(Some((locator, tuple)))
    }
}

impl<'a, S: PageStore> Iterator for HeapScan<'a, S> {
    type Item = Result<(Locator, Tuple)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let item = self.advance().transpose();
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
        }
        item
    }
}

//! Storage engine for heapstore
//!
//! This crate provides the low-level table storage primitives: a
//! fixed-width tuple codec, slotted pages and heap files built on top of
//! a page-addressed store.

pub mod file;
pub mod heap;
pub mod page;
pub mod schema;
pub mod store;
pub mod tuple;
pub mod types;

pub use file::{PageFile, PageFileOptions};
pub use heap::{HeapFile, HeapScan, Locator};
pub use page::{HeapPage, Page, PAGE_SIZE};
pub use schema::Schema;
pub use store::{MemoryPageStore, PageStore};
pub use tuple::{Field, Tuple};
pub use types::FieldType;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Schema has {types} types but {names} names")]
    SchemaLengthMismatch { types: usize, names: usize },

    #[error("Duplicate field name '{0}'")]
    DuplicateField(String),

    #[error("Tuple is not compatible with schema: {reason}")]
    IncompatibleTuple { reason: String },

    #[error("Field index {index} out of range for schema with {len} fields")]
    FieldIndexOutOfRange { index: usize, len: usize },

    #[error("Field '{0}' not found")]
    FieldNotFound(String),

    #[error("Buffer of {actual} bytes is too small, need {needed}")]
    BufferTooSmall { needed: usize, actual: usize },

    #[error("Tuple of {length} bytes does not fit in a {page_size} byte page")]
    TupleTooLarge { length: usize, page_size: usize },

    #[error("Page {page} out of range, file has {page_count} pages")]
    PageOutOfRange { page: usize, page_count: usize },

    #[error("Slot {slot} out of range for page with capacity {capacity}")]
    SlotOutOfRange { slot: usize, capacity: usize },

    #[error("Slot {slot} is not live")]
    InvalidSlot { slot: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checksum mismatch for page {0}")]
    ChecksumMismatch(usize),

    #[error("Invalid page file: {0}")]
    InvalidFile(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

pub mod error;
pub mod instance;
pub mod parallel;
pub mod replacer;

pub use error::BufferPoolError;
pub use instance::BufferPoolInstance;
pub use parallel::ParallelBufferPool;

use crate::common::types::{PageId, PagePtr};

/// Common interface over a single buffer pool instance and the sharded pool
///
/// The extendible hash table is written against this trait so it can run on
/// either flavour.
pub trait BufferPool: Send + Sync {
    /// Allocate a fresh page, pinned once, zero-filled
    fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError>;

    /// Pin a page, reading it from disk if it is not resident
    fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError>;

    /// Drop one pin; `is_dirty` marks the page as modified (sticky)
    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError>;

    /// Write a resident page through to disk and clear its dirty flag
    fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError>;

    /// Write every resident page through to disk
    fn flush_all_pages(&self) -> Result<(), BufferPoolError>;

    /// Drop a page from the cache and release its ID; fails while pinned
    fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError>;
}

// Export public modules
pub mod common;
pub mod index;
pub mod storage;

// Re-export key items for convenient access
pub use storage::buffer::BufferPool;
pub use storage::buffer::BufferPoolError;
pub use storage::buffer::BufferPoolInstance;
pub use storage::buffer::ParallelBufferPool;
pub use storage::disk::DiskManager;
pub use index::hash::ExtendibleHashTable;

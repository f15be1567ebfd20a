pub mod bucket_page;
pub mod directory_page;
pub mod error;
pub mod key;
pub mod table;

pub use bucket_page::BucketPage;
pub use directory_page::{DirectoryPage, DIRECTORY_ARRAY_SIZE, MAX_GLOBAL_DEPTH};
pub use error::HashTableError;
pub use key::{hash32, HashKey, HashValue};
pub use table::ExtendibleHashTable;

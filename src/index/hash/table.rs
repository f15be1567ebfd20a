use std::sync::Arc;
use parking_lot::RwLock;

use crate::common::types::{Page, PageId, INVALID_PAGE_ID};
use crate::index::hash::bucket_page::BucketPage;
use crate::index::hash::directory_page::{DirectoryPage, MAX_GLOBAL_DEPTH};
use crate::index::hash::error::HashTableError;
use crate::index::hash::key::{hash32, HashKey, HashValue};
use crate::storage::buffer::{BufferPool, BufferPoolError};

/// A disk-backed extendible hash table
///
/// The directory and every bucket live in pages owned by the buffer pool;
/// the table itself holds only the directory's page ID and the table latch.
///
/// Latching discipline: lookups and the happy paths of insert/remove run
/// under the shared table latch, with the touched page additionally latched
/// on its own page latch. Splits and merges take the table latch
/// exclusively. A shared holder never upgrades in place; it releases and
/// the exclusive helper re-reads the directory, tolerating whatever
/// happened in between.
///
/// Lock order is table latch, then page latch, then pool mutex. Page
/// latches are never held across buffer pool calls, and are dropped before
/// the matching unpin.
pub struct ExtendibleHashTable<K, V> {
    buffer_pool: Arc<dyn BufferPool>,
    directory_page_id: PageId,
    table_latch: RwLock<()>,
    dir: DirectoryPage,
    bucket: BucketPage<K, V>,
}

impl<K: HashKey, V: HashValue> ExtendibleHashTable<K, V> {
    /// Create an empty table: a directory at global depth 0 whose single
    /// slot points at a fresh bucket
    pub fn new(buffer_pool: Arc<dyn BufferPool>) -> Result<Self, HashTableError> {
        let dir = DirectoryPage::new();
        let bucket = BucketPage::new();

        let (dir_page, directory_page_id) = buffer_pool.new_page()?;
        let (_bucket_page, bucket_page_id) = buffer_pool.new_page()?;

        {
            let mut page = dir_page.write();
            dir.init(&mut page, directory_page_id);
            dir.set_bucket_page_id(&mut page, 0, bucket_page_id);
        }

        buffer_pool.unpin_page(directory_page_id, true)?;
        buffer_pool.unpin_page(bucket_page_id, true)?;

        Ok(Self {
            buffer_pool,
            directory_page_id,
            table_latch: RwLock::new(()),
            dir,
            bucket,
        })
    }

    /// Directory slot and bucket page for a key, under the current mask
    fn lookup(&self, key: &K, dir_page: &Page) -> (usize, PageId) {
        let idx = (hash32(key) & self.dir.global_depth_mask(dir_page)) as usize;
        (idx, self.dir.bucket_page_id(dir_page, idx))
    }

    /// Collect every value stored under `key`
    pub fn get_value(&self, key: &K) -> Result<Vec<V>, HashTableError> {
        let _table = self.table_latch.read();

        let dir_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let (_, bucket_page_id) = {
            let page = dir_page.read();
            self.lookup(key, &page)
        };

        let bucket_page = self.buffer_pool.fetch_page(bucket_page_id)?;
        let result = {
            let page = bucket_page.read();
            self.bucket.get_value(&page, key)
        };

        self.buffer_pool.unpin_page(bucket_page_id, false)?;
        self.buffer_pool.unpin_page(self.directory_page_id, false)?;

        Ok(result)
    }

    /// Insert a (key, value) pair
    ///
    /// Returns false if the exact pair is already present, or if the pair's
    /// hash cluster cannot grow any further (directory at maximum depth, or
    /// no bucket page could be allocated).
    pub fn insert(&self, key: K, value: V) -> Result<bool, HashTableError> {
        loop {
            {
                let _table = self.table_latch.read();

                let dir_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
                let (_, bucket_page_id) = {
                    let page = dir_page.read();
                    self.lookup(&key, &page)
                };

                let bucket_page = self.buffer_pool.fetch_page(bucket_page_id)?;
                let inserted = {
                    let mut page = bucket_page.write();
                    if self.bucket.is_full(&page) {
                        None
                    } else {
                        Some(self.bucket.insert(&mut page, &key, &value))
                    }
                };

                match inserted {
                    Some(inserted) => {
                        self.buffer_pool.unpin_page(bucket_page_id, inserted)?;
                        self.buffer_pool.unpin_page(self.directory_page_id, false)?;
                        return Ok(inserted);
                    }
                    None => {
                        self.buffer_pool.unpin_page(bucket_page_id, false)?;
                        self.buffer_pool.unpin_page(self.directory_page_id, false)?;
                    }
                }
            }

            // The bucket is full: split it, then retry from the top. The
            // retry recomputes everything, since the directory may have
            // been reshaped by the time the shared latch is reacquired.
            if !self.split_insert(&key)? {
                return Ok(false);
            }
        }
    }

    /// Split the bucket the key currently hashes to, growing the directory
    /// if the bucket already uses every directory bit
    ///
    /// Returns false when no further split is possible.
    fn split_insert(&self, key: &K) -> Result<bool, HashTableError> {
        let _table = self.table_latch.write();

        let dir_page = self.buffer_pool.fetch_page(self.directory_page_id)?;

        // Grow the directory first if the target bucket already
        // discriminates on every directory bit
        let (bucket_page_id, local_depth, grew) = {
            let mut page = dir_page.write();
            let idx = (hash32(key) & self.dir.global_depth_mask(&page)) as usize;
            let bucket_page_id = self.dir.bucket_page_id(&page, idx);
            let local_depth = self.dir.local_depth(&page, idx);

            let mut grew = false;
            if local_depth == self.dir.global_depth(&page) {
                if self.dir.global_depth(&page) == MAX_GLOBAL_DEPTH {
                    drop(page);
                    self.buffer_pool.unpin_page(self.directory_page_id, false)?;
                    return Ok(false);
                }
                self.dir.incr_global_depth(&mut page);
                grew = true;
                log::debug!("directory grew to depth {}", self.dir.global_depth(&page));
            }
            (bucket_page_id, local_depth, grew)
        };

        let (new_bucket_page, new_bucket_page_id) = match self.buffer_pool.new_page() {
            Ok(created) => created,
            Err(BufferPoolError::NoFreeFrames) => {
                self.buffer_pool.unpin_page(self.directory_page_id, grew)?;
                return Ok(false);
            }
            Err(e) => {
                self.buffer_pool.unpin_page(self.directory_page_id, grew)?;
                return Err(e.into());
            }
        };

        let bucket_page = self.buffer_pool.fetch_page(bucket_page_id)?;

        {
            let mut dir = dir_page.write();
            let mut old_page = bucket_page.write();
            let mut new_page = new_bucket_page.write();

            // Repoint the high half of the bucket's slots at the split
            // image; both halves now discriminate on one more bit.
            let high_bit = 1usize << local_depth;
            for slot in 0..self.dir.size(&dir) {
                if self.dir.bucket_page_id(&dir, slot) != bucket_page_id {
                    continue;
                }
                if slot & high_bit != 0 {
                    self.dir.set_bucket_page_id(&mut dir, slot, new_bucket_page_id);
                }
                self.dir.incr_local_depth(&mut dir, slot);
            }

            // Rehash the live records; the ones whose hash resolves to the
            // split image move over.
            let mask = self.dir.global_depth_mask(&dir);
            for slot in 0..BucketPage::<K, V>::capacity() {
                if !self.bucket.is_occupied(&old_page, slot) {
                    break;
                }
                if !self.bucket.is_readable(&old_page, slot) {
                    continue;
                }
                let slot_key = self.bucket.key_at(&old_page, slot);
                let target = (hash32(&slot_key) & mask) as usize;
                if self.dir.bucket_page_id(&dir, target) == new_bucket_page_id {
                    let slot_value = self.bucket.value_at(&old_page, slot);
                    self.bucket.remove_at(&mut old_page, slot);
                    self.bucket.insert(&mut new_page, &slot_key, &slot_value);
                }
            }
        }

        log::debug!(
            "split bucket {} into {} at depth {}",
            bucket_page_id,
            new_bucket_page_id,
            local_depth + 1
        );

        self.buffer_pool.unpin_page(bucket_page_id, true)?;
        self.buffer_pool.unpin_page(new_bucket_page_id, true)?;
        self.buffer_pool.unpin_page(self.directory_page_id, true)?;

        Ok(true)
    }

    /// Remove a (key, value) pair
    pub fn remove(&self, key: &K, value: &V) -> Result<bool, HashTableError> {
        let removed;
        let mut merge_candidate = false;

        {
            let _table = self.table_latch.read();

            let dir_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
            let (idx, bucket_page_id) = {
                let page = dir_page.read();
                self.lookup(key, &page)
            };

            let bucket_page = self.buffer_pool.fetch_page(bucket_page_id)?;
            let now_empty;
            {
                let mut page = bucket_page.write();
                removed = self.bucket.remove(&mut page, key, value);
                now_empty = self.bucket.is_empty(&page);
            }

            // An empty bucket with a sibling at the same depth can be
            // merged, but that needs the exclusive latch.
            if now_empty {
                let page = dir_page.read();
                let local_depth = self.dir.local_depth(&page, idx);
                if local_depth > 0 {
                    let sibling_idx = idx ^ (1usize << (local_depth - 1));
                    merge_candidate = self.dir.local_depth(&page, sibling_idx) == local_depth;
                }
            }

            self.buffer_pool.unpin_page(bucket_page_id, removed)?;
            self.buffer_pool.unpin_page(self.directory_page_id, true)?;
        }

        if merge_candidate {
            self.merge(key)?;
        }

        Ok(removed)
    }

    /// Coalesce the key's bucket with its split image
    ///
    /// Runs after the shared latch was released, so every precondition is
    /// checked again: a racing writer may have refilled the bucket or
    /// reshaped the directory.
    fn merge(&self, key: &K) -> Result<(), HashTableError> {
        let _table = self.table_latch.write();

        let dir_page = self.buffer_pool.fetch_page(self.directory_page_id)?;

        let candidate = {
            let page = dir_page.read();
            let idx = (hash32(key) & self.dir.global_depth_mask(&page)) as usize;
            let local_depth = self.dir.local_depth(&page, idx);

            if local_depth == 0 {
                None
            } else {
                let sibling_idx = idx ^ (1usize << (local_depth - 1));
                if self.dir.local_depth(&page, sibling_idx) != local_depth {
                    None
                } else {
                    Some((
                        self.dir.bucket_page_id(&page, idx),
                        self.dir.bucket_page_id(&page, sibling_idx),
                    ))
                }
            }
        };

        let Some((bucket_page_id, sibling_page_id)) = candidate else {
            self.buffer_pool.unpin_page(self.directory_page_id, false)?;
            return Ok(());
        };

        let bucket_page = self.buffer_pool.fetch_page(bucket_page_id)?;
        let sibling_page = self.buffer_pool.fetch_page(sibling_page_id)?;

        let bucket_empty = {
            let page = bucket_page.read();
            self.bucket.is_empty(&page)
        };
        let sibling_empty = {
            let page = sibling_page.read();
            self.bucket.is_empty(&page)
        };

        let (orphan_page_id, survivor_page_id) = if bucket_empty {
            (bucket_page_id, sibling_page_id)
        } else if sibling_empty {
            (sibling_page_id, bucket_page_id)
        } else {
            self.buffer_pool.unpin_page(bucket_page_id, false)?;
            self.buffer_pool.unpin_page(sibling_page_id, false)?;
            self.buffer_pool.unpin_page(self.directory_page_id, false)?;
            return Ok(());
        };

        {
            let mut dir = dir_page.write();

            // Coalesce: both slot classes point at the survivor, one bit
            // shallower.
            for slot in 0..self.dir.size(&dir) {
                let page_id = self.dir.bucket_page_id(&dir, slot);
                if page_id == orphan_page_id || page_id == survivor_page_id {
                    self.dir.set_bucket_page_id(&mut dir, slot, survivor_page_id);
                    self.dir.decr_local_depth(&mut dir, slot);
                }
            }

            // Drop directory bits no bucket discriminates on any more. The
            // upper half mirrors the lower half whenever this fires.
            while self.dir.can_shrink(&dir) && self.dir.global_depth(&dir) > 1 {
                let size = self.dir.size(&dir);
                for slot in size / 2..size {
                    debug_assert_eq!(
                        self.dir.bucket_page_id(&dir, slot),
                        self.dir.bucket_page_id(&dir, slot - size / 2)
                    );
                    self.dir.set_bucket_page_id(&mut dir, slot, INVALID_PAGE_ID);
                    self.dir.set_local_depth(&mut dir, slot, 0);
                }
                self.dir.decr_global_depth(&mut dir);
                log::debug!("directory shrank to depth {}", self.dir.global_depth(&dir));
            }
        }

        self.buffer_pool.unpin_page(bucket_page_id, false)?;
        self.buffer_pool.unpin_page(sibling_page_id, false)?;
        self.buffer_pool.delete_page(orphan_page_id)?;
        self.buffer_pool.unpin_page(self.directory_page_id, true)?;

        log::debug!("merged bucket {} into {}", orphan_page_id, survivor_page_id);

        Ok(())
    }

    /// Current global depth of the directory
    pub fn global_depth(&self) -> Result<u32, HashTableError> {
        let _table = self.table_latch.read();

        let dir_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let depth = {
            let page = dir_page.read();
            self.dir.global_depth(&page)
        };
        self.buffer_pool.unpin_page(self.directory_page_id, false)?;

        Ok(depth)
    }

    /// Check the directory invariants, panicking on violation
    pub fn verify_integrity(&self) -> Result<(), HashTableError> {
        let _table = self.table_latch.read();

        let dir_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        {
            let page = dir_page.read();
            self.dir.verify_integrity(&page);
        }
        self.buffer_pool.unpin_page(self.directory_page_id, false)?;

        Ok(())
    }
}

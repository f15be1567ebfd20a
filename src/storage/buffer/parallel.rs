use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use once_cell::sync::OnceCell;

use crate::common::types::{PageId, PagePtr};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::instance::BufferPoolInstance;
use crate::storage::buffer::BufferPool;
use crate::storage::disk::DiskManager;

/// A buffer pool sharded across independent [`BufferPoolInstance`]s
///
/// Page IDs partition cleanly: page `id` always lives in instance
/// `id % num_instances`, and instance `i` only ever allocates IDs congruent
/// to `i`. The router holds no lock of its own, so operations on different
/// shards never contend.
///
/// Instances are materialised lazily, the first time allocation reaches
/// them.
pub struct ParallelBufferPool {
    num_instances: usize,
    pool_size: usize,
    disk_manager: Arc<DiskManager>,
    instances: Vec<OnceCell<BufferPoolInstance>>,
    start_instance: AtomicUsize,
}

impl ParallelBufferPool {
    /// Create a pool of `num_instances` shards with `pool_size` frames each
    pub fn new(
        num_instances: usize,
        pool_size: usize,
        db_path: impl AsRef<Path>,
    ) -> Result<Self, BufferPoolError> {
        assert!(num_instances > 0, "a pool must have at least one instance");

        let disk_manager = Arc::new(DiskManager::new(db_path)?);
        let instances = (0..num_instances).map(|_| OnceCell::new()).collect();

        Ok(Self {
            num_instances,
            pool_size,
            disk_manager,
            instances,
            start_instance: AtomicUsize::new(0),
        })
    }

    pub fn num_instances(&self) -> usize {
        self.num_instances
    }

    /// Total frame count across all shards
    pub fn pool_size(&self) -> usize {
        self.num_instances * self.pool_size
    }

    fn instance_at(&self, index: usize) -> &BufferPoolInstance {
        self.instances[index].get_or_init(|| {
            BufferPoolInstance::new_sharded(
                self.pool_size,
                self.num_instances,
                index,
                self.disk_manager.clone(),
            )
        })
    }

    /// The shard responsible for `page_id`
    fn instance_for(&self, page_id: PageId) -> &BufferPoolInstance {
        let index = page_id.rem_euclid(self.num_instances as PageId) as usize;
        self.instance_at(index)
    }
}

impl BufferPool for ParallelBufferPool {
    /// Create a new page on the first shard that has a frame to spare
    ///
    /// Allocation starts at a rotating cursor and probes round-robin. The
    /// cursor advances on every call, successful or not, so repeated
    /// callers spread their pages across the shards.
    fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let start = self.start_instance.fetch_add(1, Ordering::Relaxed) % self.num_instances;

        for offset in 0..self.num_instances {
            let index = (start + offset) % self.num_instances;
            match self.instance_at(index).new_page() {
                Ok(result) => return Ok(result),
                Err(BufferPoolError::NoFreeFrames) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(BufferPoolError::NoFreeFrames)
    }

    fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        self.instance_for(page_id).fetch_page(page_id)
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        self.instance_for(page_id).unpin_page(page_id, is_dirty)
    }

    fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        self.instance_for(page_id).flush_page(page_id)
    }

    /// Flush every resident page across all materialised shards
    fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        for cell in &self.instances {
            if let Some(instance) = cell.get() {
                instance.flush_all_pages()?;
            }
        }
        Ok(())
    }

    fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        self.instance_for(page_id).delete_page(page_id)
    }
}

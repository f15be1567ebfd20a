use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use parking_lot::Mutex;

use crate::common::types::{Frame, FrameId, PageId, PagePtr, INVALID_PAGE_ID};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::replacer::LRUReplacer;
use crate::storage::buffer::BufferPool;
use crate::storage::disk::DiskManager;

/// Everything the instance mutex guards: frame metadata, the page table,
/// the free list, the replacer, and the page ID counter.
struct PoolCore {
    frames: Vec<Frame>,
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
    replacer: LRUReplacer,
    next_page_id: PageId,
}

/// A single buffer pool instance over a fixed set of frames
///
/// One mutex serialises every operation, so each call is atomic with
/// respect to the others. Page *data* sits behind the per-page latch in
/// `PagePtr`, which callers lock after fetching and release before the
/// matching unpin.
///
/// When the instance is one shard of a [`ParallelBufferPool`], the IDs it
/// allocates satisfy `id % num_instances == instance_index`.
///
/// [`ParallelBufferPool`]: crate::storage::buffer::ParallelBufferPool
pub struct BufferPoolInstance {
    pool_size: usize,
    num_instances: usize,
    instance_index: usize,
    disk_manager: Arc<DiskManager>,
    core: Mutex<PoolCore>,
}

impl BufferPoolInstance {
    /// Create a standalone instance backed by the database file at `db_path`
    pub fn new(pool_size: usize, db_path: impl AsRef<Path>) -> Result<Self, BufferPoolError> {
        let disk_manager = Arc::new(DiskManager::new(db_path)?);
        Ok(Self::new_sharded(pool_size, 1, 0, disk_manager))
    }

    /// Create shard `instance_index` of `num_instances`, sharing a disk manager
    pub fn new_sharded(
        pool_size: usize,
        num_instances: usize,
        instance_index: usize,
        disk_manager: Arc<DiskManager>,
    ) -> Self {
        assert!(num_instances > 0, "a pool must have at least one instance");
        assert!(
            instance_index < num_instances,
            "instance index {} out of range for {} instances",
            instance_index,
            num_instances
        );

        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        for i in 0..pool_size {
            let frame_id = i as FrameId;
            frames.push(Frame::new(frame_id));
            free_list.push_back(frame_id);
        }

        Self {
            pool_size,
            num_instances,
            instance_index,
            disk_manager,
            core: Mutex::new(PoolCore {
                frames,
                page_table: HashMap::new(),
                free_list,
                replacer: LRUReplacer::new(pool_size),
                next_page_id: instance_index as PageId,
            }),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Pin count of a resident page; `None` if the page is not resident
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let core = self.core.lock();
        let frame_id = *core.page_table.get(&page_id)?;
        Some(core.frames[frame_id as usize].pin_count)
    }

    /// Allocate a fresh page ID; consecutive IDs from this instance differ
    /// by `num_instances`, so shards never collide.
    fn allocate_page_id(&self, core: &mut PoolCore) -> PageId {
        let page_id = core.next_page_id;
        core.next_page_id += self.num_instances as PageId;
        debug_assert_eq!(page_id as usize % self.num_instances, self.instance_index);
        page_id
    }

    /// Take a frame for reuse: free list first, then LRU eviction
    ///
    /// On success the frame is unmapped, clean, and tracked by neither the
    /// free list nor the replacer. If the eviction write-back fails, the
    /// victim is put back in the replacer and the pool is unchanged.
    fn take_frame(&self, core: &mut PoolCore) -> Result<FrameId, BufferPoolError> {
        if let Some(frame_id) = core.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = core.replacer.victim().ok_or(BufferPoolError::NoFreeFrames)?;

        let old_page_id = core.frames[frame_id as usize].page.read().page_id;

        if core.frames[frame_id as usize].is_dirty {
            let result = {
                let page = core.frames[frame_id as usize].page.read();
                self.disk_manager.write_page(&page)
            };
            if let Err(e) = result {
                core.replacer.unpin(frame_id);
                return Err(e.into());
            }
            log::debug!("evicted dirty page {} from frame {}", old_page_id, frame_id);
            core.frames[frame_id as usize].is_dirty = false;
        }

        if old_page_id != INVALID_PAGE_ID {
            core.page_table.remove(&old_page_id);
        }

        Ok(frame_id)
    }
}

impl BufferPool for BufferPoolInstance {
    /// Create a new page
    ///
    /// The returned page is zero-filled and pinned once.
    fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let mut core = self.core.lock();

        let frame_id = self.take_frame(&mut core)?;
        let page_id = self.allocate_page_id(&mut core);

        {
            let frame = &mut core.frames[frame_id as usize];
            frame.page.write().reset(page_id);
            frame.pin_count = 1;
            frame.is_dirty = false;
        }

        core.replacer.pin(frame_id);
        core.page_table.insert(page_id, frame_id);

        Ok((core.frames[frame_id as usize].page.clone(), page_id))
    }

    /// Fetch a page from the buffer pool or disk
    fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        let mut core = self.core.lock();

        // Already resident: pin and return without touching the disk
        if let Some(&frame_id) = core.page_table.get(&page_id) {
            core.frames[frame_id as usize].pin_count += 1;
            core.replacer.pin(frame_id);
            return Ok(core.frames[frame_id as usize].page.clone());
        }

        let frame_id = self.take_frame(&mut core)?;

        let result = {
            let mut page = core.frames[frame_id as usize].page.write();
            self.disk_manager.read_page(page_id, &mut page)
        };
        if let Err(e) = result {
            // The frame is unmapped and clean; hand it back to the free list
            core.free_list.push_back(frame_id);
            return Err(e.into());
        }

        {
            let frame = &mut core.frames[frame_id as usize];
            frame.pin_count = 1;
            frame.is_dirty = false;
        }

        core.replacer.pin(frame_id);
        core.page_table.insert(page_id, frame_id);

        Ok(core.frames[frame_id as usize].page.clone())
    }

    /// Unpin a page, potentially marking it as dirty
    ///
    /// The dirty flag is sticky: `is_dirty == false` never clears a flag set
    /// by an earlier unpin; only a flush does.
    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        let mut core = self.core.lock();

        let frame_id = *core
            .page_table
            .get(&page_id)
            .ok_or(BufferPoolError::PageNotFound(page_id))?;

        let frame = &mut core.frames[frame_id as usize];

        if is_dirty {
            frame.is_dirty = true;
        }

        if frame.pin_count == 0 {
            return Err(BufferPoolError::PageNotPinned(page_id));
        }

        frame.pin_count -= 1;
        if frame.pin_count == 0 {
            core.replacer.unpin(frame_id);
        }

        Ok(())
    }

    /// Flush a specific page to disk
    ///
    /// Writes unconditionally and clears the dirty flag, so a flush of a
    /// clean page is an idempotent no-op on the disk image.
    fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let mut core = self.core.lock();

        let frame_id = *core
            .page_table
            .get(&page_id)
            .ok_or(BufferPoolError::PageNotFound(page_id))?;

        {
            let page = core.frames[frame_id as usize].page.read();
            self.disk_manager.write_page(&page)?;
        }
        core.frames[frame_id as usize].is_dirty = false;

        Ok(())
    }

    /// Flush all pages in the buffer pool to disk
    fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        let mut core = self.core.lock();

        let resident: Vec<FrameId> = core.page_table.values().copied().collect();
        for frame_id in resident {
            {
                let page = core.frames[frame_id as usize].page.read();
                self.disk_manager.write_page(&page)?;
            }
            core.frames[frame_id as usize].is_dirty = false;
        }

        Ok(())
    }

    /// Delete a page from the buffer pool and release its ID
    ///
    /// Deleting a page that is not resident succeeds trivially; deleting a
    /// pinned page fails and leaves the pool unchanged.
    fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let mut core = self.core.lock();

        let frame_id = match core.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(()),
        };

        if core.frames[frame_id as usize].pin_count > 0 {
            return Err(BufferPoolError::PagePinned(page_id));
        }

        if core.frames[frame_id as usize].is_dirty {
            let page = core.frames[frame_id as usize].page.read();
            self.disk_manager.write_page(&page)?;
        }

        core.page_table.remove(&page_id);

        {
            let frame = &mut core.frames[frame_id as usize];
            frame.page.write().reset(INVALID_PAGE_ID);
            frame.pin_count = 0;
            frame.is_dirty = false;
        }

        core.replacer.pin(frame_id);
        core.free_list.push_back(frame_id);

        self.disk_manager.deallocate_page(page_id);

        Ok(())
    }
}

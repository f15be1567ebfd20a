use std::collections::HashMap;

use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{Page, PageId, INVALID_PAGE_ID};

/// Number of slots in the directory array
pub const DIRECTORY_ARRAY_SIZE: usize = 512;

/// Deepest the directory can grow: log2(DIRECTORY_ARRAY_SIZE)
pub const MAX_GLOBAL_DEPTH: u32 = 9;

const PAGE_ID_OFFSET: usize = 0;
// 4 bytes reserved for an LSN at offset 4; zeroed by init, otherwise untouched
const LSN_OFFSET: usize = 4;
const GLOBAL_DEPTH_OFFSET: usize = 8;
const LOCAL_DEPTHS_OFFSET: usize = 12;
const BUCKET_PAGE_IDS_OFFSET: usize = LOCAL_DEPTHS_OFFSET + DIRECTORY_ARRAY_SIZE;

/// Accessor for the directory page of an extendible hash table
///
/// On-page layout (little-endian):
///
/// ```text
/// | page_id:4 | lsn:4 | global_depth:4 | local_depths[512]:1 | bucket_page_ids[512]:4 |
/// ```
///
/// The low `global_depth` bits of a key's hash index the directory; slot
/// `i` names the bucket page for that hash prefix and the number of hash
/// bits (`local_depths[i]`) its bucket actually discriminates on. The
/// accessor is stateless; callers hold the page latch.
pub struct DirectoryPage;

impl DirectoryPage {
    pub fn new() -> Self {
        Self
    }

    /// Set up a freshly allocated (zeroed) page as an empty directory
    ///
    /// Global depth starts at 0 with every slot unset; the caller wires in
    /// bucket 0 afterwards.
    pub fn init(&self, page: &mut Page, page_id: PageId) {
        LittleEndian::write_i32(&mut page.data[PAGE_ID_OFFSET..PAGE_ID_OFFSET + 4], page_id);
        LittleEndian::write_u32(&mut page.data[LSN_OFFSET..LSN_OFFSET + 4], 0);
        LittleEndian::write_u32(&mut page.data[GLOBAL_DEPTH_OFFSET..GLOBAL_DEPTH_OFFSET + 4], 0);
        for idx in 0..DIRECTORY_ARRAY_SIZE {
            self.set_bucket_page_id(page, idx, INVALID_PAGE_ID);
            self.set_local_depth(page, idx, 0);
        }
    }

    pub fn page_id(&self, page: &Page) -> PageId {
        LittleEndian::read_i32(&page.data[PAGE_ID_OFFSET..PAGE_ID_OFFSET + 4])
    }

    pub fn global_depth(&self, page: &Page) -> u32 {
        LittleEndian::read_u32(&page.data[GLOBAL_DEPTH_OFFSET..GLOBAL_DEPTH_OFFSET + 4])
    }

    fn set_global_depth(&self, page: &mut Page, depth: u32) {
        LittleEndian::write_u32(&mut page.data[GLOBAL_DEPTH_OFFSET..GLOBAL_DEPTH_OFFSET + 4], depth);
    }

    /// Mask selecting the hash bits that index the directory
    pub fn global_depth_mask(&self, page: &Page) -> u32 {
        (1 << self.global_depth(page)) - 1
    }

    /// Number of live directory slots
    pub fn size(&self, page: &Page) -> usize {
        1 << self.global_depth(page)
    }

    /// Double the directory
    ///
    /// Each slot `i` is duplicated into `i + old_size`, page ID and local
    /// depth both, so every bucket keeps its pointer footprint and the
    /// directory invariants survive the growth unchanged.
    pub fn incr_global_depth(&self, page: &mut Page) {
        let global_depth = self.global_depth(page);
        debug_assert!(global_depth < MAX_GLOBAL_DEPTH);

        let old_size = self.size(page);
        for idx in 0..old_size {
            let bucket_page_id = self.bucket_page_id(page, idx);
            let local_depth = self.local_depth(page, idx);
            self.set_bucket_page_id(page, idx + old_size, bucket_page_id);
            self.set_local_depth(page, idx + old_size, local_depth as u8);
        }

        self.set_global_depth(page, global_depth + 1);
    }

    /// Halve the directory; the caller has already cleared the upper half
    pub fn decr_global_depth(&self, page: &mut Page) {
        let global_depth = self.global_depth(page);
        debug_assert!(global_depth > 0);
        self.set_global_depth(page, global_depth - 1);
    }

    /// True iff dropping one directory bit would preserve the invariants
    pub fn can_shrink(&self, page: &Page) -> bool {
        let global_depth = self.global_depth(page);
        (0..self.size(page)).all(|idx| self.local_depth(page, idx) < global_depth)
    }

    pub fn local_depth(&self, page: &Page, idx: usize) -> u32 {
        page.data[LOCAL_DEPTHS_OFFSET + idx] as u32
    }

    pub fn set_local_depth(&self, page: &mut Page, idx: usize, depth: u8) {
        page.data[LOCAL_DEPTHS_OFFSET + idx] = depth;
    }

    pub fn incr_local_depth(&self, page: &mut Page, idx: usize) {
        page.data[LOCAL_DEPTHS_OFFSET + idx] += 1;
    }

    pub fn decr_local_depth(&self, page: &mut Page, idx: usize) {
        page.data[LOCAL_DEPTHS_OFFSET + idx] -= 1;
    }

    pub fn bucket_page_id(&self, page: &Page, idx: usize) -> PageId {
        let offset = BUCKET_PAGE_IDS_OFFSET + idx * 4;
        LittleEndian::read_i32(&page.data[offset..offset + 4])
    }

    pub fn set_bucket_page_id(&self, page: &mut Page, idx: usize, bucket_page_id: PageId) {
        let offset = BUCKET_PAGE_IDS_OFFSET + idx * 4;
        LittleEndian::write_i32(&mut page.data[offset..offset + 4], bucket_page_id);
    }

    /// The bit that separates slot `idx` from its split image
    pub fn local_high_bit(&self, page: &Page, idx: usize) -> usize {
        1 << self.local_depth(page, idx)
    }

    /// The slot that shares the first `local_depth` hash bits with `idx`
    pub fn split_image_index(&self, page: &Page, idx: usize) -> usize {
        idx ^ self.local_high_bit(page, idx)
    }

    /// Check the directory invariants, panicking on violation:
    /// (1) every local depth is at most the global depth;
    /// (2) each bucket is pointed to by exactly 2^(GD - LD) slots;
    /// (3) all slots sharing a bucket agree on its local depth.
    pub fn verify_integrity(&self, page: &Page) {
        let mut page_id_to_count: HashMap<PageId, u32> = HashMap::new();
        let mut page_id_to_local_depth: HashMap<PageId, u32> = HashMap::new();

        let global_depth = self.global_depth(page);

        for idx in 0..self.size(page) {
            let bucket_page_id = self.bucket_page_id(page, idx);
            let local_depth = self.local_depth(page, idx);

            assert!(
                local_depth <= global_depth,
                "local depth {} at slot {} exceeds global depth {}",
                local_depth,
                idx,
                global_depth
            );

            *page_id_to_count.entry(bucket_page_id).or_insert(0) += 1;

            match page_id_to_local_depth.get(&bucket_page_id) {
                Some(&known) if known != local_depth => {
                    log::warn!(
                        "bucket {} has local depth {} at slot {} but {} elsewhere",
                        bucket_page_id,
                        local_depth,
                        idx,
                        known
                    );
                    panic!("inconsistent local depths for bucket {}", bucket_page_id);
                }
                Some(_) => {}
                None => {
                    page_id_to_local_depth.insert(bucket_page_id, local_depth);
                }
            }
        }

        for (bucket_page_id, count) in page_id_to_count {
            let local_depth = page_id_to_local_depth[&bucket_page_id];
            let required = 1u32 << (global_depth - local_depth);
            assert_eq!(
                count, required,
                "bucket {} has {} pointers, expected {}",
                bucket_page_id, count, required
            );
        }
    }
}

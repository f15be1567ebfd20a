use linked_hash_map::LinkedHashMap;
use crate::common::types::FrameId;

/// LRU (Least Recently Used) page replacement policy
///
/// Tracks the frames whose pin count has dropped to zero, in the order they
/// became replaceable. The linked hash map gives O(1) insert, remove and
/// victim selection; the front of the map is the least recently used frame.
pub struct LRUReplacer {
    frames: LinkedHashMap<FrameId, ()>,
}

impl LRUReplacer {
    pub fn new(pool_size: usize) -> Self {
        Self {
            frames: LinkedHashMap::with_capacity(pool_size),
        }
    }

    /// Mark a frame replaceable, at the most-recently-used end
    ///
    /// A frame that is already tracked keeps its position.
    pub fn unpin(&mut self, frame_id: FrameId) {
        if self.frames.contains_key(&frame_id) {
            return;
        }
        self.frames.insert(frame_id, ());
    }

    /// Remove a frame from the replaceable set, if present
    pub fn pin(&mut self, frame_id: FrameId) {
        self.frames.remove(&frame_id);
    }

    /// Victim selection: remove and return the least recently used frame
    pub fn victim(&mut self) -> Option<FrameId> {
        self.frames.pop_front().map(|(frame_id, _)| frame_id)
    }

    /// Number of replaceable frames
    pub fn size(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_victim_returns_least_recently_unpinned() {
        let mut replacer = LRUReplacer::new(10);
        replacer.unpin(0);
        replacer.unpin(1);
        replacer.unpin(2);

        assert_eq!(replacer.size(), 3);
        assert_eq!(replacer.victim(), Some(0));
        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_pin_removes_frame() {
        let mut replacer = LRUReplacer::new(10);
        replacer.unpin(0);
        replacer.unpin(1);
        replacer.unpin(2);

        replacer.pin(1);

        assert_eq!(replacer.size(), 2);
        assert_eq!(replacer.victim(), Some(0));
        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_pin_absent_frame_is_noop() {
        let mut replacer = LRUReplacer::new(10);
        replacer.pin(42);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_unpin_is_idempotent() {
        let mut replacer = LRUReplacer::new(10);
        replacer.unpin(3);
        replacer.unpin(4);
        replacer.unpin(3);

        // The duplicate unpin must not refresh frame 3's position
        assert_eq!(replacer.size(), 2);
        assert_eq!(replacer.victim(), Some(3));
        assert_eq!(replacer.victim(), Some(4));
    }

    #[test]
    fn test_pin_then_unpin_moves_to_back() {
        let mut replacer = LRUReplacer::new(10);
        replacer.unpin(0);
        replacer.unpin(1);
        replacer.unpin(2);

        replacer.pin(0);
        replacer.unpin(0);

        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), Some(0));
    }
}

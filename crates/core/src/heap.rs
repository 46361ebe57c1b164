//! Binary min-heap keyed by vertex id.
//!
//! Slots live in a dense array; a second dense table maps each key to its
//! slot so `decrease_key` finds the entry without scanning.

use crate::types::VertexId;

#[derive(Clone, Debug, Default)]
pub struct IndexedPriorityQueue<V> {
    heap: Vec<(VertexId, V)>,
    positions: Vec<Option<usize>>,
}

impl<V: PartialOrd + Copy> IndexedPriorityQueue<V> {
    pub fn new() -> Self {
        Self {
            heap: Vec::new(),
            positions: Vec::new(),
        }
    }

    /// Pre-sizes the position table for keys `0..num_keys`
    pub fn with_capacity(num_keys: usize) -> Self {
        Self {
            heap: Vec::new(),
            positions: vec![None; num_keys],
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn contains(&self, key: VertexId) -> bool {
        self.position(key).is_some()
    }

    /// Current value stored for `key`
    pub fn value(&self, key: VertexId) -> Option<V> {
        self.position(key).map(|pos| self.heap[pos].1)
    }

    pub fn top(&self) -> Option<(VertexId, V)> {
        self.heap.first().copied()
    }

    /// Inserts a key that is not in the queue
    pub fn push(&mut self, key: VertexId, value: V) {
        debug_assert!(!self.contains(key), "key {key} pushed twice");

        let slot = key as usize;
        if slot >= self.positions.len() {
            self.positions.resize(slot + 1, None);
        }
        let pos = self.heap.len();
        self.heap.push((key, value));
        self.positions[slot] = Some(pos);
        self.sift_up(pos);
    }

    pub fn pop(&mut self) -> Option<(VertexId, V)> {
        if self.heap.is_empty() {
            return None;
        }
        let last = self.heap.len() - 1;
        self.swap(0, last);
        let (key, value) = self.heap.pop()?;
        self.positions[key as usize] = None;
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        Some((key, value))
    }

    /// Lowers the value of `key`; returns false if absent or `value` is not smaller
    pub fn decrease_key(&mut self, key: VertexId, value: V) -> bool {
        let Some(pos) = self.position(key) else {
            return false;
        };
        if !(value < self.heap[pos].1) {
            return false;
        }
        self.heap[pos].1 = value;
        self.sift_up(pos);
        true
    }

    /// Raises the value of `key`; returns false if absent or `value` is not larger
    pub fn increase_key(&mut self, key: VertexId, value: V) -> bool {
        let Some(pos) = self.position(key) else {
            return false;
        };
        if !(value > self.heap[pos].1) {
            return false;
        }
        self.heap[pos].1 = value;
        self.sift_down(pos);
        true
    }

    /// Empties the queue, keeping allocations
    pub fn clear(&mut self) {
        for (key, _) in self.heap.drain(..) {
            self.positions[key as usize] = None;
        }
    }

    fn position(&self, key: VertexId) -> Option<usize> {
        self.positions.get(key as usize).copied().flatten()
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.positions[self.heap[a].0 as usize] = Some(a);
        self.positions[self.heap[b].0 as usize] = Some(b);
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.heap[pos].1 < self.heap[parent].1 {
                self.swap(pos, parent);
                pos = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut smallest = pos;

            if left < len && self.heap[left].1 < self.heap[smallest].1 {
                smallest = left;
            }
            if right < len && self.heap[right].1 < self.heap[smallest].1 {
                smallest = right;
            }
            if smallest == pos {
                break;
            }
            self.swap(pos, smallest);
            pos = smallest;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_pops_in_order() {
        let mut queue = IndexedPriorityQueue::new();
        queue.push(4, 7.0);
        queue.push(1, 3.0);
        queue.push(9, 5.0);
        queue.push(0, 1.0);

        assert_eq!(queue.len(), 4);
        assert_eq!(queue.top(), Some((0, 1.0)));

        let order: Vec<VertexId> = std::iter::from_fn(|| queue.pop()).map(|(k, _)| k).collect();
        assert_eq!(order, vec![0, 1, 9, 4]);
        assert!(queue.is_empty());
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_decrease_key_moves_to_front() {
        let mut queue = IndexedPriorityQueue::with_capacity(8);
        queue.push(1, 10);
        queue.push(2, 20);
        queue.push(3, 30);

        assert!(queue.decrease_key(3, 5));
        assert_eq!(queue.top(), Some((3, 5)));
        assert_eq!(queue.value(3), Some(5));

        // Not strictly smaller
        assert!(!queue.decrease_key(3, 5));
        assert!(!queue.decrease_key(1, 11));
        // Absent
        assert!(!queue.decrease_key(7, 0));
    }

    #[test]
    fn test_increase_key_sinks() {
        let mut queue = IndexedPriorityQueue::new();
        queue.push(1, 1);
        queue.push(2, 2);
        queue.push(3, 3);

        assert!(queue.increase_key(1, 10));
        assert!(!queue.increase_key(1, 10));
        assert_eq!(queue.pop(), Some((2, 2)));
        assert_eq!(queue.pop(), Some((3, 3)));
        assert_eq!(queue.pop(), Some((1, 10)));
    }

    #[test]
    fn test_contains_tracks_membership() {
        let mut queue = IndexedPriorityQueue::new();
        assert!(!queue.contains(100));
        queue.push(100, 1.5);
        assert!(queue.contains(100));
        queue.pop();
        assert!(!queue.contains(100));
        assert_eq!(queue.value(100), None);
    }

    #[test]
    fn test_clear_allows_reuse() {
        let mut queue = IndexedPriorityQueue::with_capacity(4);
        queue.push(0, 1);
        queue.push(3, 2);
        queue.clear();

        assert!(queue.is_empty());
        assert!(!queue.contains(3));
        queue.push(3, 9);
        assert_eq!(queue.pop(), Some((3, 9)));
    }

    #[test]
    fn test_random_interleaving_pops_minimum() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut queue = IndexedPriorityQueue::with_capacity(512);
        let mut shadow: Vec<Option<u32>> = vec![None; 512];

        for _ in 0..5_000 {
            let key = rng.random_range(0..512u32);
            match rng.random_range(0..3) {
                0 => {
                    let value = rng.random_range(0..10_000u32);
                    if shadow[key as usize].is_none() {
                        queue.push(key, value);
                        shadow[key as usize] = Some(value);
                    }
                }
                1 => {
                    if let Some(current) = shadow[key as usize] {
                        let lower = current / 2;
                        let changed = queue.decrease_key(key, lower);
                        assert_eq!(changed, lower < current);
                        shadow[key as usize] = Some(lower);
                        assert!(queue.top().map(|(_, v)| v <= lower).unwrap_or(false));
                    }
                }
                _ => {
                    let expected = shadow.iter().flatten().min().copied();
                    let popped = queue.pop();
                    assert_eq!(popped.map(|(_, v)| v), expected);
                    if let Some((k, _)) = popped {
                        shadow[k as usize] = None;
                    }
                }
            }
            assert_eq!(queue.len(), shadow.iter().flatten().count());
        }
    }
}

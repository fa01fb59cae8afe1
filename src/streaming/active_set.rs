//! Active set management for the overlap sweep.
//!
//! The ActiveSet holds candidates that may still overlap incoming ones, in
//! insertion order, and hands evicted candidates back to the caller by value.

/// Compaction threshold - trigger when head_idx exceeds this value.
const COMPACTION_THRESHOLD: usize = 4096;

/// Insertion-ordered working set with front eviction and automatic compaction.
///
/// Uses the Vec + head_idx pattern: slots before `head_idx` have been
/// evicted (their value taken) and are only reclaimed on compaction.
///
/// # Memory Complexity
///
/// O(k) where k = max number of candidates within the eviction distance.
#[derive(Debug)]
pub struct ActiveSet<T> {
    data: Vec<Option<T>>,
    head_idx: usize,
    max_active: usize,
}

impl<T> Default for ActiveSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ActiveSet<T> {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            head_idx: 0,
            max_active: 0,
        }
    }

    /// Append an element at the back.
    #[inline]
    pub fn push(&mut self, value: T) {
        self.data.push(Some(value));
        self.max_active = self.max_active.max(self.len());
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() - self.head_idx
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head_idx >= self.data.len()
    }

    /// Evict elements from the front while `condition` holds, appending them to `out`.
    ///
    /// Returns the number of elements evicted.
    pub fn evict_while<F>(&mut self, mut condition: F, out: &mut Vec<T>) -> usize
    where
        F: FnMut(&T) -> bool,
    {
        let start_idx = self.head_idx;
        while self
            .data
            .get(self.head_idx)
            .is_some_and(|slot| slot.as_ref().is_some_and(&mut condition))
        {
            if let Some(value) = self.data[self.head_idx].take() {
                out.push(value);
            }
            self.head_idx += 1;
        }
        self.compact_if_needed();
        self.head_idx - start_idx
    }

    /// Remove every remaining element, in insertion order.
    pub fn drain_all(&mut self) -> impl Iterator<Item = T> + '_ {
        let head = self.head_idx;
        self.head_idx = 0;
        self.data.drain(..).skip(head).flatten()
    }

    fn compact_if_needed(&mut self) {
        if self.head_idx > COMPACTION_THRESHOLD && self.head_idx * 2 > self.data.len() {
            self.data.drain(0..self.head_idx);
            self.head_idx = 0;
        }
    }

    /// Maximum active size observed (for statistics).
    pub fn max_active(&self) -> usize {
        self.max_active
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data[self.head_idx..].iter().filter_map(Option::as_ref)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.data[self.head_idx..].iter_mut().filter_map(Option::as_mut)
    }

    #[inline]
    pub fn front(&self) -> Option<&T> {
        self.data.get(self.head_idx).and_then(Option::as_ref)
    }
}

//! Bounded sample storage for the streaming segmenter.
//!
//! The segmenter keeps audio in a `ringbuf::HeapRb<f32>` sized from its
//! buffer horizon. `SampleRing` adds absolute sample addressing on top so the
//! segmenter can cut `[start, end)` ranges without ever holding more than the
//! horizon in memory, however long the input is.

pub mod chunk;

use ringbuf::{
    traits::{Consumer, Observer, Producer},
    HeapRb,
};

/// Ring of f32 samples addressed by absolute stream position.
pub struct SampleRing {
    rb: HeapRb<f32>,
    /// Absolute index of the oldest sample still held.
    base: usize,
}

impl SampleRing {
    /// Allocate a ring holding at most `capacity` samples.
    ///
    /// # Panics
    /// Panics if `capacity` is zero. Callers validate this at construction.
    pub fn new(capacity: usize) -> Self {
        Self {
            rb: HeapRb::new(capacity),
            base: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.rb.capacity().get()
    }

    /// Absolute index of the oldest retained sample.
    pub fn base(&self) -> usize {
        self.base
    }

    /// Absolute index one past the newest retained sample.
    pub fn end(&self) -> usize {
        self.base + self.rb.occupied_len()
    }

    pub fn len(&self) -> usize {
        self.rb.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.rb.is_empty()
    }

    /// Append samples. When the ring is full the oldest samples are evicted
    /// and the number evicted is returned.
    pub fn push(&mut self, samples: &[f32]) -> usize {
        let overflow = samples.len().saturating_sub(self.rb.vacant_len());
        let evicted = if overflow > 0 {
            let n = self.rb.skip(overflow.min(self.rb.occupied_len()));
            self.base += n;
            n
        } else {
            0
        };
        // Input larger than the whole ring keeps only its newest tail.
        let skip_input = samples.len().saturating_sub(self.capacity());
        self.base += skip_input;
        self.rb.push_slice(&samples[skip_input..]);
        evicted + skip_input
    }

    /// Drop every sample before absolute index `pos`.
    pub fn discard_before(&mut self, pos: usize) {
        if pos <= self.base {
            return;
        }
        let n = self.rb.skip((pos - self.base).min(self.rb.occupied_len()));
        self.base += n;
        if self.rb.is_empty() {
            self.base = pos.max(self.base);
        }
    }

    /// Copy out the absolute range `[start, end)`, clamped to what is retained.
    pub fn copy_range(&self, start: usize, end: usize) -> Vec<f32> {
        let start = start.max(self.base);
        let end = end.min(self.end());
        if start >= end {
            return Vec::new();
        }
        let (head, tail) = self.rb.as_slices();
        let from = start - self.base;
        let to = end - self.base;
        let mut out = Vec::with_capacity(to - from);
        if from < head.len() {
            out.extend_from_slice(&head[from..to.min(head.len())]);
        }
        if to > head.len() {
            let t_from = from.saturating_sub(head.len());
            out.extend_from_slice(&tail[t_from..to - head.len()]);
        }
        out
    }

    /// Drop everything and restart addressing at zero.
    pub fn clear(&mut self) {
        self.rb.clear();
        self.base = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_range_uses_absolute_positions() {
        let mut ring = SampleRing::new(8);
        ring.push(&[0.0, 1.0, 2.0, 3.0, 4.0]);
        ring.discard_before(2);
        assert_eq!(ring.base(), 2);
        assert_eq!(ring.copy_range(3, 5), vec![3.0, 4.0]);
    }

    #[test]
    fn wrapped_storage_is_copied_in_order() {
        let mut ring = SampleRing::new(4);
        ring.push(&[0.0, 1.0, 2.0]);
        ring.discard_before(2);
        ring.push(&[3.0, 4.0, 5.0]);
        assert_eq!(ring.copy_range(2, 6), vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn overflow_evicts_oldest() {
        let mut ring = SampleRing::new(4);
        ring.push(&[0.0, 1.0, 2.0, 3.0]);
        let evicted = ring.push(&[4.0, 5.0]);
        assert_eq!(evicted, 2);
        assert_eq!(ring.base(), 2);
        assert_eq!(ring.copy_range(0, 10), vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn discard_past_end_moves_base() {
        let mut ring = SampleRing::new(4);
        ring.push(&[0.0, 1.0]);
        ring.discard_before(10);
        assert!(ring.is_empty());
        assert_eq!(ring.base(), 10);
        ring.push(&[7.0]);
        assert_eq!(ring.copy_range(10, 11), vec![7.0]);
    }
}

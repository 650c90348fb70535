use crate::signal::RawSample;
use std::collections::VecDeque;

/// Rolling window of the most recent raw samples.
///
/// Holds at most `capacity` samples; pushing onto a full buffer evicts the
/// oldest one.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: VecDeque<RawSample>,
    capacity: usize,
}

impl SampleBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: RawSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn extend<I: IntoIterator<Item = RawSample>>(&mut self, samples: I) {
        for sample in samples {
            self.push(sample);
        }
    }

    /// Current contents, oldest first. Shorter than the capacity while warming up.
    pub fn window(&mut self) -> &[RawSample] {
        self.samples.make_contiguous()
    }

    /// True once the buffer holds enough samples for analysis.
    pub fn has_at_least(&self, min: usize) -> bool {
        self.samples.len() >= min
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Fixed-capacity FIFO history (BPM values, RR intervals, Poincaré pairs).
#[derive(Debug, Clone)]
pub struct BoundedHistory<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> BoundedHistory<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `item`, returning the evicted entry when the history was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_sample_when_full() {
        let mut buffer = SampleBuffer::new(3);
        for i in 0..5 {
            buffer.push(RawSample::new(i, i as f64));
        }
        assert_eq!(buffer.len(), 3);
        let values: Vec<i32> = buffer.window().iter().map(|s| s.value).collect();
        assert_eq!(values, vec![2, 3, 4]);
    }

    #[test]
    fn warm_up_window_is_short() {
        let mut buffer = SampleBuffer::new(1500);
        buffer.extend((0..10).map(|i| RawSample::new(i, 0.0)));
        assert_eq!(buffer.window().len(), 10);
        assert!(!buffer.has_at_least(100));
    }

    #[test]
    fn history_reports_evictions() {
        let mut history = BoundedHistory::new(2);
        assert_eq!(history.push(1.0), None);
        assert_eq!(history.push(2.0), None);
        assert_eq!(history.push(3.0), Some(1.0));
        assert_eq!(history.to_vec(), vec![2.0, 3.0]);
        assert_eq!(history.last(), Some(&3.0));
    }
}

//! Bounded per-instrument price history.

use crate::types::HistoryPoint;
use std::collections::VecDeque;

/// FIFO ring of recent prices for one instrument.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    points: VecDeque<HistoryPoint>,
    capacity: usize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a point, evicting the oldest ones when over capacity.
    pub fn push(&mut self, time: u64, price: f64) {
        self.points.push_back(HistoryPoint { time, price });

        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    /// The `limit` most recent points, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<HistoryPoint> {
        let skip = self.points.len().saturating_sub(limit);
        self.points.iter().skip(skip).copied().collect()
    }

    pub fn to_vec(&self) -> Vec<HistoryPoint> {
        self.points.iter().copied().collect()
    }

    pub fn last(&self) -> Option<&HistoryPoint> {
        self.points.back()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_exceeds_capacity() {
        let mut buffer = HistoryBuffer::new(3);
        for t in 0..10 {
            buffer.push(t, t as f64);
            assert!(buffer.len() <= 3);
        }
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_evicts_oldest_first() {
        let mut buffer = HistoryBuffer::new(3);
        for t in 0..5 {
            buffer.push(t, 100.0 + t as f64);
        }

        let times: Vec<u64> = buffer.to_vec().iter().map(|p| p.time).collect();
        assert_eq!(times, vec![2, 3, 4]);
        assert_eq!(buffer.last().unwrap().price, 104.0);
    }

    #[test]
    fn test_recent_window() {
        let mut buffer = HistoryBuffer::new(10);
        for t in 0..6 {
            buffer.push(t, t as f64);
        }

        let recent = buffer.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].time, 4);
        assert_eq!(recent[1].time, 5);
        assert_eq!(buffer.recent(100).len(), 6);
    }

    #[test]
    fn test_zero_capacity_keeps_one() {
        let mut buffer = HistoryBuffer::new(0);
        buffer.push(1, 1.0);
        buffer.push(2, 2.0);
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.to_vec()[0].time, 2);
    }
}

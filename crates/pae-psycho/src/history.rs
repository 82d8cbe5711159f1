//! Bounded analysis history for introspection

use serde::Serialize;
use std::collections::VecDeque;

/// Default number of chunks kept
pub const HISTORY_CAPACITY: usize = 100;

/// Fixed-capacity ring; the oldest entry is dropped when full
#[derive(Debug, Clone)]
pub struct HistoryRing<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> HistoryRing<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: T) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    /// Oldest first
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<T> Default for HistoryRing<T> {
    fn default() -> Self {
        Self::new(HISTORY_CAPACITY)
    }
}

/// What one processed chunk looked like
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRecord {
    pub chunk_index: u64,
    pub band_energies: Vec<f64>,
    pub masking_thresholds: Vec<f64>,
    pub target_gains: Vec<f64>,
    pub current_gains: Vec<f64>,
    /// Chunk went through the safety tilt instead of the psychoacoustic path
    pub fallback: bool,
}

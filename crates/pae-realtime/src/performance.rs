//! Processing-time and adaptation counters
//!
//! Read through [`PerformanceSnapshot`]; nothing here raises on overrun.

use serde::Serialize;
use std::time::Duration;

/// Running timing statistics (microseconds)
#[derive(Debug, Clone, Default)]
pub struct TimingMeasurement {
    pub count: u64,
    pub total_us: u64,
    pub min_us: u64,
    pub max_us: u64,
    pub last_us: u64,
}

impl TimingMeasurement {
    pub fn add(&mut self, duration_us: u64) {
        self.count += 1;
        self.total_us += duration_us;
        self.last_us = duration_us;

        if self.count == 1 || duration_us < self.min_us {
            self.min_us = duration_us;
        }
        if duration_us > self.max_us {
            self.max_us = duration_us;
        }
    }

    pub fn average_us(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_us as f64 / self.count as f64
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Read-only view of the streaming counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSnapshot {
    pub chunks_processed: u64,
    pub adaptation_updates: u64,
    pub underruns: u64,
    pub fallbacks: u64,
    pub last_processing_ms: f64,
    pub avg_processing_ms: f64,
    pub max_processing_ms: f64,
    pub latency_budget_ms: f64,
    pub deadline_misses: u64,
}

/// Counters owned by the real-time layer
#[derive(Debug, Clone)]
pub struct PerformanceTracker {
    timing: TimingMeasurement,
    latency_budget_ms: f64,
    chunks_processed: u64,
    adaptation_updates: u64,
    underruns: u64,
    deadline_misses: u64,
}

impl PerformanceTracker {
    pub fn new(latency_budget_ms: f64) -> Self {
        Self {
            timing: TimingMeasurement::default(),
            latency_budget_ms,
            chunks_processed: 0,
            adaptation_updates: 0,
            underruns: 0,
            deadline_misses: 0,
        }
    }

    /// Record one call that produced audio
    pub fn record_chunk(&mut self, elapsed: Duration) {
        self.chunks_processed += 1;
        self.timing.add(elapsed.as_micros() as u64);

        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        if elapsed_ms > self.latency_budget_ms {
            self.deadline_misses += 1;
            log::debug!(
                "Chunk took {:.2} ms, budget {:.2} ms ({} misses)",
                elapsed_ms,
                self.latency_budget_ms,
                self.deadline_misses
            );
        }
    }

    pub fn record_adaptation(&mut self) {
        self.adaptation_updates += 1;
    }

    pub fn record_underrun(&mut self) {
        self.underruns += 1;
    }

    pub fn underruns(&self) -> u64 {
        self.underruns
    }

    pub fn snapshot(&self, fallbacks: u64) -> PerformanceSnapshot {
        PerformanceSnapshot {
            chunks_processed: self.chunks_processed,
            adaptation_updates: self.adaptation_updates,
            underruns: self.underruns,
            fallbacks,
            last_processing_ms: self.timing.last_us as f64 / 1000.0,
            avg_processing_ms: self.timing.average_us() / 1000.0,
            max_processing_ms: self.timing.max_us as f64 / 1000.0,
            latency_budget_ms: self.latency_budget_ms,
            deadline_misses: self.deadline_misses,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.latency_budget_ms);
    }
}

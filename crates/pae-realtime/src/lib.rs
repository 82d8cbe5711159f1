//! pae-realtime: Streaming layer for the psychoacoustic EQ
//!
//! Runs [`pae_psycho::PsychoacousticEq`] chunk by chunk for as long as a
//! stream lasts:
//! - Fixed-size processing blocks assembled from irregular chunks
//! - Frequency-dependent smoothing and self-adjusting adaptation speeds
//! - Spectral-centroid shaping of the target curve
//! - Timing, underrun and deadline counters

mod adaptive;
mod config;
mod performance;
mod queue;

pub use adaptive::*;
pub use config::RealtimeConfig;
pub use performance::{PerformanceSnapshot, PerformanceTracker, TimingMeasurement};
pub use queue::ChunkQueue;

//! pae-psycho: Psychoacoustic adaptive EQ
//!
//! Perceptually weighted, masking-aware band EQ over Bark critical bands:
//!
//! ## Features
//! - **Critical Bands**: 25 Bark bands with perceptual weights and a bin map
//! - **Masking**: Per-band masking threshold from the band peak
//! - **Gain Solver**: Target-curve correction with content-aware bias and smoothing
//! - **Gain Engine**: STFT band gains with sequential, vectorized or parallel strategies
//! - **Safety Tilt**: Time-domain bass/treble fallback when the spectral path fails
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pae_core::{AudioChunk, EqSettings};
//! use pae_psycho::PsychoacousticEq;
//!
//! let mut eq = PsychoacousticEq::new(EqSettings::new(48000, 2048))?;
//! let target = vec![-20.0; pae_psycho::NUM_CRITICAL_BANDS];
//! let out = eq.process_chunk(&AudioChunk::mono(samples), &target, None)?;
//! ```

// Band loops index several parallel vectors
#![allow(clippy::needless_range_loop)]

pub mod analysis;
pub mod bands;
pub mod engine;
pub mod history;
pub mod masking;
pub mod orchestrator;
pub mod safety;
pub mod solver;

pub use analysis::{SpectrumAnalysis, SpectrumAnalyzer};
pub use bands::{
    BARK_EDGES, BandModel, CriticalBand, FrequencyBandMap, NUM_CRITICAL_BANDS, PerceptualWeightCurve,
    critical_bands,
};
pub use engine::{
    GainEngine, GainStrategy, ParallelStrategy, RESIDUAL_TOLERANCE, SequentialStrategy, VectorizedStrategy,
    build_strategy, hann_window,
};
pub use history::{AnalysisRecord, HISTORY_CAPACITY, HistoryRing};
pub use masking::{MASKING_FLOOR_DB, MASKING_MARGIN_DB, MaskingCalculator};
pub use orchestrator::{BandDynamics, BandResponse, EqState, EqStats, PsychoacousticEq};
pub use safety::SafetyTilt;
pub use solver::{GainSolver, GainState, NEAR_MASKED_MARGIN_DB};

//! pae-core: Shared types for the psychoacoustic adaptive EQ
//!
//! This crate provides the foundational types used across all pae crates:
//! sample formats, interleaved chunks, content profiles, settings and errors.

mod error;
mod profile;
mod sample;
mod settings;

pub use error::*;
pub use profile::*;
pub use sample::*;
pub use settings::*;

/// Hard limit on any solved band gain (dB)
pub const MAX_BAND_GAIN_DB: f64 = 12.0;

/// Floor used when converting silence to dB
pub const SILENCE_DB: f64 = -120.0;

/// dB to linear amplitude
#[inline]
pub fn db_to_linear(db: f64) -> f64 {
    10.0f64.powf(db / 20.0)
}

/// Linear amplitude to dB, floored at [`SILENCE_DB`] for zero/non-finite input
#[inline]
pub fn linear_to_db(linear: f64) -> f64 {
    if linear.is_finite() && linear > 0.0 {
        (20.0 * linear.log10()).max(SILENCE_DB)
    } else {
        SILENCE_DB
    }
}

/// Power to dB, floored at [`SILENCE_DB`]
#[inline]
pub fn power_to_db(power: f64) -> f64 {
    if power.is_finite() && power > 0.0 {
        (10.0 * power.log10()).max(SILENCE_DB)
    } else {
        SILENCE_DB
    }
}

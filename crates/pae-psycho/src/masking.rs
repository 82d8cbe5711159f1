//! Per-band masking threshold estimate

use crate::bands::BandModel;
use pae_core::linear_to_db;

/// Distance between a band's peak and its masking threshold (dB)
pub const MASKING_MARGIN_DB: f64 = 20.0;

/// Lowest threshold ever reported (dB)
pub const MASKING_FLOOR_DB: f64 = -80.0;

/// Masking threshold calculator
#[derive(Debug, Clone, Copy)]
pub struct MaskingCalculator {
    /// Threshold reported for bands that own no FFT bins
    empty_band_db: f64,
}

impl MaskingCalculator {
    pub fn new(empty_band_db: f64) -> Self {
        Self { empty_band_db }
    }

    /// Threshold for one band given its peak linear magnitude
    #[inline]
    fn threshold_from_peak(peak: f64) -> f64 {
        // Silence, NaN and Inf all land on the floor
        if !peak.is_finite() || peak <= 0.0 {
            return MASKING_FLOOR_DB;
        }
        (linear_to_db(peak) - MASKING_MARGIN_DB).max(MASKING_FLOOR_DB)
    }

    /// Masking threshold (dB) for every band of `model`
    ///
    /// `magnitude` is the linear positive-frequency magnitude spectrum.
    pub fn thresholds(&self, magnitude: &[f64], model: &BandModel) -> Vec<f64> {
        model
            .band_map()
            .ranges()
            .iter()
            .map(|range| {
                let end = range.end.min(magnitude.len());
                if range.start >= end {
                    return self.empty_band_db;
                }
                let peak = magnitude[range.start..end]
                    .iter()
                    .map(|&m| if m.is_finite() { m.abs() } else { 0.0 })
                    .fold(0.0f64, f64::max);
                Self::threshold_from_peak(peak)
            })
            .collect()
    }
}

impl Default for MaskingCalculator {
    fn default() -> Self {
        Self::new(-60.0)
    }
}

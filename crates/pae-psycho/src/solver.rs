//! Adaptive gain solver
//!
//! Turns band energies, masking thresholds and a target curve into per-band
//! target gains, biases them by content, and smooths them into the running
//! [`GainState`].

use crate::bands::BandModel;
use pae_core::{
    ContentProfile, EnergyLevel, EqError, EqResult, Genre, MAX_BAND_GAIN_DB, sanitize,
};
use serde::Serialize;
use std::sync::Arc;

/// Bands closer than this to their masking threshold get half the correction
pub const NEAR_MASKED_MARGIN_DB: f64 = 3.0;

/// Current and target gains (dB) per band
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GainState {
    pub current_gains: Vec<f64>,
    pub target_gains: Vec<f64>,
}

impl GainState {
    /// Unity (0 dB) state
    pub fn new(num_bands: usize) -> Self {
        Self {
            current_gains: vec![0.0; num_bands],
            target_gains: vec![0.0; num_bands],
        }
    }

    pub fn reset(&mut self) {
        self.current_gains.fill(0.0);
        self.target_gains.fill(0.0);
    }

    #[inline]
    pub fn num_bands(&self) -> usize {
        self.current_gains.len()
    }

    /// Largest |target - current| across bands
    pub fn max_distance(&self) -> f64 {
        self.current_gains
            .iter()
            .zip(&self.target_gains)
            .map(|(c, t)| (t - c).abs())
            .fold(0.0, f64::max)
    }
}

/// Multiplier applied to the bands whose centre lies in `[low, high)`
struct RangeScale {
    low: f64,
    high: f64,
    scale: f64,
}

const fn scale(low: f64, high: f64, scale: f64) -> RangeScale {
    RangeScale { low, high, scale }
}

const CLASSICAL_SCALES: &[RangeScale] = &[scale(8000.0, f64::INFINITY, 0.6 / 0.7)];
const ROCK_SCALES: &[RangeScale] = &[scale(2000.0, 5000.0, 1.2), scale(60.0, 250.0, 1.1)];
const METAL_SCALES: &[RangeScale] = &[scale(2000.0, 5000.0, 1.3), scale(60.0, 250.0, 1.15)];
const ELECTRONIC_SCALES: &[RangeScale] = &[scale(0.0, 120.0, 1.3), scale(10000.0, f64::INFINITY, 1.1)];
const HIPHOP_SCALES: &[RangeScale] = &[scale(0.0, 150.0, 1.25)];
const POP_SCALES: &[RangeScale] = &[scale(1000.0, 4000.0, 1.1)];
const SPEECH_SCALES: &[RangeScale] = &[scale(1000.0, 4000.0, 1.15), scale(0.0, 120.0, 0.7)];

/// Genre bias as (overall multiplier, scoped multipliers)
fn genre_scaling(genre: Genre) -> (f64, &'static [RangeScale]) {
    match genre {
        Genre::Classical => (0.7, CLASSICAL_SCALES),
        Genre::Rock => (1.0, ROCK_SCALES),
        Genre::Metal => (1.0, METAL_SCALES),
        Genre::Electronic => (1.0, ELECTRONIC_SCALES),
        Genre::HipHop => (1.0, HIPHOP_SCALES),
        Genre::Pop => (1.0, POP_SCALES),
        Genre::Jazz => (0.85, &[]),
        Genre::Acoustic => (0.9, &[]),
        Genre::Speech => (1.0, SPEECH_SCALES),
        Genre::Unknown => (1.0, &[]),
    }
}

/// Dynamic-range multiplier: gentle on dynamic material, firmer on compressed
fn dynamic_range_scale(dynamic_range: f64) -> f64 {
    if !dynamic_range.is_finite() {
        1.0
    } else if dynamic_range > 25.0 {
        0.7
    } else if dynamic_range < 10.0 {
        1.2
    } else {
        1.0
    }
}

fn energy_scale(level: EnergyLevel) -> f64 {
    match level {
        EnergyLevel::Low => 1.3,
        EnergyLevel::Medium => 1.0,
        EnergyLevel::High => 0.8,
    }
}

#[inline]
fn clamp_gain(gain: f64) -> f64 {
    sanitize(gain).clamp(-MAX_BAND_GAIN_DB, MAX_BAND_GAIN_DB)
}

/// Gain solver bound to one band model
#[derive(Debug, Clone)]
pub struct GainSolver {
    model: Arc<BandModel>,
}

impl GainSolver {
    pub fn new(model: Arc<BandModel>) -> Self {
        Self { model }
    }

    fn check_len(&self, what: &[f64]) -> EqResult<()> {
        let expected = self.model.num_bands();
        if what.len() != expected {
            return Err(EqError::BandMismatch {
                expected,
                got: what.len(),
            });
        }
        Ok(())
    }

    /// Target gains (dB) for one chunk, clamped to ±[`MAX_BAND_GAIN_DB`]
    pub fn solve(
        &self,
        band_energies: &[f64],
        masking_thresholds: &[f64],
        target_curve: &[f64],
        profile: Option<&ContentProfile>,
    ) -> EqResult<Vec<f64>> {
        self.check_len(band_energies)?;
        self.check_len(masking_thresholds)?;
        self.check_len(target_curve)?;

        let bands = self.model.bands();
        let band_map = self.model.band_map();
        let mut gains: Vec<f64> = bands
            .iter()
            .enumerate()
            .map(|(i, band)| {
                // Bands above Nyquist own no bins: nothing to correct
                if band_map.band_range(i).is_empty() {
                    return 0.0;
                }
                let energy = sanitize(band_energies[i]);
                let threshold = sanitize(masking_thresholds[i]);
                let mut required = sanitize(target_curve[i]) - energy;

                // Near-masked content needs less correction
                if energy < threshold + NEAR_MASKED_MARGIN_DB {
                    required *= 0.5;
                }
                clamp_gain(required * band.weight)
            })
            .collect();

        if let Some(profile) = profile {
            self.apply_content(&mut gains, profile);
        }

        Ok(gains)
    }

    /// Genre, then dynamic range, then energy level
    fn apply_content(&self, gains: &mut [f64], profile: &ContentProfile) {
        let bands = self.model.bands();
        let (overall, scoped) = genre_scaling(profile.genre);
        let global = dynamic_range_scale(profile.dynamic_range) * energy_scale(profile.energy_level);

        for (gain, band) in gains.iter_mut().zip(bands) {
            let mut factor = overall;
            for range in scoped {
                if band.center_freq >= range.low && band.center_freq < range.high {
                    factor *= range.scale;
                }
            }
            *gain = clamp_gain(*gain * factor * global);
        }
    }

    /// Move `state` toward `target` by a per-band fraction
    ///
    /// `current += speed * (target - current)`, evaluated independently per band.
    pub fn smooth(&self, state: &mut GainState, target: &[f64], speeds: &[f64]) -> EqResult<()> {
        self.check_len(target)?;
        self.check_len(speeds)?;
        if state.num_bands() != target.len() {
            return Err(EqError::BandMismatch {
                expected: target.len(),
                got: state.num_bands(),
            });
        }

        for i in 0..target.len() {
            let speed = sanitize(speeds[i]).clamp(0.0, 1.0);
            let goal = clamp_gain(target[i]);
            state.target_gains[i] = goal;
            let current = state.current_gains[i];
            state.current_gains[i] = clamp_gain(current + speed * (goal - current));
        }
        Ok(())
    }

    /// Same speed for every band
    pub fn smooth_uniform(&self, state: &mut GainState, target: &[f64], speed: f64) -> EqResult<()> {
        let speeds = vec![speed; self.model.num_bands()];
        self.smooth(state, target, &speeds)
    }

    pub fn model(&self) -> &Arc<BandModel> {
        &self.model
    }
}

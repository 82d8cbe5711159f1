//! Per-chunk spectral analysis
//!
//! Features:
//! - Hann-windowed magnitude spectrum averaged over the chunk
//! - Window coherent-gain compensation (a full-scale sine reads 0 dB)
//! - Band energies and masking thresholds for the gain solver

use crate::bands::BandModel;
use crate::masking::MaskingCalculator;
use crate::engine::hann_window;
use num_complex::Complex64;
use pae_core::{EqError, EqResult, SILENCE_DB, linear_to_db, power_to_db, sanitize};
use realfft::{RealFftPlanner, RealToComplex};
use std::sync::Arc;

/// Analysis of one chunk. Consumed by the solver within the same chunk.
#[derive(Debug, Clone)]
pub struct SpectrumAnalysis {
    /// Linear magnitude per positive bin (window compensated)
    pub magnitude: Vec<f64>,
    /// Same in dB
    pub magnitude_db: Vec<f64>,
    /// Mean band power (dB)
    pub band_energies: Vec<f64>,
    /// Masking threshold per band (dB)
    pub masking_thresholds: Vec<f64>,
    /// Raw spectrum of the last analysed frame
    pub spectrum: Vec<Complex64>,
}

/// Spectral analyzer for the EQ
pub struct SpectrumAnalyzer {
    model: Arc<BandModel>,
    fft_size: usize,
    hop_size: usize,
    fft_forward: Arc<dyn RealToComplex<f64>>,
    window: Vec<f64>,
    /// Sum of the window (coherent gain × N)
    window_sum: f64,
    masking: MaskingCalculator,
    input: Vec<f64>,
    output: Vec<Complex64>,
    scratch: Vec<Complex64>,
}

impl SpectrumAnalyzer {
    pub fn new(model: Arc<BandModel>, hop_size: usize, masking: MaskingCalculator) -> Self {
        let fft_size = model.fft_size();

        let mut planner = RealFftPlanner::<f64>::new();
        let fft_forward = planner.plan_fft_forward(fft_size);
        let input = fft_forward.make_input_vec();
        let output = fft_forward.make_output_vec();
        let scratch = fft_forward.make_scratch_vec();

        let window = hann_window(fft_size);
        let window_sum = window.iter().sum();

        Self {
            model,
            fft_size,
            hop_size: hop_size.clamp(1, fft_size),
            fft_forward,
            window,
            window_sum,
            masking,
            input,
            output,
            scratch,
        }
    }

    /// Analyze a mono signal. Non-finite samples are read as silence.
    pub fn analyze(&mut self, mono: &[f64]) -> EqResult<SpectrumAnalysis> {
        let n = self.fft_size;
        let bins = n / 2 + 1;
        let num_frames = if mono.len() <= n {
            1
        } else {
            (mono.len() - n).div_ceil(self.hop_size) + 1
        };

        let mut magnitude = vec![0.0f64; bins];

        for frame in 0..num_frames {
            let start = frame * self.hop_size;
            for (i, slot) in self.input.iter_mut().enumerate() {
                let sample = mono.get(start + i).copied().map(sanitize).unwrap_or(0.0);
                *slot = sample * self.window[i];
            }

            self.fft_forward
                .process_with_scratch(&mut self.input, &mut self.output, &mut self.scratch)
                .map_err(|e| EqError::Fft(e.to_string()))?;

            for (acc, c) in magnitude.iter_mut().zip(&self.output) {
                *acc += c.norm();
            }
        }

        // Average, then undo the window's coherent gain (one-sided for inner bins)
        let frames = num_frames as f64;
        for (k, m) in magnitude.iter_mut().enumerate() {
            let sided = if k == 0 || k == n / 2 { 1.0 } else { 2.0 };
            *m = sanitize(*m / frames * sided / self.window_sum);
        }

        let magnitude_db: Vec<f64> = magnitude.iter().map(|&m| linear_to_db(m)).collect();
        let band_energies = self.band_energies(&magnitude);
        let masking_thresholds = self.masking.thresholds(&magnitude, &self.model);

        Ok(SpectrumAnalysis {
            magnitude,
            magnitude_db,
            band_energies,
            masking_thresholds,
            spectrum: self.output.clone(),
        })
    }

    /// Mean power per band in dB; empty bands read as silence
    fn band_energies(&self, magnitude: &[f64]) -> Vec<f64> {
        self.model
            .band_map()
            .ranges()
            .iter()
            .map(|range| {
                if range.is_empty() {
                    return SILENCE_DB;
                }
                let power: f64 = magnitude[range.clone()].iter().map(|m| m * m).sum();
                power_to_db(power / range.len() as f64)
            })
            .collect()
    }

    pub fn model(&self) -> &Arc<BandModel> {
        &self.model
    }
}

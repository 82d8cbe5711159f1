//! FFT-domain band gain application
//!
//! Features:
//! - Hann-windowed STFT with window-sum compensated overlap-add
//! - Band gains mirrored onto negative frequencies (Hermitian symmetric)
//! - Three interchangeable per-frame strategies: sequential, vectorized, parallel
//! - Output keeps the caller's sample type
//!
//! All strategies multiply each bin by the same `f64` factor, so they are
//! numerically interchangeable.

use crate::bands::BandModel;
use num_complex::Complex64;
use pae_core::{
    AudioChunk, AudioSample, EqError, EqResult, EqSettings, StrategyKind, db_to_linear, sanitize,
};
use rayon::prelude::*;
use rustfft::{Fft, FftPlanner};
use std::ops::Range;
use std::sync::Arc;

/// Max imaginary residual after the inverse FFT, relative to signal peak
pub const RESIDUAL_TOLERANCE: f64 = 1e-8;

/// Smallest window sum divided out during synthesis
const WINDOW_SUM_FLOOR: f64 = 1e-9;

/// Periodic Hann window
pub fn hann_window(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / size as f64).cos()))
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// STRATEGIES
// ═══════════════════════════════════════════════════════════════════════════════

/// Applies per-band linear gains to one full complex FFT frame
///
/// `spectrum.len()` equals the model's FFT size and `linear_gains` holds one
/// factor per band. Bin `k` and its mirror `N - k` always get the same factor.
pub trait GainStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn apply(&self, spectrum: &mut [Complex64], linear_gains: &[f64], model: &BandModel);
}

/// Band-by-band loop over one spectrum buffer
#[derive(Debug, Default, Clone, Copy)]
pub struct SequentialStrategy;

impl GainStrategy for SequentialStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Sequential
    }

    fn apply(&self, spectrum: &mut [Complex64], linear_gains: &[f64], model: &BandModel) {
        let n = spectrum.len();
        let half = n / 2;

        for (band, range) in model.band_map().ranges().iter().enumerate() {
            let gain = linear_gains[band];
            for k in range.clone() {
                spectrum[k] = spectrum[k].scale(gain);
                if k > 0 && k < half {
                    spectrum[n - k] = spectrum[n - k].scale(gain);
                }
            }
        }
    }
}

/// Dense per-bin gain curve, applied in one pass
#[derive(Debug, Default, Clone, Copy)]
pub struct VectorizedStrategy;

impl VectorizedStrategy {
    /// Full-length curve; the negative half is the conjugate mirror of the positive half
    pub fn gain_curve(n: usize, linear_gains: &[f64], model: &BandModel) -> Vec<Complex64> {
        let half = n / 2;
        let mut curve = vec![Complex64::new(0.0, 0.0); n];
        for (c, &band) in curve[..=half].iter_mut().zip(model.band_map().bins()) {
            *c = Complex64::new(linear_gains[band], 0.0);
        }

        let (positive, negative) = curve.split_at_mut(half + 1);
        for (dst, src) in negative.iter_mut().zip(positive[1..half].iter().rev()) {
            *dst = src.conj();
        }
        curve
    }
}

impl GainStrategy for VectorizedStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Vectorized
    }

    fn apply(&self, spectrum: &mut [Complex64], linear_gains: &[f64], model: &BandModel) {
        let curve = Self::gain_curve(spectrum.len(), linear_gains, model);
        spectrum
            .iter_mut()
            .zip(&curve)
            .for_each(|(bin, gain)| *bin = bin.scale(gain.re));
    }
}

/// One worker's share: a run of bands plus the disjoint bins they own
struct GroupTask<'a> {
    bands: Range<usize>,
    /// First positive bin covered by `positive`
    first_bin: usize,
    positive: &'a mut [Complex64],
    /// Exclusive upper positive bin whose mirror is held in `mirror`
    mirror_hi: usize,
    mirror: &'a mut [Complex64],
}

impl GroupTask<'_> {
    fn run(self, linear_gains: &[f64], ranges: &[Range<usize>], half: usize) {
        for band in self.bands.clone() {
            let gain = linear_gains[band];
            for k in ranges[band].clone() {
                let bin = &mut self.positive[k - self.first_bin];
                *bin = bin.scale(gain);
                if k > 0 && k < half {
                    // Mirror bins are stored highest-frequency-first
                    let bin = &mut self.mirror[self.mirror_hi - 1 - k];
                    *bin = bin.scale(gain);
                }
            }
        }
    }
}

/// Band groups fanned out over a rayon pool
///
/// Each task owns disjoint `&mut` slices of the positive half and of the
/// mirrored negative half, so no merge step is needed and no gain is lost.
pub struct ParallelStrategy {
    group_size: usize,
    pool: Option<rayon::ThreadPool>,
}

impl ParallelStrategy {
    /// `threads == 0` uses the global rayon pool
    pub fn new(group_size: usize, threads: usize) -> Self {
        let pool = if threads > 0 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("pae-gain-{i}"))
                .build()
                .map_err(|e| log::warn!("Gain pool unavailable, using global pool: {e}"))
                .ok()
        } else {
            None
        };

        Self {
            group_size: group_size.max(1),
            pool,
        }
    }

    pub fn group_size(&self) -> usize {
        self.group_size
    }

    fn split_tasks<'a>(&self, spectrum: &'a mut [Complex64], ranges: &[Range<usize>]) -> Vec<GroupTask<'a>> {
        let half = spectrum.len() / 2;
        let (mut positive_rest, mut negative_rest) = spectrum.split_at_mut(half + 1);
        let mut tasks = Vec::with_capacity(ranges.len().div_ceil(self.group_size));

        for group_start in (0..ranges.len()).step_by(self.group_size) {
            let group_end = (group_start + self.group_size).min(ranges.len());
            let bins_lo = ranges[group_start].start;
            let bins_hi = ranges[group_end - 1].end;

            let (positive, rest) = std::mem::take(&mut positive_rest).split_at_mut(bins_hi - bins_lo);
            positive_rest = rest;

            // Mirror of [lo, hi) sits at the top of what is left of the negative half
            let mirror_lo = bins_lo.max(1);
            let mirror_hi = bins_hi.min(half);
            let mirror_len = mirror_hi.saturating_sub(mirror_lo);
            let split = negative_rest.len() - mirror_len;
            let (rest, mirror) = std::mem::take(&mut negative_rest).split_at_mut(split);
            negative_rest = rest;

            tasks.push(GroupTask {
                bands: group_start..group_end,
                first_bin: bins_lo,
                positive,
                mirror_hi,
                mirror,
            });
        }

        tasks
    }
}

impl GainStrategy for ParallelStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Parallel {
            group_size: self.group_size,
        }
    }

    fn apply(&self, spectrum: &mut [Complex64], linear_gains: &[f64], model: &BandModel) {
        let half = spectrum.len() / 2;
        let ranges = model.band_map().ranges();
        let tasks = self.split_tasks(spectrum, ranges);

        let run = move || {
            tasks
                .into_par_iter()
                .for_each(|task| task.run(linear_gains, ranges, half));
        };

        match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }
}

/// Instantiate a strategy
pub fn build_strategy(kind: StrategyKind, threads: usize) -> Box<dyn GainStrategy> {
    match kind {
        StrategyKind::Sequential => Box::new(SequentialStrategy),
        StrategyKind::Vectorized => Box::new(VectorizedStrategy),
        StrategyKind::Parallel { group_size } => Box::new(ParallelStrategy::new(group_size, threads)),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// STFT gain engine bound to one band model
pub struct GainEngine {
    model: Arc<BandModel>,
    fft_size: usize,
    hop_size: usize,
    window: Vec<f64>,
    fft_forward: Arc<dyn Fft<f64>>,
    fft_inverse: Arc<dyn Fft<f64>>,
    strategy: Box<dyn GainStrategy>,
    /// Reused per-frame buffers
    frame: Vec<Complex64>,
    scratch: Vec<Complex64>,
    last_imag_residual: f64,
}

impl GainEngine {
    /// Engine with an explicit strategy
    pub fn new(model: Arc<BandModel>, overlap: f64, strategy: Box<dyn GainStrategy>) -> EqResult<Self> {
        let fft_size = model.fft_size();
        if fft_size < 4 || fft_size % 2 != 0 {
            return Err(EqError::InvalidConfig(format!(
                "fft_size must be an even number >= 4, got {fft_size}"
            )));
        }
        if !(0.0..1.0).contains(&overlap) {
            return Err(EqError::InvalidConfig(format!("overlap must be in [0, 1), got {overlap}")));
        }
        model.band_map().validate(model.num_bands(), fft_size)?;

        // Never hop more than half a frame: every sample sits under two windows
        let hop_size = ((fft_size as f64 * (1.0 - overlap)).round() as usize).clamp(1, fft_size / 2);

        let mut planner = FftPlanner::<f64>::new();
        let fft_forward = planner.plan_fft_forward(fft_size);
        let fft_inverse = planner.plan_fft_inverse(fft_size);
        let scratch_len = fft_forward
            .get_inplace_scratch_len()
            .max(fft_inverse.get_inplace_scratch_len());

        Ok(Self {
            model,
            fft_size,
            hop_size,
            window: hann_window(fft_size),
            fft_forward,
            fft_inverse,
            strategy,
            frame: vec![Complex64::new(0.0, 0.0); fft_size],
            scratch: vec![Complex64::new(0.0, 0.0); scratch_len],
            last_imag_residual: 0.0,
        })
    }

    /// Engine configured from settings; the strategy follows the sizing heuristic
    /// unless `settings.strategy` forces one
    pub fn from_settings(model: Arc<BandModel>, settings: &EqSettings) -> EqResult<Self> {
        if model.fft_size() != settings.fft_size || model.sample_rate() != settings.sample_rate {
            return Err(EqError::InvalidConfig(format!(
                "band model is {} Hz / {} bins, settings ask for {} Hz / {}",
                model.sample_rate(),
                model.fft_size(),
                settings.sample_rate,
                settings.fft_size
            )));
        }

        let threads = if settings.max_threads > 0 {
            settings.max_threads
        } else {
            rayon::current_num_threads()
        };
        let kind = settings
            .strategy
            .unwrap_or_else(|| StrategyKind::select(model.num_bands(), model.fft_size(), threads));
        log::debug!("Gain strategy {:?} ({} bands, {}-point FFT)", kind, model.num_bands(), model.fft_size());

        Self::new(model, settings.overlap, build_strategy(kind, settings.max_threads))
    }

    #[inline]
    pub fn strategy(&self) -> StrategyKind {
        self.strategy.kind()
    }

    #[inline]
    pub fn model(&self) -> &Arc<BandModel> {
        &self.model
    }

    #[inline]
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    #[inline]
    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Largest imaginary residual seen in the last `apply`, relative to signal peak
    #[inline]
    pub fn last_imag_residual(&self) -> f64 {
        self.last_imag_residual
    }

    fn linear_gains(&self, gains_db: &[f64]) -> EqResult<Vec<f64>> {
        let expected = self.model.num_bands();
        if gains_db.len() != expected {
            return Err(EqError::BandMismatch {
                expected,
                got: gains_db.len(),
            });
        }
        Ok(gains_db.iter().map(|&g| db_to_linear(sanitize(g))).collect())
    }

    /// Apply band gains (dB) to one mono frame of any length
    pub fn apply<S: AudioSample>(&mut self, frame: &[S], gains_db: &[f64]) -> EqResult<Vec<S>> {
        let input: Vec<f64> = frame.iter().map(|s| sanitize(s.to_f64())).collect();
        let output = self.apply_f64(&input, gains_db)?;
        Ok(output.into_iter().map(S::from_f64).collect())
    }

    /// `f64` variant of [`GainEngine::apply`]
    pub fn apply_f64(&mut self, input: &[f64], gains_db: &[f64]) -> EqResult<Vec<f64>> {
        let gains = self.linear_gains(gains_db)?;
        let (output, residual) = self.process_signal(input, &gains)?;
        self.last_imag_residual = residual;
        Ok(output)
    }

    /// Apply band gains to every channel of a chunk independently
    pub fn apply_chunk<S: AudioSample>(&mut self, chunk: &AudioChunk<S>, gains_db: &[f64]) -> EqResult<AudioChunk<S>> {
        let gains = self.linear_gains(gains_db)?;
        let mut worst = 0.0f64;
        let mut processed = Vec::with_capacity(chunk.channels());
        for channel in chunk.channels_f64() {
            let (output, residual) = self.process_signal(&channel, &gains)?;
            worst = worst.max(residual);
            processed.push(output);
        }
        self.last_imag_residual = worst;
        AudioChunk::from_channels_f64(&processed)
    }

    /// Windowed STFT → gains → IFFT → compensated overlap-add
    fn process_signal(&mut self, input: &[f64], linear_gains: &[f64]) -> EqResult<(Vec<f64>, f64)> {
        if input.is_empty() {
            return Ok((Vec::new(), 0.0));
        }

        let n = self.fft_size;
        let hop = self.hop_size;
        let pad = n - hop;
        let span = pad + input.len();
        let num_frames = span.div_ceil(hop);
        let total = (num_frames - 1) * hop + n;

        let mut padded = vec![0.0; total];
        padded[pad..span].copy_from_slice(input);
        let mut output = vec![0.0; total];
        let mut window_sum = vec![0.0; total];

        let norm = 1.0 / n as f64;
        let signal_peak = input.iter().fold(0.0f64, |m, &x| m.max(x.abs()));
        let mut max_imag = 0.0f64;

        for frame_idx in 0..num_frames {
            let start = frame_idx * hop;

            // Analysis window (the only windowing step)
            for ((bin, &x), &w) in self.frame.iter_mut().zip(&padded[start..start + n]).zip(&self.window) {
                *bin = Complex64::new(x * w, 0.0);
            }

            self.fft_forward.process_with_scratch(&mut self.frame, &mut self.scratch);
            self.strategy.apply(&mut self.frame, linear_gains, &self.model);
            self.fft_inverse.process_with_scratch(&mut self.frame, &mut self.scratch);

            for (j, bin) in self.frame.iter().enumerate() {
                max_imag = max_imag.max((bin.im * norm).abs());
                output[start + j] += bin.re * norm;
                window_sum[start + j] += self.window[j];
            }
        }

        let result: Vec<f64> = (pad..span)
            .map(|i| output[i] / window_sum[i].max(WINDOW_SUM_FLOOR))
            .collect();

        if result.iter().any(|v| !v.is_finite()) {
            return Err(EqError::NumericalFailure("non-finite sample after synthesis".into()));
        }

        let residual = if signal_peak > 0.0 {
            max_imag / signal_peak
        } else {
            max_imag
        };
        if residual > RESIDUAL_TOLERANCE {
            log::debug!("Imaginary residual {residual:.3e} above tolerance");
        }

        Ok((result, residual))
    }
}

//! Critical-band model
//!
//! - Fixed Bark-scale band set (25 bands, 0 Hz - 20 kHz)
//! - Dense FFT-bin → band lookup
//! - Per-bin perceptual weighting (ear sensitivity proxy)
//!
//! Everything here is a pure function of `(sample_rate, fft_size)`. Built
//! models are immutable and shared through [`BandModel::shared`].

use pae_core::{EqError, EqResult};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::{Arc, OnceLock};

// ═══════════════════════════════════════════════════════════════════════════════
// CRITICAL BANDS (BARK SCALE)
// ═══════════════════════════════════════════════════════════════════════════════

/// Number of critical bands
pub const NUM_CRITICAL_BANDS: usize = 25;

/// Critical band edges (Hz)
pub const BARK_EDGES: [f64; NUM_CRITICAL_BANDS + 1] = [
    0.0, 100.0, 200.0, 300.0, 400.0, 510.0, 630.0, 770.0, 920.0,
    1080.0, 1270.0, 1480.0, 1720.0, 2000.0, 2320.0, 2700.0, 3150.0,
    3700.0, 4400.0, 5300.0, 6400.0, 7700.0, 9500.0, 12000.0, 15500.0,
    20000.0,
];

/// One perceptual frequency band
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CriticalBand {
    pub index: u32,
    /// Geometric centre (Hz)
    pub center_freq: f64,
    pub low_freq: f64,
    pub high_freq: f64,
    pub bandwidth: f64,
    /// Perceptual importance in [0.3, 1.0]
    pub weight: f64,
}

/// Equal-loudness inspired importance of a band centred at `center`
fn band_weight(center: f64) -> f64 {
    match center {
        c if (1000.0..=4000.0).contains(&c) => 1.0,
        c if (500.0..1000.0).contains(&c) || (4000.0..8000.0).contains(&c) => 0.8,
        c if (200.0..500.0).contains(&c) || (8000.0..12000.0).contains(&c) => 0.6,
        c if (100.0..200.0).contains(&c) || (12000.0..16000.0).contains(&c) => 0.4,
        _ => 0.3,
    }
}

fn build_critical_bands() -> Vec<CriticalBand> {
    BARK_EDGES
        .windows(2)
        .enumerate()
        .map(|(i, edge)| {
            let (low, high) = (edge[0], edge[1]);
            let center = (low * high).sqrt();
            CriticalBand {
                index: i as u32,
                center_freq: center,
                low_freq: low,
                high_freq: high,
                bandwidth: high - low,
                weight: band_weight(center),
            }
        })
        .collect()
}

/// Process-wide critical band set, built on first use
pub fn critical_bands() -> &'static [CriticalBand] {
    static BANDS: OnceLock<Vec<CriticalBand>> = OnceLock::new();
    BANDS.get_or_init(build_critical_bands)
}

// ═══════════════════════════════════════════════════════════════════════════════
// PERCEPTUAL WEIGHTING
// ═══════════════════════════════════════════════════════════════════════════════

/// Dense per-bin ear-sensitivity weights in [0.1, 1.0]
#[derive(Debug, Clone, PartialEq)]
pub struct PerceptualWeightCurve {
    weights: Vec<f64>,
}

impl PerceptualWeightCurve {
    /// Weight for a single frequency
    pub fn weight_at(freq: f64) -> f64 {
        if freq < 20.0 {
            0.1
        } else if freq < 100.0 {
            0.3
        } else if freq < 1000.0 {
            // Linear ramp 0.5 → 0.9 across the low-mid range
            0.5 + 0.4 * (freq - 100.0) / 900.0
        } else if freq < 4000.0 {
            1.0
        } else if freq < 8000.0 {
            0.9
        } else if freq < 16000.0 {
            0.7
        } else {
            0.4
        }
    }

    pub fn build(sample_rate: u32, fft_size: usize) -> Self {
        let bin_width = sample_rate as f64 / fft_size as f64;
        let weights = (0..=fft_size / 2)
            .map(|k| Self::weight_at(k as f64 * bin_width))
            .collect();
        Self { weights }
    }

    #[inline]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BIN → BAND MAP
// ═══════════════════════════════════════════════════════════════════════════════

/// Owning band for every positive-frequency bin (`0..=fft_size/2`)
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyBandMap {
    bins: Vec<usize>,
    ranges: Vec<Range<usize>>,
}

impl FrequencyBandMap {
    /// Binary-search each bin frequency into the band edges
    pub fn build(bands: &[CriticalBand], sample_rate: u32, fft_size: usize) -> EqResult<Self> {
        if bands.is_empty() {
            return Err(EqError::BandMap("empty band set".into()));
        }
        if sample_rate == 0 || fft_size < 2 {
            return Err(EqError::BandMap(format!(
                "cannot map {fft_size}-point FFT at {sample_rate} Hz"
            )));
        }

        let last = bands.len() - 1;
        // Lower edges of every band but the first
        let edges: Vec<f64> = bands[1..].iter().map(|b| b.low_freq).collect();
        let bin_width = sample_rate as f64 / fft_size as f64;

        let bins: Vec<usize> = (0..=fft_size / 2)
            .map(|k| {
                let freq = k as f64 * bin_width;
                edges.partition_point(|&edge| edge <= freq).min(last)
            })
            .collect();

        let ranges = (0..bands.len())
            .map(|band| {
                let start = bins.partition_point(|&b| b < band);
                let end = bins.partition_point(|&b| b <= band);
                start..end
            })
            .collect();

        Ok(Self { bins, ranges })
    }

    /// Check the map against an FFT size and band count
    pub fn validate(&self, num_bands: usize, fft_size: usize) -> EqResult<()> {
        if self.bins.len() != fft_size / 2 + 1 {
            return Err(EqError::BandMap(format!(
                "map covers {} bins, {}-point FFT needs {}",
                self.bins.len(),
                fft_size,
                fft_size / 2 + 1
            )));
        }
        if self.ranges.len() != num_bands {
            return Err(EqError::BandMismatch {
                expected: num_bands,
                got: self.ranges.len(),
            });
        }
        if let Some(bad) = self.bins.iter().find(|&&b| b >= num_bands) {
            return Err(EqError::BandMap(format!("bin mapped to missing band {bad}")));
        }
        if self.bins.windows(2).any(|w| w[1] < w[0]) {
            return Err(EqError::BandMap("band indices not monotonic".into()));
        }
        Ok(())
    }

    #[inline]
    pub fn bins(&self) -> &[usize] {
        &self.bins
    }

    #[inline]
    pub fn band_of(&self, bin: usize) -> Option<usize> {
        self.bins.get(bin).copied()
    }

    /// Contiguous positive-frequency bin range owned by `band` (may be empty)
    #[inline]
    pub fn band_range(&self, band: usize) -> Range<usize> {
        self.ranges.get(band).cloned().unwrap_or(0..0)
    }

    #[inline]
    pub fn ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }

    #[inline]
    pub fn num_bands(&self) -> usize {
        self.ranges.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BAND MODEL
// ═══════════════════════════════════════════════════════════════════════════════

/// Bands, bin map and weight curve for one `(sample_rate, fft_size)`
///
/// Read-only after construction; share between sessions with `Arc`.
#[derive(Debug, Clone)]
pub struct BandModel {
    sample_rate: u32,
    fft_size: usize,
    bands: Vec<CriticalBand>,
    band_map: FrequencyBandMap,
    weights: PerceptualWeightCurve,
}

impl BandModel {
    pub fn new(sample_rate: u32, fft_size: usize) -> EqResult<Self> {
        Self::with_bands(critical_bands().to_vec(), sample_rate, fft_size)
    }

    /// Model over a custom band set
    pub fn with_bands(bands: Vec<CriticalBand>, sample_rate: u32, fft_size: usize) -> EqResult<Self> {
        let band_map = FrequencyBandMap::build(&bands, sample_rate, fft_size)?;
        band_map.validate(bands.len(), fft_size)?;
        let weights = PerceptualWeightCurve::build(sample_rate, fft_size);

        log::debug!(
            "Band model: {} bands, {} bins ({} Hz, {}-point FFT)",
            bands.len(),
            band_map.len(),
            sample_rate,
            fft_size
        );

        Ok(Self {
            sample_rate,
            fft_size,
            bands,
            band_map,
            weights,
        })
    }

    /// Cached model for the standard band set
    pub fn shared(sample_rate: u32, fft_size: usize) -> EqResult<Arc<Self>> {
        static CACHE: OnceLock<RwLock<HashMap<(u32, usize), Arc<BandModel>>>> = OnceLock::new();
        let cache = CACHE.get_or_init(|| RwLock::new(HashMap::new()));

        if let Some(model) = cache.read().get(&(sample_rate, fft_size)) {
            return Ok(Arc::clone(model));
        }

        let model = Arc::new(Self::new(sample_rate, fft_size)?);
        let mut guard = cache.write();
        let entry = guard
            .entry((sample_rate, fft_size))
            .or_insert_with(|| Arc::clone(&model));
        Ok(Arc::clone(entry))
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    #[inline]
    pub fn bands(&self) -> &[CriticalBand] {
        &self.bands
    }

    #[inline]
    pub fn num_bands(&self) -> usize {
        self.bands.len()
    }

    #[inline]
    pub fn band_map(&self) -> &FrequencyBandMap {
        &self.band_map
    }

    #[inline]
    pub fn weight_curve(&self) -> &PerceptualWeightCurve {
        &self.weights
    }

    /// Centre frequency of bin `k`
    #[inline]
    pub fn bin_frequency(&self, k: usize) -> f64 {
        k as f64 * self.sample_rate as f64 / self.fft_size as f64
    }

    /// Indices of bands whose centre lies in `[low, high)`
    pub fn bands_between(&self, low: f64, high: f64) -> impl Iterator<Item = usize> + '_ {
        self.bands
            .iter()
            .filter(move |b| b.center_freq >= low && b.center_freq < high)
            .map(|b| b.index as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_set_shape() {
        let bands = critical_bands();
        assert_eq!(bands.len(), NUM_CRITICAL_BANDS);
        assert_eq!(bands[0].low_freq, 0.0);
        assert_eq!(bands[NUM_CRITICAL_BANDS - 1].high_freq, 20000.0);

        for pair in bands.windows(2) {
            assert_eq!(pair[0].high_freq, pair[1].low_freq, "bands must be contiguous");
            assert!(pair[1].center_freq > pair[0].center_freq);
        }
        for band in bands {
            assert!(band.weight >= 0.3 && band.weight <= 1.0);
            assert_eq!(band.bandwidth, band.high_freq - band.low_freq);
        }
    }

    #[test]
    fn test_band_weights_peak_in_presence_range() {
        let bands = critical_bands();
        let b1k = bands.iter().find(|b| b.low_freq == 1080.0).unwrap();
        assert_eq!(b1k.weight, 1.0);
        assert!(bands[0].weight < b1k.weight);
        assert!(bands[NUM_CRITICAL_BANDS - 1].weight < b1k.weight);
    }

    #[test]
    fn test_weight_curve_segments() {
        assert_eq!(PerceptualWeightCurve::weight_at(10.0), 0.1);
        assert_eq!(PerceptualWeightCurve::weight_at(50.0), 0.3);
        assert!((PerceptualWeightCurve::weight_at(550.0) - 0.7).abs() < 1e-12);
        assert_eq!(PerceptualWeightCurve::weight_at(2000.0), 1.0);
        assert_eq!(PerceptualWeightCurve::weight_at(6000.0), 0.9);
        assert_eq!(PerceptualWeightCurve::weight_at(10000.0), 0.7);
        assert_eq!(PerceptualWeightCurve::weight_at(18000.0), 0.4);

        let curve = PerceptualWeightCurve::build(48000, 1024);
        assert_eq!(curve.len(), 513);
        assert!(curve.weights().iter().all(|&w| (0.1..=1.0).contains(&w)));
    }

    #[test]
    fn test_band_map_matches_linear_scan() {
        let bands = critical_bands();
        let map = FrequencyBandMap::build(bands, 48000, 2048).unwrap();
        assert_eq!(map.len(), 1025);

        for k in 0..map.len() {
            let freq = k as f64 * 48000.0 / 2048.0;
            let expected = bands
                .iter()
                .position(|b| freq >= b.low_freq && freq < b.high_freq)
                .unwrap_or(NUM_CRITICAL_BANDS - 1);
            assert_eq!(map.band_of(k), Some(expected), "bin {k} at {freq} Hz");
        }
    }

    #[test]
    fn test_band_ranges_cover_spectrum() {
        let map = FrequencyBandMap::build(critical_bands(), 44100, 4096).unwrap();
        let mut next = 0;
        for range in map.ranges() {
            assert_eq!(range.start, next);
            next = range.end;
        }
        assert_eq!(next, 2049);
        assert!(map.validate(NUM_CRITICAL_BANDS, 4096).is_ok());
        assert!(map.validate(NUM_CRITICAL_BANDS, 2048).is_err());
    }

    #[test]
    fn test_low_sample_rate_leaves_top_bands_empty() {
        let map = FrequencyBandMap::build(critical_bands(), 16000, 512).unwrap();
        // Nyquist is 8 kHz: everything from 9.5 kHz up owns no bins
        assert!(map.band_range(22).is_empty());
        assert!(map.band_range(24).is_empty());
        assert!(!map.band_range(20).is_empty());
    }

    #[test]
    fn test_shared_model_is_cached() {
        let a = BandModel::shared(48000, 1024).unwrap();
        let b = BandModel::shared(48000, 1024).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.num_bands(), NUM_CRITICAL_BANDS);
        assert_eq!(a.weight_curve().len(), 513);
    }
}

//! EQ configuration

use crate::error::{EqError, EqResult};
use serde::{Deserialize, Serialize};

/// Below this many bands the dense vectorized curve always wins
pub const PARALLEL_MIN_BANDS: usize = 16;

/// Minimum FFT size before fanning band groups out to worker threads
pub const PARALLEL_MIN_FFT: usize = 4096;

/// How band gains are applied to one FFT frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Band-by-band loop over a single spectrum buffer
    Sequential,
    /// Dense per-bin gain curve, one multiply pass
    Vectorized,
    /// Band groups fanned out over a worker pool
    Parallel {
        /// Bands per worker task
        group_size: usize,
    },
}

impl StrategyKind {
    /// Pick a strategy from the problem size
    pub fn select(num_bands: usize, fft_size: usize, threads: usize) -> Self {
        if num_bands < PARALLEL_MIN_BANDS || fft_size < PARALLEL_MIN_FFT || threads < 2 {
            return StrategyKind::Vectorized;
        }
        StrategyKind::Parallel {
            group_size: num_bands.div_ceil(threads).max(1),
        }
    }
}

/// EQ settings. Fixed for the lifetime of an EQ instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EqSettings {
    /// Sample rate (Hz)
    pub sample_rate: u32,
    /// FFT size (even)
    pub fft_size: usize,
    /// Frame overlap fraction in [0, 1)
    pub overlap: f64,
    /// Base temporal smoothing factor for target gains, [0, 1)
    pub smoothing_factor: f64,
    /// Masking level assumed for bands that own no FFT bins (dB)
    pub masking_threshold_db: f64,
    /// Fraction of the remaining gain distance covered per chunk, (0, 1]
    pub adaptation_speed: f64,
    /// Forced gain strategy (`None` = pick from problem size)
    pub strategy: Option<StrategyKind>,
    /// Worker threads for the parallel strategy (0 = rayon default)
    pub max_threads: usize,
}

impl Default for EqSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            fft_size: 2048,
            overlap: 0.5,
            smoothing_factor: 0.7,
            masking_threshold_db: -60.0,
            adaptation_speed: 0.2,
            strategy: None,
            max_threads: 0,
        }
    }
}

impl EqSettings {
    pub fn new(sample_rate: u32, fft_size: usize) -> Self {
        Self {
            sample_rate,
            fft_size,
            ..Default::default()
        }
    }

    pub fn with_overlap(mut self, overlap: f64) -> Self {
        self.overlap = overlap;
        self
    }

    pub fn with_smoothing(mut self, factor: f64) -> Self {
        self.smoothing_factor = factor;
        self
    }

    pub fn with_adaptation_speed(mut self, speed: f64) -> Self {
        self.adaptation_speed = speed;
        self
    }

    pub fn with_masking_threshold(mut self, db: f64) -> Self {
        self.masking_threshold_db = db;
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_max_threads(mut self, threads: usize) -> Self {
        self.max_threads = threads;
        self
    }

    /// Reject settings the DSP path cannot run with
    pub fn validate(&self) -> EqResult<()> {
        if self.sample_rate == 0 {
            return Err(EqError::InvalidConfig("sample_rate must be positive".into()));
        }
        if self.fft_size < 4 || self.fft_size % 2 != 0 {
            return Err(EqError::InvalidConfig(format!(
                "fft_size must be an even number >= 4, got {}",
                self.fft_size
            )));
        }
        if !(0.0..1.0).contains(&self.overlap) {
            return Err(EqError::InvalidConfig(format!(
                "overlap must be in [0, 1), got {}",
                self.overlap
            )));
        }
        if !(0.0..1.0).contains(&self.smoothing_factor) {
            return Err(EqError::InvalidConfig(format!(
                "smoothing_factor must be in [0, 1), got {}",
                self.smoothing_factor
            )));
        }
        if !(self.adaptation_speed > 0.0 && self.adaptation_speed <= 1.0) {
            return Err(EqError::InvalidConfig(format!(
                "adaptation_speed must be in (0, 1], got {}",
                self.adaptation_speed
            )));
        }
        if !self.masking_threshold_db.is_finite() {
            return Err(EqError::InvalidConfig("masking_threshold_db must be finite".into()));
        }
        if let Some(StrategyKind::Parallel { group_size: 0 }) = self.strategy {
            return Err(EqError::InvalidConfig("parallel group_size must be > 0".into()));
        }
        Ok(())
    }

    /// Load from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> EqResult<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> EqResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Frequency resolution (Hz per bin)
    #[inline]
    pub fn bin_width(&self) -> f64 {
        self.sample_rate as f64 / self.fft_size as f64
    }
}

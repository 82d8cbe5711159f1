//! Safety tilt used when the spectral path fails
//!
//! A one-pole bass/treble split around 1 kHz. The low side and the residual
//! high side get independent gains derived from the target curve, so a
//! flat curve is an exact pass-through.

use pae_core::{AudioChunk, AudioSample, db_to_linear, sanitize};

/// Split frequency between the bass and treble shelves (Hz)
pub const SAFETY_SPLIT_HZ: f64 = 1000.0;

/// Largest shelf gain either way (dB)
pub const SAFETY_MAX_DB: f64 = 6.0;

/// Bands averaged for the bass shelf
const BASS_BANDS: usize = 6;

/// First band averaged for the treble shelf
const TREBLE_FIRST_BAND: usize = 19;

/// Time-domain fallback EQ
#[derive(Debug, Clone)]
pub struct SafetyTilt {
    sample_rate: u32,
    lp_coeff: f64,
    /// Lowpass state per channel
    lp_state: Vec<f64>,
    bass_db: f64,
    treble_db: f64,
}

impl SafetyTilt {
    pub fn new(sample_rate: u32) -> Self {
        let omega = 2.0 * std::f64::consts::PI * SAFETY_SPLIT_HZ / sample_rate.max(1) as f64;
        Self {
            sample_rate,
            lp_coeff: omega / (omega + 1.0),
            lp_state: Vec::new(),
            bass_db: 0.0,
            treble_db: 0.0,
        }
    }

    /// Derive shelf gains from a per-band target curve
    pub fn set_from_curve(&mut self, target_curve: &[f64]) {
        self.bass_db = shelf_gain(target_curve.iter().take(BASS_BANDS));
        self.treble_db = shelf_gain(target_curve.iter().skip(TREBLE_FIRST_BAND));
    }

    pub fn bass_db(&self) -> f64 {
        self.bass_db
    }

    pub fn treble_db(&self) -> f64 {
        self.treble_db
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Filter a chunk; never fails
    pub fn process<S: AudioSample>(&mut self, chunk: &AudioChunk<S>) -> AudioChunk<S> {
        let channels = chunk.channels();
        if self.lp_state.len() != channels {
            self.lp_state = vec![0.0; channels];
        }

        let low_gain = db_to_linear(self.bass_db);
        let high_gain = db_to_linear(self.treble_db);

        let samples: Vec<S> = chunk
            .samples()
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let x = sanitize(s.to_f64());
                let state = &mut self.lp_state[i % channels];
                *state += self.lp_coeff * (x - *state);
                let low = *state;
                S::from_f64(sanitize(low * low_gain + (x - low) * high_gain))
            })
            .collect();

        AudioChunk::interleaved(samples, channels).unwrap_or_else(|_| AudioChunk::silent(chunk.frames(), channels))
    }

    pub fn reset(&mut self) {
        self.lp_state.fill(0.0);
    }
}

fn shelf_gain<'a>(values: impl Iterator<Item = &'a f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), &v| (sum + sanitize(v), count + 1));
    if count == 0 {
        return 0.0;
    }
    (sum / count as f64).clamp(-SAFETY_MAX_DB, SAFETY_MAX_DB)
}

//! Sample types and audio chunk definitions

use crate::error::{EqError, EqResult};

/// Floating point sample formats accepted by the EQ.
///
/// Processing runs in `f64` internally; results are converted back with
/// [`AudioSample::from_f64`] so the caller always gets its own precision back.
pub trait AudioSample: Copy + Default + PartialEq + Send + Sync + std::fmt::Debug + 'static {
    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
}

impl AudioSample for f32 {
    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl AudioSample for f64 {
    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }
}

/// Replace NaN/Inf with silence
#[inline]
pub fn sanitize(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

/// Interleaved audio chunk
///
/// Mono chunks have `channels == 1`. Multi-channel data is stored frame by
/// frame (`L R L R ...`).
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk<S: AudioSample> {
    samples: Vec<S>,
    channels: usize,
}

impl<S: AudioSample> AudioChunk<S> {
    /// Mono chunk
    pub fn mono(samples: Vec<S>) -> Self {
        Self {
            samples,
            channels: 1,
        }
    }

    /// Interleaved chunk with `channels` channels
    pub fn interleaved(samples: Vec<S>, channels: usize) -> EqResult<Self> {
        if channels == 0 {
            return Err(EqError::ChannelLayout("channel count must be > 0".into()));
        }
        if samples.len() % channels != 0 {
            return Err(EqError::ChannelLayout(format!(
                "{} samples do not divide into {} channels",
                samples.len(),
                channels
            )));
        }
        Ok(Self { samples, channels })
    }

    /// Build from planar (one `Vec` per channel) data, e.g. an N×2 column layout
    pub fn from_channels(planar: Vec<Vec<S>>) -> EqResult<Self> {
        let channels = planar.len();
        if channels == 0 {
            return Err(EqError::ChannelLayout("no channels supplied".into()));
        }
        let frames = planar[0].len();
        if planar.iter().any(|ch| ch.len() != frames) {
            return Err(EqError::ChannelLayout("channels differ in length".into()));
        }

        let mut samples = Vec::with_capacity(frames * channels);
        for frame in 0..frames {
            for ch in &planar {
                samples.push(ch[frame]);
            }
        }
        Ok(Self { samples, channels })
    }

    /// Zero-filled chunk
    pub fn silent(frames: usize, channels: usize) -> Self {
        let channels = channels.max(1);
        Self {
            samples: vec![S::default(); frames * channels],
            channels,
        }
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of sample frames (samples per channel)
    #[inline]
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn samples(&self) -> &[S] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<S> {
        self.samples
    }

    /// Copy one channel out
    pub fn channel(&self, index: usize) -> Vec<S> {
        self.samples
            .iter()
            .skip(index)
            .step_by(self.channels)
            .copied()
            .collect()
    }

    /// Per-channel `f64` copies with non-finite samples replaced by zero
    pub fn channels_f64(&self) -> Vec<Vec<f64>> {
        (0..self.channels)
            .map(|ch| {
                self.samples
                    .iter()
                    .skip(ch)
                    .step_by(self.channels)
                    .map(|s| sanitize(s.to_f64()))
                    .collect()
            })
            .collect()
    }

    /// Channel average in `f64`, sanitized
    pub fn mono_mix(&self) -> Vec<f64> {
        let scale = 1.0 / self.channels as f64;
        self.samples
            .chunks_exact(self.channels)
            .map(|frame| frame.iter().map(|s| sanitize(s.to_f64())).sum::<f64>() * scale)
            .collect()
    }

    /// Rebuild from per-channel `f64` data, converting back to `S`
    pub fn from_channels_f64(planar: &[Vec<f64>]) -> EqResult<Self> {
        let converted = planar
            .iter()
            .map(|ch| ch.iter().map(|&v| S::from_f64(v)).collect())
            .collect();
        Self::from_channels(converted)
    }
}

//! Streaming wrapper around [`PsychoacousticEq`]
//!
//! Features:
//! - Fixed-size blocks from irregular chunk sizes (underruns are counted)
//! - Slower target smoothing in the bass, faster in the air band
//! - Per-band adaptation speed that follows how much each band is moving
//! - Spectral-centroid tilt of the target curve

use crate::config::RealtimeConfig;
use crate::performance::{PerformanceSnapshot, PerformanceTracker};
use crate::queue::ChunkQueue;
use pae_core::{AudioChunk, AudioSample, ContentProfile, EqError, EqResult, EqSettings, sanitize};
use pae_psycho::{BandDynamics, PsychoacousticEq};
use std::time::Instant;

/// Bands below this index smooth slower
pub const LOW_BAND_LIMIT: usize = 8;
/// Bands above this index smooth faster
pub const HIGH_BAND_LIMIT: usize = 20;
/// Upper bound for any per-band smoothing factor
pub const MAX_SMOOTHING: f64 = 0.95;

/// A band moving more than this per block speeds up (dB)
pub const FAST_MOVE_DB: f64 = 2.0;
/// A band moving less than this per block slows down (dB)
pub const SLOW_MOVE_DB: f64 = 0.5;
pub const MAX_ADAPTATION_SPEED: f64 = 0.5;
pub const MIN_ADAPTATION_SPEED: f64 = 0.01;

/// Largest centroid tilt at the top band (dB)
pub const MAX_CENTROID_TILT_DB: f64 = 2.0;
const BRIGHT_CENTROID_HZ: f64 = 4000.0;
const DARK_CENTROID_HZ: f64 = 1000.0;

/// Target smoothing per band, derived from the base factor
pub fn band_smoothing(base: f64, num_bands: usize) -> Vec<f64> {
    (0..num_bands)
        .map(|band| {
            let factor = if band < LOW_BAND_LIMIT {
                base * 1.2
            } else if band > HIGH_BAND_LIMIT {
                base * 0.8
            } else {
                base
            };
            factor.clamp(0.0, MAX_SMOOTHING)
        })
        .collect()
}

/// Next adaptation speed for a band that moved `moved_db` in the last block
pub fn adapt_speed(speed: f64, moved_db: f64) -> f64 {
    if moved_db > FAST_MOVE_DB {
        (speed * 1.5).min(MAX_ADAPTATION_SPEED)
    } else if moved_db < SLOW_MOVE_DB {
        (speed * 0.9).max(MIN_ADAPTATION_SPEED)
    } else {
        speed
    }
}

/// Tilt at the top band for a given spectral centroid (dB)
///
/// Bright material is tilted down, dark material up; the ramp is linear over
/// band index starting from 0 at band 0.
pub fn centroid_tilt_db(centroid_hz: f64) -> f64 {
    let centroid = sanitize(centroid_hz);
    if centroid > BRIGHT_CENTROID_HZ {
        -((centroid - BRIGHT_CENTROID_HZ) / BRIGHT_CENTROID_HZ * MAX_CENTROID_TILT_DB).min(MAX_CENTROID_TILT_DB)
    } else if centroid > 0.0 && centroid < DARK_CENTROID_HZ {
        ((DARK_CENTROID_HZ - centroid) / DARK_CENTROID_HZ * MAX_CENTROID_TILT_DB).min(MAX_CENTROID_TILT_DB)
    } else {
        0.0
    }
}

/// Target curve with the centroid tilt applied
pub fn shape_target(target_curve: &[f64], profile: Option<&ContentProfile>) -> Vec<f64> {
    let tilt = profile.map_or(0.0, |p| centroid_tilt_db(p.spectral_centroid));
    let last = target_curve.len().saturating_sub(1).max(1) as f64;
    target_curve
        .iter()
        .enumerate()
        .map(|(i, &t)| t + tilt * i as f64 / last)
        .collect()
}

/// Real-time adaptive EQ
pub struct RealtimeEq {
    eq: PsychoacousticEq,
    config: RealtimeConfig,
    queue: ChunkQueue,
    dynamics: BandDynamics,
    base_speed: f64,
    perf: PerformanceTracker,
}

impl RealtimeEq {
    pub fn new(settings: EqSettings, config: RealtimeConfig) -> EqResult<Self> {
        config.validate()?;
        let eq = PsychoacousticEq::new(settings)?;
        Ok(Self::with_eq(eq, config))
    }

    /// Wrap an existing EQ; `config` must already be valid
    pub fn with_eq(eq: PsychoacousticEq, config: RealtimeConfig) -> Self {
        let num_bands = eq.model().num_bands();
        let base_speed = eq.settings().adaptation_speed;
        let target_smoothing = band_smoothing(eq.settings().smoothing_factor, num_bands);
        let budget = config.latency_budget_ms(eq.settings().sample_rate);

        log::debug!(
            "Realtime EQ: {}-frame blocks, {:.2} ms budget",
            config.buffer_size,
            budget
        );

        Self {
            dynamics: BandDynamics {
                target_smoothing,
                adaptation_speeds: vec![base_speed; num_bands],
            },
            base_speed,
            perf: PerformanceTracker::new(budget),
            queue: ChunkQueue::new(),
            config,
            eq,
        }
    }

    /// Process one chunk of any length
    ///
    /// Returns processed audio, or zeros of the input's shape while the queue
    /// is still filling.
    pub fn process<S: AudioSample>(
        &mut self,
        chunk: &AudioChunk<S>,
        target_curve: &[f64],
        profile: Option<&ContentProfile>,
    ) -> EqResult<AudioChunk<S>> {
        let num_bands = self.eq.model().num_bands();
        if target_curve.len() != num_bands {
            return Err(EqError::BandMismatch {
                expected: num_bands,
                got: target_curve.len(),
            });
        }
        if chunk.is_empty() {
            return Ok(chunk.clone());
        }

        let buffer_size = self.config.buffer_size;
        let target = shape_target(target_curve, profile);

        if chunk.frames() == buffer_size && self.queue.is_empty() {
            let start = Instant::now();
            let out = self.process_block(chunk, &target, profile)?;
            self.perf.record_chunk(start.elapsed());
            return Ok(out);
        }

        self.queue.push(chunk)?;
        if self.queue.frames() < buffer_size {
            self.perf.record_underrun();
            log::debug!(
                "Underrun: {} of {} frames queued",
                self.queue.frames(),
                buffer_size
            );
            return Ok(AudioChunk::silent(chunk.frames(), chunk.channels()));
        }

        let start = Instant::now();
        let out = self.drain(&target, profile)?;
        self.perf.record_chunk(start.elapsed());
        Ok(out)
    }

    /// Process whatever is queued, zero-padded to a full block
    pub fn flush<S: AudioSample>(
        &mut self,
        target_curve: &[f64],
        profile: Option<&ContentProfile>,
    ) -> EqResult<AudioChunk<S>> {
        let num_bands = self.eq.model().num_bands();
        if target_curve.len() != num_bands {
            return Err(EqError::BandMismatch {
                expected: num_bands,
                got: target_curve.len(),
            });
        }
        if self.queue.is_empty() {
            return Ok(AudioChunk::silent(0, 1));
        }

        let target = shape_target(target_curve, profile);
        let start = Instant::now();
        let out = self.drain(&target, profile)?;
        self.perf.record_chunk(start.elapsed());
        Ok(out)
    }

    /// Empty the queue into full blocks and concatenate the results
    fn drain<S: AudioSample>(&mut self, target: &[f64], profile: Option<&ContentProfile>) -> EqResult<AudioChunk<S>> {
        let buffer_size = self.config.buffer_size;
        let channels = self.queue.channels().max(1);
        let mut samples = Vec::with_capacity(self.queue.frames().div_ceil(buffer_size) * buffer_size * channels);

        // Blocks leave the queue only once processed, so an error keeps them queued
        while !self.queue.is_empty() {
            let block = self.queue.peek_block(buffer_size)?;
            let processed = self.process_block(&block, target, profile)?;
            self.queue.discard(buffer_size);
            samples.extend(processed.samples().iter().map(|&s| S::from_f64(s)));
        }

        AudioChunk::interleaved(samples, channels)
    }

    /// One full block through the EQ, then adapt the per-band speeds
    fn process_block<S: AudioSample>(
        &mut self,
        block: &AudioChunk<S>,
        target: &[f64],
        profile: Option<&ContentProfile>,
    ) -> EqResult<AudioChunk<S>> {
        let before = self.eq.gain_state().current_gains.clone();
        let out = self.eq.process_chunk_with(block, target, profile, Some(&self.dynamics))?;

        let after = &self.eq.gain_state().current_gains;
        for ((speed, b), a) in self.dynamics.adaptation_speeds.iter_mut().zip(&before).zip(after) {
            *speed = adapt_speed(*speed, (a - b).abs());
        }
        self.perf.record_adaptation();
        Ok(out)
    }

    pub fn performance(&self) -> PerformanceSnapshot {
        self.perf.snapshot(self.eq.stats().fallbacks)
    }

    /// Clear queue, counters, speeds and the inner EQ
    pub fn reset(&mut self) {
        self.queue.clear();
        self.perf.reset();
        self.dynamics.adaptation_speeds.fill(self.base_speed);
        self.eq.reset();
    }

    pub fn underruns(&self) -> u64 {
        self.perf.underruns()
    }

    pub fn queued_frames(&self) -> usize {
        self.queue.frames()
    }

    pub fn adaptation_speeds(&self) -> &[f64] {
        &self.dynamics.adaptation_speeds
    }

    pub fn target_smoothing(&self) -> &[f64] {
        &self.dynamics.target_smoothing
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    pub fn eq(&self) -> &PsychoacousticEq {
        &self.eq
    }
}

//! Per-chunk EQ pipeline
//!
//! analyze → masking → solve → smooth → apply, with the safety tilt taking
//! over whenever the spectral path fails numerically.

use crate::analysis::{SpectrumAnalysis, SpectrumAnalyzer};
use crate::bands::BandModel;
use crate::engine::{GainEngine, GainStrategy};
use crate::history::{AnalysisRecord, HistoryRing};
use crate::masking::MaskingCalculator;
use crate::safety::SafetyTilt;
use crate::solver::{GainSolver, GainState};
use pae_core::{AudioChunk, AudioSample, ContentProfile, EqError, EqResult, EqSettings, sanitize};
use serde::Serialize;
use std::sync::Arc;

/// Lifecycle of a [`PsychoacousticEq`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EqState {
    /// Constructed or reset, nothing processed yet
    Idle,
    /// At least one chunk processed
    Streaming,
}

/// Per-band overrides for target smoothing and adaptation speed
#[derive(Debug, Clone, PartialEq)]
pub struct BandDynamics {
    /// Weight of the previous target, per band, in [0, 1)
    pub target_smoothing: Vec<f64>,
    /// Fraction of the remaining distance covered per chunk, per band
    pub adaptation_speeds: Vec<f64>,
}

impl BandDynamics {
    /// Same smoothing and speed for every band
    pub fn uniform(num_bands: usize, smoothing: f64, speed: f64) -> Self {
        Self {
            target_smoothing: vec![smoothing; num_bands],
            adaptation_speeds: vec![speed; num_bands],
        }
    }

    fn validate(&self, num_bands: usize) -> EqResult<()> {
        for len in [self.target_smoothing.len(), self.adaptation_speeds.len()] {
            if len != num_bands {
                return Err(EqError::BandMismatch {
                    expected: num_bands,
                    got: len,
                });
            }
        }
        Ok(())
    }
}

/// Gain applied to one band right now
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BandResponse {
    pub index: usize,
    pub center_freq: f64,
    pub gain_db: f64,
}

/// Running counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EqStats {
    pub chunks_processed: u64,
    pub fallbacks: u64,
}

/// Result of one successful pass through the spectral path
struct AdaptiveOutput<S: AudioSample> {
    audio: AudioChunk<S>,
    analysis: SpectrumAnalysis,
    state: GainState,
}

/// Psychoacoustic adaptive EQ
pub struct PsychoacousticEq {
    settings: EqSettings,
    model: Arc<BandModel>,
    analyzer: SpectrumAnalyzer,
    solver: GainSolver,
    engine: GainEngine,
    gain_state: GainState,
    history: HistoryRing<AnalysisRecord>,
    safety: SafetyTilt,
    state: EqState,
    stats: EqStats,
    last_analysis: Option<SpectrumAnalysis>,
}

impl PsychoacousticEq {
    /// EQ over the cached standard band model
    pub fn new(settings: EqSettings) -> EqResult<Self> {
        settings.validate()?;
        let model = BandModel::shared(settings.sample_rate, settings.fft_size)?;
        Self::with_model(settings, model)
    }

    /// EQ over an explicit band model
    pub fn with_model(settings: EqSettings, model: Arc<BandModel>) -> EqResult<Self> {
        settings.validate()?;
        let engine = GainEngine::from_settings(Arc::clone(&model), &settings)?;
        Ok(Self::assemble(settings, model, engine))
    }

    /// EQ with a caller-supplied gain strategy
    pub fn with_strategy(
        settings: EqSettings,
        model: Arc<BandModel>,
        strategy: Box<dyn GainStrategy>,
    ) -> EqResult<Self> {
        settings.validate()?;
        if model.fft_size() != settings.fft_size || model.sample_rate() != settings.sample_rate {
            return Err(EqError::InvalidConfig(format!(
                "band model is {} Hz / {} bins, settings ask for {} Hz / {}",
                model.sample_rate(),
                model.fft_size(),
                settings.sample_rate,
                settings.fft_size
            )));
        }
        let engine = GainEngine::new(Arc::clone(&model), settings.overlap, strategy)?;
        Ok(Self::assemble(settings, model, engine))
    }

    fn assemble(settings: EqSettings, model: Arc<BandModel>, engine: GainEngine) -> Self {
        let masking = MaskingCalculator::new(settings.masking_threshold_db);
        let analyzer = SpectrumAnalyzer::new(Arc::clone(&model), settings.fft_size / 2, masking);

        log::debug!(
            "Psychoacoustic EQ ready: {} Hz, {}-point FFT, hop {}, {:?}",
            settings.sample_rate,
            settings.fft_size,
            engine.hop_size(),
            engine.strategy()
        );

        Self {
            solver: GainSolver::new(Arc::clone(&model)),
            gain_state: GainState::new(model.num_bands()),
            history: HistoryRing::default(),
            safety: SafetyTilt::new(settings.sample_rate),
            state: EqState::Idle,
            stats: EqStats::default(),
            last_analysis: None,
            settings,
            model,
            analyzer,
            engine,
        }
    }

    /// Process one chunk; the solved target is approached at the configured adaptation speed
    pub fn process_chunk<S: AudioSample>(
        &mut self,
        audio: &AudioChunk<S>,
        target_curve: &[f64],
        profile: Option<&ContentProfile>,
    ) -> EqResult<AudioChunk<S>> {
        self.process_chunk_with(audio, target_curve, profile, None)
    }

    /// Process one chunk, optionally with per-band dynamics
    pub fn process_chunk_with<S: AudioSample>(
        &mut self,
        audio: &AudioChunk<S>,
        target_curve: &[f64],
        profile: Option<&ContentProfile>,
        dynamics: Option<&BandDynamics>,
    ) -> EqResult<AudioChunk<S>> {
        let num_bands = self.model.num_bands();
        if target_curve.len() != num_bands {
            return Err(EqError::BandMismatch {
                expected: num_bands,
                got: target_curve.len(),
            });
        }
        if let Some(dynamics) = dynamics {
            dynamics.validate(num_bands)?;
        }
        if audio.is_empty() {
            return Ok(audio.clone());
        }

        self.state = EqState::Streaming;
        let chunk_index = self.stats.chunks_processed;
        self.stats.chunks_processed += 1;

        match self.adaptive_path(audio, target_curve, profile, dynamics) {
            Ok(output) => {
                self.gain_state = output.state;
                self.history.push(AnalysisRecord {
                    chunk_index,
                    band_energies: output.analysis.band_energies.clone(),
                    masking_thresholds: output.analysis.masking_thresholds.clone(),
                    target_gains: self.gain_state.target_gains.clone(),
                    current_gains: self.gain_state.current_gains.clone(),
                    fallback: false,
                });
                self.last_analysis = Some(output.analysis);
                Ok(output.audio)
            }
            Err(e) if e.is_recoverable() => {
                log::warn!("Chunk {chunk_index}: spectral path failed ({e}), using safety tilt");
                self.stats.fallbacks += 1;
                self.safety.set_from_curve(target_curve);
                self.history.push(AnalysisRecord {
                    chunk_index,
                    band_energies: Vec::new(),
                    masking_thresholds: Vec::new(),
                    target_gains: self.gain_state.target_gains.clone(),
                    current_gains: self.gain_state.current_gains.clone(),
                    fallback: true,
                });
                Ok(self.safety.process(audio))
            }
            Err(e) => Err(e),
        }
    }

    /// Full spectral path; gain state is only committed by the caller on success
    fn adaptive_path<S: AudioSample>(
        &mut self,
        audio: &AudioChunk<S>,
        target_curve: &[f64],
        profile: Option<&ContentProfile>,
        dynamics: Option<&BandDynamics>,
    ) -> EqResult<AdaptiveOutput<S>> {
        let analysis = self.analyzer.analyze(&audio.mono_mix())?;
        let solved = self.solver.solve(
            &analysis.band_energies,
            &analysis.masking_thresholds,
            target_curve,
            profile,
        )?;

        let mut state = self.gain_state.clone();
        match dynamics {
            Some(d) => {
                // Per-band pre-smoothing of the target against the previous one
                let target: Vec<f64> = solved
                    .iter()
                    .zip(&self.gain_state.target_gains)
                    .zip(&d.target_smoothing)
                    .map(|((&new, &previous), &s)| {
                        let s = sanitize(s).clamp(0.0, 1.0);
                        s * previous + (1.0 - s) * new
                    })
                    .collect();
                self.solver.smooth(&mut state, &target, &d.adaptation_speeds)?;
            }
            None => self
                .solver
                .smooth_uniform(&mut state, &solved, self.settings.adaptation_speed)?,
        }

        let audio = self.engine.apply_chunk(audio, &state.current_gains)?;

        Ok(AdaptiveOutput {
            audio,
            analysis,
            state,
        })
    }

    /// Zero the gains and forget history; the band model is kept
    pub fn reset(&mut self) {
        self.gain_state.reset();
        self.history.clear();
        self.safety.reset();
        self.last_analysis = None;
        self.stats = EqStats::default();
        self.state = EqState::Idle;
    }

    /// Gain currently applied per band
    pub fn current_response(&self) -> Vec<BandResponse> {
        self.model
            .bands()
            .iter()
            .zip(&self.gain_state.current_gains)
            .enumerate()
            .map(|(index, (band, &gain_db))| BandResponse {
                index,
                center_freq: band.center_freq,
                gain_db,
            })
            .collect()
    }

    pub fn gain_state(&self) -> &GainState {
        &self.gain_state
    }

    pub fn history(&self) -> &HistoryRing<AnalysisRecord> {
        &self.history
    }

    pub fn last_analysis(&self) -> Option<&SpectrumAnalysis> {
        self.last_analysis.as_ref()
    }

    pub fn stats(&self) -> EqStats {
        self.stats
    }

    pub fn state(&self) -> EqState {
        self.state
    }

    pub fn settings(&self) -> &EqSettings {
        &self.settings
    }

    pub fn model(&self) -> &Arc<BandModel> {
        &self.model
    }

    pub fn engine(&self) -> &GainEngine {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;
    use pae_core::{Genre, StrategyKind};

    fn settings() -> EqSettings {
        EqSettings::new(48000, 1024).with_strategy(StrategyKind::Vectorized)
    }

    fn tone(len: usize) -> AudioChunk<f32> {
        AudioChunk::mono(
            (0..len)
                .map(|i| (0.3 * (2.0 * std::f64::consts::PI * 1000.0 * i as f64 / 48000.0).sin()) as f32)
                .collect(),
        )
    }

    /// Poisons every frame
    struct NanStrategy;

    impl GainStrategy for NanStrategy {
        fn kind(&self) -> StrategyKind {
            StrategyKind::Sequential
        }

        fn apply(&self, spectrum: &mut [Complex64], _linear_gains: &[f64], _model: &BandModel) {
            spectrum.fill(Complex64::new(f64::NAN, 0.0));
        }
    }

    #[test]
    fn test_process_updates_state_and_history() {
        let mut eq = PsychoacousticEq::new(settings()).unwrap();
        assert_eq!(eq.state(), EqState::Idle);

        let out = eq.process_chunk(&tone(2048), &[-10.0; 25], None).unwrap();
        assert_eq!(out.frames(), 2048);
        assert_eq!(eq.state(), EqState::Streaming);
        assert_eq!(eq.history().len(), 1);
        assert!(eq.last_analysis().is_some());
        assert_eq!(eq.stats().chunks_processed, 1);
        assert_eq!(eq.current_response().len(), 25);
        assert!(eq.gain_state().current_gains.iter().any(|&g| g != 0.0));
    }

    #[test]
    fn test_contract_errors() {
        let mut eq = PsychoacousticEq::new(settings()).unwrap();
        assert!(matches!(
            eq.process_chunk(&tone(512), &[0.0; 24], None),
            Err(EqError::BandMismatch { expected: 25, got: 24 })
        ));

        let bad = BandDynamics {
            target_smoothing: vec![0.5; 25],
            adaptation_speeds: vec![0.5; 3],
        };
        assert!(eq.process_chunk_with(&tone(512), &[0.0; 25], None, Some(&bad)).is_err());
        assert_eq!(eq.stats().chunks_processed, 0);
    }

    #[test]
    fn test_numerical_failure_falls_back() {
        let model = BandModel::shared(48000, 1024).unwrap();
        let mut eq = PsychoacousticEq::with_strategy(settings(), model, Box::new(NanStrategy)).unwrap();

        let out = eq
            .process_chunk(&tone(1024), &[3.0; 25], Some(&ContentProfile::for_genre(Genre::Pop)))
            .unwrap();
        assert_eq!(out.frames(), 1024);
        assert!(out.samples().iter().all(|s| s.is_finite()));
        assert_eq!(eq.stats().fallbacks, 1);
        assert!(eq.history().latest().unwrap().fallback);
        // Failed chunk leaves the gain state untouched
        assert!(eq.gain_state().current_gains.iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_target_smoothing_only_with_dynamics() {
        let chunk = tone(2048);
        let target = [-10.0; 25];

        let mut plain = PsychoacousticEq::new(settings()).unwrap();
        plain.process_chunk(&chunk, &target, None).unwrap();
        let analysis = plain.last_analysis().unwrap();
        let solved = GainSolver::new(Arc::clone(plain.model()))
            .solve(&analysis.band_energies, &analysis.masking_thresholds, &target, None)
            .unwrap();
        assert_eq!(plain.gain_state().target_gains, solved);

        let mut shaped = PsychoacousticEq::new(settings()).unwrap();
        let dynamics = BandDynamics::uniform(25, 0.5, 0.2);
        shaped.process_chunk_with(&chunk, &target, None, Some(&dynamics)).unwrap();
        for (t, s) in shaped.gain_state().target_gains.iter().zip(&solved) {
            assert!((t - 0.5 * s).abs() < 1e-12);
        }
    }

    #[test]
    fn test_reset_keeps_model() {
        let mut eq = PsychoacousticEq::new(settings()).unwrap();
        let model = Arc::clone(eq.model());
        eq.process_chunk(&tone(2048), &[-10.0; 25], None).unwrap();
        eq.reset();
        assert_eq!(eq.state(), EqState::Idle);
        assert!(eq.history().is_empty());
        assert!(eq.gain_state().current_gains.iter().all(|&g| g == 0.0));
        assert!(Arc::ptr_eq(&model, eq.model()));
    }

    #[test]
    fn test_empty_chunk_is_passed_through() {
        let mut eq = PsychoacousticEq::new(settings()).unwrap();
        let out = eq.process_chunk(&AudioChunk::<f64>::silent(0, 2), &[0.0; 25], None).unwrap();
        assert!(out.is_empty());
        assert_eq!(eq.state(), EqState::Idle);
    }

    #[test]
    fn test_model_mismatch_rejected() {
        let model = BandModel::shared(44100, 1024).unwrap();
        assert!(PsychoacousticEq::with_model(settings(), model).is_err());
    }
}

// ============================================================================
// Psychoacoustic EQ property tests
// End-to-end behaviour of the gain engine, solver and orchestrator
// ============================================================================

use approx::assert_relative_eq;
use num_complex::Complex64;
use pae_core::{AudioChunk, ContentProfile, EnergyLevel, EqSettings, Genre, MAX_BAND_GAIN_DB, StrategyKind};
use pae_psycho::{
    BandModel, GainEngine, GainSolver, GainState, GainStrategy, ParallelStrategy, PsychoacousticEq,
    RESIDUAL_TOLERANCE, SequentialStrategy, VectorizedStrategy,
};
use rustfft::FftPlanner;
use std::f64::consts::PI;

// ============================================================================
// TEST UTILITIES
// ============================================================================

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn generate_sine(frequency: f64, sample_rate: f64, num_samples: usize) -> Vec<f64> {
    (0..num_samples)
        .map(|i| (2.0 * PI * frequency * i as f64 / sample_rate).sin())
        .collect()
}

/// Reproducible white noise in [-1, 1)
fn generate_noise(num_samples: usize, seed: u64) -> Vec<f64> {
    let mut state = seed;
    (0..num_samples)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0
        })
        .collect()
}

fn calculate_rms(signal: &[f64]) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    (signal.iter().map(|s| s * s).sum::<f64>() / signal.len() as f64).sqrt()
}

/// Magnitude of the analytic signal
fn hilbert_envelope(signal: &[f64]) -> Vec<f64> {
    let n = signal.len();
    let mut planner = FftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(n);
    let inverse = planner.plan_fft_inverse(n);

    let mut buffer: Vec<Complex64> = signal.iter().map(|&x| Complex64::new(x, 0.0)).collect();
    forward.process(&mut buffer);
    for (k, bin) in buffer.iter_mut().enumerate() {
        let h = if k == 0 || (n % 2 == 0 && k == n / 2) {
            1.0
        } else if k < n.div_ceil(2) {
            2.0
        } else {
            0.0
        };
        *bin *= h;
    }
    inverse.process(&mut buffer);
    buffer.iter().map(|c| c.norm() / n as f64).collect()
}

fn coefficient_of_variation(values: &[f64]) -> f64 {
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt() / mean
}

fn ramp_gains(num_bands: usize) -> Vec<f64> {
    (0..num_bands).map(|i| ((i * 7) % 25) as f64 - 12.0).collect()
}

fn engine(sample_rate: u32, fft_size: usize, strategy: StrategyKind) -> GainEngine {
    let settings = EqSettings::new(sample_rate, fft_size).with_strategy(strategy);
    let model = BandModel::shared(sample_rate, fft_size).unwrap();
    GainEngine::from_settings(model, &settings).unwrap()
}

// ============================================================================
// GAIN ENGINE
// ============================================================================

#[test]
fn test_hermitian_symmetry() {
    init_logging();
    for (seed, kind) in [
        (1, StrategyKind::Sequential),
        (2, StrategyKind::Vectorized),
        (3, StrategyKind::Parallel { group_size: 5 }),
    ] {
        let mut engine = engine(48000, 2048, kind);
        let input = generate_noise(10000, seed);
        let gains: Vec<f64> = generate_noise(25, seed + 100).iter().map(|g| g * 12.0).collect();
        engine.apply_f64(&input, &gains).unwrap();
        assert!(
            engine.last_imag_residual() < RESIDUAL_TOLERANCE,
            "{kind:?}: residual {}",
            engine.last_imag_residual()
        );
    }
}

#[test]
fn test_unity_gain_identity() {
    let mut engine = engine(48000, 2048, StrategyKind::Vectorized);
    let input = generate_sine(1000.0, 48000.0, 9600);
    let output = engine.apply_f64(&input, &[0.0; 25]).unwrap();

    let ratio = calculate_rms(&output) / calculate_rms(&input);
    assert!((ratio - 1.0).abs() < 0.01, "RMS ratio {ratio}");

    // A double-windowed path would ripple at the hop rate
    let cv = coefficient_of_variation(&hilbert_envelope(&output));
    assert!(cv < 0.001, "envelope CV {cv}");
}

#[test]
fn test_single_band_linear_gain() {
    let model = BandModel::shared(48000, 4096).unwrap();
    // 920-1080 Hz
    let band = 8;
    assert_eq!(model.bands()[band].low_freq, 920.0);

    let input = generate_sine(1000.0, 48000.0, 48000);
    let steady = 4096..48000 - 4096;

    for (gain_db, expected) in [(6.0, 10f64.powf(6.0 / 20.0)), (-6.0, 10f64.powf(-6.0 / 20.0))] {
        let mut gains = vec![0.0; 25];
        gains[band] = gain_db;
        let mut engine = engine(48000, 4096, StrategyKind::Sequential);
        let output = engine.apply_f64(&input, &gains).unwrap();

        let ratio = calculate_rms(&output[steady.clone()]) / calculate_rms(&input[steady.clone()]);
        assert_relative_eq!(ratio, expected, max_relative = 0.05);
    }
}

#[test]
fn test_strategy_equivalence() {
    let input = generate_noise(20000, 42);
    let gains = ramp_gains(25);

    let reference = engine(48000, 4096, StrategyKind::Sequential)
        .apply_f64(&input, &gains)
        .unwrap();
    let vectorized = engine(48000, 4096, StrategyKind::Vectorized)
        .apply_f64(&input, &gains)
        .unwrap();

    let model = BandModel::shared(48000, 4096).unwrap();
    let mut parallel_engine = GainEngine::new(model, 0.5, Box::new(ParallelStrategy::new(4, 3))).unwrap();
    let parallel = parallel_engine.apply_f64(&input, &gains).unwrap();

    for i in 0..input.len() {
        assert_relative_eq!(reference[i], vectorized[i], max_relative = 1e-10, epsilon = 1e-12);
        assert_relative_eq!(reference[i], parallel[i], max_relative = 1e-10, epsilon = 1e-12);
    }
}

#[test]
fn test_all_bands_coverage() {
    let input = generate_noise(16384, 9);
    let expected = 10f64.powf(6.0 / 20.0);

    let model = BandModel::shared(48000, 2048).unwrap();
    let strategies: Vec<Box<dyn GainStrategy>> = vec![
        Box::new(SequentialStrategy),
        Box::new(VectorizedStrategy),
        Box::new(ParallelStrategy::new(3, 0)),
        Box::new(ParallelStrategy::new(25, 0)),
    ];
    for strategy in strategies {
        let kind = strategy.kind();
        let mut engine = GainEngine::new(model.clone(), 0.5, strategy).unwrap();
        let output = engine.apply_f64(&input, &[6.0; 25]).unwrap();
        let ratio = calculate_rms(&output) / calculate_rms(&input);
        assert!((ratio - expected).abs() / expected < 0.05, "{kind:?}: ratio {ratio}");
    }
}

#[test]
fn test_dtype_preservation() {
    let mut engine = engine(44100, 1024, StrategyKind::Vectorized);
    let gains = vec![3.0; 25];

    let input32: Vec<f32> = generate_noise(3000, 5).into_iter().map(|v| v as f32 * 0.5).collect();
    let out32: Vec<f32> = engine.apply(&input32, &gains).unwrap();
    assert_eq!(out32.len(), input32.len());

    let input64 = generate_noise(3000, 5);
    let out64: Vec<f64> = engine.apply(&input64, &gains).unwrap();
    assert_eq!(out64.len(), input64.len());

    // Shorter than one frame: zero-padded path
    let short32: Vec<f32> = vec![0.25; 100];
    let out: Vec<f32> = engine.apply(&short32, &gains).unwrap();
    assert_eq!(out.len(), 100);
    assert!(out.iter().all(|s| s.is_finite()));

    let mut eq = PsychoacousticEq::new(EqSettings::new(44100, 1024)).unwrap();
    let chunk = AudioChunk::mono(short32);
    let processed: AudioChunk<f32> = eq.process_chunk(&chunk, &[-20.0; 25], None).unwrap();
    assert_eq!(processed.frames(), 100);
    let chunk = AudioChunk::mono(vec![0.25f64; 100]);
    let processed: AudioChunk<f64> = eq.process_chunk(&chunk, &[-20.0; 25], None).unwrap();
    assert_eq!(processed.frames(), 100);
}

// ============================================================================
// SOLVER / ORCHESTRATOR
// ============================================================================

#[test]
fn test_band_gain_clamp() {
    let solver = GainSolver::new(BandModel::shared(48000, 2048).unwrap());
    let profiles = [
        None,
        Some(ContentProfile::for_genre(Genre::Metal).with_energy(EnergyLevel::Low).with_dynamic_range(3.0)),
        Some(ContentProfile::for_genre(Genre::Electronic).with_energy(EnergyLevel::Low)),
    ];

    for seed in 0..20u64 {
        let energies: Vec<f64> = generate_noise(25, seed).iter().map(|v| v * 100.0 - 40.0).collect();
        let thresholds: Vec<f64> = generate_noise(25, seed + 50).iter().map(|v| v * 40.0 - 60.0).collect();
        let target: Vec<f64> = generate_noise(25, seed + 99).iter().map(|v| v * 80.0).collect();
        for profile in &profiles {
            let gains = solver.solve(&energies, &thresholds, &target, profile.as_ref()).unwrap();
            assert!(gains.iter().all(|g| (-MAX_BAND_GAIN_DB..=MAX_BAND_GAIN_DB).contains(g)));
        }
    }

    let mut eq = PsychoacousticEq::new(EqSettings::new(48000, 2048).with_adaptation_speed(1.0).with_smoothing(0.0))
        .unwrap();
    let loud = AudioChunk::mono(generate_noise(8192, 3));
    for _ in 0..5 {
        eq.process_chunk(&loud, &[60.0; 25], None).unwrap();
    }
    let state = eq.gain_state();
    assert!(state.current_gains.iter().all(|g| g.abs() <= MAX_BAND_GAIN_DB));
    assert!(state.target_gains.iter().all(|g| g.abs() <= MAX_BAND_GAIN_DB));
}

#[test]
fn test_finiteness_under_silence() {
    init_logging();
    let mut eq = PsychoacousticEq::new(EqSettings::new(48000, 2048)).unwrap();
    let silence = AudioChunk::from_channels(vec![vec![0.0f32; 4096], vec![0.0f32; 4096]]).unwrap();

    let out = eq.process_chunk(&silence, &[-30.0; 25], None).unwrap();
    assert!(out.samples().iter().all(|s| s.is_finite()));

    let analysis = eq.last_analysis().unwrap();
    assert!(analysis.band_energies.iter().all(|e| e.is_finite()));
    assert!(analysis.masking_thresholds.iter().all(|t| t.is_finite()));
    assert!(eq.gain_state().current_gains.iter().all(|g| g.is_finite()));
    assert!(eq.gain_state().target_gains.iter().all(|g| g.is_finite()));
    assert_eq!(eq.stats().fallbacks, 0);
}

#[test]
fn test_smoothing_convergence() {
    let solver = GainSolver::new(BandModel::shared(48000, 2048).unwrap());
    let speed: f64 = 0.2;
    let epsilon = 1e-3;
    let target: Vec<f64> = ramp_gains(25);
    let mut state = GainState::new(25);

    // Largest start distance is 12 dB: (1 - speed)^n * 12 < epsilon
    let bound = ((epsilon / 12.0f64).ln() / (1.0 - speed).ln()).ceil() as usize;
    let mut previous = target.iter().fold(0.0f64, |m, g| m.max(g.abs()));
    let mut steps = 0;
    while previous >= epsilon {
        solver.smooth_uniform(&mut state, &target, speed).unwrap();
        let distance = state.max_distance();
        assert!(distance < previous || distance == 0.0, "not monotonic at step {steps}");
        previous = distance;
        steps += 1;
        assert!(steps <= bound, "no convergence within {bound} chunks");
    }

    // Stable once converged
    let settled = state.current_gains.clone();
    solver.smooth_uniform(&mut state, &target, speed).unwrap();
    for (a, b) in settled.iter().zip(&state.current_gains) {
        assert!((a - b).abs() < epsilon);
    }
}

#[test]
fn test_chunk_smoothing_converges_at_adaptation_speed() {
    let settings = EqSettings::new(48000, 2048);
    let speed = settings.adaptation_speed;
    let mut eq = PsychoacousticEq::new(settings).unwrap();

    let samples: Vec<f64> = generate_sine(440.0, 48000.0, 8192)
        .iter()
        .zip(generate_sine(3000.0, 48000.0, 8192))
        .map(|(a, b)| 0.3 * a + 0.1 * b)
        .collect();
    let chunk = AudioChunk::mono(samples);
    let target = vec![-10.0; 25];

    eq.process_chunk(&chunk, &target, None).unwrap();
    let analysis = eq.last_analysis().unwrap();
    let solved = GainSolver::new(eq.model().clone())
        .solve(&analysis.band_energies, &analysis.masking_thresholds, &target, None)
        .unwrap();

    // The solver output is the target; the first chunk covers `speed` of it
    assert_eq!(eq.gain_state().target_gains, solved);
    for (current, goal) in eq.gain_state().current_gains.iter().zip(&solved) {
        assert_relative_eq!(*current, speed * goal, epsilon = 1e-12);
    }

    let epsilon = 1e-3;
    let start = solved.iter().fold(0.0f64, |m, g| m.max(g.abs()));
    assert!(start > epsilon);
    let bound = ((epsilon / start).ln() / (1.0 - speed).ln()).ceil() as usize;

    let distances = |eq: &PsychoacousticEq| -> Vec<f64> {
        eq.gain_state()
            .current_gains
            .iter()
            .zip(&solved)
            .map(|(c, g)| (g - c).abs())
            .collect()
    };

    let mut previous = distances(&eq);
    let mut chunks = 1;
    while previous.iter().fold(0.0f64, |m, &d| m.max(d)) >= epsilon {
        eq.process_chunk(&chunk, &target, None).unwrap();
        chunks += 1;
        assert_eq!(eq.gain_state().target_gains, solved);

        let current = distances(&eq);
        for (band, (now, before)) in current.iter().zip(&previous).enumerate() {
            assert!(now <= before, "band {band} moved away at chunk {chunks}");
        }
        previous = current;
        assert!(chunks <= bound, "no convergence within {bound} chunks");
    }
}

#[test]
fn test_history_is_bounded() {
    let mut eq = PsychoacousticEq::new(EqSettings::new(16000, 256)).unwrap();
    let chunk = AudioChunk::mono(vec![0.1f64; 64]);
    for _ in 0..150 {
        eq.process_chunk(&chunk, &[0.0; 25], None).unwrap();
    }
    assert_eq!(eq.history().len(), pae_psycho::HISTORY_CAPACITY);
    assert_eq!(eq.history().iter().next().unwrap().chunk_index, 50);
    assert_eq!(eq.stats().chunks_processed, 150);
}

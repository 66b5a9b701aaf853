use bad_core::design::{DesignSpaceConfig, linspace};
use bad_core::model::{ModelConfig, ModelKind, Particles, PosteriorSnapshot, Prior};
use bad_core::trial::{DesignOutcome, LoopState, TrialLoop};
use bad_core::{BadError, ExperimentConfig};

fn logk_config(seed: u64) -> ExperimentConfig {
    ExperimentConfig {
        experiment: None,
        max_trials: 5,
        seed: Some(seed),
        model: ModelConfig::new(ModelKind::Hyperbolic)
            .with_particles(1_000)
            .with_prior("logk", Prior::normal((1.0f64 / 365.0).ln(), 2.0)),
        design_space: DesignSpaceConfig {
            ra: linspace(0.0, 95.0, 20),
            da: vec![0.0],
            pa: vec![1.0],
            rb: vec![100.0],
            db: vec![30.0],
            pb: vec![1.0],
            ra_over_rb: Vec::new(),
            assume_discounting: true,
        },
        ..ExperimentConfig::default()
    }
}

fn truth(trial_loop: &TrialLoop) -> Particles {
    let names = trial_loop.model().parameter_names().to_vec();
    Particles::single(names, vec![(1.0f64 / 60.0).ln(), 2.0]).unwrap()
}

#[test]
fn logk_entropy_falls_on_average() {
    const SEEDS: u64 = 24;
    const TRIALS: usize = 5;
    // entropy[seed][t] is the logk entropy after t trials.
    let mut entropy = Vec::new();

    for seed in 0..SEEDS {
        let mut trial_loop = TrialLoop::new(&logk_config(seed)).unwrap();
        let mut path = vec![trial_loop.model().entropy("logk").unwrap()];
        let truth = truth(&trial_loop);
        let reports = trial_loop.run_simulated(&truth).unwrap();
        assert_eq!(reports.len(), TRIALS, "seed {seed}");
        path.extend(reports.iter().map(|report| report.metrics.entropy_of("logk").unwrap()));
        entropy.push(path);
    }

    // Each step's mean change may exceed zero only by sampling noise:
    // two standard errors of the per-seed changes.
    let n = SEEDS as f64;
    for step in 0..TRIALS {
        let changes: Vec<f64> = entropy.iter().map(|path| path[step + 1] - path[step]).collect();
        let mean = changes.iter().sum::<f64>() / n;
        let variance = changes.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let standard_error = (variance / n).sqrt();
        assert!(
            mean <= 2.0 * standard_error,
            "step {step}: mean change {mean:.4} > 2 SE ({standard_error:.4})"
        );
    }

    let total: Vec<f64> = entropy.iter().map(|path| path[TRIALS] - path[0]).collect();
    assert!(total.iter().sum::<f64>() < 0.0, "{total:?}");
    assert!(total.iter().filter(|change| **change < 0.0).count() as f64 > 0.5 * n);
}

#[test]
fn posterior_moves_towards_the_truth() {
    let mut trial_loop = TrialLoop::new(&logk_config(3).with_max_trials(15)).unwrap();
    let prior = trial_loop.model().summary("logk").unwrap();
    let truth = truth(&trial_loop);
    trial_loop.run_simulated(&truth).unwrap();
    let posterior = trial_loop.model().summary("logk").unwrap();

    let target = truth.row(0)[0];
    assert!((posterior.median - target).abs() < (prior.median - target).abs());
    assert!(posterior.upper95 - posterior.lower95 < prior.upper95 - prior.lower95);
}

#[test]
fn bad_label_leaves_the_loop_untouched() {
    let mut trial_loop = TrialLoop::new(&logk_config(1)).unwrap();
    assert!(matches!(trial_loop.next_design().unwrap(), DesignOutcome::Chosen(_)));
    let before = PosteriorSnapshot::capture(trial_loop.model());

    let err = trial_loop.submit_response(2).unwrap_err();
    assert!(matches!(err, BadError::ResponseLabel { value: 2 }));
    assert!(trial_loop.history().is_empty());
    assert!(matches!(trial_loop.state(), LoopState::AwaitingResponse { .. }));
    assert_eq!(PosteriorSnapshot::capture(trial_loop.model()), before);

    trial_loop.submit_response(0).unwrap();
    assert_eq!(trial_loop.history().len(), 1);
}

#[test]
fn zero_row_design_space_yields_no_design() {
    let mut config = logk_config(0);
    config.design_space.da = vec![60.0];
    let mut trial_loop = TrialLoop::new(&config).unwrap();
    assert!(trial_loop.design_space().is_empty());
    assert_eq!(trial_loop.next_design().unwrap(), DesignOutcome::NoDesignAvailable);
    assert_eq!(trial_loop.state(), LoopState::AwaitingDesign);
}

#[test]
fn snapshot_reflects_absorbed_trials() {
    let mut trial_loop = TrialLoop::new(&logk_config(9)).unwrap();
    let truth = truth(&trial_loop);
    trial_loop.run_simulated(&truth).unwrap();

    let json = PosteriorSnapshot::to_json(trial_loop.model()).unwrap();
    let snapshot = PosteriorSnapshot::from_json(&json).unwrap();
    assert_eq!(snapshot.absorbed_trials, 5);
    assert_eq!(snapshot.rows.len(), 1_000);
    assert_eq!(snapshot.summaries.len(), 2);
    let total: f64 = snapshot.weights.iter().sum();
    assert!((total - 1.0).abs() < 1e-9);
}

mod truth;

use std::path::PathBuf;
use std::time::Instant;

use bad_core::BadError;
use bad_core::belief::BeliefMetrics;
use bad_core::model::ChoiceModel;
use bad_core::trial::TrialLoop;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::{info, warn};

use crate::analytics::{
    AnalyticsError, ParticipantRecord, RecoveryCollector, RecoverySummary, RunHeader,
};
use crate::config::{BenchmarkConfig, ResolvedOutputs};

pub use truth::draw_truth;

/// Runs simulated participants through the adaptive loop and scores recovery.
pub struct SimulationRunner {
    config: BenchmarkConfig,
    outputs: ResolvedOutputs,
    parameters: Vec<String>,
}

/// Summary details returned after a run.
pub struct RunSummary {
    pub participants: usize,
    pub trials_run: usize,
    /// Size of the design space the participants were drawn from.
    pub designs: usize,
    pub summary_json: PathBuf,
    pub summary_md: PathBuf,
    pub recovery: RecoverySummary,
}

impl SimulationRunner {
    /// Build a runner from a validated configuration.
    pub fn new(config: BenchmarkConfig, outputs: ResolvedOutputs) -> Result<Self, RunnerError> {
        config.experiment.validate().map_err(BadError::from)?;
        let parameters = config
            .experiment
            .model
            .kind
            .parameter_names()
            .iter()
            .map(|name| name.to_string())
            .collect();

        Ok(Self {
            parameters,
            config,
            outputs,
        })
    }

    pub fn run(&self) -> Result<RunSummary, RunnerError> {
        let simulation = &self.config.simulation;
        let mut rng = StdRng::seed_from_u64(simulation.seed);
        let mut collector = RecoveryCollector::new(self.parameters.clone());
        let mut trials_run = 0usize;
        let mut designs = 0usize;

        for participant in 0..simulation.participants {
            let started = Instant::now();
            let seed: u64 = rng.r#gen();
            let experiment = self.config.experiment.clone().with_seed(seed);
            let participant_err = |source: BadError| RunnerError::Participant {
                participant,
                source,
            };

            let mut trial_loop = TrialLoop::new(&experiment).map_err(participant_err)?;
            // Every participant shares the same space; the loop already built it.
            if participant == 0 {
                designs = trial_loop.design_space().len();
                if designs == 0 {
                    warn!(run_id = %self.config.run_id, "design space is empty; participants will see no trials");
                }
            }
            let truth = draw_truth(&simulation.truth, trial_loop.model(), &mut rng)
                .map_err(participant_err)?;
            let initial = BeliefMetrics::from_particles(trial_loop.model().particles());
            let trials = trial_loop.run_simulated(&truth).map_err(participant_err)?;
            trials_run += trials.len();

            info!(
                participant,
                seed,
                trials = trials.len(),
                elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0,
                "participant complete"
            );

            collector.record(ParticipantRecord {
                participant,
                seed,
                truth: self
                    .parameters
                    .iter()
                    .cloned()
                    .zip(truth.row(0).iter().copied())
                    .collect(),
                initial,
                posterior: trial_loop.model().summaries(),
                trials,
            })?;
        }

        let recovery = collector.finalize(RunHeader {
            run_id: self.config.run_id.clone(),
            model: self.config.experiment.model.kind.to_string(),
            experiment: self.config.experiment.experiment.map(|kind| kind.to_string()),
            max_trials: self.config.experiment.max_trials,
            particles: self.config.experiment.model.particles,
            simulation_seed: simulation.seed,
        });
        recovery.write_json(&self.outputs.summary_json)?;
        recovery.write_markdown(&self.outputs.summary_md)?;

        Ok(RunSummary {
            participants: simulation.participants,
            trials_run,
            designs,
            summary_json: self.outputs.summary_json.clone(),
            summary_md: self.outputs.summary_md.clone(),
            recovery,
        })
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("participant {participant} failed: {source}")]
    Participant {
        participant: usize,
        #[source]
        source: BadError,
    },
    #[error("experiment setup failed: {0}")]
    Experiment(#[from] BadError),
    #[error("analytics error: {0}")]
    Analytics(#[from] AnalyticsError),
}

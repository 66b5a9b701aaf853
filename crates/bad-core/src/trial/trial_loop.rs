use std::time::Instant;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::info;

use super::history::{Response, Trial, TrialHistory};
use crate::belief::{BeliefMetrics, BeliefUpdater, UpdateReport};
use crate::config::ExperimentConfig;
use crate::design::{ChosenDesign, Design, DesignFilterPipeline, DesignOptimizer, DesignSpace};
use crate::error::{BadError, BadResult};
use crate::model::{Model, Particles};

/// Where the loop is between trials.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoopState {
    AwaitingDesign,
    AwaitingResponse { design: Design },
    Updating,
    Terminated,
}

impl LoopState {
    pub const fn name(&self) -> &'static str {
        match self {
            LoopState::AwaitingDesign => "awaiting a design",
            LoopState::AwaitingResponse { .. } => "awaiting a response",
            LoopState::Updating => "updating",
            LoopState::Terminated => "terminated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DesignOutcome {
    Chosen(ChosenDesign),
    /// The allowable set was empty; the loop stays ready for another attempt.
    NoDesignAvailable,
    Terminated,
}

/// One completed trial of a simulated run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialReport {
    pub trial: usize,
    pub design: Design,
    pub response: Response,
    pub utility: f64,
    pub p_chose_b: f64,
    pub candidates: usize,
    pub resampled: bool,
    pub metrics: BeliefMetrics,
    pub elapsed_ms: f64,
}

/// Drives design selection, response intake and belief updates for one participant.
#[derive(Debug)]
pub struct TrialLoop {
    max_trials: usize,
    seed: u64,
    model: Model,
    space: DesignSpace,
    pipeline: DesignFilterPipeline,
    optimizer: DesignOptimizer,
    updater: BeliefUpdater,
    history: TrialHistory,
    state: LoopState,
    rng: SmallRng,
}

impl TrialLoop {
    pub fn new(config: &ExperimentConfig) -> BadResult<Self> {
        config.validate()?;
        let seed = config.seed.unwrap_or_else(rand::random);
        let mut rng = SmallRng::seed_from_u64(seed);

        let model = Model::new(config.model.clone(), &mut rng)?;
        let space = DesignSpace::generate(&config.design_space)?;
        let updater = BeliefUpdater::new(config.updater, rng.r#gen())?;
        info!(
            seed,
            model = %model.kind(),
            designs = space.len(),
            max_trials = config.max_trials,
            "trial loop ready"
        );

        Ok(Self {
            max_trials: config.max_trials,
            seed,
            model,
            space,
            pipeline: DesignFilterPipeline::new(config.filters),
            optimizer: DesignOptimizer::new(config.optimizer),
            updater,
            history: TrialHistory::new(),
            state: LoopState::AwaitingDesign,
            rng,
        })
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn history(&self) -> &TrialHistory {
        &self.history
    }

    pub fn design_space(&self) -> &DesignSpace {
        &self.space
    }

    pub fn max_trials(&self) -> usize {
        self.max_trials
    }

    pub fn is_terminated(&self) -> bool {
        self.state == LoopState::Terminated
    }

    fn invalid_state(&self, operation: &'static str) -> BadError {
        BadError::InvalidState {
            operation,
            state: self.state.name(),
        }
    }

    /// Chooses the design for the next trial.
    pub fn next_design(&mut self) -> BadResult<DesignOutcome> {
        match self.state {
            LoopState::AwaitingDesign => {}
            LoopState::Terminated => return Ok(DesignOutcome::Terminated),
            _ => return Err(self.invalid_state("next_design")),
        }
        if self.history.len() >= self.max_trials {
            self.state = LoopState::Terminated;
            return Ok(DesignOutcome::Terminated);
        }

        let started = Instant::now();
        let candidates = self
            .pipeline
            .refine(&self.space, &self.history, &self.model, &mut self.rng)?;
        let Some(chosen) = self.optimizer.choose(&candidates, &self.model, &mut self.rng)? else {
            return Ok(DesignOutcome::NoDesignAvailable);
        };

        self.state = LoopState::AwaitingResponse {
            design: chosen.design,
        };
        info!(
            trial = self.history.len(),
            candidates = chosen.candidates,
            utility = chosen.utility,
            elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0,
            "next design chosen"
        );
        Ok(DesignOutcome::Chosen(chosen))
    }

    /// Validates a raw 0/1 label, then records it against the pending design.
    pub fn submit_response(&mut self, raw: u8) -> BadResult<UpdateReport> {
        let response = Response::try_from(raw)?;
        self.record(response)
    }

    /// Appends the trial and updates beliefs. A failed update is rolled back.
    pub fn record(&mut self, response: Response) -> BadResult<UpdateReport> {
        let LoopState::AwaitingResponse { design } = self.state else {
            return Err(self.invalid_state("submit_response"));
        };

        self.state = LoopState::Updating;
        self.history.push(Trial::new(design, response));
        match self
            .model
            .update_beliefs(&mut self.updater, self.history.trials())
        {
            Ok(report) => {
                self.state = if self.history.len() >= self.max_trials {
                    LoopState::Terminated
                } else {
                    LoopState::AwaitingDesign
                };
                Ok(report)
            }
            Err(err) => {
                self.history.pop();
                self.state = LoopState::AwaitingResponse { design };
                Err(err)
            }
        }
    }

    /// Draws a response for the pending design from `truth` and records it.
    pub fn simulate_response(&mut self, truth: &Particles) -> BadResult<(Response, UpdateReport)> {
        let LoopState::AwaitingResponse { design } = self.state else {
            return Err(self.invalid_state("simulate_response"));
        };
        let response = self.model.simulate_response(truth, &design, &mut self.rng)?;
        let report = self.record(response)?;
        Ok((response, report))
    }

    /// Runs simulated trials until the budget is spent or no design is left.
    pub fn run_simulated(&mut self, truth: &Particles) -> BadResult<Vec<TrialReport>> {
        let mut reports = Vec::with_capacity(self.max_trials.saturating_sub(self.history.len()));
        loop {
            let started = Instant::now();
            let chosen = match self.next_design()? {
                DesignOutcome::Chosen(chosen) => chosen,
                DesignOutcome::NoDesignAvailable | DesignOutcome::Terminated => break,
            };
            let (response, update) = self.simulate_response(truth)?;
            reports.push(TrialReport {
                trial: self.history.len() - 1,
                design: chosen.design,
                response,
                utility: chosen.utility,
                p_chose_b: chosen.p_chose_b,
                candidates: chosen.candidates,
                resampled: update.resampled,
                metrics: BeliefMetrics::from_particles(self.model.particles()),
                elapsed_ms: started.elapsed().as_secs_f64() * 1_000.0,
            });
        }
        Ok(reports)
    }
}

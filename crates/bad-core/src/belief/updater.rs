//! Sequential importance weighting with resample-move rejuvenation.

use std::time::{Duration, Instant};

use rand::distributions::Distribution;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;
use tracing::{Level, event};

use crate::error::{BadError, BadResult, ValidationError};
use crate::model::{Particles, systematic_indices};
use crate::trial::Trial;

/// Proposal standard deviations never drop below this.
const MIN_PROPOSAL_SD: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdaterConfig {
    /// Resample when ESS falls below this fraction of the particle count.
    pub ess_threshold: f64,
    /// Metropolis moves applied after each resample.
    pub move_steps: usize,
    /// Multiplier on the weighted sd for random-walk proposals; `2.38 / sqrt(d)` when unset.
    pub proposal_scale: Option<f64>,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            ess_threshold: 0.5,
            move_steps: 2,
            proposal_scale: None,
        }
    }
}

impl UpdaterConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.ess_threshold.is_finite() || !(0.0..=1.0).contains(&self.ess_threshold) {
            return Err(ValidationError::invalid(
                "updater.ess_threshold",
                format!("must lie in [0, 1] (got {})", self.ess_threshold),
            ));
        }
        if let Some(scale) = self.proposal_scale {
            if !scale.is_finite() || scale <= 0.0 {
                return Err(ValidationError::invalid(
                    "updater.proposal_scale",
                    format!("must be finite and > 0 (got {scale})"),
                ));
            }
        }
        Ok(())
    }

    fn scale_for(&self, dimensions: usize) -> f64 {
        self.proposal_scale
            .unwrap_or_else(|| 2.38 / (dimensions.max(1) as f64).sqrt())
    }
}

/// Outcome of a single belief update.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateReport {
    pub trials: usize,
    /// ESS after reweighting, before any resample.
    pub ess: f64,
    pub resampled: bool,
    /// Fraction of accepted Metropolis proposals, when moves ran.
    pub acceptance_rate: Option<f64>,
    /// Particles whose weight became zero.
    pub excluded: usize,
    pub elapsed: Duration,
}

/// Absorbs newly observed trials into a particle population.
#[derive(Debug, Clone)]
pub struct BeliefUpdater {
    config: UpdaterConfig,
    rng: SmallRng,
    standard_normal: Normal,
}

impl BeliefUpdater {
    pub fn new(config: UpdaterConfig, seed: u64) -> Result<Self, ValidationError> {
        config.validate()?;
        let standard_normal = Normal::new(0.0, 1.0)
            .map_err(|err| ValidationError::invalid("updater", err.to_string()))?;
        Ok(Self {
            config,
            rng: SmallRng::seed_from_u64(seed),
            standard_normal,
        })
    }

    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    /// Returns the population after absorbing `trials`.
    ///
    /// Only trials beyond `particles.absorbed_trials()` contribute new
    /// evidence, so repeating a call with the same history is a no-op. The
    /// input is never modified; on [`BadError::PosteriorCollapse`] the caller
    /// still holds the previous population.
    pub fn update<F>(
        &mut self,
        log_posterior: F,
        particles: &Particles,
        trials: &[Trial],
    ) -> BadResult<(Particles, UpdateReport)>
    where
        F: Fn(&Particles, &[Trial]) -> BadResult<Vec<f64>>,
    {
        let started = Instant::now();
        let absorbed = particles.absorbed_trials().min(trials.len());
        if absorbed == trials.len() {
            let report = UpdateReport {
                trials: trials.len(),
                ess: particles.effective_sample_size(),
                resampled: false,
                acceptance_rate: None,
                excluded: 0,
                elapsed: started.elapsed(),
            };
            return Ok((particles.clone(), report));
        }

        let current = log_posterior(particles, trials)?;
        let previous = log_posterior(particles, &trials[..absorbed])?;

        let log_weights: Vec<f64> = particles
            .weights()
            .iter()
            .zip(current.iter().zip(&previous))
            .map(|(weight, (now, before))| {
                let delta = now - before;
                if *weight > 0.0 && now.is_finite() && delta.is_finite() {
                    weight.ln() + delta
                } else {
                    f64::NEG_INFINITY
                }
            })
            .collect();
        let excluded = log_weights.iter().filter(|lw| !lw.is_finite()).count();
        let weights = normalise(&log_weights).ok_or(BadError::PosteriorCollapse {
            trials: trials.len(),
        })?;

        let reweighted = particles.clone().with_weights(weights, trials.len());
        let ess = reweighted.effective_sample_size();
        let count = reweighted.len();

        let resample = ess < self.config.ess_threshold * count as f64;

        let (updated, acceptance_rate) = if resample {
            let indices = systematic_indices(reweighted.weights(), count, &mut self.rng);
            let resampled = reweighted.select(&indices, trials.len());
            let scores: Vec<f64> = indices.iter().map(|&index| current[index]).collect();
            let proposal_sd = proposal_sds(&reweighted, self.config.scale_for(reweighted.width()));
            self.move_particles(&log_posterior, resampled, scores, &proposal_sd, trials)?
        } else {
            (reweighted, None)
        };

        let report = UpdateReport {
            trials: trials.len(),
            ess,
            resampled: resample,
            acceptance_rate,
            excluded,
            elapsed: started.elapsed(),
        };
        log_update(&report, count);
        Ok((updated, report))
    }

    /// Gaussian random-walk Metropolis moves targeting the full posterior.
    fn move_particles<F>(
        &mut self,
        log_posterior: &F,
        mut particles: Particles,
        mut scores: Vec<f64>,
        proposal_sd: &[f64],
        trials: &[Trial],
    ) -> BadResult<(Particles, Option<f64>)>
    where
        F: Fn(&Particles, &[Trial]) -> BadResult<Vec<f64>>,
    {
        if self.config.move_steps == 0 || particles.is_empty() {
            return Ok((particles, None));
        }

        let width = particles.width();
        let mut accepted = 0usize;
        for _ in 0..self.config.move_steps {
            let proposed_values: Vec<f64> = particles
                .values()
                .iter()
                .enumerate()
                .map(|(offset, value)| {
                    value + proposal_sd[offset % width] * self.standard_normal.sample(&mut self.rng)
                })
                .collect();
            let proposed = Particles::uniform(particles.names().to_vec(), proposed_values);
            let proposed_scores = log_posterior(&proposed, trials)?;

            let mut values = particles.values().to_vec();
            for (index, proposed_score) in proposed_scores.iter().enumerate() {
                let threshold = self.rng.r#gen::<f64>().ln();
                if proposed_score.is_finite() && threshold < proposed_score - scores[index] {
                    values[index * width..(index + 1) * width].copy_from_slice(proposed.row(index));
                    scores[index] = *proposed_score;
                    accepted += 1;
                }
            }
            let weights = particles.weights().to_vec();
            particles = Particles::uniform(particles.names().to_vec(), values)
                .with_weights(weights, trials.len());
        }

        let proposals = self.config.move_steps * particles.len();
        Ok((particles, Some(accepted as f64 / proposals as f64)))
    }
}

/// Log-sum-exp normalisation; `None` when every weight is zero.
fn normalise(log_weights: &[f64]) -> Option<Vec<f64>> {
    let max = log_weights
        .iter()
        .copied()
        .filter(|lw| lw.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return None;
    }
    let unnormalised: Vec<f64> = log_weights.iter().map(|lw| (lw - max).exp()).collect();
    let total: f64 = unnormalised.iter().sum();
    Some(unnormalised.into_iter().map(|w| w / total).collect())
}

fn proposal_sds(particles: &Particles, scale: f64) -> Vec<f64> {
    (0..particles.width())
        .map(|column| (scale * particles.weighted_std_dev(column)).max(MIN_PROPOSAL_SD))
        .collect()
}

fn log_update(report: &UpdateReport, particles: usize) {
    if !tracing::enabled!(Level::DEBUG) {
        return;
    }
    event!(
        target: "bad_core::belief_update",
        Level::DEBUG,
        trials = report.trials,
        particles,
        ess = report.ess,
        resampled = report.resampled,
        acceptance_rate = report.acceptance_rate.unwrap_or(f64::NAN),
        excluded = report.excluded,
        elapsed_ms = report.elapsed.as_secs_f64() * 1_000.0,
    );
}

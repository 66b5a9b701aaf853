//! Parameter beliefs for a binary-choice model.
//!
//! - `prior`: univariate prior families and their validated densities.
//! - `particles`: the weighted particle table.
//! - `kind`: the model catalogue and the [`ChoiceModel`] contract.
//! - `summary` / `snapshot`: read-only projections of the posterior.

mod kind;
mod particles;
mod prior;
mod snapshot;
mod summary;

pub use kind::{ChoiceModel, DEFAULT_EPSILON, FixedParams, ModelKind};
pub use particles::Particles;
pub use prior::{Prior, PriorDensity};
pub use snapshot::PosteriorSnapshot;
pub use summary::{ParameterSummary, normal_fit_entropy};

pub(crate) use particles::{map_rows, systematic_indices};

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::belief::{BeliefUpdater, UpdateReport};
use crate::design::Design;
use crate::error::{BadError, BadResult, ValidationError};
use crate::trial::{Response, Trial};

pub const DEFAULT_PARTICLES: usize = 5_000;

/// Construction-time description of a model instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub kind: ModelKind,
    pub particles: usize,
    /// Replacements for the kind's default priors, keyed by parameter name.
    pub priors: BTreeMap<String, Prior>,
    pub fixed: FixedParams,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::new(ModelKind::Hyperbolic)
    }
}

impl ModelConfig {
    pub fn new(kind: ModelKind) -> Self {
        Self {
            kind,
            particles: DEFAULT_PARTICLES,
            priors: BTreeMap::new(),
            fixed: FixedParams::default(),
        }
    }

    pub fn with_particles(mut self, particles: usize) -> Self {
        self.particles = particles;
        self
    }

    pub fn with_prior(mut self, name: impl Into<String>, prior: Prior) -> Self {
        self.priors.insert(name.into(), prior);
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.fixed.epsilon = epsilon;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.particles == 0 {
            return Err(ValidationError::invalid(
                "model.particles",
                "at least one particle is required",
            ));
        }
        let names = self.kind.parameter_names();
        for (name, prior) in &self.priors {
            if !names.contains(&name.as_str()) {
                return Err(ValidationError::invalid(
                    format!("model.priors.{name}"),
                    format!("{} has no parameter '{name}' (expected {names:?})", self.kind),
                ));
            }
            prior.density(name)?;
        }
        self.fixed.validate()
    }

    /// Priors in parameter order, overrides applied.
    fn resolved_priors(&self) -> Result<Vec<NamedPrior>, ValidationError> {
        self.kind
            .default_priors()
            .into_iter()
            .map(|(name, default)| {
                let prior = self.priors.get(name).copied().unwrap_or(default);
                Ok(NamedPrior {
                    name: name.to_string(),
                    prior,
                    density: prior.density(name)?,
                })
            })
            .collect()
    }
}

/// A prior bound to its parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedPrior {
    pub name: String,
    pub prior: Prior,
    density: PriorDensity,
}

impl NamedPrior {
    pub fn density(&self) -> &PriorDensity {
        &self.density
    }
}

/// A choice model together with its priors, fixed parameters and particles.
#[derive(Debug, Clone)]
pub struct Model {
    kind: ModelKind,
    priors: Vec<NamedPrior>,
    fixed: FixedParams,
    particles: Particles,
}

impl Model {
    /// Validates `config` and draws the initial particles from the priors.
    pub fn new<R: Rng + ?Sized>(config: ModelConfig, rng: &mut R) -> Result<Self, ValidationError> {
        config.validate()?;
        let priors = config.resolved_priors()?;
        let names: Vec<String> = priors.iter().map(|named| named.name.clone()).collect();

        let mut values = Vec::with_capacity(config.particles * priors.len());
        for _ in 0..config.particles {
            values.extend(priors.iter().map(|named| named.density.sample(rng)));
        }
        debug!(
            model = %config.kind,
            particles = config.particles,
            parameters = ?names,
            "sampled initial particles from priors"
        );

        Ok(Self {
            kind: config.kind,
            priors,
            fixed: config.fixed,
            particles: Particles::uniform(names, values),
        })
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn priors(&self) -> &[NamedPrior] {
        &self.priors
    }

    pub fn fixed(&self) -> &FixedParams {
        &self.fixed
    }

    pub fn particles(&self) -> &Particles {
        &self.particles
    }

    pub fn parameter_names(&self) -> &[String] {
        self.particles.names()
    }

    fn check_columns(&self, theta: &Particles) -> BadResult<()> {
        if theta.names() == self.parameter_names() {
            Ok(())
        } else {
            Err(BadError::ColumnMismatch {
                expected: self.parameter_names().to_vec(),
                found: theta.names().to_vec(),
            })
        }
    }

    fn log_prior_row(&self, row: &[f64]) -> f64 {
        self.priors
            .iter()
            .zip(row)
            .map(|(named, value)| named.density.ln_pdf(*value))
            .sum()
    }

    fn log_likelihood_row(&self, row: &[f64], trials: &[Trial]) -> f64 {
        trials
            .iter()
            .map(|trial| {
                let p = self.kind.p_chose_b(row, &self.fixed, &trial.design);
                match trial.response {
                    Response::ChoseB => p.ln(),
                    Response::ChoseA => (1.0 - p).ln(),
                }
            })
            .sum()
    }

    /// Sum of per-parameter prior log densities for every row of `theta`.
    pub fn log_prior(&self, theta: &Particles) -> BadResult<Vec<f64>> {
        self.check_columns(theta)?;
        Ok(map_rows(theta, |row| self.log_prior_row(row)))
    }

    /// Bernoulli log likelihood of `trials` for every row of `theta`.
    pub fn log_likelihood(&self, theta: &Particles, trials: &[Trial]) -> BadResult<Vec<f64>> {
        self.check_columns(theta)?;
        Ok(map_rows(theta, |row| self.log_likelihood_row(row, trials)))
    }

    pub fn log_posterior(&self, theta: &Particles, trials: &[Trial]) -> BadResult<Vec<f64>> {
        self.check_columns(theta)?;
        Ok(map_rows(theta, |row| {
            self.log_likelihood_row(row, trials) + self.log_prior_row(row)
        }))
    }

    /// Probability of choosing B, pairing rows of `theta` with `designs`.
    ///
    /// Row counts must match unless one side has a single row, which is
    /// broadcast against every row of the other.
    pub fn predictive_prob_chose_b(
        &self,
        theta: &Particles,
        designs: &[Design],
    ) -> BadResult<Vec<f64>> {
        self.check_columns(theta)?;
        let predict = |row: &[f64], design: &Design| self.kind.p_chose_b(row, &self.fixed, design);

        match (theta.len(), designs.len()) {
            (1, _) => {
                let row = theta.row(0);
                Ok(designs.iter().map(|design| predict(row, design)).collect())
            }
            (_, 1) => Ok(map_rows(theta, |row| predict(row, &designs[0]))),
            (rows, count) if rows == count => {
                #[cfg(feature = "parallel")]
                let probs: Vec<f64> = theta
                    .values()
                    .par_chunks_exact(theta.width())
                    .zip(designs.par_iter())
                    .map(|(row, design)| predict(row, design))
                    .collect();
                #[cfg(not(feature = "parallel"))]
                let probs: Vec<f64> = theta
                    .rows()
                    .zip(designs)
                    .map(|(row, design)| predict(row, design))
                    .collect();
                Ok(probs)
            }
            (rows, count) => Err(BadError::ShapeMismatch {
                particles: rows,
                designs: count,
            }),
        }
    }

    /// Weighted posterior median of every parameter, as a one-row table.
    pub fn point_estimate(&self) -> Particles {
        self.particles
            .project(|column| self.particles.weighted_quantile(column, 0.5))
    }

    /// Each prior's mean; used as stand-in true parameters in simulations.
    pub fn prior_means(&self) -> Particles {
        self.particles
            .project(|column| self.priors[column].density.mean())
    }

    pub fn summary(&self, name: &str) -> BadResult<ParameterSummary> {
        let column = self
            .particles
            .column_index(name)
            .ok_or_else(|| BadError::UnknownParameter {
                name: name.to_string(),
            })?;
        Ok(ParameterSummary::from_particles(&self.particles, column))
    }

    pub fn summaries(&self) -> Vec<ParameterSummary> {
        (0..self.particles.width())
            .map(|column| ParameterSummary::from_particles(&self.particles, column))
            .collect()
    }

    /// Normal-fit posterior entropy of one parameter, in nats.
    pub fn entropy(&self, name: &str) -> BadResult<f64> {
        self.summary(name).map(|summary| summary.entropy)
    }

    /// Draws a response from the choice function at the true parameters.
    pub fn simulate_response<R: Rng + ?Sized>(
        &self,
        truth: &Particles,
        design: &Design,
        rng: &mut R,
    ) -> BadResult<Response> {
        self.check_columns(truth)?;
        if truth.len() != 1 {
            return Err(BadError::ShapeMismatch {
                particles: truth.len(),
                designs: 1,
            });
        }
        let p = self.kind.p_chose_b(truth.row(0), &self.fixed, design);
        if rng.r#gen::<f64>() < p {
            Ok(Response::ChoseB)
        } else {
            Ok(Response::ChoseA)
        }
    }

    /// Absorbs `trials` into the particles; they are replaced only on success.
    pub fn update_beliefs(
        &mut self,
        updater: &mut BeliefUpdater,
        trials: &[Trial],
    ) -> BadResult<UpdateReport> {
        let (particles, report) = updater.update(
            |theta, trials| self.log_posterior(theta, trials),
            &self.particles,
            trials,
        )?;
        self.particles = particles;
        Ok(report)
    }

    pub fn snapshot(&self) -> PosteriorSnapshot {
        PosteriorSnapshot::capture(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::Prospect;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn model(kind: ModelKind, particles: usize) -> Model {
        let mut rng = SmallRng::seed_from_u64(11);
        Model::new(ModelConfig::new(kind).with_particles(particles), &mut rng).unwrap()
    }

    fn delayed(ra: f64, db: f64) -> Design {
        Design::new(Prospect::new(ra, 0.0, 1.0), Prospect::new(100.0, db, 1.0))
    }

    fn trials() -> Vec<Trial> {
        vec![
            Trial::new(delayed(20.0, 30.0), Response::ChoseB),
            Trial::new(delayed(80.0, 365.0), Response::ChoseA),
            Trial::new(delayed(50.0, 7.0), Response::ChoseB),
        ]
    }

    #[test]
    fn initial_particles_match_priors() {
        for kind in ModelKind::ALL {
            let model = model(kind, 200);
            let particles = model.particles();
            assert_eq!(particles.len(), 200);
            assert_eq!(particles.names(), kind.parameter_names());
            assert!(particles.all_finite());
            let log_prior = model.log_prior(particles).unwrap();
            assert!(log_prior.iter().all(|value| value.is_finite()), "{kind}");
        }
    }

    #[test]
    fn log_posterior_is_prior_plus_likelihood() {
        let model = model(ModelKind::Hyperbolic, 64);
        let theta = model.particles();
        for history in [Vec::new(), trials()] {
            let prior = model.log_prior(theta).unwrap();
            let likelihood = model.log_likelihood(theta, &history).unwrap();
            let posterior = model.log_posterior(theta, &history).unwrap();
            for i in 0..theta.len() {
                assert_eq!(posterior[i], prior[i] + likelihood[i]);
            }
            if history.is_empty() {
                assert!(likelihood.iter().all(|value| *value == 0.0));
            }
        }
    }

    #[test]
    fn out_of_support_rows_get_negative_infinity() {
        let model = model(ModelKind::Hyperbolic, 4);
        let theta = Particles::from_rows(
            model.parameter_names().to_vec(),
            &[vec![-5.0, -1.0], vec![f64::NAN, 1.0]],
        )
        .unwrap();
        let log_prior = model.log_prior(&theta).unwrap();
        assert!(log_prior.iter().all(|value| *value == f64::NEG_INFINITY));
    }

    #[test]
    fn predictive_rows_broadcast_single_rows() {
        let model = model(ModelKind::Hyperbolic, 50);
        let particles = model.particles();
        let point = model.point_estimate();

        let designs: Vec<Design> = (0..50).map(|i| delayed(i as f64 * 2.0, 30.0)).collect();
        assert_eq!(model.predictive_prob_chose_b(&point, &designs).unwrap().len(), 50);
        assert_eq!(model.predictive_prob_chose_b(particles, &designs).unwrap().len(), 50);
        assert_eq!(
            model.predictive_prob_chose_b(particles, &designs[..1]).unwrap().len(),
            50
        );
        assert_eq!(model.predictive_prob_chose_b(&point, &designs[..1]).unwrap().len(), 1);

        let err = model.predictive_prob_chose_b(particles, &designs[..7]).unwrap_err();
        assert!(matches!(err, BadError::ShapeMismatch { particles: 50, designs: 7 }));
    }

    #[test]
    fn mismatched_columns_are_rejected() {
        let model = model(ModelKind::Hyperbolic, 4);
        let theta = Particles::single(vec!["logh".to_string(), "alpha".to_string()], vec![0.0, 1.0])
            .unwrap();
        let err = model.log_prior(&theta).unwrap_err();
        assert!(matches!(err, BadError::ColumnMismatch { .. }));
    }

    #[test]
    fn unknown_prior_override_fails_validation() {
        let config = ModelConfig::new(ModelKind::Hyperbolic).with_prior("logh", Prior::normal(0.0, 1.0));
        let err = config.validate().unwrap_err();
        assert_eq!(err.field(), "model.priors.logh");

        let zero = ModelConfig::new(ModelKind::Hyperbolic).with_particles(0);
        assert_eq!(zero.validate().unwrap_err().field(), "model.particles");
    }

    #[test]
    fn prior_overrides_replace_defaults() {
        let mut rng = SmallRng::seed_from_u64(2);
        let config = ModelConfig::new(ModelKind::Hyperbolic)
            .with_particles(100)
            .with_prior("logk", Prior::uniform(-3.0, -2.0));
        let model = Model::new(config, &mut rng).unwrap();
        assert!(model.particles().column(0).all(|value| (-3.0..=-2.0).contains(&value)));
        assert!((model.prior_means().row(0)[0] + 2.5).abs() < 1e-12);
    }

    #[test]
    fn unknown_parameter_summary_is_an_error() {
        let model = model(ModelKind::RiskyHyperbolic, 10);
        assert!(model.summary("logh").is_ok());
        assert!(matches!(
            model.summary("logk"),
            Err(BadError::UnknownParameter { .. })
        ));
    }

    #[test]
    fn simulated_responses_follow_the_truth() {
        let model = model(ModelKind::Hyperbolic, 10);
        // Extremely patient, nearly deterministic participant.
        let truth = Particles::single(model.parameter_names().to_vec(), vec![-20.0, 0.01]).unwrap();
        let mut rng = SmallRng::seed_from_u64(3);
        let design = delayed(10.0, 30.0);
        let chose_b = (0..200)
            .filter(|_| model.simulate_response(&truth, &design, &mut rng).unwrap().chose_b())
            .count();
        // Only the 1% lapse rate can produce A.
        assert!(chose_b >= 185, "chose B {chose_b} times");
    }
}

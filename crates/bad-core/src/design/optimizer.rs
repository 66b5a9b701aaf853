//! Expected information gain over the allowable design set.

use std::borrow::Cow;
use std::time::Instant;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{Level, event};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::filter::CandidateDesign;
use super::types::Design;
use crate::error::{BadResult, ValidationError};
use crate::model::{Model, Particles};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Score against at most this many particles, thinned by systematic resampling.
    pub particle_budget: Option<usize>,
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.particle_budget == Some(0) {
            return Err(ValidationError::invalid(
                "optimizer.particle_budget",
                "must be at least one particle when set",
            ));
        }
        Ok(())
    }
}

/// The design picked for the next trial.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChosenDesign {
    pub design: Design,
    /// Mutual information between the response and the parameters, in nats.
    pub utility: f64,
    pub p_chose_b: f64,
    /// Size of the allowable set the design was chosen from.
    pub candidates: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DesignOptimizer {
    config: OptimizerConfig,
}

impl DesignOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Picks the candidate with the highest expected information gain.
    ///
    /// Ties go to the earliest candidate. An empty set yields `None`.
    pub fn choose<R: Rng + ?Sized>(
        &self,
        candidates: &[CandidateDesign],
        model: &Model,
        rng: &mut R,
    ) -> BadResult<Option<ChosenDesign>> {
        if candidates.is_empty() {
            return Ok(None);
        }
        let started = Instant::now();

        let particles = model.particles();
        let population = match self.config.particle_budget {
            Some(budget) if budget < particles.len() => Cow::Owned(particles.resample(budget, rng)),
            _ => Cow::Borrowed(particles),
        };

        let designs: Vec<Design> = candidates.iter().map(|candidate| candidate.design).collect();
        let utilities = expected_information_gain(model, &population, &designs)?;

        let mut best: Option<(usize, f64)> = None;
        for (index, utility) in utilities.iter().copied().enumerate() {
            if utility.is_nan() {
                continue;
            }
            if best.is_none_or(|(_, current)| utility > current) {
                best = Some((index, utility));
            }
        }
        let Some((index, utility)) = best else {
            return Ok(None);
        };

        let chosen = ChosenDesign {
            design: candidates[index].design,
            utility,
            p_chose_b: candidates[index].p_chose_b,
            candidates: candidates.len(),
        };
        if tracing::enabled!(Level::DEBUG) {
            event!(
                target: "bad_core::design_selection",
                Level::DEBUG,
                candidates = chosen.candidates,
                particles = population.len(),
                utility = chosen.utility,
                p_chose_b = chosen.p_chose_b,
                design = %chosen.design,
                elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0,
            );
        }
        Ok(Some(chosen))
    }
}

/// `H(Σ w p) - Σ w H(p)` for every design, where `p` is each particle's
/// probability of choosing B.
pub fn expected_information_gain(
    model: &Model,
    particles: &Particles,
    designs: &[Design],
) -> BadResult<Vec<f64>> {
    let score = |design: &Design| -> BadResult<f64> {
        let probabilities = model.predictive_prob_chose_b(particles, std::slice::from_ref(design))?;
        let mut marginal = 0.0;
        let mut conditional = 0.0;
        for (p, w) in probabilities.iter().zip(particles.weights()) {
            marginal += w * p;
            conditional += w * bernoulli_entropy(*p);
        }
        Ok(bernoulli_entropy(marginal) - conditional)
    };

    #[cfg(feature = "parallel")]
    {
        designs.par_iter().map(score).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        designs.iter().map(score).collect()
    }
}

/// Entropy of a Bernoulli(p) variable in nats, with `0 ln 0 = 0`.
pub fn bernoulli_entropy(p: f64) -> f64 {
    let term = |q: f64| if q > 0.0 { -q * q.ln() } else { 0.0 };
    term(p) + term(1.0 - p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::Prospect;
    use crate::model::{ModelConfig, ModelKind};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use std::f64::consts::LN_2;

    fn delayed(ra: f64, db: f64) -> Design {
        Design::new(Prospect::new(ra, 0.0, 1.0), Prospect::new(100.0, db, 1.0))
    }

    fn model() -> Model {
        let mut rng = SmallRng::seed_from_u64(17);
        Model::new(ModelConfig::new(ModelKind::Hyperbolic).with_particles(500), &mut rng).unwrap()
    }

    fn candidates(model: &Model, designs: Vec<Design>) -> Vec<CandidateDesign> {
        let probs = model
            .predictive_prob_chose_b(&model.point_estimate(), &designs)
            .unwrap();
        designs
            .into_iter()
            .zip(probs)
            .map(|(design, p_chose_b)| CandidateDesign { design, p_chose_b })
            .collect()
    }

    #[test]
    fn bernoulli_entropy_peaks_at_one_half() {
        assert!((bernoulli_entropy(0.5) - LN_2).abs() < 1e-12);
        assert_eq!(bernoulli_entropy(0.0), 0.0);
        assert_eq!(bernoulli_entropy(1.0), 0.0);
        assert!(bernoulli_entropy(0.1) < bernoulli_entropy(0.3));
    }

    #[test]
    fn utilities_are_bounded_mutual_information() {
        let model = model();
        let designs: Vec<Design> = (1..20).map(|i| delayed(i as f64 * 5.0, 90.0)).collect();
        let utilities = expected_information_gain(&model, model.particles(), &designs).unwrap();
        assert_eq!(utilities.len(), designs.len());
        assert!(utilities.iter().all(|u| *u >= -1e-12 && *u <= LN_2 + 1e-12));
    }

    #[test]
    fn uninformative_designs_lose() {
        let model = model();
        // Identical prospects carry no information about the parameters.
        let flat = Design::new(Prospect::new(100.0, 30.0, 1.0), Prospect::new(100.0, 30.0, 1.0));
        let informative = delayed(40.0, 365.0);
        let set = candidates(&model, vec![flat, informative]);
        let mut rng = SmallRng::seed_from_u64(1);
        let chosen = DesignOptimizer::default()
            .choose(&set, &model, &mut rng)
            .unwrap()
            .unwrap();
        assert_eq!(chosen.design, informative);
        assert_eq!(chosen.candidates, 2);
    }

    #[test]
    fn ties_go_to_the_first_candidate() {
        let model = model();
        let design = delayed(40.0, 365.0);
        let set = candidates(&model, vec![design, design]);
        let mut rng = SmallRng::seed_from_u64(1);
        let chosen = DesignOptimizer::default()
            .choose(&set, &model, &mut rng)
            .unwrap()
            .unwrap();
        assert_eq!(chosen.design, set[0].design);
    }

    #[test]
    fn empty_candidates_yield_no_design() {
        let model = model();
        let mut rng = SmallRng::seed_from_u64(1);
        let optimizer = DesignOptimizer::new(OptimizerConfig {
            particle_budget: Some(50),
        });
        assert_eq!(optimizer.choose(&[], &model, &mut rng).unwrap(), None);
    }

    #[test]
    fn particle_budget_still_selects() {
        let model = model();
        let set = candidates(&model, (1..10).map(|i| delayed(i as f64 * 10.0, 180.0)).collect());
        let mut rng = SmallRng::seed_from_u64(6);
        let optimizer = DesignOptimizer::new(OptimizerConfig {
            particle_budget: Some(100),
        });
        let chosen = optimizer.choose(&set, &model, &mut rng).unwrap().unwrap();
        assert!(chosen.utility > 0.0);
        assert_eq!(
            OptimizerConfig { particle_budget: Some(0) }.validate().unwrap_err().field(),
            "optimizer.particle_budget"
        );
    }
}

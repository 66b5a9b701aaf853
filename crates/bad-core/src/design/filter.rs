//! Per-trial refinement of the design space.

use std::collections::HashSet;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::space::DesignSpace;
use super::types::{Design, DesignDimension, DesignKey, value_bits};
use crate::error::{BadResult, ValidationError};
use crate::model::Model;
use crate::trial::TrialHistory;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Never present a design that was already run.
    pub no_repeats: bool,
    /// Hold one randomly chosen value of this column fixed per trial.
    pub random_choice_dimension: Option<DesignDimension>,
    /// Designs with `p < t` or `p > 1 - t` at the point estimate are highly predictable.
    pub predictability_threshold: f64,
    /// Fallback size when too few unpredictable designs remain.
    pub min_unpredictable: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            no_repeats: false,
            random_choice_dimension: None,
            predictability_threshold: 0.01,
            min_unpredictable: 10,
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let threshold = self.predictability_threshold;
        if !threshold.is_finite() || !(0.0..0.5).contains(&threshold) {
            return Err(ValidationError::invalid(
                "filters.predictability_threshold",
                format!("must lie in [0, 0.5) (got {threshold})"),
            ));
        }
        if self.min_unpredictable == 0 {
            return Err(ValidationError::invalid(
                "filters.min_unpredictable",
                "must keep at least one design",
            ));
        }
        Ok(())
    }
}

/// A design in the allowable set, annotated with its predictability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateDesign {
    pub design: Design,
    /// Probability of choosing B at the current point estimate.
    pub p_chose_b: f64,
}

/// Narrows the full design space down to the designs worth scoring this trial.
#[derive(Debug, Clone, Default)]
pub struct DesignFilterPipeline {
    config: FilterConfig,
}

impl DesignFilterPipeline {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Applies repeat removal, the random dimension pick and the predictability
    /// filter, in that order. Stages never fail on an empty set.
    pub fn refine<R: Rng + ?Sized>(
        &self,
        space: &DesignSpace,
        history: &TrialHistory,
        model: &Model,
        rng: &mut R,
    ) -> BadResult<Vec<CandidateDesign>> {
        let mut designs = space.designs().to_vec();
        debug!(count = designs.len(), "designs initially");

        if self.config.no_repeats && !history.is_empty() {
            designs = remove_trials_already_run(designs, history);
            debug!(count = designs.len(), "designs after removing prior designs");
        }

        if let Some(dimension) = self.config.random_choice_dimension {
            designs = choose_one_along_dimension(designs, dimension, rng);
            debug!(
                count = designs.len(),
                dimension = %dimension,
                "designs after holding one value fixed"
            );
        }

        let candidates = remove_highly_predictable(
            designs,
            model,
            self.config.predictability_threshold,
            self.config.min_unpredictable,
        )?;

        if candidates.is_empty() {
            error!(trial = history.len(), "no designs left");
        } else if candidates.len() < self.config.min_unpredictable {
            warn!(
                trial = history.len(),
                count = candidates.len(),
                "very few designs left"
            );
        }
        Ok(candidates)
    }
}

/// Set difference against every design already in the history.
pub(crate) fn remove_trials_already_run(
    mut designs: Vec<Design>,
    history: &TrialHistory,
) -> Vec<Design> {
    let seen: HashSet<DesignKey> = history.designs().map(Design::key).collect();
    designs.retain(|design| !seen.contains(&design.key()));
    designs
}

/// Picks one distinct value of `dimension` uniformly and keeps only matching designs.
pub(crate) fn choose_one_along_dimension<R: Rng + ?Sized>(
    mut designs: Vec<Design>,
    dimension: DesignDimension,
    rng: &mut R,
) -> Vec<Design> {
    let mut seen = HashSet::new();
    let values: Vec<u64> = designs
        .iter()
        .map(|design| value_bits(design.attribute(dimension)))
        .filter(|bits| seen.insert(*bits))
        .collect();
    if values.is_empty() {
        return designs;
    }
    let chosen = values[rng.gen_range(0..values.len())];
    designs.retain(|design| value_bits(design.attribute(dimension)) == chosen);
    designs
}

/// Drops designs whose outcome is nearly certain under the point estimate.
///
/// When `min_keep` or fewer designs survive, the `min_keep` designs closest to
/// indifference are kept instead, in their original order among equals.
pub(crate) fn remove_highly_predictable(
    designs: Vec<Design>,
    model: &Model,
    threshold: f64,
    min_keep: usize,
) -> BadResult<Vec<CandidateDesign>> {
    if designs.is_empty() {
        return Ok(Vec::new());
    }
    let point = model.point_estimate();
    let probabilities = model.predictive_prob_chose_b(&point, &designs)?;
    let mut candidates: Vec<CandidateDesign> = designs
        .into_iter()
        .zip(probabilities)
        .map(|(design, p_chose_b)| CandidateDesign { design, p_chose_b })
        .collect();

    let unpredictable = candidates
        .iter()
        .filter(|candidate| !is_highly_predictable(candidate.p_chose_b, threshold))
        .count();

    if unpredictable > min_keep {
        candidates.retain(|candidate| !is_highly_predictable(candidate.p_chose_b, threshold));
    } else {
        warn!(
            unpredictable,
            keep = min_keep,
            "few unpredictable designs, keeping those closest to indifference"
        );
        candidates.sort_by(|a, b| badness(a.p_chose_b).total_cmp(&badness(b.p_chose_b)));
        candidates.truncate(min_keep);
    }
    Ok(candidates)
}

fn is_highly_predictable(p: f64, threshold: f64) -> bool {
    p < threshold || p > 1.0 - threshold
}

fn badness(p: f64) -> f64 {
    (0.5 - p).abs()
}

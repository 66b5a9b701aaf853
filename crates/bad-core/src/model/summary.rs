use std::f64::consts::{E, PI};

use serde::{Deserialize, Serialize};

use super::particles::Particles;

/// Marginal posterior summary for one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSummary {
    pub name: String,
    pub entropy: f64,
    pub median: f64,
    pub mean: f64,
    pub lower50: f64,
    pub upper50: f64,
    pub lower95: f64,
    pub upper95: f64,
}

impl ParameterSummary {
    pub fn from_particles(particles: &Particles, column: usize) -> Self {
        Self {
            name: particles.names()[column].clone(),
            entropy: normal_fit_entropy(particles, column),
            median: particles.weighted_quantile(column, 0.5),
            mean: particles.weighted_mean(column),
            lower50: particles.weighted_quantile(column, 0.25),
            upper50: particles.weighted_quantile(column, 0.75),
            lower95: particles.weighted_quantile(column, 0.025),
            upper95: particles.weighted_quantile(column, 0.975),
        }
    }

    pub fn contains95(&self, value: f64) -> bool {
        value >= self.lower95 && value <= self.upper95
    }
}

/// Differential entropy of a normal fitted to the weighted column (nats).
///
/// A degenerate column (zero spread) reports `-inf`.
pub fn normal_fit_entropy(particles: &Particles, column: usize) -> f64 {
    let sd = particles.weighted_std_dev(column);
    if sd <= 0.0 {
        return f64::NEG_INFINITY;
    }
    0.5 * (2.0 * PI * E * sd * sd).ln()
}

use serde::{Deserialize, Serialize};

use crate::model::{Particles, normal_fit_entropy};

/// Snapshot of how concentrated a population is after a trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeliefMetrics {
    pub absorbed_trials: usize,
    pub effective_sample_size: f64,
    /// Normal-fit entropy per parameter, in column order.
    pub entropy: Vec<(String, f64)>,
}

impl BeliefMetrics {
    pub fn from_particles(particles: &Particles) -> Self {
        let entropy = particles
            .names()
            .iter()
            .enumerate()
            .map(|(column, name)| (name.clone(), normal_fit_entropy(particles, column)))
            .collect();
        Self {
            absorbed_trials: particles.absorbed_trials(),
            effective_sample_size: particles.effective_sample_size(),
            entropy,
        }
    }

    pub fn entropy_of(&self, name: &str) -> Option<f64> {
        self.entropy
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, value)| *value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_follow_column_order() {
        let particles = Particles::from_rows(
            vec!["logk".to_string(), "alpha".to_string()],
            &[vec![-1.0, 1.0], vec![1.0, 1.0]],
        )
        .unwrap();
        let metrics = BeliefMetrics::from_particles(&particles);
        assert_eq!(metrics.entropy[0].0, "logk");
        assert!(metrics.entropy_of("logk").unwrap().is_finite());
        assert_eq!(metrics.entropy_of("alpha"), Some(f64::NEG_INFINITY));
        assert_eq!(metrics.entropy_of("logh"), None);
        assert!((metrics.effective_sample_size - 2.0).abs() < 1e-12);
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

use super::space::{DesignSpaceConfig, linspace};
use super::types::DesignDimension;
use crate::error::ValidationError;
use crate::model::ModelKind;

/// Experiment families with a ready-made design space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentKind {
    Delayed,
    DelayedMagnitudeEffect,
    Risky,
    DelayedAndRisky,
}

impl ExperimentKind {
    pub const ALL: [ExperimentKind; 4] = [
        ExperimentKind::Delayed,
        ExperimentKind::DelayedMagnitudeEffect,
        ExperimentKind::Risky,
        ExperimentKind::DelayedAndRisky,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            ExperimentKind::Delayed => "delayed",
            ExperimentKind::DelayedMagnitudeEffect => "delayed_magnitude_effect",
            ExperimentKind::Risky => "risky",
            ExperimentKind::DelayedAndRisky => "delayed_and_risky",
        }
    }

    pub fn design_space(&self) -> DesignSpaceConfig {
        let sooner_rewards =
            || -> Vec<f64> { linspace(0.05, 0.95, 91).into_iter().map(|f| 100.0 * f).collect() };
        match self {
            ExperimentKind::Delayed => DesignSpaceConfig::default(),
            ExperimentKind::DelayedMagnitudeEffect => DesignSpaceConfig {
                ra: Vec::new(),
                rb: vec![100.0, 500.0, 1_000.0],
                ra_over_rb: linspace(0.05, 0.95, 19),
                ..DesignSpaceConfig::default()
            },
            ExperimentKind::Risky => DesignSpaceConfig {
                ra: sooner_rewards(),
                da: vec![0.0],
                db: vec![0.0],
                pa: vec![1.0],
                pb: vec![0.1, 0.25, 0.5, 0.75, 0.8, 0.9, 0.99],
                ..DesignSpaceConfig::default()
            },
            ExperimentKind::DelayedAndRisky => DesignSpaceConfig {
                ra: sooner_rewards(),
                pb: vec![0.1, 0.2, 0.25, 0.5, 0.75, 0.8, 0.9, 0.99],
                ..DesignSpaceConfig::default()
            },
        }
    }

    /// Column held fixed per trial to spread designs along it.
    pub const fn random_choice_dimension(&self) -> DesignDimension {
        match self {
            ExperimentKind::Delayed | ExperimentKind::DelayedAndRisky => DesignDimension::DelayB,
            ExperimentKind::DelayedMagnitudeEffect => DesignDimension::RewardB,
            ExperimentKind::Risky => DesignDimension::ProbB,
        }
    }

    pub const fn compatible_models(&self) -> &'static [ModelKind] {
        match self {
            ExperimentKind::Delayed => &[
                ModelKind::Hyperbolic,
                ModelKind::Exponential,
                ModelKind::MyersonHyperboloid,
            ],
            ExperimentKind::DelayedMagnitudeEffect => &[
                ModelKind::HyperbolicMagnitudeEffect,
                ModelKind::ExponentialMagnitudeEffect,
            ],
            ExperimentKind::Risky => &[ModelKind::RiskyHyperbolic],
            ExperimentKind::DelayedAndRisky => &[ModelKind::MultiplicativeHyperbolic],
        }
    }

    /// Model used when a config names this experiment but no model block.
    pub const fn default_model(&self) -> ModelKind {
        match self {
            ExperimentKind::Delayed => ModelKind::Hyperbolic,
            ExperimentKind::DelayedMagnitudeEffect => ModelKind::HyperbolicMagnitudeEffect,
            ExperimentKind::Risky => ModelKind::RiskyHyperbolic,
            ExperimentKind::DelayedAndRisky => ModelKind::MultiplicativeHyperbolic,
        }
    }

    pub fn supports(&self, model: ModelKind) -> bool {
        self.compatible_models().contains(&model)
    }

    pub fn check_model(&self, model: ModelKind) -> Result<(), ValidationError> {
        if self.supports(model) {
            Ok(())
        } else {
            Err(ValidationError::invalid(
                "model.kind",
                format!(
                    "{model} cannot be used for a {self} experiment (expected one of {:?})",
                    self.compatible_models()
                ),
            ))
        }
    }
}

impl fmt::Display for ExperimentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::kind::ModelKind;
use super::prior::Prior;
use super::summary::ParameterSummary;
use super::Model;

/// Read-only copy of a model's posterior for export collaborators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PosteriorSnapshot {
    pub model: ModelKind,
    pub parameter_names: Vec<String>,
    pub priors: BTreeMap<String, Prior>,
    pub fixed: BTreeMap<String, f64>,
    pub absorbed_trials: usize,
    pub rows: Vec<Vec<f64>>,
    pub weights: Vec<f64>,
    pub summaries: Vec<ParameterSummary>,
}

impl PosteriorSnapshot {
    pub fn capture(model: &Model) -> Self {
        let particles = model.particles();
        PosteriorSnapshot {
            model: model.kind(),
            parameter_names: particles.names().to_vec(),
            priors: model
                .priors()
                .iter()
                .map(|named| (named.name.clone(), named.prior))
                .collect(),
            fixed: model.fixed().entries(),
            absorbed_trials: particles.absorbed_trials(),
            rows: particles.rows().map(<[f64]>::to_vec).collect(),
            weights: particles.weights().to_vec(),
            summaries: model.summaries(),
        }
    }

    pub fn to_json(model: &Model) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&Self::capture(model))
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

use serde::{Deserialize, Serialize};

use crate::belief::UpdaterConfig;
use crate::design::{
    DesignDimension, DesignSpaceConfig, ExperimentKind, FilterConfig, OptimizerConfig,
};
use crate::error::ValidationError;
use crate::model::{ModelConfig, ModelKind};

const DEFAULT_MAX_TRIALS: usize = 20;

/// Everything needed to run one adaptive experiment.
///
/// When deserialised, blocks the document leaves out are taken from the
/// `experiment` preset, which is `delayed` when the key is absent. An
/// explicit `experiment: null` disables presets altogether.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ExperimentConfigDocument")]
pub struct ExperimentConfig {
    /// Preset family, when the design space came from one; pins the allowed models.
    pub experiment: Option<ExperimentKind>,
    pub max_trials: usize,
    /// Master seed; a random one is drawn when unset.
    pub seed: Option<u64>,
    pub model: ModelConfig,
    pub design_space: DesignSpaceConfig,
    pub filters: FilterConfig,
    pub updater: UpdaterConfig,
    pub optimizer: OptimizerConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self::preset(ExperimentKind::Delayed, ModelKind::Hyperbolic)
    }
}

impl ExperimentConfig {
    /// Preset design space and random-choice dimension for `experiment`.
    pub fn preset(experiment: ExperimentKind, model: ModelKind) -> Self {
        Self {
            experiment: Some(experiment),
            max_trials: DEFAULT_MAX_TRIALS,
            seed: None,
            model: ModelConfig::new(model),
            design_space: experiment.design_space(),
            filters: FilterConfig {
                random_choice_dimension: Some(experiment.random_choice_dimension()),
                ..FilterConfig::default()
            },
            updater: UpdaterConfig::default(),
            optimizer: OptimizerConfig::default(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_max_trials(mut self, max_trials: usize) -> Self {
        self.max_trials = max_trials;
        self
    }

    /// Checks every block before any computation runs.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(experiment) = self.experiment {
            experiment.check_model(self.model.kind)?;
        }
        self.model.validate()?;
        self.design_space.validate()?;
        self.filters.validate()?;
        self.updater.validate()?;
        self.optimizer.validate()
    }
}

/// Serialised form of [`ExperimentConfig`]; every block is optional so the
/// preset can fill whatever is missing.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExperimentConfigDocument {
    #[serde(deserialize_with = "present")]
    experiment: Option<Option<ExperimentKind>>,
    max_trials: Option<usize>,
    seed: Option<u64>,
    model: Option<ModelConfig>,
    design_space: Option<DesignSpaceConfig>,
    filters: Option<FilterOverrides>,
    updater: Option<UpdaterConfig>,
    optimizer: Option<OptimizerConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FilterOverrides {
    no_repeats: Option<bool>,
    #[serde(deserialize_with = "present")]
    random_choice_dimension: Option<Option<DesignDimension>>,
    predictability_threshold: Option<f64>,
    min_unpredictable: Option<usize>,
}

impl FilterOverrides {
    fn apply(self, filters: &mut FilterConfig) {
        if let Some(no_repeats) = self.no_repeats {
            filters.no_repeats = no_repeats;
        }
        if let Some(dimension) = self.random_choice_dimension {
            filters.random_choice_dimension = dimension;
        }
        if let Some(threshold) = self.predictability_threshold {
            filters.predictability_threshold = threshold;
        }
        if let Some(min_unpredictable) = self.min_unpredictable {
            filters.min_unpredictable = min_unpredictable;
        }
    }
}

/// Distinguishes an explicit `null` (`Some(None)`) from an absent key (`None`).
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl From<ExperimentConfigDocument> for ExperimentConfig {
    fn from(document: ExperimentConfigDocument) -> Self {
        let experiment = document.experiment.unwrap_or(Some(ExperimentKind::Delayed));
        let model = document.model.unwrap_or_else(|| {
            ModelConfig::new(experiment.map_or(ModelKind::Hyperbolic, |kind| kind.default_model()))
        });

        let mut config = match experiment {
            Some(kind) => Self::preset(kind, model.kind),
            None => Self {
                experiment: None,
                design_space: DesignSpaceConfig::default(),
                filters: FilterConfig::default(),
                ..Self::default()
            },
        };
        config.model = model;
        config.seed = document.seed;
        if let Some(max_trials) = document.max_trials {
            config.max_trials = max_trials;
        }
        if let Some(design_space) = document.design_space {
            config.design_space = design_space;
        }
        if let Some(filters) = document.filters {
            filters.apply(&mut config.filters);
        }
        if let Some(updater) = document.updater {
            config.updater = updater;
        }
        if let Some(optimizer) = document.optimizer {
            config.optimizer = optimizer;
        }
        config
    }
}

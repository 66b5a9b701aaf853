use bad_core::ExperimentConfig;
use bad_core::model::ChoiceModel;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::Level;

const DEFAULT_PARTICIPANTS: usize = 10;
const DEFAULT_SIMULATION_SEED: u64 = 2_718;
const RUN_ID_ALLOWED: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789._-";

/// Root benchmark configuration loaded from YAML.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BenchmarkConfig {
    pub run_id: String,
    #[serde(default)]
    pub experiment: ExperimentConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    pub outputs: OutputsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BenchmarkConfig {
    /// Load configuration from a YAML file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let path_buf = path.to_path_buf();
        let file = File::open(path).map_err(|source| ConfigError::Read {
            source,
            path: path_buf.clone(),
        })?;
        let reader = BufReader::new(file);
        let mut cfg: BenchmarkConfig =
            serde_yaml::from_reader(reader).map_err(|source| ConfigError::Parse {
                source,
                path: path_buf.clone(),
            })?;
        cfg.validate().map_err(|source| ConfigError::Invalid {
            path: path_buf,
            source,
        })?;
        Ok(cfg)
    }

    /// Validate the configuration without performing I/O.
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        validate_run_id(&self.run_id)?;
        self.experiment.validate()?;
        self.simulation.validate(&self.experiment)?;
        self.outputs.validate(&self.run_id)?;
        self.logging.normalize();
        Ok(())
    }

    /// Resolve output templates (`{run_id}` placeholders) into concrete paths.
    pub fn resolved_outputs(&self) -> ResolvedOutputs {
        ResolvedOutputs {
            summary_json: resolve_template(&self.run_id, &self.outputs.summary_json),
            summary_md: resolve_template(&self.run_id, &self.outputs.summary_md),
        }
    }
}

/// Simulated participant population.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SimulationConfig {
    #[serde(default = "default_participants")]
    pub participants: usize,
    /// Master seed; every participant's loop seed is drawn from it.
    #[serde(default = "default_simulation_seed")]
    pub seed: u64,
    #[serde(default)]
    pub truth: TruthConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            participants: DEFAULT_PARTICIPANTS,
            seed: DEFAULT_SIMULATION_SEED,
            truth: TruthConfig::default(),
        }
    }
}

impl SimulationConfig {
    fn validate(&self, experiment: &ExperimentConfig) -> Result<(), ValidationError> {
        if self.participants == 0 {
            return Err(ValidationError::InvalidField {
                field: "simulation.participants".to_string(),
                message: "at least one participant must be simulated".to_string(),
            });
        }
        self.truth.validate(experiment)
    }
}

/// Where each simulated participant's true parameters come from.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum TruthConfig {
    /// Prior means for every participant.
    PriorMean,
    /// An independent prior draw per participant.
    #[default]
    PriorSample,
    /// The same values for every participant.
    Fixed { values: BTreeMap<String, f64> },
}

impl TruthConfig {
    fn validate(&self, experiment: &ExperimentConfig) -> Result<(), ValidationError> {
        let TruthConfig::Fixed { values } = self else {
            return Ok(());
        };
        let names = experiment.model.kind.parameter_names();
        for name in names {
            match values.get(*name) {
                Some(value) if value.is_finite() => {}
                Some(value) => {
                    return Err(ValidationError::InvalidField {
                        field: format!("simulation.truth.values.{name}"),
                        message: format!("value must be finite (got {value})"),
                    });
                }
                None => {
                    return Err(ValidationError::InvalidField {
                        field: format!("simulation.truth.values.{name}"),
                        message: format!("missing value for {}", experiment.model.kind),
                    });
                }
            }
        }
        if let Some(extra) = values.keys().find(|key| !names.contains(&key.as_str())) {
            return Err(ValidationError::InvalidField {
                field: format!("simulation.truth.values.{extra}"),
                message: format!("{} has no parameter '{extra}'", experiment.model.kind),
            });
        }
        Ok(())
    }
}

/// Output artifact configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OutputsConfig {
    pub summary_json: String,
    pub summary_md: String,
}

impl OutputsConfig {
    fn validate(&self, run_id: &str) -> Result<(), ValidationError> {
        for (label, value) in [
            ("outputs.summary_json", &self.summary_json),
            ("outputs.summary_md", &self.summary_md),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::InvalidField {
                    field: label.to_string(),
                    message: "path must not be empty".to_string(),
                });
            }

            let resolved = resolve_template(run_id, value);
            if resolved.components().count() == 0 {
                return Err(ValidationError::InvalidField {
                    field: label.to_string(),
                    message: "resolved path is invalid".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Logging configuration; structured JSON logs are off by default.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub enable_structured: bool,
    #[serde(default = "default_tracing_level")]
    pub tracing_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enable_structured: false,
            tracing_level: default_tracing_level(),
        }
    }
}

impl LoggingConfig {
    fn normalize(&mut self) {
        if self.tracing_level.trim().is_empty() {
            self.tracing_level = default_tracing_level();
        }
    }

    pub fn level(&self) -> Option<Level> {
        match self.tracing_level.to_ascii_lowercase().as_str() {
            "trace" => Some(Level::TRACE),
            "debug" => Some(Level::DEBUG),
            "info" => Some(Level::INFO),
            "warn" | "warning" => Some(Level::WARN),
            "error" => Some(Level::ERROR),
            _ => None,
        }
    }
}

fn default_participants() -> usize {
    DEFAULT_PARTICIPANTS
}

fn default_simulation_seed() -> u64 {
    DEFAULT_SIMULATION_SEED
}

fn default_tracing_level() -> String {
    "info".to_string()
}

fn validate_run_id(run_id: &str) -> Result<(), ValidationError> {
    if run_id.trim().is_empty() {
        return Err(ValidationError::InvalidField {
            field: "run_id".to_string(),
            message: "run_id must not be empty".to_string(),
        });
    }

    if !run_id.chars().all(|c| RUN_ID_ALLOWED.contains(c)) {
        return Err(ValidationError::InvalidField {
            field: "run_id".to_string(),
            message: "run_id may only contain alphanumeric characters, '.', '_' or '-'".to_string(),
        });
    }

    Ok(())
}

fn resolve_template(run_id: &str, template: &str) -> PathBuf {
    let replaced = template.replace("{run_id}", run_id);
    PathBuf::from(replaced)
}

/// Fully resolved output paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOutputs {
    pub summary_json: PathBuf,
    pub summary_md: PathBuf,
}

impl ResolvedOutputs {
    /// Directory holding the summaries; telemetry files land here too.
    pub fn output_dir(&self) -> PathBuf {
        self.summary_md
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Errors surfaced when loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        #[source]
        source: serde_yaml::Error,
        path: PathBuf,
    },
    #[error("invalid configuration in {path:?}: {source}")]
    Invalid {
        path: PathBuf,
        source: ValidationError,
    },
}

impl ConfigError {
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. }
            | ConfigError::Parse { path, .. }
            | ConfigError::Invalid { path, .. } => path.as_path(),
        }
    }
}

/// Validation failures captured with contextual metadata.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field}: {message}")]
    InvalidField { field: String, message: String },
    #[error("experiment.{}", .0)]
    Experiment(#[from] bad_core::ValidationError),
}

impl ValidationError {
    pub fn field(&self) -> String {
        match self {
            ValidationError::InvalidField { field, .. } => field.clone(),
            ValidationError::Experiment(inner) => format!("experiment.{}", inner.field()),
        }
    }
}

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use bad_core::belief::BeliefMetrics;
use bad_core::model::ParameterSummary;
use bad_core::trial::TrialReport;
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};
use thiserror::Error;

const CONFIDENCE_LEVEL: f64 = 0.95;
const FALLBACK_Z: f64 = 1.96;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("participant {participant} has no true value for '{parameter}'")]
    MissingTruth { participant: usize, parameter: String },
    #[error("participant {participant} reported parameters {found:?}, expected {expected:?}")]
    ParameterMismatch {
        participant: usize,
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode summary JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Everything one simulated participant produced.
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantRecord {
    pub participant: usize,
    pub seed: u64,
    pub truth: BTreeMap<String, f64>,
    pub initial: BeliefMetrics,
    pub posterior: Vec<ParameterSummary>,
    pub trials: Vec<TrialReport>,
}

/// Folds participant records into per-parameter recovery statistics.
pub struct RecoveryCollector {
    parameters: Vec<String>,
    accumulators: Vec<ParameterAccumulator>,
    records: Vec<ParticipantRecord>,
}

impl RecoveryCollector {
    pub fn new(parameters: Vec<String>) -> Self {
        let accumulators = parameters
            .iter()
            .map(|name| ParameterAccumulator::new(name.clone()))
            .collect();
        Self {
            parameters,
            accumulators,
            records: Vec::new(),
        }
    }

    pub fn record(&mut self, record: ParticipantRecord) -> Result<(), AnalyticsError> {
        let found: Vec<String> = record.posterior.iter().map(|s| s.name.clone()).collect();
        if found != self.parameters {
            return Err(AnalyticsError::ParameterMismatch {
                participant: record.participant,
                expected: self.parameters.clone(),
                found,
            });
        }

        for (acc, summary) in self.accumulators.iter_mut().zip(&record.posterior) {
            let truth = record.truth.get(&summary.name).copied().ok_or_else(|| {
                AnalyticsError::MissingTruth {
                    participant: record.participant,
                    parameter: summary.name.clone(),
                }
            })?;
            acc.record_posterior(truth, summary);

            let name = acc.name.clone();
            let trace = std::iter::once(record.initial.entropy_of(&name)).chain(
                record
                    .trials
                    .iter()
                    .map(|report| report.metrics.entropy_of(&name)),
            );
            acc.record_entropy(trace.map(|value| value.unwrap_or(f64::NAN)));
        }

        self.records.push(record);
        Ok(())
    }

    pub fn finalize(self, header: RunHeader) -> RecoverySummary {
        let participants = self.records.len();
        let mean_trials = if participants == 0 {
            0.0
        } else {
            self.records.iter().map(|r| r.trials.len()).sum::<usize>() as f64
                / participants as f64
        };
        RecoverySummary {
            header,
            participants,
            mean_trials,
            parameters: self
                .accumulators
                .into_iter()
                .map(ParameterAccumulator::into_report)
                .collect(),
            records: self.records,
        }
    }
}

struct ParameterAccumulator {
    name: String,
    truths: Vec<f64>,
    errors: Vec<f64>,
    covered: usize,
    widths: Vec<f64>,
    /// Entropy after `t` trials, one entry per participant that got that far.
    entropy_by_trial: Vec<Vec<f64>>,
}

impl ParameterAccumulator {
    fn new(name: String) -> Self {
        Self {
            name,
            truths: Vec::new(),
            errors: Vec::new(),
            covered: 0,
            widths: Vec::new(),
            entropy_by_trial: Vec::new(),
        }
    }

    fn record_posterior(&mut self, truth: f64, summary: &ParameterSummary) {
        self.truths.push(truth);
        self.errors.push(summary.median - truth);
        self.widths.push(summary.upper95 - summary.lower95);
        if summary.contains95(truth) {
            self.covered += 1;
        }
    }

    fn record_entropy(&mut self, trace: impl Iterator<Item = f64>) {
        for (trial, value) in trace.enumerate() {
            if trial == self.entropy_by_trial.len() {
                self.entropy_by_trial.push(Vec::new());
            }
            // A degenerate column has -inf entropy; it would swamp the mean.
            if value.is_finite() {
                self.entropy_by_trial[trial].push(value);
            }
        }
    }

    fn into_report(self) -> ParameterRecovery {
        let participants = self.errors.len();
        let bias = mean(&self.errors);
        let mean_abs_error = mean(&self.errors.iter().map(|e| e.abs()).collect::<Vec<_>>());
        let rmse = mean(&self.errors.iter().map(|e| e * e).collect::<Vec<_>>()).sqrt();
        let coverage95 = if participants == 0 {
            0.0
        } else {
            self.covered as f64 / participants as f64
        };

        let entropy_by_trial = self
            .entropy_by_trial
            .iter()
            .enumerate()
            .map(|(trial, values)| EntropyPoint {
                trial,
                participants: values.len(),
                mean: mean(values),
                ci95: confidence_interval(values),
            })
            .collect();

        ParameterRecovery {
            name: self.name,
            participants,
            mean_truth: mean(&self.truths),
            bias,
            bias_ci95: confidence_interval(&self.errors),
            mean_abs_error,
            rmse,
            coverage95,
            mean_width95: mean(&self.widths),
            entropy_by_trial,
        }
    }
}

/// Identifies the run in both summary files.
#[derive(Debug, Clone, Serialize)]
pub struct RunHeader {
    pub run_id: String,
    pub model: String,
    pub experiment: Option<String>,
    pub max_trials: usize,
    pub particles: usize,
    pub simulation_seed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecoverySummary {
    #[serde(flatten)]
    pub header: RunHeader,
    pub participants: usize,
    pub mean_trials: f64,
    pub parameters: Vec<ParameterRecovery>,
    pub records: Vec<ParticipantRecord>,
}

impl RecoverySummary {
    pub fn parameter(&self, name: &str) -> Option<&ParameterRecovery> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), AnalyticsError> {
        let path = path.as_ref();
        ensure_parent(path)?;
        let bytes = serde_json::to_vec_pretty(self)?;
        fs::write(path, bytes).map_err(|e| AnalyticsError::Io {
            context: "writing summary json",
            source: e,
        })
    }

    pub fn write_markdown(&self, path: impl AsRef<Path>) -> Result<(), AnalyticsError> {
        let path = path.as_ref();
        ensure_parent(path)?;
        fs::write(path, self.render_markdown()).map_err(|e| AnalyticsError::Io {
            context: "writing summary markdown",
            source: e,
        })
    }

    pub fn render_markdown(&self) -> String {
        let header = &self.header;
        let mut rows = String::new();
        rows.push_str(&format!("# Parameter Recovery: {}\n\n", header.run_id));
        rows.push_str(&format!(
            "Model `{}`{}, {} participants, {} particles, up to {} trials (mean {:.1}), seed {}\n\n",
            header.model,
            header
                .experiment
                .as_ref()
                .map(|e| format!(" on the `{e}` design space"))
                .unwrap_or_default(),
            self.participants,
            header.particles,
            header.max_trials,
            self.mean_trials,
            header.simulation_seed,
        ));

        rows.push_str("| Parameter | Mean truth | Bias | 95% CI (bias) | MAE | RMSE | 95% coverage | Mean 95% width |\n");
        rows.push_str("|-----------|------------|------|---------------|-----|------|--------------|----------------|\n");
        for p in &self.parameters {
            rows.push_str(&format!(
                "| {name} | {truth:.3} | {bias:+.3} | [{lo:.3}, {hi:.3}] | {mae:.3} | {rmse:.3} | {cov:.1}% | {width:.3} |\n",
                name = p.name,
                truth = p.mean_truth,
                bias = p.bias,
                lo = p.bias_ci95.0,
                hi = p.bias_ci95.1,
                mae = p.mean_abs_error,
                rmse = p.rmse,
                cov = p.coverage95 * 100.0,
                width = p.mean_width95,
            ));
        }

        rows.push_str("\n## Posterior entropy by trial (nats)\n\n");
        rows.push_str("| Trial |");
        for p in &self.parameters {
            rows.push_str(&format!(" {} |", p.name));
        }
        rows.push_str("\n|-------|");
        for _ in &self.parameters {
            rows.push_str("------|");
        }
        rows.push('\n');

        let depth = self
            .parameters
            .iter()
            .map(|p| p.entropy_by_trial.len())
            .max()
            .unwrap_or(0);
        for trial in 0..depth {
            rows.push_str(&format!("| {trial} |"));
            for p in &self.parameters {
                match p.entropy_by_trial.get(trial) {
                    Some(point) if point.participants > 0 => {
                        rows.push_str(&format!(" {:.3} ± {:.3} |", point.mean, point.half_width()))
                    }
                    _ => rows.push_str(" n/a |"),
                }
            }
            rows.push('\n');
        }
        rows
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ParameterRecovery {
    pub name: String,
    pub participants: usize,
    pub mean_truth: f64,
    /// Mean of posterior median minus truth.
    pub bias: f64,
    pub bias_ci95: (f64, f64),
    pub mean_abs_error: f64,
    pub rmse: f64,
    /// Share of participants whose truth fell inside the 95% interval.
    pub coverage95: f64,
    pub mean_width95: f64,
    pub entropy_by_trial: Vec<EntropyPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntropyPoint {
    pub trial: usize,
    pub participants: usize,
    pub mean: f64,
    pub ci95: (f64, f64),
}

impl EntropyPoint {
    fn half_width(&self) -> f64 {
        (self.ci95.1 - self.ci95.0) / 2.0
    }
}

fn ensure_parent(path: &Path) -> Result<(), AnalyticsError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            fs::create_dir_all(dir).map_err(|e| AnalyticsError::Io {
                context: "creating output directory",
                source: e,
            })
        }
        _ => Ok(()),
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Student-t interval for the mean of `values`.
fn confidence_interval(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = mean(values);
    if values.len() == 1 {
        return (mean, mean);
    }
    let n = values.len() as f64;
    let variance = values
        .iter()
        .map(|value| (value - mean).powi(2))
        .sum::<f64>()
        / (n - 1.0);
    let std_error = (variance / n).sqrt();
    let critical = StudentsT::new(0.0, 1.0, n - 1.0)
        .map(|t| t.inverse_cdf(0.5 + CONFIDENCE_LEVEL / 2.0))
        .unwrap_or(FALLBACK_Z);
    let margin = critical * std_error;
    (mean - margin, mean + margin)
}

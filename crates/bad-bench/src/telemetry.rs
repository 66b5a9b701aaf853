use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

const DESIGN_SELECTION_TARGET: &str = "bad_core::design_selection";
const BELIEF_UPDATE_TARGET: &str = "bad_core::belief_update";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse telemetry JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize)]
pub struct TelemetrySummary {
    pub design_selection: DesignSelectionSummary,
    pub belief_update: BeliefUpdateSummary,
    /// WARN and ERROR events from any target.
    pub warnings: usize,
}

#[derive(Debug, Default, Serialize)]
pub struct DesignSelectionSummary {
    pub count: usize,
    pub avg_candidates: Option<f64>,
    pub avg_particles: Option<f64>,
    pub avg_utility: Option<f64>,
    pub avg_p_chose_b: Option<f64>,
    pub avg_elapsed_ms: Option<f64>,
}

#[derive(Debug, Default, Serialize)]
pub struct BeliefUpdateSummary {
    pub count: usize,
    pub resampled: usize,
    pub excluded: u64,
    pub avg_ess: Option<f64>,
    /// Over updates that ran a move step.
    pub avg_acceptance_rate: Option<f64>,
    pub avg_elapsed_ms: Option<f64>,
}

#[derive(Debug)]
struct Average {
    sum: f64,
    count: usize,
}

impl Average {
    fn new() -> Self {
        Self { sum: 0.0, count: 0 }
    }

    fn add(&mut self, value: Option<f64>) {
        if let Some(value) = value.filter(|v| v.is_finite()) {
            self.sum += value;
            self.count += 1;
        }
    }

    fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}

/// Aggregate design-selection and belief-update events from a JSON log.
pub fn summarise_telemetry(path: &Path) -> Result<TelemetrySummary, TelemetryError> {
    if !path.exists() {
        return Ok(TelemetrySummary::default());
    }

    let file = File::open(path).map_err(|source| TelemetryError::Io {
        context: "opening telemetry log",
        source,
    })?;
    let reader = BufReader::new(file);

    let mut summary = TelemetrySummary::default();
    let mut candidates = Average::new();
    let mut particles = Average::new();
    let mut utility = Average::new();
    let mut p_chose_b = Average::new();
    let mut selection_ms = Average::new();
    let mut ess = Average::new();
    let mut acceptance = Average::new();
    let mut update_ms = Average::new();

    for line in reader.lines() {
        let line = line.map_err(|source| TelemetryError::Io {
            context: "reading telemetry line",
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }

        let payload: Value = serde_json::from_str(&line)?;
        if matches!(
            payload.get("level").and_then(Value::as_str),
            Some("WARN" | "ERROR")
        ) {
            summary.warnings += 1;
        }
        let target = payload
            .get("target")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let fields = payload
            .get("fields")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        match target {
            DESIGN_SELECTION_TARGET => {
                summary.design_selection.count += 1;
                candidates.add(number(&fields, "candidates"));
                particles.add(number(&fields, "particles"));
                utility.add(number(&fields, "utility"));
                p_chose_b.add(number(&fields, "p_chose_b"));
                selection_ms.add(number(&fields, "elapsed_ms"));
            }
            BELIEF_UPDATE_TARGET => {
                let update = &mut summary.belief_update;
                update.count += 1;
                if fields.get("resampled").and_then(Value::as_bool) == Some(true) {
                    update.resampled += 1;
                }
                update.excluded += fields.get("excluded").and_then(Value::as_u64).unwrap_or(0);
                ess.add(number(&fields, "ess"));
                acceptance.add(number(&fields, "acceptance_rate"));
                update_ms.add(number(&fields, "elapsed_ms"));
            }
            _ => {}
        }
    }

    let selection = &mut summary.design_selection;
    selection.avg_candidates = candidates.mean();
    selection.avg_particles = particles.mean();
    selection.avg_utility = utility.mean();
    selection.avg_p_chose_b = p_chose_b.mean();
    selection.avg_elapsed_ms = selection_ms.mean();

    let update = &mut summary.belief_update;
    update.avg_ess = ess.mean();
    update.avg_acceptance_rate = acceptance.mean();
    update.avg_elapsed_ms = update_ms.mean();

    Ok(summary)
}

fn number(fields: &Map<String, Value>, key: &str) -> Option<f64> {
    fields.get(key).and_then(Value::as_f64)
}

pub fn write_summary_outputs(
    telemetry_path: &Path,
    output_dir: &Path,
) -> Result<Option<TelemetryOutputs>, TelemetryError> {
    if !telemetry_path.exists() {
        return Ok(None);
    }

    let summary = summarise_telemetry(telemetry_path)?;
    let json_path = output_dir.join("telemetry_summary.json");
    let md_path = output_dir.join("telemetry_summary.md");

    std::fs::write(
        &json_path,
        serde_json::to_vec_pretty(&summary).map_err(TelemetryError::from)?,
    )
    .map_err(|source| TelemetryError::Io {
        context: "writing telemetry summary json",
        source,
    })?;

    let markdown = render_markdown(&summary, telemetry_path);
    std::fs::write(&md_path, markdown).map_err(|source| TelemetryError::Io {
        context: "writing telemetry summary markdown",
        source,
    })?;

    Ok(Some(TelemetryOutputs {
        summary,
        json_path,
        markdown_path: md_path,
    }))
}

pub fn append_highlights_to_markdown(
    summary_path: &Path,
    outputs: &TelemetryOutputs,
) -> Result<(), TelemetryError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(summary_path)
        .map_err(|source| TelemetryError::Io {
            context: "opening summary markdown for telemetry append",
            source,
        })?;

    let mut section = String::new();
    section.push_str("\n## Telemetry Highlights\n");
    section.push_str(&render_sections(&outputs.summary));

    write!(file, "{section}").map_err(|source| TelemetryError::Io {
        context: "writing telemetry highlights",
        source,
    })?;

    Ok(())
}

fn render_markdown(summary: &TelemetrySummary, telemetry_path: &Path) -> String {
    let mut output = String::new();
    output.push_str("# Telemetry Summary\n\n");
    output.push_str(&format!("- Source: `{}`\n", telemetry_path.display()));
    output.push('\n');
    output.push_str(&render_sections(summary));
    output
}

fn render_sections(summary: &TelemetrySummary) -> String {
    let mut output = String::new();
    let selection = &summary.design_selection;
    output.push_str("### Design Selection\n");
    output.push_str(&format!("- Events: {}\n", selection.count));
    if let Some(value) = selection.avg_candidates {
        output.push_str(&format!("- Avg allowable designs: {:.1}\n", value));
    }
    if let Some(value) = selection.avg_particles {
        output.push_str(&format!("- Avg particles scored: {:.0}\n", value));
    }
    if let Some(value) = selection.avg_utility {
        output.push_str(&format!("- Avg utility: {:.4} nats\n", value));
    }
    if let Some(value) = selection.avg_p_chose_b {
        output.push_str(&format!("- Avg P(chose B): {:.3}\n", value));
    }
    if let Some(value) = selection.avg_elapsed_ms {
        output.push_str(&format!("- Avg selection time: {:.2} ms\n", value));
    }

    let update = &summary.belief_update;
    output.push_str("\n### Belief Updates\n");
    output.push_str(&format!("- Events: {}\n", update.count));
    output.push_str(&format!("- Resampled: {}\n", update.resampled));
    output.push_str(&format!("- Excluded particles: {}\n", update.excluded));
    if let Some(value) = update.avg_ess {
        output.push_str(&format!("- Avg ESS: {:.1}\n", value));
    }
    if let Some(value) = update.avg_acceptance_rate {
        output.push_str(&format!("- Avg move acceptance: {:.3}\n", value));
    }
    if let Some(value) = update.avg_elapsed_ms {
        output.push_str(&format!("- Avg update time: {:.2} ms\n", value));
    }
    output.push_str(&format!("\n- Warnings: {}\n", summary.warnings));
    output
}

#[derive(Debug)]
pub struct TelemetryOutputs {
    pub summary: TelemetrySummary,
    pub json_path: PathBuf,
    pub markdown_path: PathBuf,
}

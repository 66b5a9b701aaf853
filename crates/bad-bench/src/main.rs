use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use bad_bench::config::{BenchmarkConfig, ResolvedOutputs};
use bad_bench::logging::init_logging;
use bad_bench::simulation::SimulationRunner;
use bad_bench::telemetry::{append_highlights_to_markdown, write_summary_outputs};

/// Parameter-recovery harness for Bayesian adaptive design.
#[derive(Debug, Parser)]
#[command(
    name = "bad-bench",
    author,
    version,
    about = "Deterministic parameter-recovery simulations for adaptive designs"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "bench/bench.yaml")]
    config: PathBuf,

    /// Override the run identifier (substitutes {run_id} templates).
    #[arg(long, value_name = "RUN_ID")]
    run_id: Option<String>,

    /// Override the number of simulated participants.
    #[arg(long, value_name = "COUNT")]
    participants: Option<usize>,

    /// Override the master simulation seed.
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Override the per-participant trial budget.
    #[arg(long, value_name = "TRIALS")]
    trials: Option<usize>,

    /// Exit after validating the configuration (no simulation is run).
    #[arg(long)]
    validate_only: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = BenchmarkConfig::from_path(&cli.config)?;

    if let Some(run_id) = cli.run_id {
        config.run_id = run_id;
    }

    if let Some(participants) = cli.participants {
        config.simulation.participants = participants;
    }

    if let Some(seed) = cli.seed {
        config.simulation.seed = seed;
    }

    if let Some(trials) = cli.trials {
        config.experiment.max_trials = trials;
    }

    config.validate()?;

    let outputs: ResolvedOutputs = config.resolved_outputs();
    let run_id = config.run_id.clone();
    let participants = config.simulation.participants;
    let trials = config.experiment.max_trials;
    let model = config.experiment.model.kind;

    println!(
        "Loaded configuration '{run_id}': {model} model, {participants} participant{}, up to {trials} trials each",
        if participants == 1 { "" } else { "s" }
    );

    if cli.validate_only {
        println!("Validation-only mode: simulation skipped.");
        return Ok(());
    }

    let logging_guard = init_logging(&config.logging, &outputs, &run_id)?;
    let runner = SimulationRunner::new(config, outputs.clone())?;
    let summary = runner.run()?;
    println!(
        "Simulation complete for '{run_id}': {} participants, {} trials over {} designs",
        summary.participants, summary.trials_run, summary.designs
    );
    for parameter in &summary.recovery.parameters {
        println!(
            "  {}: bias {:+.3}, RMSE {:.3}, 95% coverage {:.0}%",
            parameter.name,
            parameter.bias,
            parameter.rmse,
            parameter.coverage95 * 100.0
        );
    }
    println!("Summary (JSON): {}", summary.summary_json.display());
    println!("Summary (Markdown): {}", summary.summary_md.display());

    if let Some(guard) = logging_guard {
        let telemetry_path = guard.telemetry_path.clone();
        // Flushes the non-blocking writer before the log is read back.
        drop(guard);
        println!("Telemetry log: {}", telemetry_path.display());
        let written = write_summary_outputs(&telemetry_path, &outputs.output_dir())
            .context("summarising telemetry")?;
        if let Some(telemetry) = written {
            append_highlights_to_markdown(&summary.summary_md, &telemetry)
                .context("appending telemetry highlights")?;
            println!("Telemetry summary (JSON): {}", telemetry.json_path.display());
            println!(
                "Telemetry summary (Markdown): {}",
                telemetry.markdown_path.display()
            );
            println!(
                "  Design selections: {}, belief updates: {} ({} resampled)",
                telemetry.summary.design_selection.count,
                telemetry.summary.belief_update.count,
                telemetry.summary.belief_update.resampled
            );
        }
    }

    Ok(())
}

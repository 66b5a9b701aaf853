//! Sequential belief updates over the particle population.
//!
//! - `updater`: importance reweighting, resampling and Metropolis moves.
//! - `metrics`: per-trial diagnostics derived from a population.

mod metrics;
mod updater;

pub use metrics::BeliefMetrics;
pub use updater::{BeliefUpdater, UpdateReport, UpdaterConfig};

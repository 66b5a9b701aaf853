//! Parameter-recovery harness for the adaptive design loop.
//!
//! Simulated participants answer from known parameters; the harness reports
//! how well the posterior recovers them and how fast its entropy falls.

pub mod analytics;
pub mod config;
pub mod logging;
pub mod simulation;
pub mod telemetry;

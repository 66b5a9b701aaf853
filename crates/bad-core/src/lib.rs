//! Bayesian Adaptive Design for binary-choice experiments.
//!
//! - `model`: priors, particle populations and the catalogue of choice models.
//! - `belief`: sequential particle updates as new trials arrive.
//! - `design`: design-space generation, per-trial filtering and utility optimisation.
//! - `trial`: trial history and the adaptive trial loop.
//! - `config`: the serde-facing experiment configuration.

pub mod belief;
pub mod config;
pub mod design;
pub mod error;
pub mod model;
pub mod trial;

pub use config::ExperimentConfig;
pub use error::{BadError, BadResult, ValidationError};

pub struct AppInfo;

impl AppInfo {
    pub const fn name() -> &'static str {
        "bad"
    }

    pub const fn codename() -> &'static str {
        "Bayesian Adaptive Design"
    }

    pub const fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}

#[cfg(test)]
mod tests {
    use super::AppInfo;

    #[test]
    fn exposes_static_metadata() {
        assert_eq!(AppInfo::name(), "bad");
        assert_eq!(AppInfo::codename(), "Bayesian Adaptive Design");
        assert!(!AppInfo::version().is_empty());
    }
}

//! Candidate designs and per-trial design selection.
//!
//! - `types`: prospects, designs and their attribute columns.
//! - `space`: the full design space generated once per experiment.
//! - `filter`: per-trial refinement of the space into an allowable set.
//! - `optimizer`: expected information gain over the allowable set.
//! - `presets`: ready-made design spaces per experiment kind.

mod filter;
mod optimizer;
mod presets;
mod space;
mod types;

pub use filter::{CandidateDesign, DesignFilterPipeline, FilterConfig};
pub use optimizer::{
    ChosenDesign, DesignOptimizer, OptimizerConfig, bernoulli_entropy, expected_information_gain,
};
pub use presets::ExperimentKind;
pub use space::{DEFAULT_DB, DesignSpace, DesignSpaceConfig, linspace};
pub use types::{Design, DesignDimension, DesignKey, Prospect};

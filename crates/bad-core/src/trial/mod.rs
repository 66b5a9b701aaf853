//! Trial records and the adaptive trial loop.
//!
//! - `history`: binary responses and the append-only trial history.
//! - `trial_loop`: the design → response → update state machine.

mod history;
mod trial_loop;

pub use history::{Response, Trial, TrialHistory};
pub use trial_loop::{DesignOutcome, LoopState, TrialLoop, TrialReport};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::design::{Design, DesignKey};
use crate::error::BadError;

/// Binary response to a design; labels are 0 for A and 1 for B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    ChoseA,
    ChoseB,
}

impl Response {
    pub const fn label(self) -> u8 {
        match self {
            Response::ChoseA => 0,
            Response::ChoseB => 1,
        }
    }

    pub const fn chose_b(self) -> bool {
        matches!(self, Response::ChoseB)
    }
}

impl TryFrom<u8> for Response {
    type Error = BadError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Response::ChoseA),
            1 => Ok(Response::ChoseB),
            value => Err(BadError::ResponseLabel { value }),
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::ChoseA => f.write_str("A"),
            Response::ChoseB => f.write_str("B"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub design: Design,
    pub response: Response,
}

impl Trial {
    pub const fn new(design: Design, response: Response) -> Self {
        Self { design, response }
    }
}

/// Append-only, insertion-ordered record of completed trials.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrialHistory {
    trials: Vec<Trial>,
}

impl TrialHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    pub fn last(&self) -> Option<&Trial> {
        self.trials.last()
    }

    pub fn designs(&self) -> impl Iterator<Item = &Design> {
        self.trials.iter().map(|trial| &trial.design)
    }

    pub fn contains_design(&self, key: &DesignKey) -> bool {
        self.designs().any(|design| design.key() == *key)
    }

    pub(crate) fn push(&mut self, trial: Trial) {
        self.trials.push(trial);
    }

    /// Removes the most recent trial; used to roll back a failed update.
    pub(crate) fn pop(&mut self) -> Option<Trial> {
        self.trials.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::Prospect;

    #[test]
    fn labels_outside_zero_and_one_are_rejected() {
        assert_eq!(Response::try_from(0).unwrap(), Response::ChoseA);
        assert_eq!(Response::try_from(1).unwrap(), Response::ChoseB);
        let err = Response::try_from(2).unwrap_err();
        assert!(matches!(err, BadError::ResponseLabel { value: 2 }));
    }

    #[test]
    fn history_keeps_insertion_order() {
        let first = Design::new(Prospect::new(10.0, 0.0, 1.0), Prospect::new(100.0, 7.0, 1.0));
        let second = Design::new(Prospect::new(20.0, 0.0, 1.0), Prospect::new(100.0, 7.0, 1.0));
        let mut history = TrialHistory::new();
        history.push(Trial::new(first, Response::ChoseB));
        history.push(Trial::new(second, Response::ChoseA));

        assert_eq!(history.len(), 2);
        assert_eq!(history.trials()[0].design, first);
        assert!(history.contains_design(&second.key()));
        assert_eq!(history.pop().map(|trial| trial.design), Some(second));
        assert!(!history.contains_design(&second.key()));
    }
}

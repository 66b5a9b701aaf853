use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// One option offered to the participant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prospect {
    pub reward: f64,
    pub delay: f64,
    pub prob: f64,
}

impl Prospect {
    pub const fn new(reward: f64, delay: f64, prob: f64) -> Self {
        Self {
            reward,
            delay,
            prob,
        }
    }

    /// Odds against receiving the reward, `(1 - p) / p`.
    pub fn odds_against(&self) -> f64 {
        (1.0 - self.prob) / self.prob
    }
}

/// A pair of prospects. By convention B is the later (more delayed) option.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Design {
    pub a: Prospect,
    pub b: Prospect,
}

impl Design {
    pub const fn new(a: Prospect, b: Prospect) -> Self {
        Self { a, b }
    }

    pub fn attribute(&self, dimension: DesignDimension) -> f64 {
        match dimension {
            DesignDimension::RewardA => self.a.reward,
            DesignDimension::DelayA => self.a.delay,
            DesignDimension::ProbA => self.a.prob,
            DesignDimension::RewardB => self.b.reward,
            DesignDimension::DelayB => self.b.delay,
            DesignDimension::ProbB => self.b.prob,
        }
    }

    /// Exact identity over all six attribute columns.
    pub fn key(&self) -> DesignKey {
        DesignKey(DesignDimension::ALL.map(|dimension| value_bits(self.attribute(dimension))))
    }
}

impl fmt::Display for Design {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "A(£{:.2}, {}d, p={}) vs B(£{:.2}, {}d, p={})",
            self.a.reward, self.a.delay, self.a.prob, self.b.reward, self.b.delay, self.b.prob
        )
    }
}

/// Hashable identity of a design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DesignKey([u64; 6]);

/// Bit pattern with `-0.0` folded onto `0.0`.
pub(crate) fn value_bits(value: f64) -> u64 {
    if value == 0.0 { 0.0f64.to_bits() } else { value.to_bits() }
}

/// Attribute columns of a design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DesignDimension {
    #[serde(rename = "RA")]
    RewardA,
    #[serde(rename = "DA")]
    DelayA,
    #[serde(rename = "PA")]
    ProbA,
    #[serde(rename = "RB")]
    RewardB,
    #[serde(rename = "DB")]
    DelayB,
    #[serde(rename = "PB")]
    ProbB,
}

impl DesignDimension {
    pub const ALL: [DesignDimension; 6] = [
        DesignDimension::RewardA,
        DesignDimension::DelayA,
        DesignDimension::ProbA,
        DesignDimension::RewardB,
        DesignDimension::DelayB,
        DesignDimension::ProbB,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            DesignDimension::RewardA => "RA",
            DesignDimension::DelayA => "DA",
            DesignDimension::ProbA => "PA",
            DesignDimension::RewardB => "RB",
            DesignDimension::DelayB => "DB",
            DesignDimension::ProbB => "PB",
        }
    }
}

impl fmt::Display for DesignDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DesignDimension {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DesignDimension::ALL
            .into_iter()
            .find(|dimension| dimension.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                ValidationError::invalid(
                    "random_choice_dimension",
                    format!("unknown design dimension '{s}' (expected one of RA, DA, PA, RB, DB, PB)"),
                )
            })
    }
}

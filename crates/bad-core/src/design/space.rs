use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::types::{Design, Prospect};
use crate::error::ValidationError;

const MINUTE: f64 = 1.0 / (24.0 * 60.0);
const HOUR: f64 = 1.0 / 24.0;
const WEEK: f64 = 7.0;
const MONTH: f64 = 30.0;
const YEAR: f64 = 365.0;

/// Delays for prospect B, from one minute to 25 years, in days.
pub const DEFAULT_DB: [f64; 45] = [
    MINUTE,
    2.0 * MINUTE,
    5.0 * MINUTE,
    10.0 * MINUTE,
    15.0 * MINUTE,
    30.0 * MINUTE,
    45.0 * MINUTE,
    HOUR,
    2.0 * HOUR,
    3.0 * HOUR,
    4.0 * HOUR,
    5.0 * HOUR,
    6.0 * HOUR,
    7.0 * HOUR,
    8.0 * HOUR,
    9.0 * HOUR,
    12.0 * HOUR,
    1.0,
    2.0,
    3.0,
    4.0,
    5.0,
    6.0,
    7.0,
    2.0 * WEEK,
    3.0 * WEEK,
    4.0 * WEEK,
    3.0 * MONTH,
    4.0 * MONTH,
    5.0 * MONTH,
    6.0 * MONTH,
    8.0 * MONTH,
    9.0 * MONTH,
    YEAR,
    2.0 * YEAR,
    3.0 * YEAR,
    4.0 * YEAR,
    5.0 * YEAR,
    6.0 * YEAR,
    7.0 * YEAR,
    8.0 * YEAR,
    10.0 * YEAR,
    15.0 * YEAR,
    20.0 * YEAR,
    25.0 * YEAR,
];

/// `count` evenly spaced values from `start` to `end` inclusive.
pub fn linspace(start: f64, end: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (count - 1) as f64;
            (0..count).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Attribute lists whose Cartesian product forms the design space.
///
/// Exactly one of `ra` (absolute sooner rewards) or `ra_over_rb` (sooner
/// reward as a fraction of `rb`) must be non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesignSpaceConfig {
    pub ra: Vec<f64>,
    pub da: Vec<f64>,
    pub pa: Vec<f64>,
    pub rb: Vec<f64>,
    pub db: Vec<f64>,
    pub pb: Vec<f64>,
    pub ra_over_rb: Vec<f64>,
    /// Drop designs where the later reward is smaller than the sooner one.
    pub assume_discounting: bool,
}

impl Default for DesignSpaceConfig {
    fn default() -> Self {
        Self {
            ra: linspace(0.05, 0.95, 91).into_iter().map(|f| 100.0 * f).collect(),
            da: vec![0.0],
            pa: vec![1.0],
            rb: vec![100.0],
            db: DEFAULT_DB.to_vec(),
            pb: vec![1.0],
            ra_over_rb: Vec::new(),
            assume_discounting: true,
        }
    }
}

impl DesignSpaceConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match (self.ra.is_empty(), self.ra_over_rb.is_empty()) {
            (false, false) => {
                return Err(ValidationError::invalid(
                    "design_space.ra",
                    "provide either ra or ra_over_rb, not both",
                ));
            }
            (true, true) => {
                return Err(ValidationError::invalid(
                    "design_space.ra",
                    "one of ra or ra_over_rb is required",
                ));
            }
            _ => {}
        }

        let columns: [(&str, &[f64]); 7] = [
            ("ra", &self.ra),
            ("da", &self.da),
            ("pa", &self.pa),
            ("rb", &self.rb),
            ("db", &self.db),
            ("pb", &self.pb),
            ("ra_over_rb", &self.ra_over_rb),
        ];
        for (name, values) in columns {
            if let Some(bad) = values.iter().find(|value| !value.is_finite()) {
                return Err(ValidationError::invalid(
                    format!("design_space.{name}"),
                    format!("values must be finite (got {bad})"),
                ));
            }
        }

        check_range("pa", &self.pa, 0.0, 1.0)?;
        check_range("pb", &self.pb, 0.0, 1.0)?;
        check_range("da", &self.da, 0.0, f64::INFINITY)?;
        check_range("db", &self.db, 0.0, f64::INFINITY)?;
        check_range("ra_over_rb", &self.ra_over_rb, 0.0, 1.0)
    }
}

fn check_range(name: &str, values: &[f64], low: f64, high: f64) -> Result<(), ValidationError> {
    match values.iter().find(|value| **value < low || **value > high) {
        Some(bad) => Err(ValidationError::invalid(
            format!("design_space.{name}"),
            format!("values must lie in [{low}, {high}] (got {bad})"),
        )),
        None => Ok(()),
    }
}

/// Every design the experiment may ever present. Generated once, read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesignSpace {
    designs: Vec<Design>,
}

impl DesignSpace {
    pub fn generate(config: &DesignSpaceConfig) -> Result<Self, ValidationError> {
        config.validate()?;

        // Leading column is either absolute RA or the RA/RB ratio.
        let (leading, ratio) = if config.ra_over_rb.is_empty() {
            (&config.ra, false)
        } else {
            (&config.ra_over_rb, true)
        };

        let mut designs = Vec::new();
        for &first in leading {
            for &da in &config.da {
                for &pa in &config.pa {
                    for &rb in &config.rb {
                        for &db in &config.db {
                            for &pb in &config.pb {
                                let ra = if ratio { rb * first } else { first };
                                designs.push(Design::new(
                                    Prospect::new(ra, da, pa),
                                    Prospect::new(rb, db, pb),
                                ));
                            }
                        }
                    }
                }
            }
        }
        debug!(count = designs.len(), "designs generated initially");

        designs.retain(|design| design.a.delay <= design.b.delay);
        debug!(count = designs.len(), "designs left after dropping DA > DB");

        if config.assume_discounting {
            designs.retain(|design| design.b.reward >= design.a.reward);
            debug!(count = designs.len(), "designs left after dropping RB < RA");
        }

        if designs.is_empty() {
            error!("no designs generated from the design space configuration");
        }
        Ok(Self { designs })
    }

    pub fn from_designs(designs: Vec<Design>) -> Self {
        Self { designs }
    }

    pub fn designs(&self) -> &[Design] {
        &self.designs
    }

    pub fn len(&self) -> usize {
        self.designs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.designs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::DesignKey;
    use std::collections::HashSet;

    fn small_config() -> DesignSpaceConfig {
        DesignSpaceConfig {
            ra: vec![10.0, 50.0, 120.0],
            da: vec![0.0, 7.0],
            pa: vec![1.0],
            rb: vec![100.0],
            db: vec![1.0, 7.0, 30.0],
            pb: vec![1.0, 0.5],
            ra_over_rb: Vec::new(),
            assume_discounting: true,
        }
    }

    fn keys(space: &DesignSpace) -> HashSet<DesignKey> {
        space.designs().iter().map(Design::key).collect()
    }

    #[test]
    fn default_delays_span_minutes_to_years() {
        assert_eq!(DEFAULT_DB.len(), 45);
        assert!((DEFAULT_DB[0] - 1.0 / 1440.0).abs() < 1e-15);
        assert_eq!(DEFAULT_DB[44], 25.0 * 365.0);
        assert!(DEFAULT_DB.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn generation_drops_inverted_delays_and_rewards() {
        let space = DesignSpace::generate(&small_config()).unwrap();
        assert!(!space.is_empty());
        for design in space.designs() {
            assert!(design.a.delay <= design.b.delay);
            assert!(design.b.reward >= design.a.reward);
        }
        // RA=120 never survives against RB=100; DA=7 only pairs with DB in {7, 30}.
        assert_eq!(space.len(), 2 * (3 + 2) * 2);
    }

    #[test]
    fn reordering_inputs_gives_the_same_set() {
        let config = small_config();
        let mut reordered = config.clone();
        reordered.ra.reverse();
        reordered.db.reverse();
        reordered.pb.reverse();
        let a = DesignSpace::generate(&config).unwrap();
        let b = DesignSpace::generate(&reordered).unwrap();
        assert_eq!(a.len(), b.len());
        assert_eq!(keys(&a), keys(&b));
    }

    #[test]
    fn assuming_discounting_never_adds_designs() {
        let mut config = small_config();
        let with = DesignSpace::generate(&config).unwrap();
        config.assume_discounting = false;
        let without = DesignSpace::generate(&config).unwrap();
        assert!(with.len() <= without.len());
        assert!(keys(&with).is_subset(&keys(&without)));
    }

    #[test]
    fn ratio_parameterisation_scales_by_rb() {
        let config = DesignSpaceConfig {
            ra: Vec::new(),
            rb: vec![100.0, 1_000.0],
            db: vec![30.0],
            ra_over_rb: vec![0.25, 0.5],
            ..DesignSpaceConfig::default()
        };
        let space = DesignSpace::generate(&config).unwrap();
        let rewards: HashSet<(u64, u64)> = space
            .designs()
            .iter()
            .map(|design| (design.a.reward as u64, design.b.reward as u64))
            .collect();
        assert_eq!(
            rewards,
            HashSet::from([(25, 100), (50, 100), (250, 1_000), (500, 1_000)])
        );
    }

    #[test]
    fn invalid_lists_are_rejected() {
        let both = DesignSpaceConfig {
            ra_over_rb: vec![0.5],
            ..DesignSpaceConfig::default()
        };
        assert_eq!(both.validate().unwrap_err().field(), "design_space.ra");

        let neither = DesignSpaceConfig {
            ra: Vec::new(),
            ..DesignSpaceConfig::default()
        };
        assert_eq!(neither.validate().unwrap_err().field(), "design_space.ra");

        let bad_prob = DesignSpaceConfig {
            pb: vec![1.5],
            ..DesignSpaceConfig::default()
        };
        assert_eq!(bad_prob.validate().unwrap_err().field(), "design_space.pb");

        let negative_delay = DesignSpaceConfig {
            da: vec![-1.0],
            ..DesignSpaceConfig::default()
        };
        assert_eq!(negative_delay.validate().unwrap_err().field(), "design_space.da");

        let negative_later_delay = DesignSpaceConfig {
            db: vec![7.0, -30.0],
            ..DesignSpaceConfig::default()
        };
        assert_eq!(negative_later_delay.validate().unwrap_err().field(), "design_space.db");

        let ratio_above_one = DesignSpaceConfig {
            ra: Vec::new(),
            ra_over_rb: vec![0.5, 1.5],
            ..DesignSpaceConfig::default()
        };
        assert_eq!(ratio_above_one.validate().unwrap_err().field(), "design_space.ra_over_rb");

        let negative_ratio = DesignSpaceConfig {
            ra: Vec::new(),
            ra_over_rb: vec![-0.1],
            ..DesignSpaceConfig::default()
        };
        assert_eq!(negative_ratio.validate().unwrap_err().field(), "design_space.ra_over_rb");

        let nan = DesignSpaceConfig {
            rb: vec![f64::NAN],
            ..DesignSpaceConfig::default()
        };
        assert_eq!(nan.validate().unwrap_err().field(), "design_space.rb");
    }

    #[test]
    fn empty_space_is_not_an_error() {
        let config = DesignSpaceConfig {
            da: vec![100.0],
            db: vec![1.0],
            ..DesignSpaceConfig::default()
        };
        let space = DesignSpace::generate(&config).unwrap();
        assert!(space.is_empty());
    }
}

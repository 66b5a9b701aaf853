//! Univariate prior distributions over free parameters.

use std::f64::consts::{FRAC_2_PI, LN_2};

use rand::Rng;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, ContinuousCDF, Normal, Uniform};

use crate::error::ValidationError;

/// Prior family and its parameters.
///
/// Priors are plain data so they can be carried in configuration files and
/// snapshots; [`Prior::density`] validates them and builds the `statrs`
/// distribution used for evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum Prior {
    Normal { mean: f64, sd: f64 },
    /// Normal(0, scale) folded onto the non-negative half line.
    HalfNormal { scale: f64 },
    Uniform { low: f64, high: f64 },
}

impl Prior {
    pub const fn normal(mean: f64, sd: f64) -> Self {
        Prior::Normal { mean, sd }
    }

    pub const fn half_normal(scale: f64) -> Self {
        Prior::HalfNormal { scale }
    }

    pub const fn uniform(low: f64, high: f64) -> Self {
        Prior::Uniform { low, high }
    }

    pub fn density(&self, name: &str) -> Result<PriorDensity, ValidationError> {
        let field = format!("priors.{name}");
        match *self {
            Prior::Normal { mean, sd } => {
                if !mean.is_finite() || !sd.is_finite() || sd <= 0.0 {
                    return Err(ValidationError::invalid(
                        field,
                        format!("normal prior needs a finite mean and sd > 0 (got {mean}, {sd})"),
                    ));
                }
                Normal::new(mean, sd)
                    .map(|dist| PriorDensity::Normal { dist, mean })
                    .map_err(|err| ValidationError::invalid(field, err.to_string()))
            }
            Prior::HalfNormal { scale } => {
                if !scale.is_finite() || scale <= 0.0 {
                    return Err(ValidationError::invalid(
                        field,
                        format!("half-normal prior needs a finite scale > 0 (got {scale})"),
                    ));
                }
                Normal::new(0.0, scale)
                    .map(|dist| PriorDensity::HalfNormal { dist, scale })
                    .map_err(|err| ValidationError::invalid(field, err.to_string()))
            }
            Prior::Uniform { low, high } => {
                if !low.is_finite() || !high.is_finite() || low >= high {
                    return Err(ValidationError::invalid(
                        field,
                        format!("uniform prior needs finite bounds with low < high (got {low}, {high})"),
                    ));
                }
                Uniform::new(low, high)
                    .map(|dist| PriorDensity::Uniform { dist, low, high })
                    .map_err(|err| ValidationError::invalid(field, err.to_string()))
            }
        }
    }
}

/// Validated, ready-to-evaluate prior.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriorDensity {
    Normal { dist: Normal, mean: f64 },
    HalfNormal { dist: Normal, scale: f64 },
    Uniform { dist: Uniform, low: f64, high: f64 },
}

impl PriorDensity {
    /// Log density at `x`; `-inf` outside the support or for non-finite input.
    pub fn ln_pdf(&self, x: f64) -> f64 {
        if !x.is_finite() {
            return f64::NEG_INFINITY;
        }
        match self {
            PriorDensity::Normal { dist, .. } => dist.ln_pdf(x),
            PriorDensity::HalfNormal { dist, .. } => {
                if x < 0.0 {
                    f64::NEG_INFINITY
                } else {
                    LN_2 + dist.ln_pdf(x)
                }
            }
            PriorDensity::Uniform { low, high, .. } => {
                if x < *low || x > *high {
                    f64::NEG_INFINITY
                } else {
                    -(high - low).ln()
                }
            }
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        use rand::distributions::Distribution;
        match self {
            PriorDensity::Normal { dist, .. } => dist.sample(rng),
            PriorDensity::HalfNormal { dist, .. } => dist.sample(rng).abs(),
            PriorDensity::Uniform { dist, .. } => dist.sample(rng),
        }
    }

    pub fn mean(&self) -> f64 {
        match *self {
            PriorDensity::Normal { mean, .. } => mean,
            PriorDensity::HalfNormal { scale, .. } => scale * FRAC_2_PI.sqrt(),
            PriorDensity::Uniform { low, high, .. } => 0.5 * (low + high),
        }
    }

    /// Inverse CDF at probability `p` in [0, 1].
    pub fn quantile(&self, p: f64) -> f64 {
        let p = p.clamp(0.0, 1.0);
        match self {
            PriorDensity::Normal { dist, .. } => dist.inverse_cdf(p),
            PriorDensity::HalfNormal { dist, .. } => dist.inverse_cdf(0.5 * (1.0 + p)),
            PriorDensity::Uniform { low, high, .. } => low + p * (high - low),
        }
    }

    pub fn in_support(&self, x: f64) -> bool {
        self.ln_pdf(x) > f64::NEG_INFINITY
    }
}

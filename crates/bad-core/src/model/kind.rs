//! Catalogue of binary-choice models and the contract they satisfy.

use std::collections::BTreeMap;
use std::f64::consts::FRAC_1_SQRT_2;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use statrs::function::erf::erfc;

use super::prior::Prior;
use crate::design::{Design, Prospect};
use crate::error::ValidationError;

/// Default lapse rate: the choice probability never leaves [ε, 1 - ε].
pub const DEFAULT_EPSILON: f64 = 0.01;

/// ln(1/365): a one-year half-life for hyperbolic discounting.
fn logk_prior_mean() -> f64 {
    (1.0f64 / 365.0).ln()
}

/// Contract between the inference core and a concrete choice model.
///
/// `p_chose_b` receives one particle row in [`ChoiceModel::parameter_names`]
/// order; batching and broadcasting are handled by the caller.
pub trait ChoiceModel {
    fn parameter_names(&self) -> &'static [&'static str];

    fn default_priors(&self) -> Vec<(&'static str, Prior)>;

    /// Probability that the participant chooses prospect B.
    fn p_chose_b(&self, theta: &[f64], fixed: &FixedParams, design: &Design) -> f64;
}

/// Non-random parameters baked into the response function.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedParams {
    pub epsilon: f64,
}

impl Default for FixedParams {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
        }
    }
}

impl FixedParams {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.epsilon.is_finite() || !(0.0..0.5).contains(&self.epsilon) {
            return Err(ValidationError::invalid(
                "fixed.epsilon",
                format!("epsilon must lie in [0, 0.5) (got {})", self.epsilon),
            ));
        }
        Ok(())
    }

    pub fn entries(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([("epsilon".to_string(), self.epsilon)])
    }
}

/// Supported choice models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Hyperbolic,
    Exponential,
    HyperbolicMagnitudeEffect,
    ExponentialMagnitudeEffect,
    MyersonHyperboloid,
    RiskyHyperbolic,
    MultiplicativeHyperbolic,
}

impl ModelKind {
    pub const ALL: [ModelKind; 7] = [
        ModelKind::Hyperbolic,
        ModelKind::Exponential,
        ModelKind::HyperbolicMagnitudeEffect,
        ModelKind::ExponentialMagnitudeEffect,
        ModelKind::MyersonHyperboloid,
        ModelKind::RiskyHyperbolic,
        ModelKind::MultiplicativeHyperbolic,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Hyperbolic => "hyperbolic",
            ModelKind::Exponential => "exponential",
            ModelKind::HyperbolicMagnitudeEffect => "hyperbolic_magnitude_effect",
            ModelKind::ExponentialMagnitudeEffect => "exponential_magnitude_effect",
            ModelKind::MyersonHyperboloid => "myerson_hyperboloid",
            ModelKind::RiskyHyperbolic => "risky_hyperbolic",
            ModelKind::MultiplicativeHyperbolic => "multiplicative_hyperbolic",
        }
    }

    /// Subjective value of a single prospect under particle `theta`.
    fn present_value(&self, theta: &[f64], prospect: &Prospect) -> f64 {
        match self {
            ModelKind::Hyperbolic => prospect.reward * hyperbolic(theta[0].exp(), prospect.delay),
            ModelKind::Exponential => prospect.reward * exponential(theta[0].exp(), prospect.delay),
            ModelKind::HyperbolicMagnitudeEffect | ModelKind::ExponentialMagnitudeEffect => {
                if prospect.reward <= 0.0 {
                    return 0.0;
                }
                // log k is linear in log reward: larger rewards are discounted less.
                let k = (theta[0] * prospect.reward.ln() + theta[1]).exp();
                let discount = if *self == ModelKind::HyperbolicMagnitudeEffect {
                    hyperbolic(k, prospect.delay)
                } else {
                    exponential(k, prospect.delay)
                };
                prospect.reward * discount
            }
            ModelKind::MyersonHyperboloid => {
                prospect.reward * hyperbolic(theta[0].exp(), prospect.delay).powf(theta[1])
            }
            ModelKind::RiskyHyperbolic => {
                prospect.reward * hyperbolic(theta[0].exp(), prospect.odds_against())
            }
            ModelKind::MultiplicativeHyperbolic => {
                prospect.reward
                    * hyperbolic(theta[0].exp(), prospect.delay)
                    * hyperbolic(theta[1].exp(), prospect.odds_against())
            }
        }
    }

    /// Decision variable `V_B - V_A`.
    pub fn decision_variable(&self, theta: &[f64], design: &Design) -> f64 {
        self.present_value(theta, &design.b) - self.present_value(theta, &design.a)
    }
}

impl ChoiceModel for ModelKind {
    fn parameter_names(&self) -> &'static [&'static str] {
        match self {
            ModelKind::Hyperbolic | ModelKind::Exponential => &["logk", "alpha"],
            ModelKind::HyperbolicMagnitudeEffect | ModelKind::ExponentialMagnitudeEffect => {
                &["m", "c", "alpha"]
            }
            ModelKind::MyersonHyperboloid => &["logk", "s", "alpha"],
            ModelKind::RiskyHyperbolic => &["logh", "alpha"],
            ModelKind::MultiplicativeHyperbolic => &["logk", "logh", "alpha"],
        }
    }

    fn default_priors(&self) -> Vec<(&'static str, Prior)> {
        let logk = ("logk", Prior::normal(logk_prior_mean(), 2.0));
        let logh = ("logh", Prior::normal(0.0, 1.0));
        let alpha = ("alpha", Prior::half_normal(2.0));
        match self {
            ModelKind::Hyperbolic | ModelKind::Exponential => vec![logk, alpha],
            ModelKind::HyperbolicMagnitudeEffect | ModelKind::ExponentialMagnitudeEffect => vec![
                ("m", Prior::normal(-2.43, 2.0)),
                ("c", Prior::normal(0.0, 100.0)),
                alpha,
            ],
            ModelKind::MyersonHyperboloid => vec![logk, ("s", Prior::half_normal(2.0)), alpha],
            ModelKind::RiskyHyperbolic => vec![logh, alpha],
            ModelKind::MultiplicativeHyperbolic => {
                vec![logk, logh, ("alpha", Prior::half_normal(3.0))]
            }
        }
    }

    fn p_chose_b(&self, theta: &[f64], fixed: &FixedParams, design: &Design) -> f64 {
        let alpha = theta[theta.len() - 1];
        psychometric(self.decision_variable(theta, design), alpha, fixed.epsilon)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| ValidationError::invalid("model.kind", format!("unknown model '{s}'")))
    }
}

/// `1 / (1 + rate * x)`; an immediate or certain prospect is never discounted,
/// even at an infinite rate.
fn hyperbolic(rate: f64, x: f64) -> f64 {
    if x == 0.0 {
        return 1.0;
    }
    1.0 / (1.0 + rate * x)
}

fn exponential(rate: f64, x: f64) -> f64 {
    if x == 0.0 {
        return 1.0;
    }
    (-rate * x).exp()
}

/// `ε + (1 - 2ε) Φ(dv / α)`.
fn psychometric(decision_variable: f64, alpha: f64, epsilon: f64) -> f64 {
    let z = decision_variable / alpha;
    let phi = if z.is_nan() {
        0.5
    } else {
        0.5 * erfc(-z * FRAC_1_SQRT_2)
    };
    epsilon + (1.0 - 2.0 * epsilon) * phi
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delayed(ra: f64, rb: f64, db: f64) -> Design {
        Design::new(Prospect::new(ra, 0.0, 1.0), Prospect::new(rb, db, 1.0))
    }

    #[test]
    fn indifference_gives_even_odds() {
        // k = 1/30 halves a reward delayed by 30 days.
        let theta = [(1.0f64 / 30.0).ln(), 1.0];
        let design = delayed(50.0, 100.0, 30.0);
        let p = ModelKind::Hyperbolic.p_chose_b(&theta, &FixedParams::default(), &design);
        assert!((p - 0.5).abs() < 1e-9, "p = {p}");
    }

    #[test]
    fn probabilities_respect_lapse_bounds() {
        let fixed = FixedParams::default();
        for kind in ModelKind::ALL {
            let theta: Vec<f64> = kind
                .default_priors()
                .iter()
                .map(|(_, prior)| match prior {
                    Prior::Normal { mean, .. } => *mean,
                    Prior::HalfNormal { scale } => *scale,
                    Prior::Uniform { low, high } => 0.5 * (low + high),
                })
                .collect();
            assert_eq!(theta.len(), kind.parameter_names().len());
            for design in [delayed(0.0, 100.0, 1.0), delayed(99.0, 100.0, 3650.0)] {
                let p = kind.p_chose_b(&theta, &fixed, &design);
                assert!(
                    p >= fixed.epsilon - 1e-12 && p <= 1.0 - fixed.epsilon + 1e-12,
                    "{kind}: {p}"
                );
            }
        }
    }

    #[test]
    fn steeper_discounting_favours_the_sooner_option() {
        let fixed = FixedParams::default();
        let design = delayed(60.0, 100.0, 180.0);
        let patient = ModelKind::Hyperbolic.p_chose_b(&[-8.0, 2.0], &fixed, &design);
        let impulsive = ModelKind::Hyperbolic.p_chose_b(&[-1.0, 2.0], &fixed, &design);
        assert!(patient > impulsive);
    }

    #[test]
    fn risky_model_ignores_delay() {
        let fixed = FixedParams::default();
        let near = Design::new(Prospect::new(40.0, 0.0, 1.0), Prospect::new(100.0, 0.0, 0.5));
        let far = Design::new(Prospect::new(40.0, 0.0, 1.0), Prospect::new(100.0, 365.0, 0.5));
        let theta = [0.0, 1.0];
        let a = ModelKind::RiskyHyperbolic.p_chose_b(&theta, &fixed, &near);
        let b = ModelKind::RiskyHyperbolic.p_chose_b(&theta, &fixed, &far);
        assert!((a - b).abs() < 1e-12);
    }

    #[test]
    fn magnitude_effect_discounts_large_rewards_less() {
        let fixed = FixedParams::default();
        let theta = [-0.5, -1.0, 1.0];
        for kind in [
            ModelKind::HyperbolicMagnitudeEffect,
            ModelKind::ExponentialMagnitudeEffect,
        ] {
            let small = kind.decision_variable(&theta, &delayed(5.0, 10.0, 30.0)) / 10.0;
            let large = kind.decision_variable(&theta, &delayed(500.0, 1_000.0, 30.0)) / 1_000.0;
            assert!(large > small, "{kind}: {small} vs {large}");
            let p = kind.p_chose_b(&theta, &fixed, &delayed(0.0, 100.0, 30.0));
            assert!(p > 0.5, "{kind}: {p}");
        }
    }

    #[test]
    fn exponential_magnitude_effect_matches_its_closed_form() {
        let (m, c) = (-0.5f64, -1.0f64);
        let design = delayed(40.0, 100.0, 30.0);
        let k_b = (m * 100.0f64.ln() + c).exp();
        let expected = 100.0 * (-k_b * 30.0).exp() - 40.0;
        let dv = ModelKind::ExponentialMagnitudeEffect.decision_variable(&[m, c, 1.0], &design);
        assert!((dv - expected).abs() < 1e-9, "{dv} vs {expected}");
    }

    #[test]
    fn immediate_rewards_are_undiscounted_at_extreme_rates() {
        let immediate = delayed(40.0, 100.0, 0.0);
        for kind in [
            ModelKind::Hyperbolic,
            ModelKind::Exponential,
            ModelKind::MyersonHyperboloid,
        ] {
            let dv = kind.decision_variable(&[800.0, 1.0, 1.0], &immediate);
            assert_eq!(dv, 60.0, "{kind}");
        }
        let certain = Design::new(Prospect::new(40.0, 0.0, 1.0), Prospect::new(100.0, 0.0, 1.0));
        let dv = ModelKind::RiskyHyperbolic.decision_variable(&[800.0, 1.0], &certain);
        assert_eq!(dv, 60.0);
        let p = ModelKind::Hyperbolic.p_chose_b(&[800.0, 1.0], &FixedParams::default(), &immediate);
        assert!(p.is_finite() && p > 0.5);
    }

    #[test]
    fn model_names_round_trip() {
        for kind in ModelKind::ALL {
            assert_eq!(kind.as_str().parse::<ModelKind>().unwrap(), kind);
        }
        assert!("hyperbolicc".parse::<ModelKind>().is_err());
    }
}

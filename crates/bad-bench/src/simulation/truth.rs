use bad_core::model::{Model, Particles};
use bad_core::{BadError, BadResult};
use rand::Rng;

use crate::config::TruthConfig;

/// One-row parameter table a simulated participant answers from.
pub fn draw_truth<R: Rng + ?Sized>(
    truth: &TruthConfig,
    model: &Model,
    rng: &mut R,
) -> BadResult<Particles> {
    let names = model.parameter_names().to_vec();
    match truth {
        TruthConfig::PriorMean => Ok(model.prior_means()),
        TruthConfig::PriorSample => {
            let row = model
                .priors()
                .iter()
                .map(|prior| prior.density().sample(&mut *rng))
                .collect();
            Particles::single(names, row)
        }
        TruthConfig::Fixed { values } => {
            let row = names
                .iter()
                .map(|name| {
                    values
                        .get(name)
                        .copied()
                        .ok_or_else(|| BadError::UnknownParameter { name: name.clone() })
                })
                .collect::<BadResult<Vec<f64>>>()?;
            Particles::single(names, row)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bad_core::model::{ModelConfig, ModelKind};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::BTreeMap;

    fn model() -> Model {
        let mut rng = StdRng::seed_from_u64(5);
        Model::new(ModelConfig::new(ModelKind::Hyperbolic).with_particles(50), &mut rng).unwrap()
    }

    #[test]
    fn fixed_truth_follows_parameter_order() {
        let model = model();
        let values = BTreeMap::from([("alpha".to_string(), 2.0), ("logk".to_string(), -4.0)]);
        let mut rng = StdRng::seed_from_u64(1);
        let truth = draw_truth(&TruthConfig::Fixed { values }, &model, &mut rng).unwrap();
        assert_eq!(truth.len(), 1);
        assert_eq!(truth.row(0), &[-4.0, 2.0]);
    }

    #[test]
    fn prior_samples_stay_in_support() {
        let model = model();
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..20 {
            let truth = draw_truth(&TruthConfig::PriorSample, &model, &mut rng).unwrap();
            assert!(truth.row(0)[1] > 0.0);
        }
    }

    #[test]
    fn missing_fixed_value_is_an_unknown_parameter() {
        let model = model();
        let values = BTreeMap::from([("logk".to_string(), -4.0)]);
        let mut rng = StdRng::seed_from_u64(1);
        let err = draw_truth(&TruthConfig::Fixed { values }, &model, &mut rng).unwrap_err();
        assert!(matches!(err, BadError::UnknownParameter { name } if name == "alpha"));
    }
}

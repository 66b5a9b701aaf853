//! Weighted particle populations over the free parameters of a model.

use rand::Rng;

use crate::error::{BadError, BadResult};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Ordered table of parameter hypotheses, one row per particle.
///
/// Values are stored row-major so each particle is a contiguous slice in the
/// declared parameter order. Weights are normalised to sum to one; a fresh or
/// freshly resampled population is uniformly weighted.
#[derive(Debug, Clone, PartialEq)]
pub struct Particles {
    names: Vec<String>,
    values: Vec<f64>,
    weights: Vec<f64>,
    absorbed_trials: usize,
}

impl Particles {
    /// Builds a uniformly weighted population from row-major values.
    pub fn from_values(names: Vec<String>, values: Vec<f64>) -> BadResult<Self> {
        let width = names.len();
        if width == 0 || values.len() % width != 0 {
            return Err(BadError::ColumnMismatch {
                expected: names,
                found: vec![format!("{} values", values.len())],
            });
        }
        Ok(Self::uniform(names, values))
    }

    /// Unchecked variant of [`Particles::from_values`] for tables built in-crate.
    pub(crate) fn uniform(names: Vec<String>, values: Vec<f64>) -> Self {
        debug_assert!(!names.is_empty() && values.len() % names.len() == 0);
        let rows = values.len() / names.len().max(1);
        Self {
            names,
            values,
            weights: vec![1.0 / rows.max(1) as f64; rows],
            absorbed_trials: 0,
        }
    }

    /// One-row table over the same columns, e.g. a point estimate.
    pub(crate) fn project<F: Fn(usize) -> f64>(&self, f: F) -> Self {
        let values = (0..self.width()).map(f).collect();
        Self::uniform(self.names.clone(), values)
    }

    pub fn from_rows(names: Vec<String>, rows: &[Vec<f64>]) -> BadResult<Self> {
        let width = names.len();
        if let Some(bad) = rows.iter().find(|row| row.len() != width) {
            return Err(BadError::ColumnMismatch {
                expected: names,
                found: vec![format!("row of {} values", bad.len())],
            });
        }
        let values = rows.iter().flatten().copied().collect();
        Self::from_values(names, values)
    }

    /// Single-row table, e.g. a point estimate or a set of true parameters.
    pub fn single(names: Vec<String>, row: Vec<f64>) -> BadResult<Self> {
        Self::from_rows(names, &[row])
    }

    pub(crate) fn with_weights(mut self, weights: Vec<f64>, absorbed_trials: usize) -> Self {
        debug_assert_eq!(weights.len(), self.len());
        self.weights = weights;
        self.absorbed_trials = absorbed_trials;
        self
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn width(&self) -> usize {
        self.names.len()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Number of trials already reflected in this population.
    pub fn absorbed_trials(&self) -> usize {
        self.absorbed_trials
    }

    pub fn row(&self, index: usize) -> &[f64] {
        let width = self.width();
        &self.values[index * width..(index + 1) * width]
    }

    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[f64]> {
        self.values.chunks_exact(self.width())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|candidate| candidate == name)
    }

    pub fn column(&self, index: usize) -> impl Iterator<Item = f64> + '_ {
        self.values
            .iter()
            .skip(index)
            .step_by(self.width())
            .copied()
    }

    pub fn all_finite(&self) -> bool {
        self.values.iter().all(|value| value.is_finite())
    }

    /// Effective sample size, `1 / Σ w²`.
    pub fn effective_sample_size(&self) -> f64 {
        let sum_sq: f64 = self.weights.iter().map(|w| w * w).sum();
        if sum_sq > 0.0 { 1.0 / sum_sq } else { 0.0 }
    }

    pub fn weighted_mean(&self, column: usize) -> f64 {
        self.column(column)
            .zip(&self.weights)
            .map(|(value, weight)| value * weight)
            .sum()
    }

    /// Weighted maximum-likelihood standard deviation of a column.
    pub fn weighted_std_dev(&self, column: usize) -> f64 {
        let mean = self.weighted_mean(column);
        let variance: f64 = self
            .column(column)
            .zip(&self.weights)
            .map(|(value, weight)| weight * (value - mean).powi(2))
            .sum();
        variance.max(0.0).sqrt()
    }

    /// Weighted quantile using the inverse of the empirical CDF.
    pub fn weighted_quantile(&self, column: usize, q: f64) -> f64 {
        let mut pairs: Vec<(f64, f64)> = self
            .column(column)
            .zip(self.weights.iter().copied())
            .filter(|(_, weight)| *weight > 0.0)
            .collect();
        if pairs.is_empty() {
            return f64::NAN;
        }
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let total: f64 = pairs.iter().map(|(_, weight)| weight).sum();
        let target = q.clamp(0.0, 1.0) * total;
        let mut cumulative = 0.0;
        for (index, (value, weight)) in pairs.iter().enumerate() {
            cumulative += weight;
            if cumulative >= target {
                // Average across an exact split so equally weighted even-sized
                // populations report the conventional median.
                if (cumulative - target).abs() <= f64::EPSILON * total {
                    if let Some((next, _)) = pairs.get(index + 1) {
                        return 0.5 * (value + next);
                    }
                }
                return *value;
            }
        }
        pairs[pairs.len() - 1].0
    }

    /// Copies the given rows into a new, uniformly weighted population.
    pub(crate) fn select(&self, indices: &[usize], absorbed_trials: usize) -> Self {
        let mut values = Vec::with_capacity(indices.len() * self.width());
        for &index in indices {
            values.extend_from_slice(self.row(index));
        }
        let count = indices.len();
        Self {
            names: self.names.clone(),
            values,
            weights: vec![1.0 / count.max(1) as f64; count],
            absorbed_trials,
        }
    }

    /// Systematic resample to `count` equally weighted particles.
    pub fn resample<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Self {
        let indices = systematic_indices(&self.weights, count, rng);
        self.select(&indices, self.absorbed_trials)
    }
}

/// Systematic resampling indices; zero-weight entries are never selected.
pub(crate) fn systematic_indices<R: Rng + ?Sized>(
    weights: &[f64],
    count: usize,
    rng: &mut R,
) -> Vec<usize> {
    let Some(last_positive) = weights.iter().rposition(|weight| *weight > 0.0) else {
        return Vec::new();
    };
    if count == 0 {
        return Vec::new();
    }

    let step = 1.0 / count as f64;
    let mut position = rng.gen_range(0.0..step);
    let mut index = 0usize;
    let mut cumulative = weights[0];
    let mut selected = Vec::with_capacity(count);

    for _ in 0..count {
        while position >= cumulative && index < last_positive {
            index += 1;
            cumulative += weights[index];
        }
        selected.push(index);
        position += step;
    }
    selected
}

/// Applies `f` to every particle row, in parallel when the feature is enabled.
pub(crate) fn map_rows<F>(particles: &Particles, f: F) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64 + Sync + Send,
{
    #[cfg(feature = "parallel")]
    {
        particles
            .values
            .par_chunks_exact(particles.width())
            .map(f)
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        particles.rows().map(f).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn names() -> Vec<String> {
        vec!["logk".to_string(), "alpha".to_string()]
    }

    #[test]
    fn rows_and_columns_follow_declared_order() {
        let table = Particles::from_rows(names(), &[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.row(1), &[3.0, 4.0]);
        assert_eq!(table.column(1).collect::<Vec<_>>(), vec![2.0, 4.0]);
        assert_eq!(table.column_index("alpha"), Some(1));
        assert!((table.effective_sample_size() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = Particles::from_rows(names(), &[vec![1.0]]).unwrap_err();
        assert!(matches!(err, BadError::ColumnMismatch { .. }));
    }

    #[test]
    fn median_of_even_population_averages_middle_values() {
        let rows: Vec<Vec<f64>> = [4.0, 1.0, 3.0, 2.0].iter().map(|v| vec![*v, 0.0]).collect();
        let table = Particles::from_rows(names(), &rows).unwrap();
        assert!((table.weighted_quantile(0, 0.5) - 2.5).abs() < 1e-12);
        assert!((table.weighted_mean(0) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn zero_weight_particles_are_never_resampled() {
        let rows = vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![2.0, 2.0]];
        let table = Particles::from_rows(names(), &rows)
            .unwrap()
            .with_weights(vec![0.0, 1.0, 0.0], 0);
        let mut rng = SmallRng::seed_from_u64(9);
        let resampled = table.resample(50, &mut rng);
        assert_eq!(resampled.len(), 50);
        assert!(resampled.column(0).all(|value| value == 1.0));
        assert!((resampled.weighted_quantile(0, 0.5) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn systematic_resampling_tracks_weights() {
        let weights = [0.1, 0.6, 0.3];
        let mut rng = SmallRng::seed_from_u64(1);
        let picks = systematic_indices(&weights, 1000, &mut rng);
        let ones = picks.iter().filter(|idx| **idx == 1).count();
        assert!((590..=610).contains(&ones), "picked {ones}");
    }
}

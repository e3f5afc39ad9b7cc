//! Squared-error gradient boosting.
//!
//! Starts from the target mean and adds one shrunken regression tree per
//! round, each fitted to the current residuals. Training predictions are
//! updated with [`RegressionTree::predict`] on the raw rows, the same path
//! used at serving time.

use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tree::{grow_tree, BinnedMatrix, RegressionTree, TreeParams};
use super::GbdtParams;
use crate::domain::error::{DelayError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedRegressor {
    pub base_score: f64,
    pub learning_rate: f64,
    pub n_features: usize,
    pub trees: Vec<RegressionTree>,
}

impl GradientBoostedRegressor {
    /// Fit on `rows` (all of equal width) against `targets`.
    pub fn fit(rows: &[Vec<f64>], targets: &[f64], params: &GbdtParams) -> Result<Self> {
        params.validate()?;
        if rows.is_empty() {
            return Err(DelayError::Training("no training rows".to_string()));
        }
        if rows.len() != targets.len() {
            return Err(DelayError::Training(format!(
                "{} rows but {} targets",
                rows.len(),
                targets.len()
            )));
        }
        let n_features = rows[0].len();
        if rows.iter().any(|row| row.len() != n_features) {
            return Err(DelayError::Training("rows have differing widths".to_string()));
        }
        if rows.iter().flatten().chain(targets).any(|v| !v.is_finite()) {
            return Err(DelayError::NonFinite);
        }

        let n = rows.len();
        let base_score = targets.iter().sum::<f64>() / n as f64;
        let matrix = BinnedMatrix::new(rows, n_features, params.max_bins);
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_leaf: params.min_samples_leaf,
            min_samples_split: params.min_samples_split,
        };
        let sample_size = ((n as f64 * params.subsample).round() as usize).clamp(1, n);
        let all_rows: Vec<usize> = (0..n).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);

        let mut predictions = vec![base_score; n];
        let mut residuals = vec![0.0; n];
        let mut trees = Vec::with_capacity(params.n_estimators);
        for round in 0..params.n_estimators {
            for ((residual, target), prediction) in
                residuals.iter_mut().zip(targets).zip(&predictions)
            {
                *residual = target - prediction;
            }
            let tree = if sample_size < n {
                let mut drawn = sample(&mut rng, n, sample_size).into_vec();
                drawn.sort_unstable();
                grow_tree(&matrix, &residuals, &drawn, tree_params)
            } else {
                grow_tree(&matrix, &residuals, &all_rows, tree_params)
            };
            for (prediction, row) in predictions.iter_mut().zip(rows) {
                *prediction += params.learning_rate * tree.predict(row);
            }
            debug!(round, nodes = tree.nodes.len(), "boosting round");
            trees.push(tree);
        }

        Ok(Self {
            base_score,
            learning_rate: params.learning_rate,
            n_features,
            trees,
        })
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let mut out = self.base_score;
        for tree in &self.trees {
            out += self.learning_rate * tree.predict(row);
        }
        out
    }

    pub fn predict(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|row| self.predict_row(row)).collect()
    }

    /// Structural checks for a model decoded from outside.
    pub fn validate(&self) -> Result<()> {
        if !self.base_score.is_finite() || !self.learning_rate.is_finite() {
            return Err(DelayError::InvalidArtifact(
                "model has non-finite parameters".to_string(),
            ));
        }
        self.trees
            .iter()
            .try_for_each(|tree| tree.validate(self.n_features))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RegressionMetrics;

    fn dataset() -> (Vec<Vec<f64>>, Vec<f64>) {
        let rows: Vec<Vec<f64>> = (0..60)
            .map(|i| vec![f64::from(i % 12), f64::from(i % 5)])
            .collect();
        let targets = rows
            .iter()
            .map(|r| 2.0 * r[0] + if r[1] > 2.0 { 10.0 } else { 0.0 })
            .collect();
        (rows, targets)
    }

    #[test]
    fn boosting_reduces_training_error() {
        let (rows, targets) = dataset();
        let params = GbdtParams {
            n_estimators: 50,
            ..GbdtParams::default()
        };
        let model = GradientBoostedRegressor::fit(&rows, &targets, &params).unwrap();
        assert_eq!(model.trees.len(), 50);

        let baseline = RegressionMetrics::compute(&targets, &vec![model.base_score; targets.len()]);
        let fitted = RegressionMetrics::compute(&targets, &model.predict(&rows));
        assert!(fitted.rmse < baseline.rmse / 10.0);
        model.validate().unwrap();
    }

    #[test]
    fn same_seed_same_model() {
        let (rows, targets) = dataset();
        let params = GbdtParams {
            n_estimators: 10,
            subsample: 0.7,
            ..GbdtParams::default()
        };
        let a = GradientBoostedRegressor::fit(&rows, &targets, &params).unwrap();
        let b = GradientBoostedRegressor::fit(&rows, &targets, &params).unwrap();
        assert_eq!(a, b);

        let c = GradientBoostedRegressor::fit(
            &rows,
            &targets,
            &GbdtParams {
                seed: 7,
                ..params
            },
        )
        .unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn rejects_bad_input() {
        let params = GbdtParams::default();
        assert!(matches!(
            GradientBoostedRegressor::fit(&[], &[], &params),
            Err(DelayError::Training(_))
        ));
        assert!(matches!(
            GradientBoostedRegressor::fit(&[vec![f64::NAN]], &[1.0], &params),
            Err(DelayError::NonFinite)
        ));
    }
}

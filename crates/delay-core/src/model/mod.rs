//! Gradient-boosted regression trees.

pub mod gbdt;
pub mod metrics;
pub mod tree;

use serde::{Deserialize, Serialize};

use crate::domain::error::{DelayError, Result};

pub use gbdt::GradientBoostedRegressor;
pub use metrics::RegressionMetrics;
pub use tree::{RegressionTree, TreeNode};

/// Boosting hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GbdtParams {
    /// Number of boosting rounds (trees).
    pub n_estimators: usize,
    pub max_depth: usize,
    /// Shrinkage applied to every tree's output.
    pub learning_rate: f64,
    pub min_samples_leaf: usize,
    pub min_samples_split: usize,
    /// Fraction of rows drawn per round, without replacement.
    pub subsample: f64,
    /// Upper bound on candidate thresholds per feature. Features with fewer
    /// distinct values are split exactly.
    pub max_bins: usize,
    pub seed: u64,
}

impl Default for GbdtParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 6,
            learning_rate: 0.1,
            min_samples_leaf: 1,
            min_samples_split: 2,
            subsample: 1.0,
            max_bins: 256,
            seed: 42,
        }
    }
}

impl GbdtParams {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(DelayError::InvalidConfig(msg.to_string()));
        if self.n_estimators == 0 {
            return invalid("n_estimators must be at least 1");
        }
        if self.max_depth == 0 {
            return invalid("max_depth must be at least 1");
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return invalid("learning_rate must be in (0, 1]");
        }
        if self.min_samples_leaf == 0 {
            return invalid("min_samples_leaf must be at least 1");
        }
        if self.min_samples_split < 2 {
            return invalid("min_samples_split must be at least 2");
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return invalid("subsample must be in (0, 1]");
        }
        if !(2..=usize::from(u16::MAX)).contains(&self.max_bins) {
            return invalid("max_bins must be in [2, 65535]");
        }
        Ok(())
    }
}

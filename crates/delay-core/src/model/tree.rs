//! CART regression trees on pre-binned features.
//!
//! Candidate thresholds come from [`FeatureBins`]: every distinct training
//! value when there are few enough, evenly spaced quantiles otherwise. A row
//! goes left when `x <= threshold`, both while fitting and when predicting.

use serde::{Deserialize, Serialize};

use crate::domain::error::{DelayError, Result};

/// Smallest variance reduction that justifies a split.
const MIN_GAIN: f64 = 1e-12;

/// One node of a flattened tree. Children always sit after their parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<TreeNode>,
}

impl RegressionTree {
    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], index: usize) -> usize {
            match &nodes[index] {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    /// Structural checks for a tree decoded from outside.
    pub fn validate(&self, n_features: usize) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(DelayError::InvalidArtifact("empty tree".to_string()));
        }
        for (i, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Leaf { value } if !value.is_finite() => {
                    return Err(DelayError::InvalidArtifact(format!(
                        "leaf {i} has a non-finite value"
                    )));
                }
                TreeNode::Leaf { .. } => {}
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let children_ok = *left > i
                        && *right > i
                        && *left < self.nodes.len()
                        && *right < self.nodes.len();
                    if *feature >= n_features || !threshold.is_finite() || !children_ok {
                        return Err(DelayError::InvalidArtifact(format!(
                            "split node {i} is malformed"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Candidate split thresholds for one feature, ascending.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FeatureBins {
    edges: Vec<f64>,
}

impl FeatureBins {
    pub(crate) fn fit(values: &[f64], max_bins: usize) -> Self {
        let mut distinct = values.to_vec();
        distinct.sort_by(f64::total_cmp);
        distinct.dedup();
        // The largest value never separates anything.
        distinct.pop();

        let max_edges = max_bins.saturating_sub(1).max(1);
        let edges = if distinct.len() <= max_edges {
            distinct
        } else {
            let mut picked: Vec<f64> = (1..=max_edges)
                .map(|k| distinct[k * distinct.len() / (max_edges + 1)])
                .collect();
            picked.dedup();
            picked
        };
        Self { edges }
    }

    /// Bin of `x`: bin `j` holds values in `(edges[j-1], edges[j]]`.
    pub(crate) fn bin(&self, x: f64) -> u16 {
        self.edges.partition_point(|&edge| edge < x) as u16
    }

    fn n_bins(&self) -> usize {
        self.edges.len() + 1
    }
}

/// Feature matrix binned column by column.
#[derive(Debug, Clone)]
pub(crate) struct BinnedMatrix {
    bins: Vec<FeatureBins>,
    /// `columns[feature][row]`
    columns: Vec<Vec<u16>>,
}

impl BinnedMatrix {
    pub(crate) fn new(rows: &[Vec<f64>], n_features: usize, max_bins: usize) -> Self {
        let mut bins = Vec::with_capacity(n_features);
        let mut columns = Vec::with_capacity(n_features);
        for feature in 0..n_features {
            let values: Vec<f64> = rows.iter().map(|row| row[feature]).collect();
            let fitted = FeatureBins::fit(&values, max_bins);
            columns.push(values.iter().map(|&x| fitted.bin(x)).collect());
            bins.push(fitted);
        }
        Self { bins, columns }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeParams {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub min_samples_split: usize,
}

struct BestSplit {
    feature: usize,
    edge: usize,
    gain: f64,
}

/// Grow one tree on `targets` over the rows listed in `sample`.
pub(crate) fn grow_tree(
    matrix: &BinnedMatrix,
    targets: &[f64],
    sample: &[usize],
    params: TreeParams,
) -> RegressionTree {
    let mut nodes = Vec::new();
    grow_node(matrix, targets, sample.to_vec(), 0, params, &mut nodes);
    RegressionTree { nodes }
}

fn grow_node(
    matrix: &BinnedMatrix,
    targets: &[f64],
    rows: Vec<usize>,
    depth: usize,
    params: TreeParams,
    nodes: &mut Vec<TreeNode>,
) -> usize {
    let index = nodes.len();
    let total: f64 = rows.iter().map(|&r| targets[r]).sum();
    let mean = if rows.is_empty() {
        0.0
    } else {
        total / rows.len() as f64
    };
    nodes.push(TreeNode::Leaf { value: mean });

    if depth >= params.max_depth || rows.len() < params.min_samples_split {
        return index;
    }
    let Some(best) = best_split(matrix, targets, &rows, total, params.min_samples_leaf) else {
        return index;
    };

    let column = &matrix.columns[best.feature];
    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
        .iter()
        .partition(|&&r| usize::from(column[r]) <= best.edge);

    let left = grow_node(matrix, targets, left_rows, depth + 1, params, nodes);
    let right = grow_node(matrix, targets, right_rows, depth + 1, params, nodes);
    nodes[index] = TreeNode::Split {
        feature: best.feature,
        threshold: matrix.bins[best.feature].edges[best.edge],
        left,
        right,
    };
    index
}

fn best_split(
    matrix: &BinnedMatrix,
    targets: &[f64],
    rows: &[usize],
    total: f64,
    min_leaf: usize,
) -> Option<BestSplit> {
    let n = rows.len();
    let parent_score = total * total / n as f64;
    let mut best: Option<BestSplit> = None;

    for (feature, bins) in matrix.bins.iter().enumerate() {
        if bins.edges.is_empty() {
            continue;
        }
        let column = &matrix.columns[feature];
        let mut sums = vec![0.0; bins.n_bins()];
        let mut counts = vec![0usize; bins.n_bins()];
        for &r in rows {
            let b = usize::from(column[r]);
            sums[b] += targets[r];
            counts[b] += 1;
        }

        let mut left_sum = 0.0;
        let mut left_count = 0;
        for edge in 0..bins.edges.len() {
            left_sum += sums[edge];
            left_count += counts[edge];
            let right_count = n - left_count;
            if left_count < min_leaf || right_count < min_leaf {
                continue;
            }
            let right_sum = total - left_sum;
            let gain = left_sum * left_sum / left_count as f64
                + right_sum * right_sum / right_count as f64
                - parent_score;
            if gain > MIN_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                best = Some(BestSplit {
                    feature,
                    edge,
                    gain,
                });
            }
        }
    }
    best
}

//! Regression trees and the two ensembles built from them.
//!
//! Both ensembles are fitted from scratch on every call. Bootstrap sampling
//! draws from a seeded generator, so identical data gives identical models.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use crate::error::EstimatorError;
use crate::stats::mean;

const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 3,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// CART regression tree minimising squared error.
#[derive(Debug, Clone)]
pub struct RegressionTree {
    root: Node,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    cost: f64,
}

/// Reject empty, ragged or non-finite training data.
fn validate(x: &[Vec<f64>], y: &[f64]) -> Result<usize, EstimatorError> {
    if x.is_empty() {
        return Err(EstimatorError::Failure("empty training set".into()));
    }
    if x.len() != y.len() {
        return Err(EstimatorError::Failure(format!(
            "{} feature rows but {} labels",
            x.len(),
            y.len()
        )));
    }
    let width = x[0].len();
    if width == 0 || x.iter().any(|row| row.len() != width) {
        return Err(EstimatorError::Failure("ragged feature matrix".into()));
    }
    if x.iter().flatten().chain(y).any(|v| !v.is_finite()) {
        return Err(EstimatorError::Failure("non-finite value in training data".into()));
    }
    Ok(width)
}

impl RegressionTree {
    pub fn fit(x: &[Vec<f64>], y: &[f64], params: TreeParams) -> Result<Self, EstimatorError> {
        validate(x, y)?;
        let indices: Vec<usize> = (0..x.len()).collect();
        Ok(Self::fit_indices(x, y, &indices, params))
    }

    /// Fit on a (possibly repeated) subset of already validated rows.
    fn fit_indices(x: &[Vec<f64>], y: &[f64], indices: &[usize], params: TreeParams) -> Self {
        Self {
            root: build(x, y, indices, 0, params),
        }
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = row.get(*feature).copied().unwrap_or(f64::NAN);
                    node = if value <= *threshold { left } else { right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn depth(node: &Node) -> usize {
            match node {
                Node::Leaf(_) => 0,
                Node::Split { left, right, .. } => 1 + depth(left).max(depth(right)),
            }
        }
        depth(&self.root)
    }
}

fn leaf_value(y: &[f64], indices: &[usize]) -> f64 {
    indices.iter().map(|&i| y[i]).sum::<f64>() / indices.len() as f64
}

fn build(x: &[Vec<f64>], y: &[f64], indices: &[usize], depth: usize, params: TreeParams) -> Node {
    let value = leaf_value(y, indices);
    if depth >= params.max_depth || indices.len() < params.min_samples_split {
        return Node::Leaf(value);
    }

    let parent_cost: f64 = indices.iter().map(|&i| (y[i] - value).powi(2)).sum();
    let Some(best) = best_split(x, y, indices, params.min_samples_leaf) else {
        return Node::Leaf(value);
    };
    if parent_cost - best.cost <= MIN_GAIN {
        return Node::Leaf(value);
    }

    let (left, right): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .copied()
        .partition(|&i| x[i][best.feature] <= best.threshold);
    trace!(
        feature = best.feature,
        threshold = best.threshold,
        left = left.len(),
        right = right.len(),
        "tree split"
    );

    Node::Split {
        feature: best.feature,
        threshold: best.threshold,
        left: Box::new(build(x, y, &left, depth + 1, params)),
        right: Box::new(build(x, y, &right, depth + 1, params)),
    }
}

/// Lowest summed squared error over every feature and midpoint threshold.
fn best_split(
    x: &[Vec<f64>],
    y: &[f64],
    indices: &[usize],
    min_leaf: usize,
) -> Option<SplitCandidate> {
    let width = x[indices[0]].len();
    let mut best: Option<SplitCandidate> = None;

    for feature in 0..width {
        let mut order = indices.to_vec();
        order.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));

        let total: f64 = order.iter().map(|&i| y[i]).sum();
        let total_sq: f64 = order.iter().map(|&i| y[i] * y[i]).sum();
        let n = order.len();

        let (mut left_sum, mut left_sq) = (0.0, 0.0);
        for split in 1..n {
            let prev = order[split - 1];
            left_sum += y[prev];
            left_sq += y[prev] * y[prev];

            let (lo, hi) = (x[prev][feature], x[order[split]][feature]);
            if hi <= lo || split < min_leaf || n - split < min_leaf {
                continue;
            }

            let left_n = split as f64;
            let right_n = (n - split) as f64;
            let right_sum = total - left_sum;
            let right_sq = total_sq - left_sq;
            let cost = (left_sq - left_sum * left_sum / left_n)
                + (right_sq - right_sum * right_sum / right_n);

            if best.as_ref().map_or(true, |b| cost < b.cost) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: (lo + hi) / 2.0,
                    cost,
                });
            }
        }
    }
    best
}

/// Bootstrap-aggregated regression trees.
#[derive(Debug, Clone)]
pub struct BaggedTrees {
    trees: Vec<RegressionTree>,
}

impl BaggedTrees {
    pub fn fit(
        x: &[Vec<f64>],
        y: &[f64],
        n_trees: usize,
        params: TreeParams,
        seed: u64,
    ) -> Result<Self, EstimatorError> {
        validate(x, y)?;
        if n_trees == 0 {
            return Err(EstimatorError::Failure("bagging needs at least one tree".into()));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let n = x.len();
        let trees = (0..n_trees)
            .map(|_| {
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit_indices(x, y, &sample, params)
            })
            .collect();
        Ok(Self { trees })
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        let predictions: Vec<f64> = self.trees.iter().map(|t| t.predict(row)).collect();
        mean(&predictions)
    }
}

/// Gradient-boosted regression trees with squared loss.
#[derive(Debug, Clone)]
pub struct BoostedTrees {
    base: f64,
    learning_rate: f64,
    stages: Vec<RegressionTree>,
}

impl BoostedTrees {
    pub fn fit(
        x: &[Vec<f64>],
        y: &[f64],
        rounds: usize,
        learning_rate: f64,
        params: TreeParams,
    ) -> Result<Self, EstimatorError> {
        validate(x, y)?;
        if rounds == 0 || !(learning_rate > 0.0) {
            return Err(EstimatorError::Failure(format!(
                "invalid boosting schedule: {rounds} rounds at rate {learning_rate}"
            )));
        }

        let base = mean(y);
        let mut fitted = vec![base; y.len()];
        let mut stages = Vec::with_capacity(rounds);
        for _ in 0..rounds {
            let residuals: Vec<f64> = y.iter().zip(&fitted).map(|(t, f)| t - f).collect();
            let tree = RegressionTree::fit(x, &residuals, params)?;
            for (row, f) in x.iter().zip(fitted.iter_mut()) {
                *f += learning_rate * tree.predict(row);
            }
            stages.push(tree);
        }

        Ok(Self {
            base,
            learning_rate,
            stages,
        })
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        self.base
            + self.learning_rate * self.stages.iter().map(|t| t.predict(row)).sum::<f64>()
    }
}

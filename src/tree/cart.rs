//! CART decision trees grown on binned features
//!
//! One grower serves both learners. What differs between a Gini classification
//! tree and a gradient regression tree is captured by [`SplitObjective`]: which
//! per-row statistics are accumulated, how a node's statistics are scored, and
//! what value a leaf stores.

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::ComputeError;
use crate::tree::binning::BinnedMatrix;

/// Minimum score improvement for a split to be kept
const MIN_GAIN: f64 = 1e-12;

/// Flat-arena tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: Vec<f64>,
    },
}

/// A fitted decision tree; node 0 is the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// Leaf value reached by a raw (unbinned) row
    pub fn leaf_value(&self, row: &[f64]) -> &[f64] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    /// Check a deserialized arena before it is walked: split features must be
    /// below `n_features`, children must come after their parent, and every
    /// leaf must hold `leaf_len` values
    pub fn validate(&self, n_features: usize, leaf_len: usize) -> Result<(), ComputeError> {
        if self.nodes.is_empty() {
            return Err(ComputeError::ShapeMismatch("tree has no nodes".into()));
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Split {
                    feature,
                    left,
                    right,
                    ..
                } => {
                    if *feature >= n_features {
                        return Err(ComputeError::ShapeMismatch(format!(
                            "node {} splits on feature {} but the model has {} features",
                            idx, feature, n_features
                        )));
                    }
                    let in_arena = |child: usize| child > idx && child < self.nodes.len();
                    if !in_arena(*left) || !in_arena(*right) {
                        return Err(ComputeError::ShapeMismatch(format!(
                            "node {} has children outside the tree",
                            idx
                        )));
                    }
                }
                Node::Leaf { value } if value.len() != leaf_len => {
                    return Err(ComputeError::ShapeMismatch(format!(
                        "leaf {} holds {} values, expected {}",
                        idx,
                        value.len(),
                        leaf_len
                    )));
                }
                Node::Leaf { .. } => {}
            }
        }
        Ok(())
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    /// Length of the longest root-to-leaf path
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }
}

/// Growth limits shared by both tree learners
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Candidate features per node; `None` means all features
    pub max_features: Option<usize>,
}

/// Per-node statistics and scoring for a tree learner
pub trait SplitObjective {
    /// Number of `f64` statistics accumulated per row
    fn width(&self) -> usize;

    /// Add the statistics of `row` into `out`
    fn accumulate(&self, row: usize, out: &mut [f64]);

    /// Sample weight represented by a statistics block
    fn count(&self, stats: &[f64]) -> f64;

    /// Node score; a split's gain is `score(left) + score(right) - score(parent)`
    fn score(&self, stats: &[f64]) -> f64;

    /// Whether no split can improve this node
    fn is_pure(&self, _stats: &[f64]) -> bool {
        false
    }

    fn leaf_value(&self, rows: &[usize], stats: &[f64]) -> Vec<f64>;
}

struct BestSplit {
    feature: usize,
    split: usize,
    gain: f64,
}

/// Grows one tree over a binned matrix
pub struct TreeGrower<'a, O: SplitObjective> {
    binned: &'a BinnedMatrix,
    objective: &'a O,
    params: TreeParams,
    nodes: Vec<Node>,
    features: Vec<usize>,
}

impl<'a, O: SplitObjective> TreeGrower<'a, O> {
    pub fn new(binned: &'a BinnedMatrix, objective: &'a O, params: TreeParams) -> Self {
        Self {
            binned,
            objective,
            params,
            nodes: Vec::new(),
            features: (0..binned.n_features()).collect(),
        }
    }

    /// Grow a tree from the given row indices (repeats act as sample weights)
    pub fn grow(
        mut self,
        rows: Vec<usize>,
        rng: &mut ChaCha8Rng,
    ) -> Result<Tree, ComputeError> {
        if rows.is_empty() {
            return Err(ComputeError::TrainingError(
                "cannot grow a tree from zero rows".into(),
            ));
        }
        self.grow_node(rows, 0, rng);
        Ok(Tree { nodes: self.nodes })
    }

    fn grow_node(&mut self, rows: Vec<usize>, depth: usize, rng: &mut ChaCha8Rng) -> usize {
        let stats = self.node_stats(&rows);

        let splittable = depth < self.params.max_depth
            && rows.len() >= self.params.min_samples_split
            && !self.objective.is_pure(&stats);

        let best = if splittable {
            self.find_best_split(&rows, &stats, rng)
        } else {
            None
        };

        let Some(best) = best else {
            let value = self.objective.leaf_value(&rows, &stats);
            self.nodes.push(Node::Leaf { value });
            return self.nodes.len() - 1;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| self.binned.bin(best.feature, r) <= best.split);

        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf { value: Vec::new() });
        let left = self.grow_node(left_rows, depth + 1, rng);
        let right = self.grow_node(right_rows, depth + 1, rng);
        self.nodes[idx] = Node::Split {
            feature: best.feature,
            threshold: self.binned.threshold(best.feature, best.split),
            left,
            right,
        };
        idx
    }

    fn node_stats(&self, rows: &[usize]) -> Vec<f64> {
        let mut stats = vec![0.0; self.objective.width()];
        for &r in rows {
            self.objective.accumulate(r, &mut stats);
        }
        stats
    }

    fn find_best_split(
        &mut self,
        rows: &[usize],
        parent: &[f64],
        rng: &mut ChaCha8Rng,
    ) -> Option<BestSplit> {
        let width = self.objective.width();
        let parent_score = self.objective.score(parent);
        let min_leaf = self.params.min_samples_leaf as f64;

        let candidates = match self.params.max_features {
            Some(k) if k < self.features.len() => {
                let (chosen, _) = self.features.partial_shuffle(rng, k);
                let mut chosen = chosen.to_vec();
                chosen.sort_unstable();
                chosen
            }
            _ => self.features.clone(),
        };

        let mut best: Option<BestSplit> = None;
        let mut left = vec![0.0; width];
        let mut right = vec![0.0; width];

        for feature in candidates {
            let n_bins = self.binned.n_bins(feature);
            if n_bins < 2 {
                continue;
            }

            let mut hist = vec![0.0; n_bins * width];
            for &r in rows {
                let b = self.binned.bin(feature, r);
                self.objective
                    .accumulate(r, &mut hist[b * width..(b + 1) * width]);
            }

            left.iter_mut().for_each(|v| *v = 0.0);
            for split in 0..n_bins - 1 {
                for (l, h) in left.iter_mut().zip(&hist[split * width..(split + 1) * width]) {
                    *l += h;
                }
                for ((r, p), l) in right.iter_mut().zip(parent).zip(&left) {
                    *r = p - l;
                }

                if self.objective.count(&left) < min_leaf
                    || self.objective.count(&right) < min_leaf
                {
                    continue;
                }

                let gain =
                    self.objective.score(&left) + self.objective.score(&right) - parent_score;
                if gain > MIN_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(BestSplit {
                        feature,
                        split,
                        gain,
                    });
                }
            }
        }

        best
    }
}

/// Gini classification objective over class counts
pub struct GiniObjective<'a> {
    labels: &'a [usize],
    n_classes: usize,
}

impl<'a> GiniObjective<'a> {
    pub fn new(labels: &'a [usize], n_classes: usize) -> Self {
        Self { labels, n_classes }
    }
}

impl SplitObjective for GiniObjective<'_> {
    fn width(&self) -> usize {
        self.n_classes
    }

    fn accumulate(&self, row: usize, out: &mut [f64]) {
        out[self.labels[row]] += 1.0;
    }

    fn count(&self, stats: &[f64]) -> f64 {
        stats.iter().sum()
    }

    /// `-n * gini(stats)`, so that gain is the weighted impurity decrease
    fn score(&self, stats: &[f64]) -> f64 {
        let n = self.count(stats);
        if n <= 0.0 {
            return 0.0;
        }
        stats.iter().map(|c| c * c).sum::<f64>() / n - n
    }

    fn is_pure(&self, stats: &[f64]) -> bool {
        stats.iter().filter(|&&c| c > 0.0).count() <= 1
    }

    /// Class frequency distribution
    fn leaf_value(&self, _rows: &[usize], stats: &[f64]) -> Vec<f64> {
        let n = self.count(stats);
        stats.iter().map(|c| c / n).collect()
    }
}

/// Least-squares objective on gradient residuals with a Newton leaf step.
///
/// Leaf value: `scale * Σ r / Σ h`, where `h` is the per-row hessian.
pub struct ResidualObjective<'a> {
    residuals: &'a [f64],
    hessians: &'a [f64],
    scale: f64,
}

impl<'a> ResidualObjective<'a> {
    pub fn new(residuals: &'a [f64], hessians: &'a [f64], scale: f64) -> Self {
        Self {
            residuals,
            hessians,
            scale,
        }
    }
}

impl SplitObjective for ResidualObjective<'_> {
    fn width(&self) -> usize {
        2
    }

    fn accumulate(&self, row: usize, out: &mut [f64]) {
        out[0] += self.residuals[row];
        out[1] += 1.0;
    }

    fn count(&self, stats: &[f64]) -> f64 {
        stats[1]
    }

    /// `(Σ r)² / n`, so that gain is the squared-error reduction
    fn score(&self, stats: &[f64]) -> f64 {
        if stats[1] <= 0.0 {
            return 0.0;
        }
        stats[0] * stats[0] / stats[1]
    }

    fn leaf_value(&self, rows: &[usize], stats: &[f64]) -> Vec<f64> {
        let denominator: f64 = rows.iter().map(|&r| self.hessians[r]).sum();
        if denominator.abs() < 1e-150 {
            return vec![0.0];
        }
        vec![self.scale * stats[0] / denominator]
    }
}

//! Multinomial gradient boosting
//!
//! Each stage fits one regression tree per class to the negative gradient of the
//! multinomial deviance (`y_k - p_k`) and takes a single Newton step in every
//! leaf. Scores start at the log class priors; probabilities are the softmax of
//! the accumulated scores.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classifier::{accuracy, argmax, check_rows, softmax, Dataset, ProbabilisticClassifier};
use crate::error::ComputeError;
use crate::tree::binning::BinnedMatrix;
use crate::tree::cart::{ResidualObjective, Tree, TreeGrower, TreeParams};
use crate::tree::DEFAULT_MAX_BINS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingConfig {
    pub n_stages: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_bins: usize,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            n_stages: 200,
            learning_rate: 0.1,
            max_depth: 7,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_bins: DEFAULT_MAX_BINS,
        }
    }
}

impl BoostingConfig {
    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.n_stages == 0 {
            return Err(ComputeError::InvalidConfig(
                "boosting.n_stages must be > 0".into(),
            ));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(ComputeError::InvalidConfig(format!(
                "boosting.learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.max_depth == 0 {
            return Err(ComputeError::InvalidConfig(
                "boosting.max_depth must be > 0".into(),
            ));
        }
        if self.min_samples_split < 2 || self.min_samples_leaf == 0 {
            return Err(ComputeError::InvalidConfig(
                "boosting.min_samples_split must be >= 2 and min_samples_leaf >= 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    config: BoostingConfig,
    seed: u64,
    n_features: usize,
    /// Log class priors
    init: Vec<f64>,
    /// `stages[s][k]` is the tree for class `k` at stage `s`
    stages: Vec<Vec<Tree>>,
}

impl GradientBoosting {
    pub fn new(config: BoostingConfig, seed: u64) -> Self {
        Self {
            config,
            seed,
            n_features: 0,
            init: Vec::new(),
            stages: Vec::new(),
        }
    }

    pub fn config(&self) -> &BoostingConfig {
        &self.config
    }

    pub fn n_stages(&self) -> usize {
        self.stages.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Check every stage of a restored model against the expected input width
    pub fn validate_structure(&self, n_features: usize) -> Result<(), ComputeError> {
        if self.stages.is_empty() {
            return Ok(());
        }
        if self.n_features != n_features {
            return Err(ComputeError::ShapeMismatch(format!(
                "gradient boosting was fitted on {} features, expected {}",
                self.n_features, n_features
            )));
        }
        for (s, stage) in self.stages.iter().enumerate() {
            if stage.len() != self.init.len() {
                return Err(ComputeError::ShapeMismatch(format!(
                    "boosting stage {} has {} trees for {} classes",
                    s,
                    stage.len(),
                    self.init.len()
                )));
            }
            for tree in stage {
                tree.validate(n_features, 1)?;
            }
        }
        Ok(())
    }

    fn raw_scores(&self, row: &[f64]) -> Vec<f64> {
        let mut scores = self.init.clone();
        for stage in &self.stages {
            for (score, tree) in scores.iter_mut().zip(stage) {
                *score += self.config.learning_rate * tree.leaf_value(row)[0];
            }
        }
        scores
    }
}

/// Log class priors, floored so an absent class stays finite
fn log_priors(labels: &[usize], n_classes: usize) -> Vec<f64> {
    let mut counts = vec![0.0; n_classes];
    for &l in labels {
        counts[l] += 1.0;
    }
    let n = labels.len() as f64;
    counts
        .into_iter()
        .map(|c| (c / n).max(f64::MIN_POSITIVE).ln())
        .collect()
}

impl ProbabilisticClassifier for GradientBoosting {
    fn name(&self) -> &'static str {
        "gradient_boosting"
    }

    fn fit(
        &mut self,
        train: Dataset<'_>,
        validation: Option<Dataset<'_>>,
    ) -> Result<(), ComputeError> {
        self.config.validate()?;

        let n = train.len();
        let k = train.n_classes;
        let binned = BinnedMatrix::from_rows(train.rows, self.config.max_bins)?;
        let params = TreeParams {
            max_depth: self.config.max_depth,
            min_samples_split: self.config.min_samples_split,
            min_samples_leaf: self.config.min_samples_leaf,
            max_features: None,
        };
        let newton_scale = (k as f64 - 1.0) / k as f64;
        let lr = self.config.learning_rate;
        let seed = self.seed;

        let init = log_priors(train.labels, k);
        let mut scores: Vec<Vec<f64>> = vec![init.clone(); n];
        let mut stages = Vec::with_capacity(self.config.n_stages);

        for stage in 0..self.config.n_stages {
            let proba: Vec<Vec<f64>> = scores.iter().map(|s| softmax(s)).collect();

            let trees = (0..k)
                .into_par_iter()
                .map(|class| {
                    let residuals: Vec<f64> = proba
                        .iter()
                        .zip(train.labels)
                        .map(|(p, &y)| {
                            let target = if y == class { 1.0 } else { 0.0 };
                            target - p[class]
                        })
                        .collect();
                    let hessians: Vec<f64> =
                        residuals.iter().map(|r| r.abs() * (1.0 - r.abs())).collect();
                    let objective = ResidualObjective::new(&residuals, &hessians, newton_scale);
                    let mut rng =
                        ChaCha8Rng::seed_from_u64(seed.wrapping_add((stage * k + class) as u64));
                    TreeGrower::new(&binned, &objective, params).grow((0..n).collect(), &mut rng)
                })
                .collect::<Result<Vec<Tree>, ComputeError>>()?;

            for (row, score) in train.rows.iter().zip(scores.iter_mut()) {
                for (s, tree) in score.iter_mut().zip(&trees) {
                    *s += lr * tree.leaf_value(row)[0];
                }
            }
            stages.push(trees);

            if stage % 50 == 0 {
                let predicted: Vec<usize> = scores.iter().map(|s| argmax(s)).collect();
                debug!(
                    stage,
                    train_accuracy = accuracy(&predicted, train.labels),
                    "boosting stage"
                );
            }
        }

        self.n_features = train.n_features();
        self.init = init;
        self.stages = stages;

        if let Some(val) = validation {
            let validation_accuracy = self.score(val)?;
            debug!(validation_accuracy, "gradient boosting validation");
        }
        info!(
            stages = self.stages.len(),
            classes = k,
            rows = n,
            "gradient boosting fitted"
        );
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        !self.stages.is_empty()
    }

    fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ComputeError> {
        if !self.is_fitted() {
            return Err(ComputeError::NotFitted("gradient boosting"));
        }
        check_rows(rows, self.n_features)?;
        Ok(rows.iter().map(|row| softmax(&self.raw_scores(row))).collect())
    }
}

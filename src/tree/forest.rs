//! Bagged random forest of Gini CART trees

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classifier::{check_rows, Dataset, ProbabilisticClassifier};
use crate::error::ComputeError;
use crate::tree::binning::BinnedMatrix;
use crate::tree::cart::{GiniObjective, Tree, TreeGrower, TreeParams};
use crate::tree::DEFAULT_MAX_BINS;

/// Number of candidate features examined at each node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    /// `floor(sqrt(n_features))`, at least 1
    Sqrt,
    All,
    Fixed(usize),
}

impl MaxFeatures {
    pub fn resolve(&self, n_features: usize) -> usize {
        let k = match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().floor() as usize,
            MaxFeatures::All => n_features,
            MaxFeatures::Fixed(k) => *k,
        };
        k.clamp(1, n_features.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub max_bins: usize,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 200,
            max_depth: 20,
            min_samples_split: 5,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            max_bins: DEFAULT_MAX_BINS,
        }
    }
}

impl ForestConfig {
    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.n_trees == 0 {
            return Err(ComputeError::InvalidConfig("forest.n_trees must be > 0".into()));
        }
        if self.max_depth == 0 {
            return Err(ComputeError::InvalidConfig("forest.max_depth must be > 0".into()));
        }
        if self.min_samples_split < 2 {
            return Err(ComputeError::InvalidConfig(
                "forest.min_samples_split must be >= 2".into(),
            ));
        }
        if self.min_samples_leaf == 0 {
            return Err(ComputeError::InvalidConfig(
                "forest.min_samples_leaf must be >= 1".into(),
            ));
        }
        if let MaxFeatures::Fixed(0) = self.max_features {
            return Err(ComputeError::InvalidConfig(
                "forest.max_features must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

/// Random forest classifier; probabilities are the mean of per-tree leaf
/// class frequencies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    config: ForestConfig,
    seed: u64,
    n_classes: usize,
    n_features: usize,
    trees: Vec<Tree>,
}

impl RandomForest {
    pub fn new(config: ForestConfig, seed: u64) -> Self {
        Self {
            config,
            seed,
            n_classes: 0,
            n_features: 0,
            trees: Vec::new(),
        }
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Check every tree of a restored forest against the expected input width
    pub fn validate_structure(&self, n_features: usize) -> Result<(), ComputeError> {
        if self.trees.is_empty() {
            return Ok(());
        }
        if self.n_features != n_features {
            return Err(ComputeError::ShapeMismatch(format!(
                "random forest was fitted on {} features, expected {}",
                self.n_features, n_features
            )));
        }
        self.trees
            .iter()
            .try_for_each(|tree| tree.validate(n_features, self.n_classes))
    }
}

impl ProbabilisticClassifier for RandomForest {
    fn name(&self) -> &'static str {
        "random_forest"
    }

    fn fit(
        &mut self,
        train: Dataset<'_>,
        _validation: Option<Dataset<'_>>,
    ) -> Result<(), ComputeError> {
        self.config.validate()?;

        let binned = BinnedMatrix::from_rows(train.rows, self.config.max_bins)?;
        let objective = GiniObjective::new(train.labels, train.n_classes);
        let params = TreeParams {
            max_depth: self.config.max_depth,
            min_samples_split: self.config.min_samples_split,
            min_samples_leaf: self.config.min_samples_leaf,
            max_features: Some(self.config.max_features.resolve(train.n_features())),
        };
        let n = train.len();
        let bootstrap = self.config.bootstrap;
        let seed = self.seed;

        let trees = (0..self.config.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(t as u64));
                let rows: Vec<usize> = if bootstrap {
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                TreeGrower::new(&binned, &objective, params).grow(rows, &mut rng)
            })
            .collect::<Result<Vec<Tree>, ComputeError>>()?;

        let mean_depth =
            trees.iter().map(|t| t.depth()).sum::<usize>() as f64 / trees.len() as f64;
        debug!(trees = trees.len(), mean_depth, "random forest grown");

        self.n_classes = train.n_classes;
        self.n_features = train.n_features();
        self.trees = trees;
        info!(
            trees = self.trees.len(),
            rows = n,
            features = self.n_features,
            "random forest fitted"
        );
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ComputeError> {
        if !self.is_fitted() {
            return Err(ComputeError::NotFitted("random forest"));
        }
        check_rows(rows, self.n_features)?;

        let n_trees = self.trees.len() as f64;
        Ok(rows
            .iter()
            .map(|row| {
                let mut proba = vec![0.0; self.n_classes];
                for tree in &self.trees {
                    for (p, v) in proba.iter_mut().zip(tree.leaf_value(row)) {
                        *p += v;
                    }
                }
                proba.iter_mut().for_each(|p| *p /= n_trees);
                proba
            })
            .collect())
    }
}

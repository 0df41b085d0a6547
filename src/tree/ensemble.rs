//! Soft-voting ensemble of a random forest and gradient boosting

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::classifier::{Dataset, ProbabilisticClassifier};
use crate::error::ComputeError;
use crate::tree::boosting::{BoostingConfig, GradientBoosting};
use crate::tree::forest::{ForestConfig, RandomForest};

/// Unweighted mean of forest and boosting probabilities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    forest: RandomForest,
    boosting: GradientBoosting,
}

impl TreeEnsemble {
    pub fn new(forest: ForestConfig, boosting: BoostingConfig, seed: u64) -> Self {
        Self {
            forest: RandomForest::new(forest, seed),
            boosting: GradientBoosting::new(boosting, seed),
        }
    }

    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }

    pub fn boosting(&self) -> &GradientBoosting {
        &self.boosting
    }

    pub fn validate_structure(&self, n_features: usize) -> Result<(), ComputeError> {
        self.forest.validate_structure(n_features)?;
        self.boosting.validate_structure(n_features)
    }
}

impl ProbabilisticClassifier for TreeEnsemble {
    fn name(&self) -> &'static str {
        "tree_ensemble"
    }

    fn fit(
        &mut self,
        train: Dataset<'_>,
        validation: Option<Dataset<'_>>,
    ) -> Result<(), ComputeError> {
        let (forest, boosting) = (&mut self.forest, &mut self.boosting);
        let (forest_result, boosting_result) = rayon::join(
            || forest.fit(train, validation),
            || boosting.fit(train, validation),
        );
        forest_result?;
        boosting_result?;

        if let Some(val) = validation {
            let forest_accuracy = self.forest.score(val)?;
            let boosting_accuracy = self.boosting.score(val)?;
            let ensemble_accuracy = self.score(val)?;
            info!(
                forest_accuracy,
                boosting_accuracy, ensemble_accuracy, "tree ensemble validation"
            );
        }
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        self.forest.is_fitted() && self.boosting.is_fitted()
    }

    fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ComputeError> {
        if !self.is_fitted() {
            return Err(ComputeError::NotFitted("tree ensemble"));
        }
        let forest = self.forest.predict_proba(rows)?;
        let boosting = self.boosting.predict_proba(rows)?;
        Ok(forest
            .into_iter()
            .zip(boosting)
            .map(|(f, b)| f.iter().zip(&b).map(|(x, y)| (x + y) / 2.0).collect())
            .collect())
    }
}

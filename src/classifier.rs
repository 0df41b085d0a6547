//! Probabilistic classifier abstraction
//!
//! Every learner in the crate (random forest, gradient boosting, their soft-voting
//! ensemble and the neural network) implements [`ProbabilisticClassifier`], so the
//! hybrid predictor can fuse them without knowing which is which.

use crate::error::ComputeError;

/// Training data handed to a classifier: scaled rows plus dense class indices
#[derive(Debug, Clone, Copy)]
pub struct Dataset<'a> {
    pub rows: &'a [Vec<f64>],
    pub labels: &'a [usize],
    pub n_classes: usize,
}

impl<'a> Dataset<'a> {
    pub fn new(
        rows: &'a [Vec<f64>],
        labels: &'a [usize],
        n_classes: usize,
    ) -> Result<Self, ComputeError> {
        if rows.len() != labels.len() {
            return Err(ComputeError::ShapeMismatch(format!(
                "{} rows but {} labels",
                rows.len(),
                labels.len()
            )));
        }
        if rows.is_empty() {
            return Err(ComputeError::TrainingError("empty training set".into()));
        }
        if let Some(&bad) = labels.iter().find(|&&l| l >= n_classes) {
            return Err(ComputeError::ShapeMismatch(format!(
                "label {} out of range for {} classes",
                bad, n_classes
            )));
        }
        Ok(Self {
            rows,
            labels,
            n_classes,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.rows.first().map_or(0, |r| r.len())
    }
}

/// A classifier that is fitted once and then yields per-class probabilities
pub trait ProbabilisticClassifier {
    /// Short name for logs and reports
    fn name(&self) -> &'static str;

    /// Fit on `train`, optionally monitoring `validation`.
    ///
    /// Fitting replaces any previously learned state.
    fn fit(&mut self, train: Dataset<'_>, validation: Option<Dataset<'_>>)
        -> Result<(), ComputeError>;

    fn is_fitted(&self) -> bool;

    /// One probability vector (summing to 1) per input row
    fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ComputeError>;

    /// Most probable class per row
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<usize>, ComputeError> {
        Ok(self.predict_proba(rows)?.iter().map(|p| argmax(p)).collect())
    }

    /// Fraction of `data` rows predicted correctly
    fn score(&self, data: Dataset<'_>) -> Result<f64, ComputeError> {
        let predictions = self.predict(data.rows)?;
        Ok(accuracy(&predictions, data.labels))
    }
}

/// Index of the largest value; ties resolve to the lowest index
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Fraction of matching entries; 0 for empty input
pub fn accuracy(predicted: &[usize], actual: &[usize]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let correct = predicted
        .iter()
        .zip(actual)
        .filter(|(p, a)| p == a)
        .count();
    correct as f64 / actual.len() as f64
}

/// Reject rows whose width differs from the width a model was fitted on
pub fn check_rows(rows: &[Vec<f64>], n_features: usize) -> Result<(), ComputeError> {
    match rows.iter().find(|r| r.len() != n_features) {
        Some(row) => Err(ComputeError::ShapeMismatch(format!(
            "model expects {} features, got {}",
            n_features,
            row.len()
        ))),
        None => Ok(()),
    }
}

/// Numerically stable softmax
pub fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|&z| (z - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

//! Holdout evaluation: accuracy, per-style precision/recall/F1 and a confusion
//! matrix

use serde::{Deserialize, Serialize};

use crate::error::ComputeError;
use crate::types::{LearningStyle, NUM_STYLES};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleMetrics {
    pub style: LearningStyle,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Number of true rows of this style
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub accuracy: f64,
    pub styles: Vec<StyleMetrics>,
    /// `confusion[actual][predicted]`, indexed in VARK order
    pub confusion: Vec<Vec<usize>>,
}

impl ClassificationReport {
    pub fn new(
        actual: &[LearningStyle],
        predicted: &[LearningStyle],
    ) -> Result<Self, ComputeError> {
        if actual.len() != predicted.len() {
            return Err(ComputeError::ShapeMismatch(format!(
                "{} labels but {} predictions",
                actual.len(),
                predicted.len()
            )));
        }

        let mut confusion = vec![vec![0usize; NUM_STYLES]; NUM_STYLES];
        for (a, p) in actual.iter().zip(predicted) {
            confusion[a.code() as usize][p.code() as usize] += 1;
        }

        let correct: usize = (0..NUM_STYLES).map(|k| confusion[k][k]).sum();
        let accuracy = if actual.is_empty() {
            0.0
        } else {
            correct as f64 / actual.len() as f64
        };

        let styles = LearningStyle::ALL
            .iter()
            .map(|&style| {
                let k = style.code() as usize;
                let tp = confusion[k][k] as f64;
                let support: usize = confusion[k].iter().sum();
                let predicted_k: usize = confusion.iter().map(|row| row[k]).sum();
                let precision = ratio(tp, predicted_k as f64);
                let recall = ratio(tp, support as f64);
                StyleMetrics {
                    style,
                    precision,
                    recall,
                    f1: ratio(2.0 * precision * recall, precision + recall),
                    support,
                }
            })
            .collect();

        Ok(Self {
            accuracy,
            styles,
            confusion,
        })
    }

    /// Unweighted mean F1 over styles
    pub fn macro_f1(&self) -> f64 {
        self.styles.iter().map(|s| s.f1).sum::<f64>() / self.styles.len().max(1) as f64
    }
}

/// `num / den`, or 0 when the denominator is 0
fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

//! Preprocessing: feature standardization, label encoding and stratified splitting

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::ComputeError;
use crate::types::{LearningStyle, NUM_STYLES};

/// Per-feature standardization: `(x - mean) / scale`.
///
/// `scale` is the population standard deviation; constant features get a scale of
/// 1 so they map to 0 instead of dividing by zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fitted(&self) -> bool {
        !self.mean.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    /// Fit mean and scale on the rows, replacing any previous fit
    pub fn fit(&mut self, rows: &[Vec<f64>]) -> Result<(), ComputeError> {
        let first = rows
            .first()
            .ok_or_else(|| ComputeError::ShapeMismatch("cannot fit scaler on zero rows".into()))?;
        let n_features = first.len();
        let n = rows.len() as f64;

        let mut mean = vec![0.0; n_features];
        for row in rows {
            if row.len() != n_features {
                return Err(ComputeError::ShapeMismatch(format!(
                    "expected {} features, got {}",
                    n_features,
                    row.len()
                )));
            }
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in mean.iter_mut() {
            *m /= n;
        }

        let mut var = vec![0.0; n_features];
        for row in rows {
            for ((acc, v), m) in var.iter_mut().zip(row).zip(&mean) {
                *acc += (v - m).powi(2);
            }
        }
        let scale = var
            .into_iter()
            .map(|s| {
                let std = (s / n).sqrt();
                if std > f64::EPSILON {
                    std
                } else {
                    1.0
                }
            })
            .collect();

        self.mean = mean;
        self.scale = scale;
        Ok(())
    }

    /// Standardize rows with the fitted statistics
    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ComputeError> {
        if !self.is_fitted() {
            return Err(ComputeError::NotFitted("feature scaler"));
        }
        rows.iter()
            .map(|row| {
                if row.len() != self.mean.len() {
                    return Err(ComputeError::ShapeMismatch(format!(
                        "scaler expects {} features, got {}",
                        self.mean.len(),
                        row.len()
                    )));
                }
                Ok(row
                    .iter()
                    .zip(self.mean.iter().zip(&self.scale))
                    .map(|(v, (m, s))| (v - m) / s)
                    .collect())
            })
            .collect()
    }

    pub fn fit_transform(&mut self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ComputeError> {
        self.fit(rows)?;
        self.transform(rows)
    }
}

/// Frozen bidirectional mapping between learning styles and class indices.
///
/// Classes are indexed in canonical VARK order, so index 0 is always Visual.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<LearningStyle>,
}

impl LabelEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit on training labels; every style must be present
    pub fn fit(&mut self, labels: &[LearningStyle]) -> Result<(), ComputeError> {
        let present: Vec<LearningStyle> = LearningStyle::ALL
            .iter()
            .copied()
            .filter(|style| labels.contains(style))
            .collect();

        if present.len() != NUM_STYLES {
            let missing: Vec<&str> = LearningStyle::ALL
                .iter()
                .filter(|style| !present.contains(style))
                .map(|style| style.as_str())
                .collect();
            return Err(ComputeError::MissingClasses {
                found: present.len(),
                expected: NUM_STYLES,
                missing: missing.join(", "),
            });
        }

        self.classes = present;
        Ok(())
    }

    pub fn is_fitted(&self) -> bool {
        !self.classes.is_empty()
    }

    pub fn classes(&self) -> &[LearningStyle] {
        &self.classes
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn encode(&self, style: LearningStyle) -> Result<usize, ComputeError> {
        if !self.is_fitted() {
            return Err(ComputeError::NotFitted("label encoder"));
        }
        self.classes
            .iter()
            .position(|&c| c == style)
            .ok_or_else(|| ComputeError::UnknownStyle(style.to_string()))
    }

    pub fn encode_all(&self, styles: &[LearningStyle]) -> Result<Vec<usize>, ComputeError> {
        styles.iter().map(|&s| self.encode(s)).collect()
    }

    pub fn decode(&self, index: usize) -> Result<LearningStyle, ComputeError> {
        if !self.is_fitted() {
            return Err(ComputeError::NotFitted("label encoder"));
        }
        self.classes.get(index).copied().ok_or_else(|| {
            ComputeError::ShapeMismatch(format!(
                "class index {} out of range for {} classes",
                index,
                self.classes.len()
            ))
        })
    }
}

/// Row indices of a train/validation split
#[derive(Debug, Clone, PartialEq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

/// Split row indices into train/validation while preserving class proportions.
///
/// Each class is shuffled with a seeded RNG and `round(len * validation_fraction)`
/// of its rows go to validation. Index order within each part is class-major.
pub fn stratified_split(
    labels: &[usize],
    n_classes: usize,
    validation_fraction: f64,
    seed: u64,
) -> Result<SplitIndices, ComputeError> {
    if !(validation_fraction > 0.0 && validation_fraction < 1.0) {
        return Err(ComputeError::InvalidConfig(format!(
            "validation fraction must be in (0, 1), got {}",
            validation_fraction
        )));
    }

    let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
    for (i, &label) in labels.iter().enumerate() {
        let bucket = by_class.get_mut(label).ok_or_else(|| {
            ComputeError::ShapeMismatch(format!(
                "label {} out of range for {} classes",
                label, n_classes
            ))
        })?;
        bucket.push(i);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut validation = Vec::new();

    for mut members in by_class {
        members.shuffle(&mut rng);
        let n_val = (members.len() as f64 * validation_fraction).round() as usize;
        let n_val = n_val.min(members.len().saturating_sub(1));
        validation.extend_from_slice(&members[..n_val]);
        train.extend_from_slice(&members[n_val..]);
    }

    if train.is_empty() || validation.is_empty() {
        return Err(ComputeError::TrainingError(format!(
            "split of {} rows left train={} validation={}",
            labels.len(),
            train.len(),
            validation.len()
        )));
    }

    Ok(SplitIndices { train, validation })
}

/// Gather the rows at `indices`
pub fn take_rows<T: Clone>(rows: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|&i| rows[i].clone()).collect()
}

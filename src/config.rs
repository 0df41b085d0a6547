//! Training configuration for the hybrid predictor
//!
//! Every section has serde defaults matching the production model, so a config
//! file only needs the keys it overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ComputeError;
use crate::features::FeatureSchema;
use crate::hybrid::FusionWeights;
use crate::neural::{LayerSpec, NeuralConfig};
use crate::synth::DEFAULT_SEED;
use crate::tree::{BoostingConfig, ForestConfig};

/// Fraction of training rows held out to monitor the neural classifier
pub const DEFAULT_VALIDATION_FRACTION: f64 = 0.2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridConfig {
    pub neural: NeuralConfig,
    pub forest: ForestConfig,
    pub boosting: BoostingConfig,
    pub fusion: FusionWeights,
    pub feature_schema: FeatureSchema,
    /// Seeds the split, weight init, shuffling and tree bootstraps
    pub seed: u64,
    pub validation_fraction: f64,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            neural: NeuralConfig::default(),
            forest: ForestConfig::default(),
            boosting: BoostingConfig::default(),
            fusion: FusionWeights::default(),
            feature_schema: FeatureSchema::default(),
            seed: DEFAULT_SEED,
            validation_fraction: DEFAULT_VALIDATION_FRACTION,
        }
    }
}

impl HybridConfig {
    /// A small configuration that trains in well under a second; used by tests
    /// and the CLI's `--quick` flag
    pub fn quick() -> Self {
        Self {
            neural: NeuralConfig {
                layers: vec![
                    LayerSpec::new(32, 0.2, 0.001),
                    LayerSpec::new(16, 0.0, 0.0),
                ],
                learning_rate: 0.005,
                max_epochs: 12,
                early_stopping_patience: 5,
                ..NeuralConfig::default()
            },
            forest: ForestConfig {
                n_trees: 20,
                max_depth: 10,
                ..ForestConfig::default()
            },
            boosting: BoostingConfig {
                n_stages: 15,
                max_depth: 3,
                ..BoostingConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ComputeError> {
        self.neural.validate()?;
        self.forest.validate()?;
        self.boosting.validate()?;
        self.fusion.validate()?;
        if !(self.validation_fraction > 0.0 && self.validation_fraction < 1.0) {
            return Err(ComputeError::InvalidConfig(format!(
                "validation_fraction must be in (0, 1), got {}",
                self.validation_fraction
            )));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ComputeError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, ComputeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

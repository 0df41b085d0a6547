//! Pipeline orchestration
//!
//! This module provides the public API for Vark Flux. It turns raw session
//! records into prediction reports and owns the model lifecycle: load a saved
//! predictor if one exists, otherwise synthesize data, train and save.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::adapter::parse_record;
use crate::config::HybridConfig;
use crate::error::ComputeError;
use crate::features::engineer_batch;
use crate::hybrid::{FitReport, HybridPredictor};
use crate::synth::{synthesize, DEFAULT_SAMPLES, DEFAULT_SEED};
use crate::types::{LabeledRecord, LearningStyle, RawMetricsRecord, StyleScores};

/// Classification result for one session, shaped for API responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionReport {
    pub success: bool,
    pub predicted_style: LearningStyle,
    /// Largest fused probability
    pub confidence: f64,
    pub all_scores: StyleScores,
    pub description: String,
    pub model_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

/// Classify one record with a fitted predictor.
///
/// # Example
/// ```ignore
/// let report = classify_record(&predictor, &record)?;
/// println!("{} ({:.2})", report.predicted_style, report.confidence);
/// ```
pub fn classify_record(
    predictor: &HybridPredictor,
    record: &RawMetricsRecord,
) -> Result<PredictionReport, ComputeError> {
    let prediction = predictor.predict_record(record)?;
    Ok(PredictionReport {
        success: true,
        predicted_style: prediction.style,
        confidence: prediction.confidence,
        all_scores: prediction.scores,
        description: prediction.style.description().to_string(),
        model_id: predictor.model_id(),
        timestamp: Utc::now(),
    })
}

/// Parse a record from JSON, classify it and return the report as JSON
pub fn classify_json(predictor: &HybridPredictor, raw_json: &str) -> Result<String, ComputeError> {
    let record = parse_record(raw_json)?;
    let report = classify_record(predictor, &record)?;
    Ok(serde_json::to_string(&report)?)
}

/// Engineer features for labeled records and fit a fresh predictor on them
pub fn fit_records(
    records: &[LabeledRecord],
    config: HybridConfig,
) -> Result<(HybridPredictor, FitReport), ComputeError> {
    let raw: Vec<RawMetricsRecord> = records.iter().map(|r| r.record.clone()).collect();
    let labels: Vec<LearningStyle> = records.iter().map(|r| r.label).collect();
    let x = engineer_batch(&raw, config.feature_schema)?;
    let validation_fraction = config.validation_fraction;

    let mut predictor = HybridPredictor::new(config);
    let report = predictor.fit(&x, &labels, validation_fraction)?;
    Ok((predictor, report))
}

/// How to bootstrap a model when no saved one exists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingPlan {
    /// Number of synthetic sessions to generate
    pub samples: usize,
    /// Seed for the synthetic data (model seeds live in `config`)
    pub data_seed: u64,
    pub config: HybridConfig,
}

impl Default for TrainingPlan {
    fn default() -> Self {
        Self {
            samples: DEFAULT_SAMPLES,
            data_seed: DEFAULT_SEED,
            config: HybridConfig::default(),
        }
    }
}

/// Owns a fitted predictor for the lifetime of a service.
///
/// Construct once (train, load, or load-or-train), then share by reference;
/// classification never mutates it.
#[derive(Debug, Clone)]
pub struct VarkProcessor {
    predictor: HybridPredictor,
}

impl VarkProcessor {
    /// Wrap a fitted predictor
    pub fn new(predictor: HybridPredictor) -> Result<Self, ComputeError> {
        if !predictor.is_fitted() {
            return Err(ComputeError::NotFitted("hybrid predictor"));
        }
        Ok(Self { predictor })
    }

    /// Synthesize a dataset and train a predictor on it
    pub fn train(plan: &TrainingPlan) -> Result<(Self, FitReport), ComputeError> {
        info!(samples = plan.samples, seed = plan.data_seed, "synthesizing training data");
        let records = synthesize(plan.samples, plan.data_seed);
        let (predictor, report) = fit_records(&records, plan.config.clone())?;
        Ok((Self { predictor }, report))
    }

    pub fn load(path: &Path) -> Result<Self, ComputeError> {
        let json = std::fs::read_to_string(path)?;
        let processor = Self::from_json(&json)?;
        info!(
            path = %path.display(),
            model_id = ?processor.predictor.model_id(),
            "model loaded"
        );
        Ok(processor)
    }

    pub fn save(&self, path: &Path) -> Result<(), ComputeError> {
        std::fs::write(path, self.to_json()?)?;
        info!(path = %path.display(), "model saved");
        Ok(())
    }

    /// Load the model at `path` if it exists; otherwise train per `plan` and
    /// save the result there
    pub fn load_or_train(path: &Path, plan: &TrainingPlan) -> Result<Self, ComputeError> {
        if path.exists() {
            return Self::load(path);
        }
        info!(path = %path.display(), "no saved model, training a new one");
        let (processor, report) = Self::train(plan)?;
        info!(
            hybrid_accuracy = report.hybrid_accuracy,
            "model trained"
        );
        processor.save(path)?;
        Ok(processor)
    }

    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        Self::new(HybridPredictor::from_json(json)?)
    }

    pub fn to_json(&self) -> Result<String, ComputeError> {
        self.predictor.to_json()
    }

    pub fn predictor(&self) -> &HybridPredictor {
        &self.predictor
    }

    pub fn classify(&self, record: &RawMetricsRecord) -> Result<PredictionReport, ComputeError> {
        classify_record(&self.predictor, record)
    }

    pub fn classify_json(&self, raw_json: &str) -> Result<String, ComputeError> {
        classify_json(&self.predictor, raw_json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureSchema;
    use pretty_assertions::assert_eq;

    fn quick_plan(schema: FeatureSchema) -> TrainingPlan {
        TrainingPlan {
            samples: 400,
            data_seed: 42,
            config: HybridConfig {
                feature_schema: schema,
                ..HybridConfig::quick()
            },
        }
    }

    fn sample_request() -> &'static str {
        r#"{
            "engagement": {
                "visual": {"clicks": 15, "timeSpent": 300},
                "auditory": {"clicks": 3, "timeSpent": 45},
                "reading": {"clicks": 5, "timeSpent": 80},
                "kinesthetic": {"clicks": 2, "timeSpent": 30}
            },
            "questionnaire": [0, 0, 1, 0, 2, 0, 0, 1, 0, 0]
        }"#
    }

    #[test]
    fn test_classify_json_report_shape() {
        let (processor, _) = VarkProcessor::train(&quick_plan(FeatureSchema::Compact)).unwrap();
        let json = processor.classify_json(sample_request()).unwrap();

        let report: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(report["success"], true);
        assert_eq!(report["predicted_style"], "Visual");
        assert!(report["description"]
            .as_str()
            .unwrap()
            .starts_with("You learn best through visual aids"));

        let scores = report["all_scores"].as_object().unwrap();
        assert_eq!(scores.len(), 4);
        let max = scores.values().map(|v| v.as_f64().unwrap()).fold(0.0, f64::max);
        assert_eq!(report["confidence"].as_f64().unwrap(), max);
    }

    #[test]
    fn test_classify_rejects_bad_questionnaire() {
        let (processor, _) = VarkProcessor::train(&quick_plan(FeatureSchema::Compact)).unwrap();
        let bad = sample_request().replace("[0, 0, 1, 0, 2, 0, 0, 1, 0, 0]", "[0, 1]");
        assert!(matches!(
            processor.classify_json(&bad),
            Err(ComputeError::QuestionnaireLength { actual: 2, .. })
        ));
    }

    #[test]
    fn test_load_or_train_trains_once_then_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vark_model.json");
        let plan = quick_plan(FeatureSchema::Full);

        let trained = VarkProcessor::load_or_train(&path, &plan).unwrap();
        assert!(path.exists());

        let loaded = VarkProcessor::load_or_train(&path, &plan).unwrap();
        assert_eq!(
            trained.predictor().model_id(),
            loaded.predictor().model_id()
        );

        let record = parse_record(sample_request().replace(
            r#""visual": {"clicks": 15, "timeSpent": 300}"#,
            r#""visual": {"clicks": 15, "timeSpent": 300, "videoPlays": 5, "videoCompletion": 80}"#,
        ).as_str())
        .unwrap();
        let a = trained.classify(&record).unwrap();
        let b = loaded.classify(&record).unwrap();
        assert_eq!(a.all_scores, b.all_scores);
        assert_eq!(a.predicted_style, b.predicted_style);
    }

    #[test]
    fn test_load_missing_file_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            VarkProcessor::load(&dir.path().join("absent.json")),
            Err(ComputeError::PersistenceError(_))
        ));
    }

    #[test]
    fn test_unfitted_predictor_rejected() {
        assert!(matches!(
            VarkProcessor::new(HybridPredictor::default()),
            Err(ComputeError::NotFitted(_))
        ));
    }

    #[test]
    fn test_fit_records_uses_config_schema() {
        let records = synthesize(200, 3);
        let config = HybridConfig {
            feature_schema: FeatureSchema::Compact,
            ..HybridConfig::quick()
        };
        let (predictor, report) = fit_records(&records, config).unwrap();
        assert_eq!(report.features, 38);
        assert_eq!(predictor.feature_columns().len(), 38);
    }
}

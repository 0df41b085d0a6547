//! Hybrid VARK predictor
//!
//! Fuses a neural classifier and a tree ensemble trained on the same scaled
//! features. The predictor owns everything a prediction needs (scaler, label
//! mapping, frozen feature columns and both members), so a fitted instance can
//! be persisted as one JSON document and shared read-only across threads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::classifier::{accuracy, argmax, Dataset, ProbabilisticClassifier};
use crate::config::HybridConfig;
use crate::error::ComputeError;
use crate::features::{engineer, FeatureMatrix};
use crate::neural::NeuralClassifier;
use crate::preprocessing::{stratified_split, take_rows, LabelEncoder, StandardScaler};
use crate::tree::TreeEnsemble;
use crate::types::{LearningStyle, RawMetricsRecord, StylePrediction, StyleScores};

/// Default weight of the neural classifier in the fused distribution
pub const DEFAULT_NEURAL_WEIGHT: f64 = 0.6;

/// Default weight of the tree ensemble in the fused distribution
pub const DEFAULT_ENSEMBLE_WEIGHT: f64 = 0.4;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// Non-negative member weights summing to 1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
    pub neural: f64,
    pub ensemble: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            neural: DEFAULT_NEURAL_WEIGHT,
            ensemble: DEFAULT_ENSEMBLE_WEIGHT,
        }
    }
}

impl FusionWeights {
    pub fn new(neural: f64, ensemble: f64) -> Result<Self, ComputeError> {
        let weights = Self { neural, ensemble };
        weights.validate()?;
        Ok(weights)
    }

    pub fn validate(&self) -> Result<(), ComputeError> {
        let valid = |w: f64| w.is_finite() && w >= 0.0;
        if !valid(self.neural) || !valid(self.ensemble) {
            return Err(ComputeError::InvalidConfig(format!(
                "fusion weights must be non-negative, got neural={} ensemble={}",
                self.neural, self.ensemble
            )));
        }
        if (self.neural + self.ensemble - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ComputeError::InvalidConfig(format!(
                "fusion weights must sum to 1, got {}",
                self.neural + self.ensemble
            )));
        }
        Ok(())
    }
}

/// A fused classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Member {
    Neural(NeuralClassifier),
    TreeEnsemble(TreeEnsemble),
}

impl ProbabilisticClassifier for Member {
    fn name(&self) -> &'static str {
        match self {
            Member::Neural(m) => m.name(),
            Member::TreeEnsemble(m) => m.name(),
        }
    }

    fn fit(
        &mut self,
        train: Dataset<'_>,
        validation: Option<Dataset<'_>>,
    ) -> Result<(), ComputeError> {
        match self {
            Member::Neural(m) => m.fit(train, validation),
            Member::TreeEnsemble(m) => m.fit(train, validation),
        }
    }

    fn is_fitted(&self) -> bool {
        match self {
            Member::Neural(m) => m.is_fitted(),
            Member::TreeEnsemble(m) => m.is_fitted(),
        }
    }

    fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ComputeError> {
        match self {
            Member::Neural(m) => m.predict_proba(rows),
            Member::TreeEnsemble(m) => m.predict_proba(rows),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedMember {
    pub weight: f64,
    pub member: Member,
}

/// Summary of a completed `fit`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub model_id: Uuid,
    pub fitted_at: DateTime<Utc>,
    pub rows: usize,
    pub train_rows: usize,
    pub validation_rows: usize,
    pub features: usize,
    pub neural_accuracy: f64,
    pub ensemble_accuracy: f64,
    pub hybrid_accuracy: f64,
    pub neural_epochs: usize,
    pub neural_best_epoch: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridPredictor {
    config: HybridConfig,
    scaler: StandardScaler,
    labels: LabelEncoder,
    feature_columns: Vec<String>,
    members: Vec<WeightedMember>,
    model_id: Option<Uuid>,
    fitted_at: Option<DateTime<Utc>>,
}

impl Default for HybridPredictor {
    fn default() -> Self {
        Self::new(HybridConfig::default())
    }
}

impl HybridPredictor {
    pub fn new(config: HybridConfig) -> Self {
        Self {
            config,
            scaler: StandardScaler::new(),
            labels: LabelEncoder::new(),
            feature_columns: Vec::new(),
            members: Vec::new(),
            model_id: None,
            fitted_at: None,
        }
    }

    /// Train both members on `x`/`y`, holding out `validation_fraction` of the
    /// rows (stratified) to monitor the neural classifier.
    ///
    /// Any previous fit is discarded; on error the predictor is left unchanged.
    pub fn fit(
        &mut self,
        x: &FeatureMatrix,
        y: &[LearningStyle],
        validation_fraction: f64,
    ) -> Result<FitReport, ComputeError> {
        self.config.validate()?;
        if x.n_rows() != y.len() {
            return Err(ComputeError::ShapeMismatch(format!(
                "{} feature rows but {} labels",
                x.n_rows(),
                y.len()
            )));
        }
        if x.is_empty() {
            return Err(ComputeError::TrainingError("no training rows".into()));
        }
        x.ensure_numeric()?;

        let mut labels = LabelEncoder::new();
        labels.fit(y)?;
        let encoded = labels.encode_all(y)?;
        let n_classes = labels.n_classes();

        let mut scaler = StandardScaler::new();
        let scaled = scaler.fit_transform(x.rows())?;

        let split = stratified_split(&encoded, n_classes, validation_fraction, self.config.seed)?;
        let train_rows = take_rows(&scaled, &split.train);
        let train_labels = take_rows(&encoded, &split.train);
        let val_rows = take_rows(&scaled, &split.validation);
        let val_labels = take_rows(&encoded, &split.validation);
        let train = Dataset::new(&train_rows, &train_labels, n_classes)?;
        let val = Dataset::new(&val_rows, &val_labels, n_classes)?;

        info!(
            rows = x.n_rows(),
            features = x.n_columns(),
            train = train.len(),
            validation = val.len(),
            schema = self.config.feature_schema.as_str(),
            "fitting hybrid predictor"
        );

        let mut neural = NeuralClassifier::new(self.config.neural.clone(), self.config.seed);
        neural.fit(train, Some(val))?;
        let neural_epochs = neural.history().epochs.len();
        let neural_best_epoch = neural.history().best_epoch;

        let mut ensemble = TreeEnsemble::new(
            self.config.forest.clone(),
            self.config.boosting.clone(),
            self.config.seed,
        );
        ensemble.fit(train, Some(val))?;

        let members = vec![
            WeightedMember {
                weight: self.config.fusion.neural,
                member: Member::Neural(neural),
            },
            WeightedMember {
                weight: self.config.fusion.ensemble,
                member: Member::TreeEnsemble(ensemble),
            },
        ];

        let member_accuracy = |i: usize| -> Result<f64, ComputeError> {
            members[i].member.score(val)
        };
        let neural_accuracy = member_accuracy(0)?;
        let ensemble_accuracy = member_accuracy(1)?;
        let fused: Vec<usize> = fuse(&members, &val_rows)?.iter().map(|p| argmax(p)).collect();
        let hybrid_accuracy = accuracy(&fused, &val_labels);

        let model_id = Uuid::new_v4();
        let fitted_at = Utc::now();

        self.scaler = scaler;
        self.labels = labels;
        self.feature_columns = x.columns().to_vec();
        self.members = members;
        self.model_id = Some(model_id);
        self.fitted_at = Some(fitted_at);

        let report = FitReport {
            model_id,
            fitted_at,
            rows: x.n_rows(),
            train_rows: train_rows.len(),
            validation_rows: val_rows.len(),
            features: x.n_columns(),
            neural_accuracy,
            ensemble_accuracy,
            hybrid_accuracy,
            neural_epochs,
            neural_best_epoch,
        };
        info!(
            model_id = %model_id,
            neural_accuracy,
            ensemble_accuracy,
            hybrid_accuracy,
            "hybrid predictor fitted"
        );
        Ok(report)
    }

    pub fn is_fitted(&self) -> bool {
        !self.members.is_empty() && self.members.iter().all(|m| m.member.is_fitted())
    }

    /// Scale `x` with the fitted scaler after checking its columns match the
    /// frozen training columns in name and order
    pub fn transform(&self, x: &FeatureMatrix) -> Result<Vec<Vec<f64>>, ComputeError> {
        if !self.is_fitted() {
            return Err(ComputeError::NotFitted("hybrid predictor"));
        }
        if x.columns() != self.feature_columns.as_slice() {
            return Err(ComputeError::FeatureMismatch(describe_column_mismatch(
                &self.feature_columns,
                x.columns(),
            )));
        }
        x.ensure_numeric()?;
        self.scaler.transform(x.rows())
    }

    /// Fused class probabilities per row, in VARK order
    pub fn predict_proba(&self, x: &FeatureMatrix) -> Result<Vec<Vec<f64>>, ComputeError> {
        let scaled = self.transform(x)?;
        fuse(&self.members, &scaled)
    }

    /// Most probable style per row; ties resolve to the earlier VARK style
    pub fn predict(&self, x: &FeatureMatrix) -> Result<Vec<LearningStyle>, ComputeError> {
        self.predict_proba(x)?
            .iter()
            .map(|p| self.labels.decode(argmax(p)))
            .collect()
    }

    /// Style, confidence and the full score mapping per row
    pub fn predict_with_scores(
        &self,
        x: &FeatureMatrix,
    ) -> Result<Vec<StylePrediction>, ComputeError> {
        self.predict_proba(x)?
            .iter()
            .map(|p| {
                let best = argmax(p);
                Ok(StylePrediction {
                    style: self.labels.decode(best)?,
                    confidence: p[best],
                    scores: StyleScores::from_probabilities(p)?,
                })
            })
            .collect()
    }

    /// Engineer features for one record with the trained schema and classify it
    pub fn predict_record(
        &self,
        record: &RawMetricsRecord,
    ) -> Result<StylePrediction, ComputeError> {
        let features = FeatureMatrix::from(engineer(record, self.config.feature_schema)?);
        only_prediction(self.predict_with_scores(&features)?)
    }

    /// Replace the member weights of a fitted predictor
    pub fn set_fusion_weights(&mut self, weights: FusionWeights) -> Result<(), ComputeError> {
        weights.validate()?;
        for wm in self.members.iter_mut() {
            wm.weight = match wm.member {
                Member::Neural(_) => weights.neural,
                Member::TreeEnsemble(_) => weights.ensemble,
            };
        }
        self.config.fusion = weights;
        Ok(())
    }

    pub fn config(&self) -> &HybridConfig {
        &self.config
    }

    pub fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    pub fn classes(&self) -> &[LearningStyle] {
        self.labels.classes()
    }

    pub fn members(&self) -> &[WeightedMember] {
        &self.members
    }

    pub fn model_id(&self) -> Option<Uuid> {
        self.model_id
    }

    pub fn fitted_at(&self) -> Option<DateTime<Utc>> {
        self.fitted_at
    }

    pub fn to_json(&self) -> Result<String, ComputeError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Restore a predictor saved with [`HybridPredictor::to_json`].
    ///
    /// A fitted document is checked for internal consistency (member weights,
    /// tree structure, network width) before it is accepted, so a malformed
    /// file fails here instead of at prediction time.
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let predictor: Self = serde_json::from_str(json)?;
        predictor.config.validate()?;
        if predictor.is_fitted() {
            predictor.validate_fitted()?;
        }
        Ok(predictor)
    }

    fn validate_fitted(&self) -> Result<(), ComputeError> {
        let n_features = self.feature_columns.len();
        if self.scaler.n_features() != n_features {
            return Err(ComputeError::ShapeMismatch(format!(
                "saved scaler has {} features but {} feature columns",
                self.scaler.n_features(),
                n_features
            )));
        }

        let mut total = 0.0;
        for wm in &self.members {
            let expected = match &wm.member {
                Member::Neural(_) => self.config.fusion.neural,
                Member::TreeEnsemble(_) => self.config.fusion.ensemble,
            };
            if !wm.weight.is_finite()
                || wm.weight < 0.0
                || (wm.weight - expected).abs() > WEIGHT_SUM_TOLERANCE
            {
                return Err(ComputeError::InvalidConfig(format!(
                    "{} weight {} does not match the fusion weight {}",
                    wm.member.name(),
                    wm.weight,
                    expected
                )));
            }
            total += wm.weight;
        }
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ComputeError::InvalidConfig(format!(
                "member weights must sum to 1, got {}",
                total
            )));
        }

        for wm in &self.members {
            match &wm.member {
                Member::Neural(neural) => {
                    if neural.n_features() != n_features {
                        return Err(ComputeError::ShapeMismatch(format!(
                            "neural network expects {} inputs but {} feature columns",
                            neural.n_features(),
                            n_features
                        )));
                    }
                    if neural.n_classes() != self.labels.n_classes() {
                        return Err(ComputeError::ShapeMismatch(format!(
                            "neural network has {} outputs for {} classes",
                            neural.n_classes(),
                            self.labels.n_classes()
                        )));
                    }
                    neural.validate_weights()?;
                }
                Member::TreeEnsemble(ensemble) => ensemble.validate_structure(n_features)?,
            }
        }
        Ok(())
    }
}

/// The prediction for a one-row input
fn only_prediction(mut predictions: Vec<StylePrediction>) -> Result<StylePrediction, ComputeError> {
    match (predictions.pop(), predictions.is_empty()) {
        (Some(prediction), true) => Ok(prediction),
        (popped, _) => Err(ComputeError::ShapeMismatch(format!(
            "expected one prediction for one record, got {}",
            predictions.len() + usize::from(popped.is_some())
        ))),
    }
}

/// Weighted sum of member probabilities
fn fuse(members: &[WeightedMember], rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ComputeError> {
    let mut fused: Vec<Vec<f64>> = Vec::new();
    for wm in members {
        let proba = wm.member.predict_proba(rows)?;
        if fused.is_empty() {
            fused = proba
                .into_iter()
                .map(|p| p.into_iter().map(|v| wm.weight * v).collect())
                .collect();
            continue;
        }
        for (acc, p) in fused.iter_mut().zip(proba) {
            for (a, v) in acc.iter_mut().zip(p) {
                *a += wm.weight * v;
            }
        }
    }

    for p in fused.iter_mut() {
        let sum: f64 = p.iter().sum();
        if !(sum.is_finite() && sum > 0.0) {
            warn!(sum, "degenerate fused distribution");
            return Err(ComputeError::TrainingError(
                "fused probabilities do not form a distribution".into(),
            ));
        }
    }
    Ok(fused)
}

fn describe_column_mismatch(expected: &[String], actual: &[String]) -> String {
    if expected.len() != actual.len() {
        return format!(
            "model was trained on {} feature columns, got {}",
            expected.len(),
            actual.len()
        );
    }
    match expected.iter().zip(actual).position(|(e, a)| e != a) {
        Some(i) => format!(
            "column {} is '{}' but the model expects '{}'",
            i, actual[i], expected[i]
        ),
        None => "feature columns differ".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{engineer_batch, FeatureSchema};
    use crate::synth::synthesize;
    use crate::types::{Engagement, VisualEngagement};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn training_data(
        n: usize,
        seed: u64,
        schema: FeatureSchema,
    ) -> (FeatureMatrix, Vec<LearningStyle>) {
        let data = synthesize(n, seed);
        let records: Vec<RawMetricsRecord> = data.iter().map(|d| d.record.clone()).collect();
        let labels = data.iter().map(|d| d.label).collect();
        (engineer_batch(&records, schema).unwrap(), labels)
    }

    fn fitted(schema: FeatureSchema) -> HybridPredictor {
        let config = HybridConfig {
            feature_schema: schema,
            ..HybridConfig::quick()
        };
        let (x, y) = training_data(600, 42, schema);
        let mut predictor = HybridPredictor::new(config);
        predictor.fit(&x, &y, 0.2).unwrap();
        predictor
    }

    fn strong_visual_record() -> RawMetricsRecord {
        let mut engagement = Engagement::default();
        engagement.visual = VisualEngagement {
            clicks: 20,
            time_spent: 400.0,
            video_plays: 6,
            video_pauses: 2,
            video_completion: 85.0,
            hover_time: 35.0,
            revisits: 1,
        };
        engagement.auditory.clicks = 2;
        engagement.auditory.time_spent = 40.0;
        engagement.reading.clicks = 3;
        engagement.reading.time_spent = 50.0;
        engagement.kinesthetic.clicks = 1;
        engagement.kinesthetic.time_spent = 20.0;
        RawMetricsRecord::new(engagement, vec![0, 0, 0, 0, 1, 0, 0, 2, 0, 0])
    }

    #[test]
    fn test_fusion_weights_validation() {
        assert!(FusionWeights::new(0.6, 0.4).is_ok());
        assert!(FusionWeights::new(0.7, 0.4).is_err());
        assert!(FusionWeights::new(-0.5, 1.5).is_err());
        assert!(FusionWeights::new(f64::NAN, 1.0).is_err());
        assert_eq!(
            FusionWeights::default(),
            FusionWeights {
                neural: DEFAULT_NEURAL_WEIGHT,
                ensemble: DEFAULT_ENSEMBLE_WEIGHT
            }
        );
    }

    #[test]
    fn test_probabilities_form_distributions() {
        let predictor = fitted(FeatureSchema::Full);
        let (x, _) = training_data(50, 7, FeatureSchema::Full);

        let proba = predictor.predict_proba(&x).unwrap();
        let predicted = predictor.predict(&x).unwrap();
        assert_eq!(proba.len(), 50);
        for (p, style) in proba.iter().zip(&predicted) {
            assert_eq!(p.len(), 4);
            assert!(p.iter().all(|v| *v >= 0.0));
            assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-6);
            assert_eq!(LearningStyle::ALL[argmax(p)], *style);
        }
    }

    #[test]
    fn test_fit_report_and_identity() {
        let config = HybridConfig::quick();
        let (x, y) = training_data(400, 1, FeatureSchema::Full);
        let mut predictor = HybridPredictor::new(config);
        let report = predictor.fit(&x, &y, 0.2).unwrap();

        assert_eq!(report.rows, 400);
        assert_eq!(report.train_rows + report.validation_rows, 400);
        assert_eq!(report.features, 72);
        assert!(report.hybrid_accuracy > 0.8);
        assert_eq!(predictor.model_id(), Some(report.model_id));
        assert_eq!(predictor.classes(), &LearningStyle::ALL);
        assert_eq!(predictor.members().len(), 2);
        assert_eq!(predictor.members()[0].weight, DEFAULT_NEURAL_WEIGHT);
    }

    #[test]
    fn test_strong_visual_record_is_visual() {
        let predictor = fitted(FeatureSchema::Full);
        let prediction = predictor.predict_record(&strong_visual_record()).unwrap();
        assert_eq!(prediction.style, LearningStyle::Visual);
        assert!(prediction.confidence > 0.5);
        assert_eq!(prediction.confidence, prediction.scores.visual);
    }

    #[test]
    fn test_visual_clicks_and_time_only_record_is_visual() {
        let predictor = fitted(FeatureSchema::Full);
        let mut engagement = Engagement::default();
        engagement.visual.clicks = 20;
        engagement.visual.time_spent = 400.0;
        let record = RawMetricsRecord::new(engagement, vec![0, 0, 0, 0, 1, 0, 0, 2, 0, 0]);

        let prediction = predictor.predict_record(&record).unwrap();
        assert_eq!(prediction.style, LearningStyle::Visual);
        assert!(prediction.confidence > 0.5);
    }

    #[test]
    fn test_record_prediction_count_is_checked() {
        assert!(matches!(
            only_prediction(Vec::new()),
            Err(ComputeError::ShapeMismatch(_))
        ));
        let predictor = fitted(FeatureSchema::Compact);
        let (x, _) = training_data(2, 9, FeatureSchema::Compact);
        let two = predictor.predict_with_scores(&x).unwrap();
        assert!(matches!(
            only_prediction(two.clone()),
            Err(ComputeError::ShapeMismatch(_))
        ));
        assert_eq!(only_prediction(two[..1].to_vec()).unwrap(), two[0]);
    }

    #[test]
    fn test_compact_model_classifies_clicks_and_time_only() {
        let predictor = fitted(FeatureSchema::Compact);
        let json = r#"{
            "engagement": {
                "visual": {"clicks": 15, "timeSpent": 300},
                "auditory": {"clicks": 3, "timeSpent": 45},
                "reading": {"clicks": 5, "timeSpent": 80},
                "kinesthetic": {"clicks": 2, "timeSpent": 30}
            },
            "questionnaire": [0, 0, 1, 0, 2, 0, 0, 1, 0, 0]
        }"#;
        let record = crate::adapter::parse_record(json).unwrap();
        let prediction = predictor.predict_record(&record).unwrap();
        assert_eq!(prediction.style, LearningStyle::Visual);
        assert!(prediction.confidence > 0.5);
    }

    #[test]
    fn test_all_zero_engagement_yields_distribution() {
        let predictor = fitted(FeatureSchema::Full);
        let record =
            RawMetricsRecord::new(Engagement::default(), vec![0, 1, 2, 3, 0, 1, 2, 3, 0, 1]);
        let prediction = predictor.predict_record(&record).unwrap();
        let scores = prediction.scores.to_vec();
        assert!((scores.iter().sum::<f64>() - 1.0).abs() < 1e-6);
        assert!(scores.iter().all(|s| *s >= 0.0));
    }

    #[test]
    fn test_refit_equals_fresh_fit() {
        let (x1, y1) = training_data(300, 5, FeatureSchema::Full);
        let (x2, y2) = training_data(300, 6, FeatureSchema::Full);
        let (sample, _) = training_data(20, 99, FeatureSchema::Full);

        let mut refit = HybridPredictor::new(HybridConfig::quick());
        refit.fit(&x1, &y1, 0.2).unwrap();
        refit.fit(&x2, &y2, 0.2).unwrap();

        let mut fresh = HybridPredictor::new(HybridConfig::quick());
        fresh.fit(&x2, &y2, 0.2).unwrap();

        assert_eq!(
            refit.predict_proba(&sample).unwrap(),
            fresh.predict_proba(&sample).unwrap()
        );
        assert_ne!(refit.model_id(), fresh.model_id());
    }

    #[test]
    fn test_json_roundtrip_reproduces_predictions() {
        let predictor = fitted(FeatureSchema::Full);
        let (sample, _) = training_data(30, 123, FeatureSchema::Full);

        let restored = HybridPredictor::from_json(&predictor.to_json().unwrap()).unwrap();
        assert_eq!(
            predictor.predict_proba(&sample).unwrap(),
            restored.predict_proba(&sample).unwrap()
        );
        assert_eq!(predictor.model_id(), restored.model_id());
        assert_eq!(predictor.feature_columns(), restored.feature_columns());
    }

    fn corrupted(predictor: &HybridPredictor, edit: impl FnOnce(&mut serde_json::Value)) -> String {
        let mut doc = serde_json::to_value(predictor).unwrap();
        edit(&mut doc);
        doc.to_string()
    }

    #[test]
    fn test_corrupted_saved_model_is_rejected() {
        let predictor = fitted(FeatureSchema::Compact);

        let reweighted = corrupted(&predictor, |doc| {
            doc["members"][0]["weight"] = serde_json::json!(0.9);
        });
        assert!(matches!(
            HybridPredictor::from_json(&reweighted),
            Err(ComputeError::InvalidConfig(_))
        ));

        let out_of_range_split = corrupted(&predictor, |doc| {
            let nodes = &mut doc["members"][1]["member"]["tree_ensemble"]["forest"]["trees"][0]
                ["nodes"];
            nodes[0]["Split"]["feature"] = serde_json::json!(500);
        });
        assert!(matches!(
            HybridPredictor::from_json(&out_of_range_split),
            Err(ComputeError::ShapeMismatch(_))
        ));

        let boosting_width = corrupted(&predictor, |doc| {
            doc["members"][1]["member"]["tree_ensemble"]["boosting"]["n_features"] =
                serde_json::json!(72);
        });
        assert!(matches!(
            HybridPredictor::from_json(&boosting_width),
            Err(ComputeError::ShapeMismatch(_))
        ));

        let neural_width = corrupted(&predictor, |doc| {
            doc["members"][0]["member"]["neural"]["n_features"] = serde_json::json!(72);
        });
        assert!(matches!(
            HybridPredictor::from_json(&neural_width),
            Err(ComputeError::ShapeMismatch(_))
        ));

        assert!(HybridPredictor::from_json(&predictor.to_json().unwrap()).is_ok());
    }

    #[test]
    fn test_unfitted_and_mismatched_inputs() {
        let unfitted = HybridPredictor::default();
        let (full, _) = training_data(5, 3, FeatureSchema::Full);
        assert!(matches!(
            unfitted.predict(&full),
            Err(ComputeError::NotFitted(_))
        ));

        let predictor = fitted(FeatureSchema::Full);
        let (compact, _) = training_data(5, 3, FeatureSchema::Compact);
        assert!(matches!(
            predictor.predict_proba(&compact),
            Err(ComputeError::FeatureMismatch(_))
        ));
    }

    #[test]
    fn test_reordered_columns_rejected() {
        let predictor = fitted(FeatureSchema::Compact);
        let (x, _) = training_data(3, 4, FeatureSchema::Compact);
        let mut columns = x.columns().to_vec();
        columns.swap(0, 1);
        let rows: Vec<Vec<f64>> = x.rows().to_vec();
        let swapped = FeatureMatrix::new(columns, rows).unwrap();

        match predictor.transform(&swapped) {
            Err(ComputeError::FeatureMismatch(msg)) => assert!(msg.contains("column 0")),
            other => panic!("expected FeatureMismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_missing_class_fails_fit() {
        let (x, mut y) = training_data(100, 8, FeatureSchema::Full);
        for label in y.iter_mut() {
            if *label == LearningStyle::Kinesthetic {
                *label = LearningStyle::Reading;
            }
        }
        let mut predictor = HybridPredictor::new(HybridConfig::quick());
        assert!(matches!(
            predictor.fit(&x, &y, 0.2),
            Err(ComputeError::MissingClasses { found: 3, .. })
        ));
        assert!(!predictor.is_fitted());
    }

    #[test]
    fn test_set_fusion_weights() {
        let mut predictor = fitted(FeatureSchema::Full);
        let (sample, _) = training_data(10, 2, FeatureSchema::Full);

        predictor.set_fusion_weights(FusionWeights::new(1.0, 0.0).unwrap()).unwrap();
        let fused = predictor.predict_proba(&sample).unwrap();
        let scaled = predictor.transform(&sample).unwrap();
        let neural = predictor.members()[0].member.predict_proba(&scaled).unwrap();
        assert_eq!(fused, neural);

        let unnormalized = FusionWeights {
            neural: 0.2,
            ensemble: 0.2,
        };
        assert!(predictor.set_fusion_weights(unnormalized).is_err());
    }

    #[test]
    fn test_concurrent_predictions() {
        let predictor = Arc::new(fitted(FeatureSchema::Full));
        let (sample, _) = training_data(20, 77, FeatureSchema::Full);
        let expected = predictor.predict_proba(&sample).unwrap();

        std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let predictor = Arc::clone(&predictor);
                    let sample = &sample;
                    s.spawn(move || predictor.predict_proba(sample).unwrap())
                })
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap(), expected);
            }
        });
    }
}

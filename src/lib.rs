//! Vark Flux - Hybrid VARK learning-style classifier
//!
//! Vark Flux turns learning-session telemetry into a learning-style prediction
//! through a deterministic pipeline: record validation → feature engineering →
//! standardization → neural and tree-ensemble members → weighted soft voting.
//!
//! ## Modules
//!
//! - **Data**: record types, JSON adapters, feature engineering, synthetic data
//! - **Models**: a batch-normalized MLP, a random forest + gradient boosting
//!   ensemble, and the hybrid predictor fusing them
//! - **Pipeline**: model lifecycle (train, save, load) and prediction reports

pub mod adapter;
pub mod classifier;
pub mod config;
pub mod error;
pub mod features;
pub mod hybrid;
pub mod metrics;
pub mod neural;
pub mod pipeline;
pub mod preprocessing;
pub mod synth;
pub mod tree;
pub mod types;

pub use config::HybridConfig;
pub use error::ComputeError;
pub use features::{engineer, engineer_batch, FeatureMatrix, FeatureSchema};
pub use hybrid::{FitReport, FusionWeights, HybridPredictor};
pub use metrics::ClassificationReport;
pub use pipeline::{classify_json, classify_record, PredictionReport, TrainingPlan, VarkProcessor};
pub use synth::synthesize;
pub use types::{LabeledRecord, LearningStyle, RawMetricsRecord, StylePrediction, StyleScores};

/// Vark Flux version recorded in CLI reports
pub const VARK_FLUX_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for CLI reports
pub const PRODUCER_NAME: &str = "vark-flux";

//! Error types for Vark Flux

use thiserror::Error;

/// Errors that can occur while engineering features, training or predicting
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Failed to parse metrics record: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid metrics record: {0}")]
    SchemaError(String),

    #[error("Questionnaire must have exactly {expected} answers, got {actual}")]
    QuestionnaireLength { expected: usize, actual: usize },

    #[error("Questionnaire answer {index} has invalid code {code} (expected 0-3)")]
    QuestionnaireCode { index: usize, code: u8 },

    #[error("Unknown learning style: {0}")]
    UnknownStyle(String),

    #[error("Model has not been fitted: {0}")]
    NotFitted(&'static str),

    #[error("Feature mismatch: {0}")]
    FeatureMismatch(String),

    #[error("Non-numeric feature '{column}' in row {row}")]
    NonNumericFeature { column: String, row: usize },

    #[error("Training labels cover {found} of {expected} learning styles (missing: {missing})")]
    MissingClasses {
        found: usize,
        expected: usize,
        missing: String,
    },

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("Model persistence error: {0}")]
    PersistenceError(#[from] std::io::Error),
}

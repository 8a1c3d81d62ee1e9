//! Error types for the pipeliner

use thiserror::Error;

/// Result type alias for pipeliner operations
pub type Result<T> = std::result::Result<T, PipelinerError>;

/// Main error type for the pipeliner
#[derive(Error, Debug)]
pub enum PipelinerError {
    /// A step, variant, banned combo or parameter grid does not line up with
    /// the declared steps.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The prefix cache was asked for a key sequence that cannot extend or
    /// truncate the current chain.
    #[error("Cache consistency error: {0}")]
    CacheConsistencyError(String),

    /// Grid search finished without a usable best candidate.
    #[error("Search error: {0}")]
    SearchError(String),

    /// A fit, predict or score call failed.
    #[error("Evaluation error: {0}")]
    EvaluationError(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl PipelinerError {
    /// Short stable name of the error kind, used for failure markers in
    /// result rows.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelinerError::ConfigError(_) => "configuration",
            PipelinerError::CacheConsistencyError(_) => "cache_consistency",
            PipelinerError::SearchError(_) => "search",
            PipelinerError::EvaluationError(_) => "evaluation",
            PipelinerError::DataError(_) => "data",
            PipelinerError::ShapeError { .. } => "shape",
            PipelinerError::ModelNotFitted => "not_fitted",
            PipelinerError::InvalidParameter { .. } => "invalid_parameter",
            PipelinerError::Unsupported(_) => "unsupported",
            PipelinerError::IoError(_) => "io",
            PipelinerError::SerializationError(_) => "serialization",
        }
    }

    /// Wrap a failure raised by a stage during fit/predict/score.
    ///
    /// Setup problems (bad configuration, bad parameter names, cache
    /// invariants) keep their own variant so they still fail fast.
    pub fn into_evaluation(self) -> Self {
        match self {
            PipelinerError::ConfigError(_)
            | PipelinerError::CacheConsistencyError(_)
            | PipelinerError::SearchError(_)
            | PipelinerError::EvaluationError(_)
            | PipelinerError::InvalidParameter { .. } => self,
            other => PipelinerError::EvaluationError(other.to_string()),
        }
    }

    /// Whether a run configured to isolate row failures may record this
    /// error and move on to the next row.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PipelinerError::EvaluationError(_))
    }
}

impl From<serde_json::Error> for PipelinerError {
    fn from(err: serde_json::Error) -> Self {
        PipelinerError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for PipelinerError {
    fn from(err: ndarray::ShapeError) -> Self {
        PipelinerError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

impl From<polars::error::PolarsError> for PipelinerError {
    fn from(err: polars::error::PolarsError) -> Self {
        PipelinerError::DataError(err.to_string())
    }
}

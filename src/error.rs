//! Error types for the churnflow pipeline

use std::fmt;
use thiserror::Error;

/// Result type alias for churnflow operations
pub type Result<T> = std::result::Result<T, ChurnflowError>;

/// Pipeline stage an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingestion,
    Validation,
    Transformation,
    Training,
    Evaluation,
    Pushing,
    Monitoring,
    Serving,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Ingestion => "data_ingestion",
            Stage::Validation => "data_validation",
            Stage::Transformation => "data_transformation",
            Stage::Training => "model_trainer",
            Stage::Evaluation => "model_evaluation",
            Stage::Pushing => "model_pusher",
            Stage::Monitoring => "drift_monitor",
            Stage::Serving => "serving",
        };
        f.write_str(name)
    }
}

/// Main error type for churnflow
#[derive(Error, Debug)]
pub enum ChurnflowError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Data source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Query failed: {0}")]
    QueryError(String),

    #[error("Registry error: {0}")]
    RegistryError(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Model quality below minimum: {metric} = {score:.4}, required >= {minimum:.4}")]
    ModelQuality {
        metric: String,
        score: f64,
        minimum: f64,
    },

    #[error("Data validation failed, refusing to continue: {0}")]
    ValidationFailed(String),

    #[error("No model is loaded")]
    ModelNotLoaded,

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("{stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<ChurnflowError>,
    },
}

impl ChurnflowError {
    /// Whether the failure is worth retrying (connectivity and storage I/O)
    pub fn is_transient(&self) -> bool {
        match self {
            ChurnflowError::SourceUnavailable(_) | ChurnflowError::IoError(_) => true,
            ChurnflowError::Stage { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Stage the error was raised in, if it has been wrapped
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ChurnflowError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Innermost error, skipping stage wrappers
    pub fn root_cause(&self) -> &ChurnflowError {
        match self {
            ChurnflowError::Stage { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Attach the originating stage to an error
pub trait StageContext<T> {
    fn in_stage(self, stage: Stage) -> Result<T>;
}

impl<T> StageContext<T> for Result<T> {
    fn in_stage(self, stage: Stage) -> Result<T> {
        self.map_err(|err| match err {
            // Already wrapped by the same stage
            ChurnflowError::Stage { stage: s, .. } if s == stage => err,
            other => ChurnflowError::Stage {
                stage,
                source: Box::new(other),
            },
        })
    }
}

impl From<polars::error::PolarsError> for ChurnflowError {
    fn from(err: polars::error::PolarsError) -> Self {
        ChurnflowError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for ChurnflowError {
    fn from(err: serde_json::Error) -> Self {
        ChurnflowError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ChurnflowError {
    fn from(err: serde_yaml::Error) -> Self {
        ChurnflowError::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for ChurnflowError {
    fn from(err: bincode::Error) -> Self {
        ChurnflowError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for ChurnflowError {
    fn from(err: ndarray::ShapeError) -> Self {
        ChurnflowError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

impl From<figment::Error> for ChurnflowError {
    fn from(err: figment::Error) -> Self {
        ChurnflowError::ConfigError(err.to_string())
    }
}

impl From<sqlx::Error> for ChurnflowError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => ChurnflowError::SourceUnavailable(err.to_string()),
            other => ChurnflowError::QueryError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ChurnflowError::DataError("test error".to_string());
        assert_eq!(err.to_string(), "Data error: test error");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ChurnflowError = io_err.into();
        assert!(matches!(err, ChurnflowError::IoError(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_stage_context_wraps_once() {
        let res: Result<()> = Err(ChurnflowError::SourceUnavailable("refused".into()));
        let err = res
            .in_stage(Stage::Ingestion)
            .in_stage(Stage::Ingestion)
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Ingestion));
        assert!(err.is_transient());
        assert!(matches!(err.root_cause(), ChurnflowError::SourceUnavailable(_)));
        assert_eq!(err.to_string(), "data_ingestion failed: Data source unavailable: refused");
    }

    #[test]
    fn test_quality_error_is_not_transient() {
        let err = ChurnflowError::ModelQuality {
            metric: "roc_auc".into(),
            score: 0.41,
            minimum: 0.6,
        };
        assert!(!err.is_transient());
    }
}

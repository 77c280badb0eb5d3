//! Stage artifacts
//!
//! Each artifact is produced by exactly one stage and handed to the next by
//! the orchestrator. They are plain values; nothing mutates them after the
//! producing stage returns.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::training::ClassificationMetrics;

/// Output of data ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionArtifact {
    pub raw_path: PathBuf,
    pub train_path: PathBuf,
    pub test_path: PathBuf,
    pub total_rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// Output of data validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationArtifact {
    pub validation_status: bool,
    pub report_path: PathBuf,
    pub message: Option<String>,
}

/// Output of data transformation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationArtifact {
    /// Resampled training matrix, label as the last column
    pub transformed_train_path: PathBuf,
    /// Transformed (never resampled) test matrix, label as the last column
    pub transformed_test_path: PathBuf,
    pub preprocessor_path: PathBuf,
    /// Column order of both transformed matrices
    pub feature_names: Vec<String>,
    pub label_column: String,
    pub raw_train_path: PathBuf,
    pub raw_test_path: PathBuf,
    pub train_rows_before: usize,
    pub train_rows_after: usize,
    pub test_rows: usize,
}

/// Output of model training
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerArtifact {
    pub trained_model_path: PathBuf,
    /// Version in the staging registry
    pub registry_version: u64,
    pub run_id: String,
    pub train_metrics: ClassificationMetrics,
    pub test_metrics: Option<ClassificationMetrics>,
    /// Value of the acceptance metric that was checked against the minimum
    pub score: f64,
}

/// Output of champion/challenger evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationArtifact {
    pub is_model_accepted: bool,
    pub report_path: PathBuf,
    pub challenger_score: f64,
    /// Sentinel 0.0 when no champion exists
    pub champion_score: f64,
    pub champion_version: Option<u64>,
    pub margin: f64,
}

/// Output of the pusher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PusherArtifact {
    pub promoted: bool,
    pub production_version: Option<u64>,
    pub production_uri: Option<String>,
}

impl PusherArtifact {
    pub fn not_promoted() -> Self {
        Self {
            promoted: false,
            production_version: None,
            production_uri: None,
        }
    }
}

//! Typed pipeline configuration
//!
//! One struct per stage, aggregated in [`PipelineConfig`]. Every struct has
//! defaults matching the churn project so a partial YAML file is enough.
//! Loading and validation live in [`loader`].

mod loader;

pub use loader::{ConfigError, ConfigLoader};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::preprocessing::DerivedFeature;
use crate::training::{MetricKind, ModelSpec};

/// Whole-pipeline configuration, constructed once at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub logging: LoggingConfig,
    pub registry: RegistryConfig,
    pub storage: StorageConfig,
    pub retry: RetrySettings,
    pub ingestion: IngestionConfig,
    pub schema: SchemaConfig,
    pub validation: ValidationConfig,
    pub transformation: TransformationConfig,
    pub trainer: TrainerConfig,
    pub evaluation: EvaluationConfig,
    pub pusher: PusherConfig,
    pub monitor: MonitorConfig,
    pub server: ServerSettings,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

/// Model registry and experiment tracker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Root directory of the tracking store
    pub tracking_uri: PathBuf,
    pub experiment_name: String,
    /// Staging namespace where freshly trained versions land
    pub registry_name: String,
    /// Production namespace carrying the `champion` alias
    pub prod_registry_name: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            tracking_uri: PathBuf::from("mlruns"),
            experiment_name: "churn_prediction".to_string(),
            registry_name: "churn_model_staging".to_string(),
            prod_registry_name: "churn_model_prod".to_string(),
        }
    }
}

impl RegistryConfig {
    pub fn registry_root(&self) -> PathBuf {
        self.tracking_uri.join("registry")
    }

    pub fn experiments_root(&self) -> PathBuf {
        self.tracking_uri.join("experiments")
    }
}

/// Object storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Local directory standing in for the bucket namespace
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("object_store"),
        }
    }
}

/// Retry policy for the ingestion stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub delay_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay_secs: 10,
        }
    }
}

/// Where raw rows come from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Any database URL understood by sqlx (mysql://, sqlite://)
    Sql { url: String, max_connections: u32 },
    /// Local CSV snapshot, for offline runs
    Csv { path: PathBuf },
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Csv {
            path: PathBuf::from("data/churners.csv"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub source: SourceConfig,
    /// Query template; `{columns}` is replaced by the schema column list
    pub base_query: String,
    pub raw_path: PathBuf,
    pub train_path: PathBuf,
    pub test_path: PathBuf,
    pub test_size: f64,
    pub random_state: u64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            base_query: "SELECT {columns} FROM churners".to_string(),
            raw_path: PathBuf::from("artifacts/data_ingestion/raw.csv"),
            train_path: PathBuf::from("artifacts/data_ingestion/train.csv"),
            test_path: PathBuf::from("artifacts/data_ingestion/test.csv"),
            test_size: 0.2,
            random_state: 42,
        }
    }
}

/// Declared column and its expected dtype tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub dtype: String,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, dtype: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dtype: dtype.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub target_column: String,
    /// Ordered; the ingestion query selects exactly these
    pub columns: Vec<ColumnSpec>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            target_column: "Attrition_Flag".to_string(),
            columns: vec![
                ColumnSpec::new("Total_Relationship_Count", "int64"),
                ColumnSpec::new("Credit_Limit", "float64"),
                ColumnSpec::new("Total_Revolving_Bal", "int64"),
                ColumnSpec::new("Total_Amt_Chng_Q4_Q1", "float64"),
                ColumnSpec::new("Total_Trans_Amt", "int64"),
                ColumnSpec::new("Total_Trans_Ct", "int64"),
                ColumnSpec::new("Total_Ct_Chng_Q4_Q1", "float64"),
                ColumnSpec::new("Avg_Utilization_Ratio", "float64"),
                ColumnSpec::new("Attrition_Flag", "object"),
            ],
        }
    }
}

impl SchemaConfig {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Columns other than the target
    pub fn feature_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.name != self.target_column)
            .map(|c| c.name.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub report_path: PathBuf,
    /// p-value threshold used by the dataset comparison mode
    pub drift_threshold: f64,
    pub sample_rows: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            report_path: PathBuf::from("artifacts/data_validation/report.json"),
            drift_threshold: 0.05,
            sample_rows: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformationConfig {
    pub transformed_train_path: PathBuf,
    pub transformed_test_path: PathBuf,
    pub preprocessor_path: PathBuf,
    /// Target value mapped to 1
    pub positive_label: String,
    /// Target value mapped to 0
    pub negative_label: String,
    pub derived_features: Vec<DerivedFeature>,
    /// Raw columns removed after feature engineering
    pub drop_columns: Vec<String>,
    pub smote_k_neighbors: usize,
    pub random_state: u64,
}

impl Default for TransformationConfig {
    fn default() -> Self {
        Self {
            transformed_train_path: PathBuf::from("artifacts/data_transformation/train.csv"),
            transformed_test_path: PathBuf::from("artifacts/data_transformation/test.csv"),
            preprocessor_path: PathBuf::from("artifacts/data_transformation/preprocessor.bin"),
            positive_label: "Attrited Customer".to_string(),
            negative_label: "Existing Customer".to_string(),
            derived_features: DerivedFeature::churn_defaults(),
            drop_columns: Vec::new(),
            smote_k_neighbors: 5,
            random_state: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub model: ModelSpec,
    pub trained_model_path: PathBuf,
    pub acceptance_metric: MetricKind,
    /// Below this the run fails outright
    pub min_acceptance_score: f64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            model: ModelSpec::default(),
            trained_model_path: PathBuf::from("artifacts/model_trainer/model.bin"),
            acceptance_metric: MetricKind::RocAuc,
            min_acceptance_score: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub report_path: PathBuf,
    pub metric: MetricKind,
    /// Challenger must beat the champion by strictly more than this
    pub margin: f64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            report_path: PathBuf::from("artifacts/model_evaluation/report.json"),
            metric: MetricKind::RocAuc,
            margin: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PusherConfig {
    /// Fixed location the serving component loads from
    pub production_uri: String,
}

impl Default for PusherConfig {
    fn default() -> Self {
        Self {
            production_uri: "s3://churn-models/production/churn_model".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub log_bucket: String,
    pub log_prefix: String,
    pub reports_uri: String,
    pub threshold: f64,
    /// Fewer current rows than this marks the report unreliable
    pub min_samples: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            log_bucket: "churn-prediction-logs".to_string(),
            log_prefix: "predictions".to_string(),
            reports_uri: "s3://churn-prediction-logs/monitoring_reports".to_string(),
            threshold: 0.05,
            min_samples: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub log_requests: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            log_requests: true,
        }
    }
}

//! Layered configuration loading and eager validation

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use super::{PipelineConfig, SourceConfig};
use crate::error::{ChurnflowError, Result};

/// Configuration error types
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid test_size: {0}. Must be strictly between 0 and 1")]
    InvalidSplitRatio(f64),

    #[error("Schema must declare at least one column")]
    EmptySchema,

    #[error("Target column '{0}' is not declared in the schema")]
    TargetNotInSchema(String),

    #[error("Base query must contain the {{columns}} placeholder: {0}")]
    MissingColumnsPlaceholder(String),

    #[error("Invalid {name} threshold: {value}. Must be strictly between 0 and 1")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("Invalid margin: {0}. Cannot be negative")]
    InvalidMargin(f64),

    #[error("Registry name cannot be empty")]
    EmptyRegistryName,

    #[error("Staging and production registry names must differ (both '{0}')")]
    SameRegistryNames(String),

    #[error("Invalid model parameters: {0}")]
    InvalidModelParams(String),

    #[error("Invalid min_samples: {0}. Must be at least 1")]
    InvalidMinSamples(usize),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

impl From<ConfigError> for ChurnflowError {
    fn from(err: ConfigError) -> Self {
        ChurnflowError::ConfigError(err.to_string())
    }
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Default project config location
    pub const DEFAULT_PATH: &'static str = "config/pipeline.yaml";

    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. YAML file (`config/pipeline.yaml` unless a path is given)
    /// 3. Environment variables (`CHURNFLOW_` prefix, `__` separates nesting)
    pub fn load(path: Option<&Path>) -> Result<PipelineConfig> {
        let path = path.unwrap_or_else(|| Path::new(Self::DEFAULT_PATH));
        let config: PipelineConfig = Figment::new()
            .merge(Serialized::defaults(PipelineConfig::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("CHURNFLOW_").split("__"))
            .extract()?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load from a YAML string, without environment overrides
    pub fn from_yaml_str(yaml: &str) -> Result<PipelineConfig> {
        let config: PipelineConfig = Figment::new()
            .merge(Serialized::defaults(PipelineConfig::default()))
            .merge(Yaml::string(yaml))
            .extract()?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &PipelineConfig) -> std::result::Result<(), ConfigError> {
        let ingestion = &config.ingestion;
        if !(ingestion.test_size > 0.0 && ingestion.test_size < 1.0) {
            return Err(ConfigError::InvalidSplitRatio(ingestion.test_size));
        }
        if !ingestion.base_query.contains("{columns}") {
            return Err(ConfigError::MissingColumnsPlaceholder(
                ingestion.base_query.clone(),
            ));
        }
        if let SourceConfig::Sql { url, max_connections } = &ingestion.source {
            if url.is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "database url cannot be empty".to_string(),
                ));
            }
            if *max_connections == 0 {
                return Err(ConfigError::ValidationFailed(
                    "max_connections must be at least 1".to_string(),
                ));
            }
        }

        let schema = &config.schema;
        if schema.columns.is_empty() {
            return Err(ConfigError::EmptySchema);
        }
        if !schema.columns.iter().any(|c| c.name == schema.target_column) {
            return Err(ConfigError::TargetNotInSchema(schema.target_column.clone()));
        }

        Self::check_threshold("validation drift", config.validation.drift_threshold)?;
        Self::check_threshold("monitor", config.monitor.threshold)?;

        if config.monitor.min_samples == 0 {
            return Err(ConfigError::InvalidMinSamples(config.monitor.min_samples));
        }

        if config.evaluation.margin < 0.0 || config.evaluation.margin.is_nan() {
            return Err(ConfigError::InvalidMargin(config.evaluation.margin));
        }

        let registry = &config.registry;
        if registry.registry_name.is_empty() || registry.prod_registry_name.is_empty() {
            return Err(ConfigError::EmptyRegistryName);
        }
        if registry.registry_name == registry.prod_registry_name {
            return Err(ConfigError::SameRegistryNames(registry.registry_name.clone()));
        }

        config
            .trainer
            .model
            .validate()
            .map_err(ConfigError::InvalidModelParams)?;

        for feature in &config.transformation.derived_features {
            feature.validate().map_err(ConfigError::ValidationFailed)?;
        }

        if config.transformation.smote_k_neighbors == 0 {
            return Err(ConfigError::ValidationFailed(
                "smote_k_neighbors must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    fn check_threshold(name: &'static str, value: f64) -> std::result::Result<(), ConfigError> {
        if value > 0.0 && value < 1.0 {
            Ok(())
        } else {
            Err(ConfigError::InvalidThreshold { name, value })
        }
    }
}

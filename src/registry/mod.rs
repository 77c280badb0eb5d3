//! Model registry
//!
//! Named models, each with monotonically numbered versions, free-form tags
//! and movable aliases. The pipeline registers candidates into a staging
//! name and copies accepted ones into a production name carrying the
//! `champion` alias.

mod local;

pub use local::LocalModelRegistry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{ChurnflowError, Result};

/// Alias of the production version the serving side loads
pub const CHAMPION_ALIAS: &str = "champion";
/// Alias set on the staging version that passed evaluation
pub const CANDIDATE_ALIAS: &str = "candidate";
/// Tag key recording where a version is in the promotion protocol
pub const VALIDATION_STATUS_TAG: &str = "validation_status";

/// Version number or alias within a registered model
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModelRef {
    Version(u64),
    Alias(String),
}

/// `models:/<name>/<version>` or `models:/<name>@<alias>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelUri {
    pub name: String,
    pub reference: ModelRef,
}

impl ModelUri {
    const SCHEME: &'static str = "models:/";

    pub fn version(name: impl Into<String>, version: u64) -> Self {
        Self {
            name: name.into(),
            reference: ModelRef::Version(version),
        }
    }

    pub fn alias(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reference: ModelRef::Alias(alias.into()),
        }
    }

    pub fn parse(uri: &str) -> Result<Self> {
        let invalid = || ChurnflowError::InvalidInput(format!("Invalid model URI: {}", uri));
        let rest = uri.strip_prefix(Self::SCHEME).ok_or_else(invalid)?;

        if let Some((name, alias)) = rest.split_once('@') {
            if name.is_empty() || alias.is_empty() || name.contains('/') {
                return Err(invalid());
            }
            return Ok(Self::alias(name, alias));
        }

        let (name, version) = rest.rsplit_once('/').ok_or_else(invalid)?;
        if name.is_empty() {
            return Err(invalid());
        }
        let version = version.parse::<u64>().map_err(|_| invalid())?;
        Ok(Self::version(name, version))
    }
}

impl fmt::Display for ModelUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reference {
            ModelRef::Version(v) => write!(f, "{}{}/{}", Self::SCHEME, self.name, v),
            ModelRef::Alias(a) => write!(f, "{}{}@{}", Self::SCHEME, self.name, a),
        }
    }
}

/// Serialized model plus the metadata registered alongside it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelBundle {
    pub payload: Vec<u8>,
    pub run_id: Option<String>,
    pub metrics: BTreeMap<String, f64>,
}

impl ModelBundle {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            ..Default::default()
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_metrics(mut self, metrics: impl IntoIterator<Item = (String, f64)>) -> Self {
        self.metrics.extend(metrics);
        self
    }
}

/// Registry record for one version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersionInfo {
    pub name: String,
    pub version: u64,
    pub registered_at: DateTime<Utc>,
    #[serde(default)]
    pub run_id: Option<String>,
    /// Set when the version was copied from another registered model
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    /// Aliases currently pointing here; filled in on read
    #[serde(default)]
    pub aliases: Vec<String>,
    /// SHA-256 of the payload, hex encoded
    pub checksum: String,
}

impl ModelVersionInfo {
    pub fn uri(&self) -> ModelUri {
        ModelUri::version(&self.name, self.version)
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Operations the pipeline needs from a model registry
///
/// Version assignment and alias moves are expected to be atomic: an alias
/// names at most one version of a model at any time.
pub trait ModelRegistry: Send + Sync {
    /// Store a new version under `name`, numbered one past the current max
    fn register(&self, name: &str, bundle: &ModelBundle) -> Result<ModelVersionInfo>;

    fn set_tag(&self, name: &str, version: u64, key: &str, value: &str) -> Result<()>;

    /// Point `alias` at `version`, moving it off any other version
    fn set_alias(&self, name: &str, alias: &str, version: u64) -> Result<()>;

    fn delete_alias(&self, name: &str, alias: &str) -> Result<()>;

    /// Look up a version; `None` when the model, version or alias is absent
    fn resolve(&self, uri: &ModelUri) -> Result<Option<ModelVersionInfo>>;

    fn get_version(&self, name: &str, version: u64) -> Result<ModelVersionInfo>;

    /// Read back the payload; `ModelNotFound` when the URI does not resolve
    fn load(&self, uri: &ModelUri) -> Result<ModelBundle>;

    /// Register the payload behind `src` as a new version of `dst_name`
    fn copy_version(&self, src: &ModelUri, dst_name: &str) -> Result<ModelVersionInfo>;

    /// All versions of `name`, oldest first
    fn list_versions(&self, name: &str) -> Result<Vec<ModelVersionInfo>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version_uri() {
        let uri = ModelUri::parse("models:/churn_model_staging/12").unwrap();
        assert_eq!(uri, ModelUri::version("churn_model_staging", 12));
        assert_eq!(uri.to_string(), "models:/churn_model_staging/12");
    }

    #[test]
    fn test_parse_alias_uri() {
        let uri = ModelUri::parse("models:/churn_model_prod@champion").unwrap();
        assert_eq!(uri.reference, ModelRef::Alias("champion".to_string()));
        assert_eq!(uri.to_string(), "models:/churn_model_prod@champion");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in [
            "churn/1",
            "models:/",
            "models:/churn",
            "models:/churn/latest",
            "models:/@champion",
            "models:/churn@",
        ] {
            assert!(ModelUri::parse(bad).is_err(), "{} should not parse", bad);
        }
    }
}

//! Prediction service backed by the mirrored production bundle
//!
//! The service is constructed explicitly and handed to the HTTP layer. It
//! holds at most one loaded model; `reload` swaps it in one step, so a
//! request sees either the old model or the new one, never a mix.

mod request_log;

pub use request_log::{LoggedInput, RequestLogRecord, RequestLogger};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{ChurnflowError, Result};
use crate::pusher::{ProductionMetadata, METADATA_FILE, MODEL_DIR, MODEL_FILE};
use crate::storage::{ObjectStore, ObjectUri};
use crate::training::InferencePipeline;
use crate::utils::records_to_frame;

/// One JSON object per row, keyed by raw feature column
pub type Record = Map<String, Value>;

/// A decoded production bundle
#[derive(Debug)]
pub struct LoadedModel {
    pub pipeline: InferencePipeline,
    pub metadata: ProductionMetadata,
}

impl LoadedModel {
    pub fn version(&self) -> u64 {
        self.metadata.version
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub predictions: Vec<i64>,
    pub probabilities: Vec<f64>,
    pub model_version: u64,
    pub timestamp: DateTime<Utc>,
    pub num_samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub model_version: Option<u64>,
    pub model_loaded: bool,
}

pub struct PredictionService {
    store: Arc<dyn ObjectStore>,
    production_uri: ObjectUri,
    model: RwLock<Option<Arc<LoadedModel>>>,
}

impl PredictionService {
    pub fn new(store: Arc<dyn ObjectStore>, production_uri: ObjectUri) -> Self {
        Self {
            store,
            production_uri,
            model: RwLock::new(None),
        }
    }

    /// Build the service and attempt a first load
    ///
    /// A failed load is logged and leaves the service without a model.
    pub fn bootstrap(store: Arc<dyn ObjectStore>, production_uri: ObjectUri) -> Self {
        let service = Self::new(store, production_uri);
        if let Err(err) = service.reload() {
            warn!(
                uri = %service.production_uri,
                error = %err,
                "Initial model load failed, serving without a model"
            );
        }
        service
    }

    pub fn production_uri(&self) -> &ObjectUri {
        &self.production_uri
    }

    /// Download the production folder and swap the loaded model
    pub fn reload(&self) -> Result<u64> {
        let scratch = tempfile::tempdir()?;
        self.store
            .download_folder(&self.production_uri, scratch.path())?;

        let metadata: ProductionMetadata =
            serde_json::from_slice(&std::fs::read(scratch.path().join(METADATA_FILE))?)?;
        let payload = std::fs::read(scratch.path().join(MODEL_DIR).join(MODEL_FILE))?;
        let pipeline = InferencePipeline::from_bytes(&payload)?;

        let version = metadata.version;
        let loaded = Arc::new(LoadedModel { pipeline, metadata });
        *self.model.write() = Some(loaded);
        info!(uri = %self.production_uri, version, "Production model loaded");
        Ok(version)
    }

    pub fn current(&self) -> Option<Arc<LoadedModel>> {
        self.model.read().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.model.read().is_some()
    }

    pub fn health(&self) -> HealthStatus {
        let current = self.current();
        HealthStatus {
            status: "ok".to_string(),
            model_version: current.as_ref().map(|m| m.version()),
            model_loaded: current.is_some(),
        }
    }

    pub fn predict(&self, records: &[Record]) -> Result<PredictionResponse> {
        let model = self.current().ok_or(ChurnflowError::ModelNotLoaded)?;
        check_records(records, model.pipeline.input_columns())?;

        let frame = records_to_frame(records)?;
        let probabilities = model.pipeline.predict_proba(&frame)?;
        let predictions = probabilities
            .iter()
            .map(|&p| i64::from(p >= InferencePipeline::DECISION_THRESHOLD))
            .collect();

        Ok(PredictionResponse {
            predictions,
            probabilities: probabilities.to_vec(),
            model_version: model.version(),
            timestamp: Utc::now(),
            num_samples: records.len(),
        })
    }
}

/// Reject input the model could not score
fn check_records(records: &[Record], required: &[String]) -> Result<()> {
    if records.is_empty() {
        return Err(ChurnflowError::InvalidInput("no records supplied".into()));
    }
    if records
        .iter()
        .all(|r| r.values().all(Value::is_null))
    {
        return Err(ChurnflowError::InvalidInput(
            "every supplied value is null".into(),
        ));
    }
    for (row, record) in records.iter().enumerate() {
        let missing: Vec<&str> = required
            .iter()
            .filter(|c| !record.contains_key(c.as_str()))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(ChurnflowError::InvalidInput(format!(
                "record {} is missing required columns: {}",
                row,
                missing.join(", ")
            )));
        }
    }
    Ok(())
}

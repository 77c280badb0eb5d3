//! Per-request prediction log, partitioned by UTC date
//!
//! The drift monitor reads these records back as its current sample.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{PredictionResponse, Record};
use crate::storage::{ObjectStore, ObjectUri};

/// Single requests log `input`, batch requests log `inputs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LoggedInput {
    #[serde(rename = "input")]
    Single(Record),
    #[serde(rename = "inputs")]
    Batch(Vec<Record>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLogRecord {
    pub request_id: String,
    pub log_timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub input: LoggedInput,
    pub predictions: Vec<i64>,
    pub model_version: u64,
    pub prediction_timestamp: DateTime<Utc>,
    pub num_samples: usize,
    pub latency_seconds: f64,
}

impl RequestLogRecord {
    pub fn new(input: LoggedInput, response: &PredictionResponse, latency_seconds: f64) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            log_timestamp: Utc::now(),
            input,
            predictions: response.predictions.clone(),
            model_version: response.model_version,
            prediction_timestamp: response.timestamp,
            num_samples: response.num_samples,
            latency_seconds,
        }
    }

    /// `<prefix>/date=YYYY-MM-DD/id=<request_id>.json`
    pub fn key(&self, prefix: &str) -> String {
        format!(
            "{}/date={}/id={}.json",
            prefix.trim_end_matches('/'),
            self.log_timestamp.format("%Y-%m-%d"),
            self.request_id
        )
    }
}

pub struct RequestLogger {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: String,
}

impl RequestLogger {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    /// Write one record; failures are logged and swallowed
    pub fn log(&self, record: &RequestLogRecord) {
        let uri = ObjectUri::new(&self.bucket, record.key(&self.prefix));
        let written = serde_json::to_vec(record)
            .map_err(Into::into)
            .and_then(|bytes| self.store.put_object(&uri, &bytes));
        match written {
            Ok(()) => debug!(uri = %uri, "Prediction logged"),
            Err(err) => warn!(uri = %uri, error = %err, "Failed to log prediction request"),
        }
    }
}

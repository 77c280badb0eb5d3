//! Scheduled drift check over logged production inputs

use async_trait::async_trait;
use chrono::NaiveDate;
use polars::prelude::*;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::report::{check_drift_with_min_samples, DriftReport};
use crate::config::{MonitorConfig, SchemaConfig};
use crate::error::{Result, Stage, StageContext};
use crate::ingestion::{build_query, DataSource};
use crate::pipeline::{FlowOutcome, TrainingTrigger};
use crate::storage::{ObjectStore, ObjectUri};
use crate::utils::records_to_frame;

pub const DRIFT_TRIGGER_REASON: &str = "Data Drift Detected";

/// Starts a training run out-of-band
#[async_trait]
pub trait RetrainingLauncher: Send + Sync {
    async fn launch(&self, trigger: TrainingTrigger) -> Result<FlowOutcome>;
}

#[derive(Debug, Clone)]
pub enum RetrainDecision {
    NotTriggered,
    Triggered {
        trigger: TrainingTrigger,
        outcome: FlowOutcome,
    },
}

#[derive(Debug, Clone)]
pub enum MonitorOutcome {
    /// Nothing was logged for the date
    NoData,
    Checked {
        report: DriftReport,
        retrain: RetrainDecision,
    },
}

/// Launch retraining when the report shows drift; otherwise do nothing
pub async fn maybe_retrain(
    report: &DriftReport,
    date: NaiveDate,
    launcher: &dyn RetrainingLauncher,
) -> Result<RetrainDecision> {
    if !report.drift_detected {
        info!(date = %date, "No drift detected, retraining not needed");
        return Ok(RetrainDecision::NotTriggered);
    }

    let drifted_features = report.drifted_features();
    let trigger = TrainingTrigger {
        trigger_reason: DRIFT_TRIGGER_REASON.to_string(),
        drift_date: Some(date),
        threshold: Some(report.threshold),
        num_drifted_features: drifted_features.len(),
        drifted_features,
    };
    info!(
        date = %date,
        drifted = ?trigger.drifted_features,
        "Drift detected, launching retraining"
    );
    let outcome = launcher.launch(trigger.clone()).await?;
    Ok(RetrainDecision::Triggered { trigger, outcome })
}

/// Parse one logged request into input rows
fn logged_rows(bytes: &[u8]) -> std::result::Result<Vec<Map<String, Value>>, String> {
    let record: Value = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
    let rows = match record.get("inputs").or_else(|| record.get("input")) {
        Some(Value::Object(row)) => vec![row.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::Object(row) => Ok(row.clone()),
                other => Err(format!("input row is not an object: {}", other)),
            })
            .collect::<std::result::Result<_, _>>()?,
        Some(other) => return Err(format!("unexpected input payload: {}", other)),
        None => Vec::new(),
    };
    Ok(rows)
}

/// Coerce one logged row to the schema's declared feature dtypes
///
/// Numeric columns accept numbers and numeric strings, text columns accept
/// any scalar, boolean columns accept booleans. Anything else becomes null.
/// Keys outside the schema are dropped. Returns the row and the number of
/// values that had to be nulled.
fn conform_row(row: &Map<String, Value>, schema: &SchemaConfig) -> (Map<String, Value>, usize) {
    let mut out = Map::new();
    let mut nulled = 0;
    for spec in schema.columns.iter().filter(|c| c.name != schema.target_column) {
        let Some(value) = row.get(&spec.name) else {
            continue;
        };
        let dtype = spec.dtype.to_ascii_lowercase();
        let coerced = match value {
            Value::Null => Value::Null,
            _ if dtype.starts_with("int") || dtype.starts_with("float") => match value {
                Value::Number(_) => value.clone(),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map_or(Value::Null, Value::Number),
                _ => Value::Null,
            },
            _ if dtype == "bool" => match value {
                Value::Bool(_) => value.clone(),
                _ => Value::Null,
            },
            Value::String(_) => value.clone(),
            Value::Number(n) => Value::String(n.to_string()),
            Value::Bool(b) => Value::String(b.to_string()),
            _ => Value::Null,
        };
        if coerced.is_null() && !value.is_null() {
            nulled += 1;
        }
        out.insert(spec.name.clone(), coerced);
    }
    (out, nulled)
}

pub struct DriftMonitor {
    config: MonitorConfig,
    schema: SchemaConfig,
    base_query: String,
    source: Arc<dyn DataSource>,
    store: Arc<dyn ObjectStore>,
}

impl DriftMonitor {
    pub fn new(
        config: MonitorConfig,
        schema: SchemaConfig,
        base_query: impl Into<String>,
        source: Arc<dyn DataSource>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            config,
            schema,
            base_query: base_query.into(),
            source,
            store,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Training reference: the schema's feature columns, no target
    pub async fn load_reference(&self) -> Result<DataFrame> {
        let query = build_query(&self.base_query, &self.schema.feature_columns());
        let df = self.source.fetch(&query).await?;
        if df.column(&self.schema.target_column).is_ok() {
            return Ok(df.drop(&self.schema.target_column)?);
        }
        Ok(df)
    }

    fn partition_prefix(&self, date: NaiveDate) -> String {
        format!(
            "{}/date={}/",
            self.config.log_prefix.trim_matches('/'),
            date.format("%Y-%m-%d")
        )
    }

    /// Inputs of every request logged on `date`, flattened to one frame
    ///
    /// Records that cannot be read are skipped with a warning. Values are
    /// coerced to the schema dtypes, so one oddly typed request cannot
    /// break the frame for the whole day.
    pub fn fetch_logged_inputs(&self, date: NaiveDate) -> Result<DataFrame> {
        let bucket = &self.config.log_bucket;
        let keys = self.store.list_objects(bucket, &self.partition_prefix(date))?;

        let mut rows = Vec::new();
        for key in keys.iter().filter(|k| k.ends_with(".json")) {
            let bytes = self.store.get_object(&ObjectUri::new(bucket.as_str(), key))?;
            match logged_rows(&bytes) {
                Ok(parsed) => {
                    for row in &parsed {
                        let (row, nulled) = conform_row(row, &self.schema);
                        if nulled > 0 {
                            warn!(key = %key, nulled, "Logged values do not match the schema dtypes, treating them as missing");
                        }
                        rows.push(row);
                    }
                }
                Err(reason) => warn!(key = %key, reason = %reason, "Skipping unreadable log record"),
            }
        }

        info!(date = %date, records = keys.len(), rows = rows.len(), "Loaded logged inputs");
        if rows.is_empty() {
            return Ok(DataFrame::empty());
        }
        records_to_frame(&rows)
    }

    /// Upload the metadata record and the rendered report under the date
    pub fn persist_report(&self, report: &DriftReport, date: NaiveDate) -> Result<ObjectUri> {
        let target = ObjectUri::parse(&self.config.reports_uri)?
            .join(format!("date={}", date.format("%Y-%m-%d")));

        let staging = tempfile::tempdir()?;
        let metadata = serde_json::to_vec_pretty(&report.metadata(date))?;
        std::fs::write(staging.path().join("drift_metadata.json"), metadata)?;
        std::fs::write(
            staging.path().join("drift_report.md"),
            report.render_markdown(date),
        )?;
        self.store.upload_folder(staging.path(), &target)?;

        info!(uri = %target, "Drift report stored");
        Ok(target)
    }

    /// Full monitoring pass for one date partition
    pub async fn run(
        &self,
        date: NaiveDate,
        launcher: &dyn RetrainingLauncher,
    ) -> Result<MonitorOutcome> {
        let report = match self.check(date).await.in_stage(Stage::Monitoring)? {
            Some(report) => report,
            None => {
                info!(date = %date, "No logged inputs for date");
                return Ok(MonitorOutcome::NoData);
            }
        };
        let retrain = maybe_retrain(&report, date, launcher).await?;
        Ok(MonitorOutcome::Checked { report, retrain })
    }

    async fn check(&self, date: NaiveDate) -> Result<Option<DriftReport>> {
        let current = self.fetch_logged_inputs(date)?;
        if current.height() == 0 {
            return Ok(None);
        }
        let reference = self.load_reference().await?;
        let report = check_drift_with_min_samples(
            &reference,
            &current,
            self.config.threshold,
            self.config.min_samples,
        )?;
        info!(
            date = %date,
            drift_detected = report.drift_detected,
            drifted = report.drifted_features().len(),
            tested = report.features.len(),
            "Drift check complete"
        );
        self.persist_report(&report, date)?;
        Ok(Some(report))
    }
}

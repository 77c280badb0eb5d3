//! Data validation stage
//!
//! Fail-closed checks on the raw snapshot: declared columns present, dtype
//! tags as declared, no missing values. Any failing check makes the artifact
//! negative and the orchestrator stops before transformation.
//!
//! [`DriftValidation`] is the alternate mode that compares two datasets.

mod drift;

pub use drift::{ColumnDrift, ColumnKind, DriftValidation, DriftValidationReport};

use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

use crate::artifact::ValidationArtifact;
use crate::config::{SchemaConfig, ValidationConfig};
use crate::error::Result;
use crate::utils::{save_json, DataLoader};

/// Pandas-style name of a column dtype, as declared in the schema
pub fn dtype_tag(dtype: &DataType) -> String {
    match dtype {
        DataType::Int64 => "int64".to_string(),
        DataType::Int32 => "int32".to_string(),
        DataType::Float64 => "float64".to_string(),
        DataType::Float32 => "float32".to_string(),
        DataType::String => "object".to_string(),
        DataType::Boolean => "bool".to_string(),
        other => other.to_string().to_lowercase(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationChecks {
    pub columns: bool,
    pub data_types: bool,
    pub missing_values: bool,
}

impl ValidationChecks {
    pub fn passed(&self) -> bool {
        self.columns && self.data_types && self.missing_values
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeMismatch {
    pub column: String,
    pub expected: String,
    pub actual: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationDetails {
    pub missing_columns: Vec<String>,
    pub type_mismatches: Vec<TypeMismatch>,
    /// Only columns with at least one null
    pub null_counts: BTreeMap<String, usize>,
}

/// Persisted audit record of one validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub timestamp: DateTime<Utc>,
    pub status: bool,
    pub checks: ValidationChecks,
    pub details: ValidationDetails,
    pub sample: Vec<Map<String, Value>>,
}

impl ValidationReport {
    fn summary(&self) -> Option<String> {
        if self.status {
            return None;
        }
        let mut reasons = Vec::new();
        if !self.details.missing_columns.is_empty() {
            reasons.push(format!(
                "missing columns: {}",
                self.details.missing_columns.join(", ")
            ));
        }
        for m in &self.details.type_mismatches {
            reasons.push(format!(
                "column '{}' is {} (expected {})",
                m.column, m.actual, m.expected
            ));
        }
        if !self.details.null_counts.is_empty() {
            let columns: Vec<&str> = self.details.null_counts.keys().map(String::as_str).collect();
            reasons.push(format!("missing values in: {}", columns.join(", ")));
        }
        Some(reasons.join("; "))
    }
}

fn json_cell(value: AnyValue<'_>) -> Value {
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Bool(b),
        AnyValue::Int32(v) => Value::from(v),
        AnyValue::Int64(v) => Value::from(v),
        AnyValue::UInt32(v) => Value::from(v),
        AnyValue::UInt64(v) => Value::from(v),
        AnyValue::Float32(v) => serde_json::Number::from_f64(v as f64).map_or(Value::Null, Value::Number),
        AnyValue::Float64(v) => serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number),
        AnyValue::String(s) => Value::String(s.to_string()),
        AnyValue::StringOwned(s) => Value::String(s.to_string()),
        other => Value::String(other.to_string()),
    }
}

/// First `n` rows as JSON objects
pub fn frame_sample(df: &DataFrame, n: usize) -> Result<Vec<Map<String, Value>>> {
    let rows = n.min(df.height());
    let mut sample = Vec::with_capacity(rows);
    for i in 0..rows {
        let mut row = Map::new();
        for column in df.get_columns() {
            row.insert(column.name().to_string(), json_cell(column.get(i)?));
        }
        sample.push(row);
    }
    Ok(sample)
}

/// Run the three checks against the declared schema
pub fn check_frame(df: &DataFrame, schema: &SchemaConfig, sample_rows: usize) -> Result<ValidationReport> {
    let mut details = ValidationDetails::default();

    for spec in &schema.columns {
        match df.column(&spec.name) {
            Err(_) => details.missing_columns.push(spec.name.clone()),
            Ok(column) => {
                let actual = dtype_tag(column.dtype());
                if actual != spec.dtype {
                    details.type_mismatches.push(TypeMismatch {
                        column: spec.name.clone(),
                        expected: spec.dtype.clone(),
                        actual,
                    });
                }
            }
        }
    }

    for column in df.get_columns() {
        let nulls = column.null_count();
        if nulls > 0 {
            details.null_counts.insert(column.name().to_string(), nulls);
        }
    }

    let checks = ValidationChecks {
        columns: details.missing_columns.is_empty(),
        data_types: details.type_mismatches.is_empty(),
        missing_values: details.null_counts.is_empty(),
    };
    Ok(ValidationReport {
        timestamp: Utc::now(),
        status: checks.passed(),
        checks,
        details,
        sample: frame_sample(df, sample_rows)?,
    })
}

pub struct DataValidation {
    config: ValidationConfig,
    schema: SchemaConfig,
}

impl DataValidation {
    pub fn new(config: ValidationConfig, schema: SchemaConfig) -> Self {
        Self { config, schema }
    }

    /// Validate a CSV snapshot and persist the report
    ///
    /// Data problems produce a negative artifact, not an error; only an
    /// unreadable file or a failed report write is an error.
    pub fn validate(&self, dataset_path: &Path) -> Result<ValidationArtifact> {
        let df = DataLoader::new()
            .with_infer_schema_length(None)
            .load_csv(dataset_path)?;
        let report = check_frame(&df, &self.schema, self.config.sample_rows)?;
        save_json(&self.config.report_path, &report)?;

        let message = report.summary();
        if report.status {
            info!(
                rows = df.height(),
                report = %self.config.report_path.display(),
                "Data validation passed"
            );
        } else {
            warn!(
                reason = message.as_deref().unwrap_or_default(),
                report = %self.config.report_path.display(),
                "Data validation failed"
            );
        }

        Ok(ValidationArtifact {
            validation_status: report.status,
            report_path: self.config.report_path.clone(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColumnSpec;

    fn schema() -> SchemaConfig {
        SchemaConfig {
            target_column: "flag".into(),
            columns: vec![
                ColumnSpec::new("A", "int64"),
                ColumnSpec::new("B", "float64"),
                ColumnSpec::new("flag", "object"),
            ],
        }
    }

    #[test]
    fn test_dtype_tags() {
        assert_eq!(dtype_tag(&DataType::Int64), "int64");
        assert_eq!(dtype_tag(&DataType::String), "object");
        assert_eq!(dtype_tag(&DataType::Boolean), "bool");
    }

    #[test]
    fn test_clean_frame_passes() {
        let df = df!("A" => &[1i64, 2], "B" => &[0.5f64, 1.5], "flag" => &["x", "y"]).unwrap();
        let report = check_frame(&df, &schema(), 5).unwrap();
        assert!(report.status);
        assert_eq!(report.sample.len(), 2);
        assert_eq!(report.sample[0]["A"], Value::from(1));
    }

    #[test]
    fn test_each_check_fails_independently() {
        let missing = df!("A" => &[1i64], "B" => &[0.5f64]).unwrap();
        let report = check_frame(&missing, &schema(), 5).unwrap();
        assert!(!report.status);
        assert!(!report.checks.columns);
        assert!(report.checks.data_types);
        assert_eq!(report.details.missing_columns, vec!["flag".to_string()]);

        let wrong_type = df!("A" => &[1.5f64], "B" => &[0.5f64], "flag" => &["x"]).unwrap();
        let report = check_frame(&wrong_type, &schema(), 5).unwrap();
        assert!(!report.checks.data_types);
        assert_eq!(report.details.type_mismatches[0].actual, "float64");

        let nulls = df!(
            "A" => &[Some(1i64), None],
            "B" => &[0.5f64, 1.5],
            "flag" => &["x", "y"]
        )
        .unwrap();
        let report = check_frame(&nulls, &schema(), 5).unwrap();
        assert!(report.checks.columns && report.checks.data_types);
        assert!(!report.checks.missing_values);
        assert_eq!(report.details.null_counts.get("A"), Some(&1));
    }

    #[test]
    fn test_validate_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("raw.csv");
        let mut df = df!("A" => &[1i64, 2], "B" => &[0.5f64, 1.5]).unwrap();
        crate::utils::save_csv(&mut df, &csv).unwrap();

        let config = ValidationConfig {
            report_path: dir.path().join("validation/report.json"),
            ..ValidationConfig::default()
        };
        let artifact = DataValidation::new(config, schema()).validate(&csv).unwrap();
        assert!(!artifact.validation_status);
        assert!(artifact.message.unwrap().contains("flag"));

        let stored: ValidationReport =
            serde_json::from_slice(&std::fs::read(&artifact.report_path).unwrap()).unwrap();
        assert!(!stored.status);
    }
}

//! Dataset comparison mode: drift counts as a validation failure

use chrono::{DateTime, Utc};
use ndarray::Array1;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::artifact::ValidationArtifact;
use crate::drift::{ChiSquareTest, DriftDetector, DriftResult, KolmogorovSmirnovTest};
use crate::error::Result;
use crate::utils::{column_values, is_numeric_dtype, save_json, DataLoader};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

impl ColumnKind {
    fn of(dtype: &DataType) -> Option<Self> {
        if is_numeric_dtype(dtype) {
            Some(ColumnKind::Numeric)
        } else if matches!(dtype, DataType::String | DataType::Boolean) {
            Some(ColumnKind::Categorical)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDrift {
    pub kind: ColumnKind,
    pub statistic: f64,
    pub p_value: f64,
    pub drifted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftValidationReport {
    pub timestamp: DateTime<Utc>,
    pub status: bool,
    pub drift_detected: bool,
    pub threshold: f64,
    pub columns: BTreeMap<String, ColumnDrift>,
    /// Shared columns that could not be compared
    pub skipped: Vec<String>,
}

impl DriftValidationReport {
    pub fn drifted_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|(_, c)| c.drifted)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Non-null, finite values of a numeric column
fn finite_values(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    Ok(column_values(df, name)?
        .into_iter()
        .flatten()
        .filter(|v| v.is_finite())
        .collect())
}

fn categories(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let series = df.column(name)?.as_materialized_series().cast(&DataType::String)?;
    Ok(series
        .str()?
        .into_iter()
        .flatten()
        .map(str::to_string)
        .collect())
}

/// Compares a current dataset against a reference one, column by column
pub struct DriftValidation {
    threshold: f64,
    report_path: PathBuf,
}

impl DriftValidation {
    pub fn new(threshold: f64, report_path: impl Into<PathBuf>) -> Self {
        Self {
            threshold,
            report_path: report_path.into(),
        }
    }

    /// KS test on numeric columns, chi-square on categorical ones
    pub fn compare(&self, reference: &DataFrame, current: &DataFrame) -> Result<DriftValidationReport> {
        let ks = KolmogorovSmirnovTest::new(self.threshold);
        let chi2 = ChiSquareTest::new(self.threshold);
        let mut columns = BTreeMap::new();
        let mut skipped = Vec::new();

        for column in reference.get_columns() {
            let name = column.name().as_str();
            let Ok(other) = current.column(name) else {
                continue;
            };
            let kind = match (ColumnKind::of(column.dtype()), ColumnKind::of(other.dtype())) {
                (Some(a), Some(b)) if a == b => a,
                _ => {
                    warn!(column = name, "Column kinds differ between datasets, skipping");
                    skipped.push(name.to_string());
                    continue;
                }
            };

            let result: Option<DriftResult> = match kind {
                ColumnKind::Numeric => {
                    let a = finite_values(reference, name)?;
                    let b = finite_values(current, name)?;
                    if a.is_empty() || b.is_empty() {
                        None
                    } else {
                        Some(ks.detect(&Array1::from_vec(a), &Array1::from_vec(b))?)
                    }
                }
                ColumnKind::Categorical => {
                    let a = categories(reference, name)?;
                    let b = categories(current, name)?;
                    if a.is_empty() || b.is_empty() {
                        None
                    } else {
                        Some(chi2.detect_categories(&a, &b)?)
                    }
                }
            };

            match result {
                Some(result) => {
                    columns.insert(
                        name.to_string(),
                        ColumnDrift {
                            kind,
                            statistic: result.statistic,
                            p_value: result.p_value.unwrap_or(1.0),
                            drifted: result.drift_detected,
                        },
                    );
                }
                None => {
                    warn!(column = name, "Column has no values on one side, skipping");
                    skipped.push(name.to_string());
                }
            }
        }

        let drift_detected = columns.values().any(|c| c.drifted);
        Ok(DriftValidationReport {
            timestamp: Utc::now(),
            status: !drift_detected,
            drift_detected,
            threshold: self.threshold,
            columns,
            skipped,
        })
    }

    /// Load both CSVs, compare them and persist the report
    pub fn validate(&self, reference_path: &Path, current_path: &Path) -> Result<ValidationArtifact> {
        let loader = DataLoader::new().with_infer_schema_length(None);
        let reference = loader.load_csv(reference_path)?;
        let current = loader.load_csv(current_path)?;

        let report = self.compare(&reference, &current)?;
        save_json(&self.report_path, &report)?;

        let message = if report.drift_detected {
            let drifted = report.drifted_columns().join(", ");
            warn!(drifted = %drifted, "Drift between datasets");
            Some(format!("Drift detected in: {}", drifted))
        } else {
            info!(columns = report.columns.len(), "No drift between datasets");
            None
        };

        Ok(ValidationArtifact {
            validation_status: report.status,
            report_path: self.report_path.clone(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> DataFrame {
        df!(
            "A" => (0..200).map(|i| (i % 20) as f64).collect::<Vec<_>>(),
            "Gender" => (0..200).map(|i| if i % 2 == 0 { "M" } else { "F" }).collect::<Vec<_>>()
        )
        .unwrap()
    }

    #[test]
    fn test_identical_datasets_pass() {
        let validation = DriftValidation::new(0.05, "unused.json");
        let report = validation.compare(&reference(), &reference()).unwrap();
        assert!(report.status);
        assert_eq!(report.columns["A"].kind, ColumnKind::Numeric);
        assert_eq!(report.columns["Gender"].kind, ColumnKind::Categorical);
    }

    #[test]
    fn test_categorical_shift_fails() {
        let current = df!(
            "A" => (0..200).map(|i| (i % 20) as f64).collect::<Vec<_>>(),
            "Gender" => (0..200).map(|i| if i % 10 == 0 { "F" } else { "M" }).collect::<Vec<_>>()
        )
        .unwrap();
        let validation = DriftValidation::new(0.05, "unused.json");
        let report = validation.compare(&reference(), &current).unwrap();
        assert!(!report.status);
        assert_eq!(report.drifted_columns(), vec!["Gender"]);
    }

    #[test]
    fn test_non_finite_column_is_skipped() {
        let current = df!(
            "A" => vec![f64::NAN; 200],
            "Gender" => (0..200).map(|i| if i % 2 == 0 { "M" } else { "F" }).collect::<Vec<_>>()
        )
        .unwrap();
        let mut partial = current.clone();
        let mixed: Vec<f64> = (0..200)
            .map(|i| if i % 4 == 0 { f64::INFINITY } else { (i % 20) as f64 })
            .collect();
        partial.with_column(Column::new("A".into(), mixed)).unwrap();

        let validation = DriftValidation::new(0.05, "unused.json");
        let report = validation.compare(&reference(), &current).unwrap();
        assert!(report.status);
        assert_eq!(report.skipped, vec!["A".to_string()]);
        assert!(!report.columns.contains_key("A"));

        let report = validation.compare(&reference(), &partial).unwrap();
        assert!(report.columns.contains_key("A"));
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_validate_csv_files() {
        let dir = tempfile::tempdir().unwrap();
        let ref_path = dir.path().join("reference.csv");
        let cur_path = dir.path().join("current.csv");
        crate::utils::save_csv(&mut reference(), &ref_path).unwrap();
        let mut shifted = df!(
            "A" => (0..200).map(|i| 100.0 + i as f64).collect::<Vec<_>>(),
            "Gender" => (0..200).map(|i| if i % 2 == 0 { "M" } else { "F" }).collect::<Vec<_>>()
        )
        .unwrap();
        crate::utils::save_csv(&mut shifted, &cur_path).unwrap();

        let validation = DriftValidation::new(0.05, dir.path().join("drift.json"));
        let artifact = validation.validate(&ref_path, &cur_path).unwrap();
        assert!(!artifact.validation_status);
        assert!(artifact.message.unwrap().contains('A'));
        assert!(dir.path().join("drift.json").exists());
    }
}

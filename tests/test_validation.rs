//! Integration test: schema validation and two-file drift comparison

mod common;

use churnflow::config::{SchemaConfig, ValidationConfig};
use churnflow::validation::{DataValidation, DriftValidation, DriftValidationReport, ValidationReport};
use std::path::Path;

fn validator(dir: &Path) -> DataValidation {
    let config = ValidationConfig {
        report_path: dir.join("validation/report.json"),
        ..ValidationConfig::default()
    };
    DataValidation::new(config, SchemaConfig::default())
}

#[test]
fn test_churn_snapshot_passes() {
    let dir = tempfile::tempdir().unwrap();
    let csv = common::write_frame(&common::churn_frame(120, 1, 0), &dir.path().join("raw.csv"));

    let artifact = validator(dir.path()).validate(&csv).unwrap();
    assert!(artifact.validation_status);
    assert!(artifact.message.is_none());

    let report: ValidationReport =
        serde_json::from_slice(&std::fs::read(&artifact.report_path).unwrap()).unwrap();
    assert!(report.checks.passed());
    assert_eq!(report.sample.len(), 5);
}

#[test]
fn test_dropped_column_fails_closed() {
    let dir = tempfile::tempdir().unwrap();
    let df = common::churn_frame(50, 2, 0).drop("Credit_Limit").unwrap();
    let csv = common::write_frame(&df, &dir.path().join("raw.csv"));

    let artifact = validator(dir.path()).validate(&csv).unwrap();
    assert!(!artifact.validation_status);
    assert!(artifact.message.unwrap().contains("Credit_Limit"));

    let report: ValidationReport =
        serde_json::from_slice(&std::fs::read(&artifact.report_path).unwrap()).unwrap();
    assert!(!report.checks.columns);
    assert_eq!(report.details.missing_columns, vec!["Credit_Limit".to_string()]);
}

#[test]
fn test_unreadable_snapshot_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(validator(dir.path()).validate(&dir.path().join("absent.csv")).is_err());
}

#[test]
fn test_identical_files_show_no_drift() {
    let dir = tempfile::tempdir().unwrap();
    let csv = common::write_frame(&common::churn_frame(200, 3, 0), &dir.path().join("ref.csv"));
    let report_path = dir.path().join("drift/report.json");

    let artifact = DriftValidation::new(0.05, &report_path).validate(&csv, &csv).unwrap();
    assert!(artifact.validation_status);

    let report: DriftValidationReport =
        serde_json::from_slice(&std::fs::read(&report_path).unwrap()).unwrap();
    assert!(!report.drift_detected);
    // eight numeric columns plus the categorical target
    assert_eq!(report.columns.len(), 9);
}

#[test]
fn test_shifted_transactions_are_flagged() {
    let dir = tempfile::tempdir().unwrap();
    let reference = common::write_frame(&common::churn_frame(300, 4, 0), &dir.path().join("ref.csv"));
    let current = common::write_frame(&common::churn_frame(300, 5, 80), &dir.path().join("cur.csv"));

    let artifact = DriftValidation::new(0.05, dir.path().join("drift/report.json"))
        .validate(&reference, &current)
        .unwrap();
    assert!(!artifact.validation_status);
    let message = artifact.message.unwrap();
    assert!(message.contains("Total_Trans_Ct"));
    assert!(message.contains("Total_Trans_Amt"));
}

//! Integration test: transformation guard, resampling and test-split integrity

mod common;

use churnflow::artifact::ValidationArtifact;
use churnflow::error::ChurnflowError;
use churnflow::ingestion::{CsvDataSource, DataIngestion};
use churnflow::preprocessing::{DataTransformation, Preprocessor};
use churnflow::utils::DataLoader;
use std::sync::Arc;

fn passed(report_path: &std::path::Path) -> ValidationArtifact {
    ValidationArtifact {
        validation_status: true,
        report_path: report_path.to_path_buf(),
        message: None,
    }
}

#[tokio::test]
async fn test_negative_validation_stops_transformation() {
    let dir = tempfile::tempdir().unwrap();
    let source = common::write_frame(&common::churn_frame(100, 11, 0), &dir.path().join("source.csv"));
    let config = common::test_config(dir.path(), &source);

    let ingestion = DataIngestion::new(
        config.ingestion.clone(),
        config.schema.clone(),
        Arc::new(CsvDataSource::new(&source)),
    )
    .initiate()
    .await
    .unwrap();

    let failed = ValidationArtifact {
        validation_status: false,
        report_path: config.validation.report_path.clone(),
        message: Some("missing columns: Credit_Limit".to_string()),
    };
    let err = DataTransformation::new(config.transformation.clone(), &config.schema.target_column)
        .initiate(&failed, &ingestion)
        .unwrap_err();

    match err {
        ChurnflowError::ValidationFailed(reason) => assert!(reason.contains("Credit_Limit")),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!config.transformation.transformed_train_path.exists());
    assert!(!config.transformation.preprocessor_path.exists());
}

#[tokio::test]
async fn test_only_training_rows_are_resampled() {
    let dir = tempfile::tempdir().unwrap();
    let source = common::write_frame(&common::churn_frame(300, 12, 0), &dir.path().join("source.csv"));
    let config = common::test_config(dir.path(), &source);

    let ingestion = DataIngestion::new(
        config.ingestion.clone(),
        config.schema.clone(),
        Arc::new(CsvDataSource::new(&source)),
    )
    .initiate()
    .await
    .unwrap();

    let artifact = DataTransformation::new(config.transformation.clone(), &config.schema.target_column)
        .initiate(&passed(&config.validation.report_path), &ingestion)
        .unwrap();

    // churners are the minority, so rebalancing adds rows
    assert_eq!(artifact.train_rows_before, ingestion.train_rows);
    assert!(artifact.train_rows_after > artifact.train_rows_before);
    assert_eq!(artifact.test_rows, ingestion.test_rows);

    let loader = DataLoader::new();
    let train = loader.load_csv(&artifact.transformed_train_path).unwrap();
    let test = loader.load_csv(&artifact.transformed_test_path).unwrap();
    assert_eq!(train.height(), artifact.train_rows_after);
    assert_eq!(test.height(), ingestion.test_rows);

    // label last, engineered features included
    let names: Vec<String> = train.get_column_names().iter().map(|s| s.to_string()).collect();
    assert_eq!(names.last().map(String::as_str), Some("Attrition_Flag"));
    assert!(names.iter().any(|n| n == "Activity_Growth"));
    assert!(names.iter().any(|n| n == "Customer_Value"));
    assert_eq!(&names[..names.len() - 1], artifact.feature_names.as_slice());

    let positives = train
        .column("Attrition_Flag")
        .unwrap()
        .i64()
        .unwrap()
        .into_no_null_iter()
        .filter(|&v| v == 1)
        .count();
    assert_eq!(positives * 2, train.height());

    let preprocessor = Preprocessor::load(&artifact.preprocessor_path).unwrap();
    assert_eq!(preprocessor.feature_names(), artifact.feature_names.as_slice());
}

//! Integration test: ingestion from a source into the raw and split files

mod common;

use churnflow::config::{ColumnSpec, IngestionConfig, SchemaConfig, SourceConfig};
use churnflow::error::ChurnflowError;
use churnflow::ingestion::{split_frame, CsvDataSource, DataIngestion, DataSource};
use churnflow::utils::DataLoader;
use polars::prelude::*;
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

fn ingestion_config(dir: &Path, source: &Path, test_size: f64) -> IngestionConfig {
    IngestionConfig {
        source: SourceConfig::Csv {
            path: source.to_path_buf(),
        },
        raw_path: dir.join("raw.csv"),
        train_path: dir.join("train.csv"),
        test_path: dir.join("test.csv"),
        test_size,
        ..Default::default()
    }
}

fn ab_schema() -> SchemaConfig {
    SchemaConfig {
        target_column: "B".to_string(),
        columns: vec![ColumnSpec::new("A", "int64"), ColumnSpec::new("B", "object")],
    }
}

fn ids(df: &DataFrame) -> Vec<i64> {
    df.column("id")
        .unwrap()
        .i64()
        .unwrap()
        .into_no_null_iter()
        .collect()
}

#[tokio::test]
async fn test_four_rows_split_three_one() {
    let dir = tempfile::tempdir().unwrap();
    let source = common::write_frame(
        &df!("A" => &[1i64, 2, 3, 4], "B" => &["x", "y", "x", "y"]).unwrap(),
        &dir.path().join("source.csv"),
    );

    let config = ingestion_config(dir.path(), &source, 0.25);
    let ingestion = DataIngestion::new(config, ab_schema(), Arc::new(CsvDataSource::new(&source)));
    let artifact = ingestion.initiate().await.unwrap();

    assert_eq!(artifact.total_rows, 4);
    assert_eq!(artifact.train_rows, 3);
    assert_eq!(artifact.test_rows, 1);

    let loader = DataLoader::new();
    let train = loader.load_csv(&artifact.train_path).unwrap();
    let test = loader.load_csv(&artifact.test_path).unwrap();
    assert_eq!(train.height(), 3);
    assert_eq!(test.height(), 1);
    assert_eq!(train.get_column_names(), test.get_column_names());
}

#[tokio::test]
async fn test_columns_follow_schema_order() {
    let dir = tempfile::tempdir().unwrap();
    let source = common::write_frame(
        &df!("B" => &["x", "y", "x", "y"], "A" => &[1i64, 2, 3, 4]).unwrap(),
        &dir.path().join("source.csv"),
    );

    let ingestion = DataIngestion::new(
        ingestion_config(dir.path(), &source, 0.25),
        ab_schema(),
        Arc::new(CsvDataSource::new(&source)),
    );
    let raw_path = ingestion.fetch_and_save().await.unwrap();
    let raw = DataLoader::new().load_csv(raw_path).unwrap();
    let names: Vec<String> = raw.get_column_names().iter().map(|s| s.to_string()).collect();
    assert_eq!(names, vec!["A", "B"]);
}

#[tokio::test]
async fn test_unexpected_columns_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let source = common::write_frame(
        &df!("A" => &[1i64, 2], "C" => &[0.5f64, 0.7]).unwrap(),
        &dir.path().join("source.csv"),
    );

    let ingestion = DataIngestion::new(
        ingestion_config(dir.path(), &source, 0.5),
        ab_schema(),
        Arc::new(CsvDataSource::new(&source)),
    );
    let err = ingestion.initiate().await.unwrap_err();
    assert!(matches!(err, ChurnflowError::DataError(_)));
}

#[tokio::test]
async fn test_missing_snapshot_is_transient() {
    let dir = tempfile::tempdir().unwrap();
    let source = CsvDataSource::new(dir.path().join("absent.csv"));
    let err = source.fetch("SELECT A, B FROM t").await.unwrap_err();
    assert!(err.is_transient());
}

#[test]
fn test_split_with_too_few_rows_fails() {
    let df = df!("id" => &[1i64]).unwrap();
    assert!(split_frame(&df, 0.5, 42).is_err());
}

#[test]
fn test_split_is_reproducible() {
    let df = df!("id" => (0..40i64).collect::<Vec<_>>()).unwrap();
    let (train_a, test_a) = split_frame(&df, 0.2, 7).unwrap();
    let (train_b, test_b) = split_frame(&df, 0.2, 7).unwrap();
    assert_eq!(ids(&train_a), ids(&train_b));
    assert_eq!(ids(&test_a), ids(&test_b));
}

proptest! {
    #[test]
    fn prop_split_is_disjoint_and_complete(
        rows in 2usize..200,
        ratio in 0.05f64..0.95,
        seed in any::<u64>(),
    ) {
        let n_test = (rows as f64 * ratio).ceil() as usize;
        prop_assume!(n_test < rows);

        let df = df!("id" => (0..rows as i64).collect::<Vec<_>>()).unwrap();
        let (train, test) = split_frame(&df, ratio, seed).unwrap();

        let train_ids: BTreeSet<i64> = ids(&train).into_iter().collect();
        let test_ids: BTreeSet<i64> = ids(&test).into_iter().collect();

        prop_assert_eq!(test.height(), n_test);
        prop_assert_eq!(train.height() + test.height(), rows);
        prop_assert!(train_ids.is_disjoint(&test_ids));
        prop_assert_eq!(train_ids.len() + test_ids.len(), rows);
    }
}

//! Shared fixtures for the integration tests

#![allow(dead_code)]

use churnflow::config::{PipelineConfig, RetrySettings, SourceConfig};
use churnflow::training::{GradientBoostingConfig, ModelSpec};
use churnflow::utils::save_csv;
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};

pub const ATTRITED: &str = "Attrited Customer";
pub const EXISTING: &str = "Existing Customer";

/// Synthetic bank-churn rows matching the default schema
///
/// Customers with few transactions churn, with a little label noise.
/// `trans_shift` moves the transaction count distribution.
pub fn churn_frame(rows: usize, seed: u64, trans_shift: i64) -> DataFrame {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut relationships = Vec::with_capacity(rows);
    let mut credit_limit = Vec::with_capacity(rows);
    let mut revolving = Vec::with_capacity(rows);
    let mut amt_change = Vec::with_capacity(rows);
    let mut trans_amt = Vec::with_capacity(rows);
    let mut trans_ct = Vec::with_capacity(rows);
    let mut ct_change = Vec::with_capacity(rows);
    let mut utilization = Vec::with_capacity(rows);
    let mut attrition = Vec::with_capacity(rows);

    for _ in 0..rows {
        let count: i64 = rng.gen_range(10..130) + trans_shift;
        let churned = (count < 50) ^ rng.gen_bool(0.05);

        relationships.push(rng.gen_range(1i64..7));
        credit_limit.push(rng.gen_range(1500.0..35000.0f64));
        revolving.push(rng.gen_range(0i64..2500));
        amt_change.push(rng.gen_range(0.3..1.5f64));
        trans_amt.push(count * 80 + rng.gen_range(0i64..500));
        trans_ct.push(count);
        ct_change.push(rng.gen_range(0.2..1.3f64));
        utilization.push(rng.gen_range(0.01..0.99f64));
        attrition.push(if churned { ATTRITED } else { EXISTING });
    }

    df!(
        "Total_Relationship_Count" => relationships,
        "Credit_Limit" => credit_limit,
        "Total_Revolving_Bal" => revolving,
        "Total_Amt_Chng_Q4_Q1" => amt_change,
        "Total_Trans_Amt" => trans_amt,
        "Total_Trans_Ct" => trans_ct,
        "Total_Ct_Chng_Q4_Q1" => ct_change,
        "Avg_Utilization_Ratio" => utilization,
        "Attrition_Flag" => attrition
    )
    .unwrap()
}

pub fn write_frame(df: &DataFrame, path: &Path) -> PathBuf {
    let mut df = df.clone();
    save_csv(&mut df, path).unwrap();
    path.to_path_buf()
}

/// Default pipeline config with every path under `root` and a CSV source
pub fn test_config(root: &Path, source_csv: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    let artifacts = root.join("artifacts");

    config.ingestion.source = SourceConfig::Csv {
        path: source_csv.to_path_buf(),
    };
    config.ingestion.raw_path = artifacts.join("data_ingestion/raw.csv");
    config.ingestion.train_path = artifacts.join("data_ingestion/train.csv");
    config.ingestion.test_path = artifacts.join("data_ingestion/test.csv");

    config.validation.report_path = artifacts.join("data_validation/report.json");

    config.transformation.transformed_train_path = artifacts.join("data_transformation/train.csv");
    config.transformation.transformed_test_path = artifacts.join("data_transformation/test.csv");
    config.transformation.preprocessor_path =
        artifacts.join("data_transformation/preprocessor.bin");

    config.trainer.trained_model_path = artifacts.join("model_trainer/model.bin");
    config.trainer.model = ModelSpec::GradientBoosted(GradientBoostingConfig {
        n_estimators: 25,
        ..Default::default()
    });
    config.trainer.min_acceptance_score = 0.5;

    config.evaluation.report_path = artifacts.join("model_evaluation/report.json");

    config.registry.tracking_uri = root.join("mlruns");
    config.storage.root = root.join("object_store");
    config.retry = RetrySettings {
        max_retries: 1,
        delay_secs: 0,
    };
    config
}

//! Data ingestion stage
//!
//! Pulls the configured columns from the data source, persists the raw
//! snapshot, and splits it into disjoint train and test files with a seeded
//! shuffle.

mod source;

pub use source::{build_query, CsvDataSource, DataSource, SqlDataSource};

use polars::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::artifact::IngestionArtifact;
use crate::config::{IngestionConfig, SchemaConfig, SourceConfig};
use crate::error::{ChurnflowError, Result};
use crate::utils::{save_csv, DataLoader};

/// Shuffle rows with a fixed seed and cut off `ceil(n * ratio)` for test
///
/// Fails when either side would end up empty.
pub fn split_frame(df: &DataFrame, ratio: f64, seed: u64) -> Result<(DataFrame, DataFrame)> {
    if !(ratio > 0.0 && ratio < 1.0) {
        return Err(ChurnflowError::InvalidInput(format!(
            "Split ratio must be strictly between 0 and 1, got {}",
            ratio
        )));
    }
    let total = df.height();
    let n_test = (total as f64 * ratio).ceil() as usize;
    if n_test == 0 || n_test >= total {
        return Err(ChurnflowError::DataError(format!(
            "Cannot split {} rows with test ratio {}: one side would be empty",
            total, ratio
        )));
    }

    let mut indices: Vec<IdxSize> = (0..total as IdxSize).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));
    let (test_idx, train_idx) = indices.split_at(n_test);

    let take = |idx: &[IdxSize]| df.take(&IdxCa::from_vec("idx".into(), idx.to_vec()));
    Ok((take(train_idx)?, take(test_idx)?))
}

/// Check the fetched columns against the schema and put them in schema order
fn conform_to_schema(df: DataFrame, expected: &[String]) -> Result<DataFrame> {
    let actual: BTreeSet<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    let wanted: BTreeSet<String> = expected.iter().cloned().collect();
    if actual != wanted {
        let missing: Vec<_> = wanted.difference(&actual).collect();
        let unexpected: Vec<_> = actual.difference(&wanted).collect();
        return Err(ChurnflowError::DataError(format!(
            "Query returned the wrong columns (missing {:?}, unexpected {:?})",
            missing, unexpected
        )));
    }
    Ok(df.select(expected.iter().map(String::as_str))?)
}

pub struct DataIngestion {
    config: IngestionConfig,
    schema: SchemaConfig,
    source: Arc<dyn DataSource>,
}

impl DataIngestion {
    pub fn new(config: IngestionConfig, schema: SchemaConfig, source: Arc<dyn DataSource>) -> Self {
        Self {
            config,
            schema,
            source,
        }
    }

    /// Build whatever source the configuration names
    ///
    /// SQL pools connect lazily, so an unreachable database surfaces on the
    /// first fetch where the ingestion retry can see it.
    pub fn source_from_config(config: &SourceConfig) -> Result<Arc<dyn DataSource>> {
        Ok(match config {
            SourceConfig::Sql {
                url,
                max_connections,
            } => Arc::new(SqlDataSource::connect_lazy(url, *max_connections)?),
            SourceConfig::Csv { path } => Arc::new(CsvDataSource::new(path.clone())),
        })
    }

    pub fn query(&self) -> String {
        build_query(&self.config.base_query, &self.schema.column_names())
    }

    /// Run the query and write the raw snapshot
    pub async fn fetch_and_save(&self) -> Result<PathBuf> {
        info!(source = %self.source.describe(), "Fetching raw data");
        let df = self.source.fetch(&self.query()).await?;
        if df.height() == 0 {
            return Err(ChurnflowError::DataError(
                "Ingestion query returned no rows".to_string(),
            ));
        }
        let mut df = conform_to_schema(df, &self.schema.column_names())?;

        save_csv(&mut df, &self.config.raw_path)?;
        info!(
            rows = df.height(),
            path = %self.config.raw_path.display(),
            "Raw data saved"
        );
        Ok(self.config.raw_path.clone())
    }

    /// Split the raw snapshot into the train and test files
    pub fn split(&self, ratio: f64, seed: u64) -> Result<IngestionArtifact> {
        let raw = DataLoader::new()
            .with_infer_schema_length(None)
            .load_csv(&self.config.raw_path)?;
        let (mut train, mut test) = split_frame(&raw, ratio, seed)?;

        save_csv(&mut train, &self.config.train_path)?;
        save_csv(&mut test, &self.config.test_path)?;
        info!(
            train_rows = train.height(),
            test_rows = test.height(),
            "Train/test split saved"
        );

        Ok(IngestionArtifact {
            raw_path: self.config.raw_path.clone(),
            train_path: self.config.train_path.clone(),
            test_path: self.config.test_path.clone(),
            total_rows: raw.height(),
            train_rows: train.height(),
            test_rows: test.height(),
        })
    }

    pub async fn initiate(&self) -> Result<IngestionArtifact> {
        self.fetch_and_save().await?;
        self.split(self.config.test_size, self.config.random_state)
    }
}

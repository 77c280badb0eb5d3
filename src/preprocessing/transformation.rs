//! Data transformation stage

use std::time::Instant;
use tracing::info;

use super::{FeatureEngineer, LabelEncoder, Preprocessor};
use crate::artifact::{IngestionArtifact, TransformationArtifact, ValidationArtifact};
use crate::config::TransformationConfig;
use crate::error::{ChurnflowError, Result};
use crate::synthetic::{class_counts, Sampler, SMOTE};
use crate::utils::{array_to_frame, save_csv, DataLoader};

/// Fits the preprocessor on the train split and rebalances it
pub struct DataTransformation {
    config: TransformationConfig,
    target_column: String,
}

impl DataTransformation {
    pub fn new(config: TransformationConfig, target_column: impl Into<String>) -> Self {
        Self {
            config,
            target_column: target_column.into(),
        }
    }

    fn preprocessor(&self) -> Preprocessor {
        Preprocessor::new(
            self.target_column.clone(),
            LabelEncoder::new(&self.config.positive_label, &self.config.negative_label),
            FeatureEngineer::new(
                self.config.derived_features.clone(),
                self.config.drop_columns.clone(),
            ),
        )
    }

    /// Refuses to run on a negative validation artifact
    pub fn initiate(
        &self,
        validation: &ValidationArtifact,
        ingestion: &IngestionArtifact,
    ) -> Result<TransformationArtifact> {
        if !validation.validation_status {
            return Err(ChurnflowError::ValidationFailed(
                validation
                    .message
                    .clone()
                    .unwrap_or_else(|| "validation status is false".to_string()),
            ));
        }

        let start = Instant::now();
        let loader = DataLoader::new().with_infer_schema_length(None);
        let train = loader.load_csv(&ingestion.train_path)?;
        let test = loader.load_csv(&ingestion.test_path)?;

        let mut preprocessor = self.preprocessor();
        let (x_train, y_train) = preprocessor.fit_transform(&train)?;
        // Test rows go through the fitted parameters and are never resampled
        let (x_test, y_test) = preprocessor.transform_labelled(&test)?;

        let before = class_counts(&y_train);
        let resampled = SMOTE::new()
            .with_k_neighbors(self.config.smote_k_neighbors)
            .with_seed(self.config.random_state)
            .fit_resample(&x_train, &y_train)?;
        info!(
            before = ?before,
            after = ?class_counts(&resampled.y),
            "Training split rebalanced"
        );

        let feature_names = preprocessor.feature_names().to_vec();
        let label = self.target_column.as_str();
        let mut train_frame =
            array_to_frame(&resampled.x, &feature_names, Some((label, &resampled.y)))?;
        let mut test_frame = array_to_frame(&x_test, &feature_names, Some((label, &y_test)))?;

        save_csv(&mut train_frame, &self.config.transformed_train_path)?;
        save_csv(&mut test_frame, &self.config.transformed_test_path)?;
        preprocessor.save(&self.config.preprocessor_path)?;

        info!(
            features = feature_names.len(),
            train_rows = train_frame.height(),
            test_rows = test_frame.height(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Data transformation complete"
        );

        Ok(TransformationArtifact {
            transformed_train_path: self.config.transformed_train_path.clone(),
            transformed_test_path: self.config.transformed_test_path.clone(),
            preprocessor_path: self.config.preprocessor_path.clone(),
            feature_names,
            label_column: self.target_column.clone(),
            raw_train_path: ingestion.train_path.clone(),
            raw_test_path: ingestion.test_path.clone(),
            train_rows_before: x_train.nrows(),
            train_rows_after: resampled.x.nrows(),
            test_rows: x_test.nrows(),
        })
    }
}

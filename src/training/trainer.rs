//! Model trainer stage

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use super::metrics::ClassificationMetrics;
use super::models::ChurnModel;
use super::pipeline::InferencePipeline;
use crate::artifact::{TrainerArtifact, TransformationArtifact};
use crate::config::{RegistryConfig, TrainerConfig};
use crate::error::{ChurnflowError, Result};
use crate::preprocessing::Preprocessor;
use crate::registry::{ModelBundle, ModelRegistry, VALIDATION_STATUS_TAG};
use crate::tracking::{ActiveRun, ExperimentTracker};
use crate::utils::{save_bytes, split_labelled, DataLoader};

/// Fits the configured model family and registers it as a pending candidate
pub struct ModelTrainer {
    config: TrainerConfig,
    registry_config: Arc<RegistryConfig>,
    registry: Arc<dyn ModelRegistry>,
    tracker: ExperimentTracker,
}

impl ModelTrainer {
    pub fn new(
        config: TrainerConfig,
        registry_config: Arc<RegistryConfig>,
        registry: Arc<dyn ModelRegistry>,
        tracker: ExperimentTracker,
    ) -> Self {
        Self {
            config,
            registry_config,
            registry,
            tracker,
        }
    }

    pub fn initiate(
        &self,
        transformation: &TransformationArtifact,
        parent_run_id: Option<&str>,
    ) -> Result<TrainerArtifact> {
        let mut run = self.tracker.start_run("model_trainer", parent_run_id)?;
        let result = self.train(transformation, &mut run);
        run.close(result)
    }

    fn train(
        &self,
        transformation: &TransformationArtifact,
        run: &mut ActiveRun,
    ) -> Result<TrainerArtifact> {
        let start = Instant::now();
        let loader = DataLoader::new();

        let train_df = loader.load_csv(&transformation.transformed_train_path)?;
        let (x, y) = split_labelled(
            &train_df,
            &transformation.feature_names,
            &transformation.label_column,
        )?;
        let preprocessor = Preprocessor::load(&transformation.preprocessor_path)?;
        if preprocessor.feature_names() != transformation.feature_names.as_slice() {
            return Err(ChurnflowError::DataError(
                "Preprocessor feature names do not match the transformed training data"
                    .to_string(),
            ));
        }

        let spec = &self.config.model;
        info!(family = %spec.family(), rows = x.nrows(), features = x.ncols(), "Fitting model");
        let model = ChurnModel::fit(spec, &x, &y)?;
        let importances = model.feature_importances();

        // Score the decoded bytes, so what gets registered is what was measured
        let bytes = InferencePipeline::new(preprocessor, model).to_bytes()?;
        let bundle = InferencePipeline::from_bytes(&bytes)?;

        let train_metrics = ClassificationMetrics::compute(&y, &bundle.model().predict_proba(&x)?)?;
        let test_metrics = if transformation.raw_test_path.exists() {
            Some(bundle.evaluate(&loader.load_csv(&transformation.raw_test_path)?)?)
        } else {
            None
        };

        let metric = self.config.acceptance_metric;
        let score = test_metrics
            .as_ref()
            .unwrap_or(&train_metrics)
            .get(metric);

        run.log_params(spec.params())?;
        run.log_metrics(train_metrics.to_pairs("train_"))?;
        if let Some(test) = &test_metrics {
            run.log_metrics(test.to_pairs("test_"))?;
        }

        if score < self.config.min_acceptance_score {
            return Err(ChurnflowError::ModelQuality {
                metric: metric.to_string(),
                score,
                minimum: self.config.min_acceptance_score,
            });
        }

        save_bytes(&self.config.trained_model_path, &bytes)?;
        run.log_json_artifact("feature_names.json", &transformation.feature_names)?;
        let importance_map: BTreeMap<&str, f64> = transformation
            .feature_names
            .iter()
            .map(String::as_str)
            .zip(importances.iter().copied())
            .collect();
        run.log_json_artifact("feature_importances.json", &importance_map)?;

        let mut registered_metrics = train_metrics.to_pairs("train_");
        if let Some(test) = &test_metrics {
            registered_metrics.extend(test.to_pairs("test_"));
        }
        let registry_name = &self.registry_config.registry_name;
        let info = self.registry.register(
            registry_name,
            &ModelBundle::new(bytes)
                .with_run_id(run.run_id())
                .with_metrics(registered_metrics),
        )?;
        self.registry
            .set_tag(registry_name, info.version, VALIDATION_STATUS_TAG, "pending")?;

        info!(
            model = %registry_name,
            version = info.version,
            metric = %metric,
            score,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Model trained and registered as pending"
        );

        Ok(TrainerArtifact {
            trained_model_path: self.config.trained_model_path.clone(),
            registry_version: info.version,
            run_id: run.run_id().to_string(),
            train_metrics,
            test_metrics,
            score,
        })
    }
}

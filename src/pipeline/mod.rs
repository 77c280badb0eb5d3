//! Training flow orchestration
//!
//! Runs ingest, validate, transform, train, evaluate and push as one linear
//! chain. Each stage consumes the previous stage's artifact. Only ingestion is
//! retried; a negative validation ends the run before any training work.

mod retry;

pub use retry::RetryPolicy;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::artifact::{
    EvaluationArtifact, IngestionArtifact, PusherArtifact, TrainerArtifact,
    TransformationArtifact, ValidationArtifact,
};
use crate::config::{PipelineConfig, RegistryConfig};
use crate::drift::RetrainingLauncher;
use crate::error::{Result, Stage, StageContext};
use crate::evaluation::ModelEvaluation;
use crate::ingestion::{DataIngestion, DataSource};
use crate::preprocessing::DataTransformation;
use crate::pusher::ModelPusher;
use crate::registry::{LocalModelRegistry, ModelRegistry};
use crate::storage::{LocalObjectStore, ObjectStore};
use crate::tracking::ExperimentTracker;
use crate::training::ModelTrainer;
use crate::validation::DataValidation;

pub const MANUAL_TRIGGER_REASON: &str = "Manual Trigger";

/// Why a training run was started
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingTrigger {
    pub trigger_reason: String,
    pub drift_date: Option<NaiveDate>,
    pub threshold: Option<f64>,
    pub num_drifted_features: usize,
    pub drifted_features: Vec<String>,
}

impl TrainingTrigger {
    pub fn manual() -> Self {
        Self::with_reason(MANUAL_TRIGGER_REASON)
    }

    pub fn with_reason(reason: impl Into<String>) -> Self {
        Self {
            trigger_reason: reason.into(),
            drift_date: None,
            threshold: None,
            num_drifted_features: 0,
            drifted_features: Vec::new(),
        }
    }
}

/// How a training run ended, when it did not fail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FlowOutcome {
    /// Data checks failed; nothing after validation ran
    ValidationFailed { validation: ValidationArtifact },
    Completed {
        ingestion: IngestionArtifact,
        transformation: TransformationArtifact,
        trainer: TrainerArtifact,
        evaluation: EvaluationArtifact,
        pusher: PusherArtifact,
    },
}

impl FlowOutcome {
    pub fn promoted(&self) -> bool {
        matches!(self, FlowOutcome::Completed { pusher, .. } if pusher.promoted)
    }

    fn label(&self) -> &'static str {
        match self {
            FlowOutcome::ValidationFailed { .. } => "validation_failed",
            FlowOutcome::Completed { pusher, .. } if pusher.promoted => "promoted",
            FlowOutcome::Completed { .. } => "not_promoted",
        }
    }
}

pub struct TrainingFlow {
    config: PipelineConfig,
    registry_config: Arc<RegistryConfig>,
    source: Arc<dyn DataSource>,
    registry: Arc<dyn ModelRegistry>,
    store: Arc<dyn ObjectStore>,
    tracker: ExperimentTracker,
    retry: RetryPolicy,
}

impl TrainingFlow {
    pub fn new(
        config: PipelineConfig,
        source: Arc<dyn DataSource>,
        registry: Arc<dyn ModelRegistry>,
        store: Arc<dyn ObjectStore>,
        tracker: ExperimentTracker,
    ) -> Self {
        Self {
            registry_config: Arc::new(config.registry.clone()),
            retry: RetryPolicy::from(&config.retry),
            config,
            source,
            registry,
            store,
            tracker,
        }
    }

    /// Wire the local registry, object store and tracker named in the config
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        let source = DataIngestion::source_from_config(&config.ingestion.source)?;
        let registry = Arc::new(LocalModelRegistry::open(config.registry.registry_root())?);
        let store = Arc::new(LocalObjectStore::new(&config.storage.root)?);
        let tracker = ExperimentTracker::local(
            config.registry.experiments_root(),
            &config.registry.experiment_name,
        )?;
        Ok(Self::new(config, source, registry, store, tracker))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The ingestion source, shared with anything that queries the same data
    pub fn source(&self) -> &Arc<dyn DataSource> {
        &self.source
    }

    pub fn registry(&self) -> &Arc<dyn ModelRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn tracker(&self) -> &ExperimentTracker {
        &self.tracker
    }

    /// One full pipeline run, tracked as `pipeline_run`
    pub async fn run(&self, trigger: TrainingTrigger) -> Result<FlowOutcome> {
        info!(
            trigger_reason = %trigger.trigger_reason,
            drift_date = ?trigger.drift_date,
            threshold = ?trigger.threshold,
            num_drifted_features = trigger.num_drifted_features,
            "Training flow started"
        );

        let mut run = self.tracker.start_run("pipeline_run", None)?;
        run.set_tag("trigger_reason", &trigger.trigger_reason)?;
        run.set_tag(
            "drift_date",
            trigger
                .drift_date
                .map_or_else(|| "none".to_string(), |d| d.to_string()),
        )?;
        if let Some(threshold) = trigger.threshold {
            run.log_param("threshold", threshold)?;
        }
        if !trigger.drifted_features.is_empty() {
            run.log_json_artifact("drifted_features.json", &trigger.drifted_features)?;
        }

        let parent_id = run.run_id().to_string();
        let result = self.execute(&parent_id).await;
        match &result {
            Ok(outcome) => {
                run.tag("outcome", outcome.label());
                info!(outcome = outcome.label(), "Training flow finished");
            }
            Err(err) => warn!(stage = ?err.stage(), error = %err, "Training flow failed"),
        }
        run.close(result)
    }

    async fn execute(&self, parent_run_id: &str) -> Result<FlowOutcome> {
        let config = &self.config;

        let ingest = DataIngestion::new(
            config.ingestion.clone(),
            config.schema.clone(),
            Arc::clone(&self.source),
        );
        let ingestion = self
            .retry
            .run("data_ingestion", || ingest.initiate())
            .await
            .in_stage(Stage::Ingestion)?;

        let validation = DataValidation::new(config.validation.clone(), config.schema.clone())
            .validate(&ingestion.raw_path)
            .in_stage(Stage::Validation)?;
        if !validation.validation_status {
            warn!(
                reason = validation.message.as_deref().unwrap_or_default(),
                "Validation failed, skipping transformation and training"
            );
            return Ok(FlowOutcome::ValidationFailed { validation });
        }

        let transformation = DataTransformation::new(
            config.transformation.clone(),
            config.schema.target_column.clone(),
        )
        .initiate(&validation, &ingestion)
        .in_stage(Stage::Transformation)?;

        let trainer = ModelTrainer::new(
            config.trainer.clone(),
            Arc::clone(&self.registry_config),
            Arc::clone(&self.registry),
            self.tracker.clone(),
        )
        .initiate(&transformation, Some(parent_run_id))
        .in_stage(Stage::Training)?;

        let evaluation = ModelEvaluation::new(
            config.evaluation.clone(),
            Arc::clone(&self.registry_config),
            Arc::clone(&self.registry),
            self.tracker.clone(),
        )
        .initiate(&transformation, &trainer, Some(parent_run_id))
        .in_stage(Stage::Evaluation)?;

        let pusher = ModelPusher::new(
            config.pusher.clone(),
            Arc::clone(&self.registry_config),
            Arc::clone(&self.registry),
            Arc::clone(&self.store),
        )
        .initiate(&evaluation, &trainer)
        .in_stage(Stage::Pushing)?;

        Ok(FlowOutcome::Completed {
            ingestion,
            transformation,
            trainer,
            evaluation,
            pusher,
        })
    }
}

#[async_trait]
impl RetrainingLauncher for TrainingFlow {
    async fn launch(&self, trigger: TrainingTrigger) -> Result<FlowOutcome> {
        self.run(trigger).await
    }
}

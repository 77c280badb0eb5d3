//! Model pusher
//!
//! Promotes an accepted challenger: staging tag, copy into the production
//! namespace, `champion` alias, and a mirror of the bundle at the fixed
//! object-storage location the serving side loads from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::artifact::{EvaluationArtifact, PusherArtifact, TrainerArtifact};
use crate::config::{PusherConfig, RegistryConfig};
use crate::error::Result;
use crate::registry::{ModelRegistry, ModelUri, CHAMPION_ALIAS, VALIDATION_STATUS_TAG};
use crate::storage::{ObjectStore, ObjectUri};

/// Sub-folder of the production bundle holding the model bytes
pub const MODEL_DIR: &str = "model";
pub const MODEL_FILE: &str = "model.bin";
pub const METADATA_FILE: &str = "metadata.json";

/// Written next to the mirrored model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionMetadata {
    pub version: u64,
    pub promoted_at: DateTime<Utc>,
    pub run_id: Option<String>,
    pub source_model_uri: String,
}

/// Lay out a production bundle folder under `dir`
pub fn write_bundle(dir: &Path, payload: &[u8], metadata: &ProductionMetadata) -> Result<()> {
    let model_dir = dir.join(MODEL_DIR);
    std::fs::create_dir_all(&model_dir)?;
    std::fs::write(model_dir.join(MODEL_FILE), payload)?;
    std::fs::write(dir.join(METADATA_FILE), serde_json::to_vec_pretty(metadata)?)?;
    Ok(())
}

pub struct ModelPusher {
    config: PusherConfig,
    registry_config: Arc<RegistryConfig>,
    registry: Arc<dyn ModelRegistry>,
    store: Arc<dyn ObjectStore>,
}

impl ModelPusher {
    pub fn new(
        config: PusherConfig,
        registry_config: Arc<RegistryConfig>,
        registry: Arc<dyn ModelRegistry>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            config,
            registry_config,
            registry,
            store,
        }
    }

    pub fn initiate(
        &self,
        evaluation: &EvaluationArtifact,
        trainer: &TrainerArtifact,
    ) -> Result<PusherArtifact> {
        let staging = &self.registry_config.registry_name;
        let version = trainer.registry_version;

        if !evaluation.is_model_accepted {
            self.registry
                .set_tag(staging, version, VALIDATION_STATUS_TAG, "rejected")?;
            info!(
                model = %staging,
                version,
                challenger = evaluation.challenger_score,
                champion = evaluation.champion_score,
                "Challenger rejected, champion unchanged"
            );
            return Ok(PusherArtifact::not_promoted());
        }

        self.registry
            .set_tag(staging, version, VALIDATION_STATUS_TAG, "approved")?;

        let source = ModelUri::version(staging, version);
        let prod = &self.registry_config.prod_registry_name;
        let promoted = self.registry.copy_version(&source, prod)?;
        // Moves the alias off the previous champion
        self.registry.set_alias(prod, CHAMPION_ALIAS, promoted.version)?;
        info!(
            model = %prod,
            version = promoted.version,
            source = %source,
            "Champion alias assigned"
        );

        let target = self.mirror(&promoted.uri(), &source, promoted.version)?;

        Ok(PusherArtifact {
            promoted: true,
            production_version: Some(promoted.version),
            production_uri: Some(target.to_string()),
        })
    }

    /// Stage the complete bundle locally, then upload it as one unit
    fn mirror(&self, promoted: &ModelUri, source: &ModelUri, version: u64) -> Result<ObjectUri> {
        let bundle = self.registry.load(promoted)?;
        let metadata = ProductionMetadata {
            version,
            promoted_at: Utc::now(),
            run_id: bundle.run_id.clone(),
            source_model_uri: source.to_string(),
        };

        let staging_dir = tempfile::tempdir()?;
        write_bundle(staging_dir.path(), &bundle.payload, &metadata)?;

        let target = ObjectUri::parse(&self.config.production_uri)?;
        self.store.upload_folder(staging_dir.path(), &target)?;
        info!(uri = %target, version, "Production bundle mirrored");
        Ok(target)
    }
}

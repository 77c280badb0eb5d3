//! Champion/challenger evaluation
//!
//! The freshly registered challenger and the production champion are scored
//! on the same held-out split with the same metric. No champion is the
//! bootstrap case and always accepts.

use chrono::{DateTime, Utc};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::artifact::{EvaluationArtifact, TrainerArtifact, TransformationArtifact};
use crate::config::{EvaluationConfig, RegistryConfig};
use crate::error::Result;
use crate::registry::{ModelRegistry, ModelUri, CANDIDATE_ALIAS, CHAMPION_ALIAS};
use crate::tracking::{ActiveRun, ExperimentTracker};
use crate::training::{InferencePipeline, MetricKind};
use crate::utils::{save_json, DataLoader};

/// Score recorded for the champion when there is none
pub const NO_CHAMPION_SCORE: f64 = 0.0;

pub const DECISION_RULE: &str = "challenger > champion + margin";

/// What the production namespace currently holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ChampionState {
    NoChampion,
    Champion { version: u64, score: f64 },
}

impl ChampionState {
    pub fn score(&self) -> f64 {
        match self {
            ChampionState::NoChampion => NO_CHAMPION_SCORE,
            ChampionState::Champion { score, .. } => *score,
        }
    }

    pub fn version(&self) -> Option<u64> {
        match self {
            ChampionState::NoChampion => None,
            ChampionState::Champion { version, .. } => Some(*version),
        }
    }
}

/// Accept unconditionally without a champion, otherwise require a strict win
/// by more than `margin`; a tie is a rejection
pub fn decide(challenger_score: f64, champion: &ChampionState, margin: f64) -> bool {
    match champion {
        ChampionState::NoChampion => true,
        ChampionState::Champion { score, .. } => challenger_score > score + margin,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub challenger_version: u64,
    pub challenger_score: f64,
    pub champion_score: f64,
    pub champion_version: Option<u64>,
    pub margin: f64,
    pub metric: MetricKind,
    pub decision_rule: String,
    pub is_model_accepted: bool,
    pub evaluated_at: DateTime<Utc>,
}

pub struct ModelEvaluation {
    config: EvaluationConfig,
    registry_config: Arc<RegistryConfig>,
    registry: Arc<dyn ModelRegistry>,
    tracker: ExperimentTracker,
}

impl ModelEvaluation {
    pub fn new(
        config: EvaluationConfig,
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

    fn score(&self, uri: &ModelUri, test: &DataFrame) -> Result<f64> {
        let bundle = self.registry.load(uri)?;
        let pipeline = InferencePipeline::from_bytes(&bundle.payload)?;
        Ok(pipeline.evaluate(test)?.get(self.config.metric))
    }

    /// Look up and score the production champion, if there is one
    pub fn champion_state(&self, test: &DataFrame) -> Result<ChampionState> {
        let uri = ModelUri::alias(&self.registry_config.prod_registry_name, CHAMPION_ALIAS);
        match self.registry.resolve(&uri)? {
            None => {
                info!(uri = %uri, "No champion found, accepting the challenger by default");
                Ok(ChampionState::NoChampion)
            }
            Some(champion) => {
                let score = self.score(&champion.uri(), test)?;
                Ok(ChampionState::Champion {
                    version: champion.version,
                    score,
                })
            }
        }
    }

    pub fn initiate(
        &self,
        transformation: &TransformationArtifact,
        trainer: &TrainerArtifact,
        parent_run_id: Option<&str>,
    ) -> Result<EvaluationArtifact> {
        let mut run = self.tracker.start_run("model_evaluation", parent_run_id)?;
        let result = self.evaluate(transformation, trainer, &mut run);
        run.close(result)
    }

    fn evaluate(
        &self,
        transformation: &TransformationArtifact,
        trainer: &TrainerArtifact,
        run: &mut ActiveRun,
    ) -> Result<EvaluationArtifact> {
        let test = DataLoader::new()
            .with_infer_schema_length(None)
            .load_csv(&transformation.raw_test_path)?;
        let staging = &self.registry_config.registry_name;
        let metric = self.config.metric;

        let challenger_score =
            self.score(&ModelUri::version(staging, trainer.registry_version), &test)?;
        let champion = self.champion_state(&test)?;
        let accepted = decide(challenger_score, &champion, self.config.margin);

        let report = EvaluationReport {
            challenger_version: trainer.registry_version,
            challenger_score,
            champion_score: champion.score(),
            champion_version: champion.version(),
            margin: self.config.margin,
            metric,
            decision_rule: DECISION_RULE.to_string(),
            is_model_accepted: accepted,
            evaluated_at: Utc::now(),
        };
        save_json(&self.config.report_path, &report)?;

        run.log_metrics([
            (format!("challenger_{}", metric), challenger_score),
            (format!("champion_{}", metric), champion.score()),
        ])?;
        run.set_tag("is_model_accepted", accepted)?;
        run.log_json_artifact("evaluation_report.json", &report)?;

        if accepted {
            self.registry
                .set_alias(staging, CANDIDATE_ALIAS, trainer.registry_version)?;
        }
        info!(
            challenger = challenger_score,
            champion = champion.score(),
            champion_version = ?champion.version(),
            margin = self.config.margin,
            accepted,
            "Model evaluation complete"
        );

        Ok(EvaluationArtifact {
            is_model_accepted: accepted,
            report_path: self.config.report_path.clone(),
            challenger_score,
            champion_score: champion.score(),
            champion_version: champion.version(),
            margin: self.config.margin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn champion(score: f64) -> ChampionState {
        ChampionState::Champion { version: 3, score }
    }

    #[test]
    fn test_bootstrap_accepts_any_score() {
        assert!(decide(0.51, &ChampionState::NoChampion, 0.0));
        assert!(decide(0.0, &ChampionState::NoChampion, 0.05));
        assert_eq!(ChampionState::NoChampion.score(), NO_CHAMPION_SCORE);
    }

    #[test]
    fn test_margin_is_respected() {
        let margin = 0.02;
        assert!(!decide(0.80 + margin / 2.0, &champion(0.80), margin));
        assert!(decide(0.80 + margin + 1e-6, &champion(0.80), margin));
    }

    #[test]
    fn test_tie_is_rejected() {
        assert!(!decide(0.80, &champion(0.80), 0.0));
        assert!(decide(0.8001, &champion(0.80), 0.0));
    }
}

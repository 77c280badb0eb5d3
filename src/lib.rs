//! churnflow - churn model lifecycle pipeline
//!
//! Ingests customer data from a relational source, validates and transforms
//! it, trains a challenger classifier, compares it against the production
//! champion and promotes the winner through a model registry. A prediction
//! service answers requests from the promoted model and logs them; a drift
//! monitor compares those logs with the training reference and retrains when
//! the distributions move.
//!
//! # Modules
//!
//! ## Pipeline stages
//! - [`ingestion`] - relational source, raw snapshot, train/test split
//! - [`validation`] - schema checks and two-file drift comparison
//! - [`preprocessing`] - feature engineering, scaling, class rebalancing
//! - [`training`] - tree ensembles and the bundled inference pipeline
//! - [`evaluation`] - champion/challenger decision
//! - [`pusher`] - promotion and production mirroring
//! - [`pipeline`] - the end-to-end training flow
//!
//! ## Operations
//! - [`drift`] - drift statistics, reports and retraining triggers
//! - [`serving`] - prediction service and request logging
//! - [`server`] - HTTP front end
//! - [`cli`] - command-line interface
//!
//! ## Infrastructure
//! - [`registry`] - versioned model registry with aliases
//! - [`storage`] - object storage
//! - [`tracking`] - experiment runs, params, metrics and artifacts
//! - [`config`] - layered configuration

pub mod error;

pub mod artifact;
pub mod config;

pub mod ingestion;
pub mod validation;
pub mod preprocessing;
pub mod synthetic;
pub mod training;
pub mod evaluation;
pub mod pusher;
pub mod pipeline;

pub mod drift;
pub mod serving;
pub mod server;
pub mod cli;

pub mod registry;
pub mod storage;
pub mod tracking;
pub mod utils;

pub use error::{ChurnflowError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{ChurnflowError, Result, Stage};

    pub use crate::config::{ConfigLoader, PipelineConfig};
    pub use crate::artifact::{
        EvaluationArtifact, IngestionArtifact, PusherArtifact, TrainerArtifact,
        TransformationArtifact, ValidationArtifact,
    };

    pub use crate::ingestion::{CsvDataSource, DataIngestion, DataSource, SqlDataSource};
    pub use crate::pipeline::{FlowOutcome, TrainingFlow, TrainingTrigger};
    pub use crate::evaluation::ChampionState;

    pub use crate::drift::{check_drift, DriftMonitor, DriftReport, RetrainingLauncher};
    pub use crate::serving::{PredictionService, RequestLogger};

    pub use crate::registry::{LocalModelRegistry, ModelRegistry, ModelUri};
    pub use crate::storage::{LocalObjectStore, ObjectStore, ObjectUri};
    pub use crate::tracking::ExperimentTracker;
}

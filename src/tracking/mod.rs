//! Experiment tracking
//!
//! Track pipeline runs, their parameters, metrics, tags and artifacts. The
//! orchestrator opens one run per pipeline execution; stages open child runs
//! linked through `parent_run_id`.

mod storage;

pub use storage::{LocalStorage, StorageBackend};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;

/// Status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run is currently running
    Running,
    /// Run completed successfully
    Finished,
    /// Run failed
    Failed,
    /// Run was stopped before completing
    Killed,
}

/// A run within an experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub run_name: String,
    pub experiment: String,
    #[serde(default)]
    pub parent_run_id: Option<String>,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// Latest value per metric
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Artifact names, relative to the run's artifact directory
    #[serde(default)]
    pub artifacts: Vec<String>,
}

impl Run {
    fn new(experiment: &str, run_name: &str, parent_run_id: Option<&str>) -> Self {
        Self {
            run_id: Uuid::new_v4().simple().to_string(),
            run_name: run_name.to_string(),
            experiment: experiment.to_string(),
            parent_run_id: parent_run_id.map(str::to_string),
            status: RunStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
            tags: BTreeMap::new(),
            artifacts: Vec::new(),
        }
    }

    /// Get run duration in seconds
    pub fn duration_secs(&self) -> f64 {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).num_milliseconds() as f64 / 1000.0
    }
}

/// Creates and reads runs for one experiment
#[derive(Clone)]
pub struct ExperimentTracker {
    experiment: String,
    storage: Arc<dyn StorageBackend>,
}

impl ExperimentTracker {
    /// Tracker persisting under a local directory
    pub fn local(root: impl AsRef<Path>, experiment: impl Into<String>) -> Result<Self> {
        Ok(Self::with_storage(
            Arc::new(LocalStorage::new(root)?),
            experiment,
        ))
    }

    pub fn with_storage(storage: Arc<dyn StorageBackend>, experiment: impl Into<String>) -> Self {
        Self {
            experiment: experiment.into(),
            storage,
        }
    }

    pub fn experiment(&self) -> &str {
        &self.experiment
    }

    /// Open and persist a new run
    pub fn start_run(&self, run_name: &str, parent_run_id: Option<&str>) -> Result<ActiveRun> {
        let run = Run::new(&self.experiment, run_name, parent_run_id);
        self.storage.save_run(&run)?;
        debug!(
            experiment = %self.experiment,
            run_id = %run.run_id,
            run_name,
            "Started run"
        );
        Ok(ActiveRun {
            run,
            storage: Arc::clone(&self.storage),
        })
    }

    pub fn get_run(&self, run_id: &str) -> Result<Run> {
        self.storage.load_run(&self.experiment, run_id)
    }

    pub fn list_runs(&self) -> Result<Vec<Run>> {
        self.storage.list_runs(&self.experiment)
    }

    /// Runs opened with `parent_run_id` as their parent
    pub fn child_runs(&self, parent_run_id: &str) -> Result<Vec<Run>> {
        Ok(self
            .list_runs()?
            .into_iter()
            .filter(|r| r.parent_run_id.as_deref() == Some(parent_run_id))
            .collect())
    }
}

/// A run being logged to; every call is written through to storage
pub struct ActiveRun {
    run: Run,
    storage: Arc<dyn StorageBackend>,
}

impl ActiveRun {
    pub fn run_id(&self) -> &str {
        &self.run.run_id
    }

    pub fn run(&self) -> &Run {
        &self.run
    }

    pub fn log_param(&mut self, key: &str, value: impl ToString) -> Result<()> {
        self.run.params.insert(key.to_string(), value.to_string());
        self.storage.save_run(&self.run)
    }

    pub fn log_params<I, K, V>(&mut self, params: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        for (k, v) in params {
            self.run.params.insert(k.into(), v.to_string());
        }
        self.storage.save_run(&self.run)
    }

    pub fn log_metric(&mut self, key: &str, value: f64) -> Result<()> {
        self.run.metrics.insert(key.to_string(), value);
        self.storage.save_run(&self.run)
    }

    pub fn log_metrics(&mut self, metrics: impl IntoIterator<Item = (String, f64)>) -> Result<()> {
        self.run.metrics.extend(metrics);
        self.storage.save_run(&self.run)
    }

    pub fn set_tag(&mut self, key: &str, value: impl ToString) -> Result<()> {
        self.run.tags.insert(key.to_string(), value.to_string());
        self.storage.save_run(&self.run)
    }

    /// Record a tag without writing; it is saved with the next write, at the
    /// latest when the run finishes
    pub fn tag(&mut self, key: &str, value: impl ToString) {
        self.run.tags.insert(key.to_string(), value.to_string());
    }

    /// Store a value as a pretty JSON artifact
    pub fn log_json_artifact<T: Serialize>(&mut self, name: &str, value: &T) -> Result<PathBuf> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.log_artifact(name, &bytes)
    }

    pub fn log_artifact(&mut self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.storage.write_artifact(&self.run, name, bytes)?;
        if !self.run.artifacts.iter().any(|a| a == name) {
            self.run.artifacts.push(name.to_string());
        }
        self.storage.save_run(&self.run)?;
        Ok(path)
    }

    /// Close the run with a terminal status
    pub fn finish(mut self, status: RunStatus) -> Result<Run> {
        self.run.status = status;
        self.run.end_time = Some(Utc::now());
        self.storage.save_run(&self.run)?;
        debug!(
            run_id = %self.run.run_id,
            status = ?status,
            duration_secs = self.run.duration_secs(),
            "Finished run"
        );
        Ok(self.run)
    }

    /// Finish according to a stage result and hand the result back
    ///
    /// A tracker write failure on the error path is logged, never allowed to
    /// mask the stage error.
    pub fn close<T>(mut self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.finish(RunStatus::Finished)?;
                Ok(value)
            }
            Err(err) => {
                let recorded = self
                    .set_tag("error", &err)
                    .and_then(|_| self.finish(RunStatus::Failed));
                if let Err(tracking_err) = recorded {
                    warn!(error = %tracking_err, "Could not record failed run");
                }
                Err(err)
            }
        }
    }
}

//! Storage backend for experiment tracking
//!
//! Runs are persisted one JSON document per run, with artifacts beside it:
//!
//! ```text
//! <base>/<experiment>/<run_id>/run.json
//! <base>/<experiment>/<run_id>/artifacts/<name>
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use super::Run;
use crate::error::{ChurnflowError, Result};

/// Storage backend trait
pub trait StorageBackend: Send + Sync {
    /// Persist the current state of a run
    fn save_run(&self, run: &Run) -> Result<()>;

    fn load_run(&self, experiment: &str, run_id: &str) -> Result<Run>;

    /// All runs of an experiment, oldest first
    fn list_runs(&self, experiment: &str) -> Result<Vec<Run>>;

    /// Store an artifact file for a run, returning where it landed
    fn write_artifact(&self, run: &Run, name: &str, bytes: &[u8]) -> Result<PathBuf>;
}

/// Local file system storage backend
pub struct LocalStorage {
    base_dir: PathBuf,
}

impl LocalStorage {
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn run_dir(&self, experiment: &str, run_id: &str) -> PathBuf {
        self.base_dir.join(experiment).join(run_id)
    }
}

impl StorageBackend for LocalStorage {
    fn save_run(&self, run: &Run) -> Result<()> {
        let dir = self.run_dir(&run.experiment, &run.run_id);
        fs::create_dir_all(&dir)?;

        let tmp = dir.join(".run.json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(run)?)?;
        fs::rename(&tmp, dir.join("run.json"))?;
        Ok(())
    }

    fn load_run(&self, experiment: &str, run_id: &str) -> Result<Run> {
        let path = self.run_dir(experiment, run_id).join("run.json");
        let content = fs::read_to_string(&path).map_err(|e| {
            ChurnflowError::DataError(format!("Failed to read run {}: {}", run_id, e))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    fn list_runs(&self, experiment: &str) -> Result<Vec<Run>> {
        let dir = self.base_dir.join(experiment);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path().join("run.json");
            if path.is_file() {
                runs.push(serde_json::from_str::<Run>(&fs::read_to_string(&path)?)?);
            }
        }
        runs.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(runs)
    }

    fn write_artifact(&self, run: &Run, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        if name.is_empty() || name.split(['/', '\\']).any(|s| s.is_empty() || s == "..") {
            return Err(ChurnflowError::InvalidInput(format!(
                "Invalid artifact name: {:?}",
                name
            )));
        }
        let path = self
            .run_dir(&run.experiment, &run.run_id)
            .join("artifacts")
            .join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        Ok(path)
    }
}

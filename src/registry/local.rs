//! Filesystem-backed model registry
//!
//! Layout under the root:
//!
//! ```text
//! index.json                  every model, version record and alias
//! <name>/<version>/model.bin  payload
//! ```

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use super::{ModelBundle, ModelRef, ModelRegistry, ModelUri, ModelVersionInfo};
use crate::error::{ChurnflowError, Result};

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegisteredModel {
    /// Ascending by version
    versions: Vec<ModelVersionInfo>,
    aliases: BTreeMap<String, u64>,
}

impl RegisteredModel {
    fn find(&self, version: u64) -> Option<&ModelVersionInfo> {
        self.versions.iter().find(|v| v.version == version)
    }

    fn find_mut(&mut self, version: u64) -> Option<&mut ModelVersionInfo> {
        self.versions.iter_mut().find(|v| v.version == version)
    }

    fn resolve(&self, reference: &ModelRef) -> Option<&ModelVersionInfo> {
        match reference {
            ModelRef::Version(v) => self.find(*v),
            ModelRef::Alias(alias) => self.aliases.get(alias).and_then(|v| self.find(*v)),
        }
    }

    /// Version record with its current aliases attached
    fn describe(&self, info: &ModelVersionInfo) -> ModelVersionInfo {
        let mut out = info.clone();
        out.aliases = self
            .aliases
            .iter()
            .filter(|(_, &v)| v == info.version)
            .map(|(alias, _)| alias.clone())
            .collect();
        out
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryIndex {
    models: BTreeMap<String, RegisteredModel>,
}

/// Model registry rooted at a local directory
///
/// The index is re-read under the lock for every operation, so separate
/// registry handles (and sequential processes) on the same root agree.
pub struct LocalModelRegistry {
    root: PathBuf,
    lock: Mutex<()>,
}

impl LocalModelRegistry {
    /// Create or open a registry at path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("index.json")
    }

    fn payload_path(&self, name: &str, version: u64) -> PathBuf {
        self.root.join(name).join(version.to_string()).join("model.bin")
    }

    fn read_index(&self) -> Result<RegistryIndex> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(RegistryIndex::default());
        }
        let content = fs::read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|e| {
            ChurnflowError::RegistryError(format!("Corrupt index {}: {}", path.display(), e))
        })
    }

    fn write_index(&self, index: &RegistryIndex) -> Result<()> {
        let tmp = self.root.join(format!(".index.{}.tmp", Uuid::new_v4()));
        fs::write(&tmp, serde_json::to_vec_pretty(index)?)?;
        fs::rename(&tmp, self.index_path())?;
        Ok(())
    }

    /// Run a mutation against the index and persist it
    fn update<T>(&self, f: impl FnOnce(&mut RegistryIndex) -> Result<T>) -> Result<T> {
        let _guard = self.lock.lock();
        let mut index = self.read_index()?;
        let out = f(&mut index)?;
        self.write_index(&index)?;
        Ok(out)
    }

    fn read<T>(&self, f: impl FnOnce(&RegistryIndex) -> Result<T>) -> Result<T> {
        let _guard = self.lock.lock();
        let index = self.read_index()?;
        f(&index)
    }

    fn read_payload(&self, info: &ModelVersionInfo) -> Result<Vec<u8>> {
        let payload = fs::read(self.payload_path(&info.name, info.version))?;
        if checksum(&payload) != info.checksum {
            return Err(ChurnflowError::RegistryError(format!(
                "Checksum mismatch for {}",
                info.uri()
            )));
        }
        Ok(payload)
    }

    /// Write the payload and append a version record; caller holds the lock
    fn store(
        &self,
        index: &mut RegistryIndex,
        name: &str,
        payload: &[u8],
        run_id: Option<String>,
        metrics: BTreeMap<String, f64>,
        source: Option<String>,
    ) -> Result<ModelVersionInfo> {
        validate_name(name)?;
        let model = index.models.entry(name.to_string()).or_default();
        let version = model.versions.last().map_or(1, |v| v.version + 1);

        let path = self.payload_path(name, version);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, payload)?;

        let info = ModelVersionInfo {
            name: name.to_string(),
            version,
            registered_at: Utc::now(),
            run_id,
            source,
            tags: BTreeMap::new(),
            metrics,
            aliases: Vec::new(),
            checksum: checksum(payload),
        };
        model.versions.push(info.clone());
        Ok(info)
    }
}

fn checksum(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\', '@']) {
        return Err(ChurnflowError::InvalidInput(format!(
            "Invalid registered model name: {:?}",
            name
        )));
    }
    Ok(())
}

fn not_found(name: &str, version: u64) -> ChurnflowError {
    ChurnflowError::ModelNotFound(ModelUri::version(name, version).to_string())
}

impl ModelRegistry for LocalModelRegistry {
    fn register(&self, name: &str, bundle: &ModelBundle) -> Result<ModelVersionInfo> {
        let info = self.update(|index| {
            self.store(
                index,
                name,
                &bundle.payload,
                bundle.run_id.clone(),
                bundle.metrics.clone(),
                None,
            )
        })?;
        info!(model = name, version = info.version, "Registered model version");
        Ok(info)
    }

    fn set_tag(&self, name: &str, version: u64, key: &str, value: &str) -> Result<()> {
        self.update(|index| {
            let info = index
                .models
                .get_mut(name)
                .and_then(|m| m.find_mut(version))
                .ok_or_else(|| not_found(name, version))?;
            info.tags.insert(key.to_string(), value.to_string());
            Ok(())
        })?;
        debug!(model = name, version, key, value, "Tagged model version");
        Ok(())
    }

    fn set_alias(&self, name: &str, alias: &str, version: u64) -> Result<()> {
        let previous = self.update(|index| {
            let model = index
                .models
                .get_mut(name)
                .filter(|m| m.find(version).is_some())
                .ok_or_else(|| not_found(name, version))?;
            Ok(model.aliases.insert(alias.to_string(), version))
        })?;
        info!(model = name, alias, version, previous = ?previous, "Alias set");
        Ok(())
    }

    fn delete_alias(&self, name: &str, alias: &str) -> Result<()> {
        self.update(|index| {
            if let Some(model) = index.models.get_mut(name) {
                model.aliases.remove(alias);
            }
            Ok(())
        })
    }

    fn resolve(&self, uri: &ModelUri) -> Result<Option<ModelVersionInfo>> {
        self.read(|index| {
            Ok(index.models.get(&uri.name).and_then(|model| {
                model
                    .resolve(&uri.reference)
                    .map(|info| model.describe(info))
            }))
        })
    }

    fn get_version(&self, name: &str, version: u64) -> Result<ModelVersionInfo> {
        self.resolve(&ModelUri::version(name, version))?
            .ok_or_else(|| not_found(name, version))
    }

    fn load(&self, uri: &ModelUri) -> Result<ModelBundle> {
        let info = self
            .resolve(uri)?
            .ok_or_else(|| ChurnflowError::ModelNotFound(uri.to_string()))?;
        let payload = self.read_payload(&info)?;
        Ok(ModelBundle {
            payload,
            run_id: info.run_id,
            metrics: info.metrics,
        })
    }

    fn copy_version(&self, src: &ModelUri, dst_name: &str) -> Result<ModelVersionInfo> {
        let info = self.update(|index| {
            let source = index
                .models
                .get(&src.name)
                .and_then(|m| m.resolve(&src.reference))
                .cloned()
                .ok_or_else(|| ChurnflowError::ModelNotFound(src.to_string()))?;
            let payload = self.read_payload(&source)?;
            self.store(
                index,
                dst_name,
                &payload,
                source.run_id.clone(),
                source.metrics.clone(),
                Some(source.uri().to_string()),
            )
        })?;
        info!(
            source = %src,
            model = dst_name,
            version = info.version,
            "Copied model version"
        );
        Ok(info)
    }

    fn list_versions(&self, name: &str) -> Result<Vec<ModelVersionInfo>> {
        self.read(|index| {
            Ok(index
                .models
                .get(name)
                .map(|model| model.versions.iter().map(|v| model.describe(v)).collect())
                .unwrap_or_default())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CHAMPION_ALIAS;
    use std::sync::Arc;

    fn registry() -> (tempfile::TempDir, LocalModelRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let registry = LocalModelRegistry::open(dir.path().join("registry")).unwrap();
        (dir, registry)
    }

    #[test]
    fn test_versions_increase_per_name() {
        let (_dir, registry) = registry();
        let a1 = registry.register("a", &ModelBundle::new(vec![1])).unwrap();
        let a2 = registry.register("a", &ModelBundle::new(vec![2])).unwrap();
        let b1 = registry.register("b", &ModelBundle::new(vec![3])).unwrap();

        assert_eq!((a1.version, a2.version, b1.version), (1, 2, 1));
        assert_eq!(
            registry
                .load(&ModelUri::version("a", 2))
                .unwrap()
                .payload,
            vec![2]
        );
    }

    #[test]
    fn test_alias_moves_instead_of_duplicating() {
        let (_dir, registry) = registry();
        for payload in [vec![1u8], vec![2u8]] {
            registry.register("prod", &ModelBundle::new(payload)).unwrap();
        }

        registry.set_alias("prod", CHAMPION_ALIAS, 1).unwrap();
        registry.set_alias("prod", CHAMPION_ALIAS, 2).unwrap();

        let holders: Vec<u64> = registry
            .list_versions("prod")
            .unwrap()
            .into_iter()
            .filter(|v| v.aliases.iter().any(|a| a == CHAMPION_ALIAS))
            .map(|v| v.version)
            .collect();
        assert_eq!(holders, vec![2]);

        let champion = registry
            .resolve(&ModelUri::alias("prod", CHAMPION_ALIAS))
            .unwrap()
            .unwrap();
        assert_eq!(champion.version, 2);
    }

    #[test]
    fn test_alias_on_missing_version_fails() {
        let (_dir, registry) = registry();
        registry.register("prod", &ModelBundle::new(vec![1])).unwrap();
        assert!(matches!(
            registry.set_alias("prod", CHAMPION_ALIAS, 9),
            Err(ChurnflowError::ModelNotFound(_))
        ));
    }

    #[test]
    fn test_missing_alias_resolves_to_none() {
        let (_dir, registry) = registry();
        let uri = ModelUri::alias("prod", CHAMPION_ALIAS);
        assert!(registry.resolve(&uri).unwrap().is_none());
        assert!(matches!(
            registry.load(&uri),
            Err(ChurnflowError::ModelNotFound(_))
        ));
    }

    #[test]
    fn test_copy_version_records_source() {
        let (_dir, registry) = registry();
        let bundle = ModelBundle::new(vec![7, 7])
            .with_run_id("run-1")
            .with_metrics([("test_roc_auc".to_string(), 0.9)]);
        registry.register("staging", &bundle).unwrap();
        registry.register("staging", &bundle).unwrap();

        let copied = registry
            .copy_version(&ModelUri::version("staging", 2), "prod")
            .unwrap();
        assert_eq!(copied.version, 1);
        assert_eq!(copied.source.as_deref(), Some("models:/staging/2"));
        assert_eq!(copied.run_id.as_deref(), Some("run-1"));

        let loaded = registry.load(&copied.uri()).unwrap();
        assert_eq!(loaded.payload, vec![7, 7]);
        assert_eq!(loaded.metrics.get("test_roc_auc"), Some(&0.9));
    }

    #[test]
    fn test_tags_persist_across_handles() {
        let (dir, registry) = registry();
        registry.register("m", &ModelBundle::new(vec![0])).unwrap();
        registry.set_tag("m", 1, "validation_status", "pending").unwrap();

        let reopened = LocalModelRegistry::open(dir.path().join("registry")).unwrap();
        let info = reopened.get_version("m", 1).unwrap();
        assert_eq!(info.tag("validation_status"), Some("pending"));
        assert!(reopened.set_tag("m", 5, "k", "v").is_err());
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let (_dir, registry) = registry();
        registry.register("m", &ModelBundle::new(vec![1, 2, 3])).unwrap();
        fs::write(registry.payload_path("m", 1), [9u8]).unwrap();

        assert!(matches!(
            registry.load(&ModelUri::version("m", 1)),
            Err(ChurnflowError::RegistryError(_))
        ));
    }

    #[test]
    fn test_concurrent_registrations_get_unique_versions() {
        let (_dir, registry) = registry();
        let registry = Arc::new(registry);

        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry
                        .register("m", &ModelBundle::new(vec![i]))
                        .unwrap()
                        .version
                })
            })
            .collect();

        let mut versions: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        versions.sort_unstable();
        assert_eq!(versions, (1..=8).collect::<Vec<_>>());
    }

    #[test]
    fn test_rejects_path_like_names() {
        let (_dir, registry) = registry();
        assert!(registry.register("../escape", &ModelBundle::new(vec![])).is_err());
        assert!(registry.register("", &ModelBundle::new(vec![])).is_err());
    }
}

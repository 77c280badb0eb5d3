//! Object store backed by a local directory tree
//!
//! `s3://bucket/a/b` maps to `<root>/bucket/a/b`. Entries whose name starts
//! with a dot are bookkeeping (staged uploads, temp files) and never listed.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use super::{ObjectStore, ObjectUri};
use crate::error::{ChurnflowError, Result};

pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path for a URI, rejecting segments that would escape the root
    fn path(&self, uri: &ObjectUri) -> Result<PathBuf> {
        let invalid = || ChurnflowError::InvalidInput(format!("Invalid object location: {}", uri));
        if !is_plain_segment(&uri.bucket) {
            return Err(invalid());
        }
        let mut path = self.root.join(&uri.bucket);
        if !uri.key.is_empty() {
            for segment in uri.key.split('/') {
                if !is_plain_segment(segment) {
                    return Err(invalid());
                }
                path.push(segment);
            }
        }
        Ok(path)
    }

    /// Hidden sibling of `target` for staging writes
    fn sibling(target: &Path, kind: &str) -> Result<PathBuf> {
        let parent = target.parent().ok_or_else(|| {
            ChurnflowError::StorageError(format!("{} has no parent", target.display()))
        })?;
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(parent.join(format!(".{}.{}-{}", name, kind, Uuid::new_v4().simple())))
    }
}

fn is_plain_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.starts_with('.')
        && !segment.contains('\\')
}

fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn collect_keys(dir: &Path, prefix: &str, out: &mut Vec<String>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let key = if prefix.is_empty() {
            name
        } else {
            format!("{}/{}", prefix, name)
        };
        if entry.file_type()?.is_dir() {
            collect_keys(&entry.path(), &key, out)?;
        } else {
            out.push(key);
        }
    }
    Ok(())
}

impl ObjectStore for LocalObjectStore {
    fn upload_folder(&self, local_dir: &Path, remote: &ObjectUri) -> Result<()> {
        if !local_dir.is_dir() {
            return Err(ChurnflowError::StorageError(format!(
                "{} is not a directory",
                local_dir.display()
            )));
        }
        if remote.key.is_empty() {
            return Err(ChurnflowError::InvalidInput(format!(
                "Refusing to replace a whole bucket: {}",
                remote
            )));
        }

        let target = self.path(remote)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let staging = Self::sibling(&target, "staging")?;
        if let Err(err) = copy_dir(local_dir, &staging) {
            let _ = fs::remove_dir_all(&staging);
            return Err(err);
        }

        // Swap in the complete copy; the old folder is only removed afterwards
        if target.exists() {
            let retired = Self::sibling(&target, "old")?;
            fs::rename(&target, &retired)?;
            fs::rename(&staging, &target)?;
            fs::remove_dir_all(&retired)?;
        } else {
            fs::rename(&staging, &target)?;
        }

        info!(from = %local_dir.display(), to = %remote, "Uploaded folder");
        Ok(())
    }

    fn download_folder(&self, remote: &ObjectUri, local_dir: &Path) -> Result<()> {
        let source = self.path(remote)?;
        if !source.is_dir() {
            return Err(ChurnflowError::StorageError(format!(
                "No folder at {}",
                remote
            )));
        }
        copy_dir(&source, local_dir)?;
        debug!(from = %remote, to = %local_dir.display(), "Downloaded folder");
        Ok(())
    }

    fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let bucket_dir = self.path(&ObjectUri::new(bucket, ""))?;
        if !bucket_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        collect_keys(&bucket_dir, "", &mut keys)?;
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }

    fn put_object(&self, remote: &ObjectUri, bytes: &[u8]) -> Result<()> {
        if remote.key.is_empty() {
            return Err(ChurnflowError::InvalidInput(format!(
                "Object key is empty: {}",
                remote
            )));
        }
        let target = self.path(remote)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = Self::sibling(&target, "tmp")?;
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &target)?;
        Ok(())
    }

    fn get_object(&self, remote: &ObjectUri) -> Result<Vec<u8>> {
        let path = self.path(remote)?;
        fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ChurnflowError::StorageError(format!("No object at {}", remote)),
            _ => ChurnflowError::IoError(e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, LocalObjectStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path().join("objects")).unwrap();
        (dir, store)
    }

    fn folder_with(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        dir
    }

    #[test]
    fn test_upload_replaces_whole_folder() {
        let (_dir, store) = store();
        let remote = ObjectUri::parse("s3://models/production/churn").unwrap();

        let first = folder_with(&[("model/model.bin", "v1"), ("stale.txt", "x")]);
        store.upload_folder(first.path(), &remote).unwrap();
        let second = folder_with(&[("model/model.bin", "v2"), ("metadata.json", "{}")]);
        store.upload_folder(second.path(), &remote).unwrap();

        assert_eq!(
            store.list_objects("models", "production/").unwrap(),
            vec![
                "production/churn/metadata.json".to_string(),
                "production/churn/model/model.bin".to_string(),
            ]
        );

        let out = tempfile::tempdir().unwrap();
        store.download_folder(&remote, out.path()).unwrap();
        assert_eq!(fs::read_to_string(out.path().join("model/model.bin")).unwrap(), "v2");
    }

    #[test]
    fn test_staging_leftovers_are_hidden() {
        let (_dir, store) = store();
        let hidden = store.root().join("models/production/.churn.staging-abc/model.bin");
        fs::create_dir_all(hidden.parent().unwrap()).unwrap();
        fs::write(&hidden, "partial").unwrap();

        assert!(store.list_objects("models", "").unwrap().is_empty());
    }

    #[test]
    fn test_put_get_and_prefix_listing() {
        let (_dir, store) = store();
        let base = ObjectUri::new("logs", "predictions");
        store
            .put_object(&base.join("date=2024-05-01/id=a.json"), b"{}")
            .unwrap();
        store
            .put_object(&base.join("date=2024-05-02/id=b.json"), b"[]")
            .unwrap();

        let keys = store
            .list_objects("logs", "predictions/date=2024-05-01/")
            .unwrap();
        assert_eq!(keys, vec!["predictions/date=2024-05-01/id=a.json".to_string()]);
        assert_eq!(
            store
                .get_object(&ObjectUri::new("logs", "predictions/date=2024-05-02/id=b.json"))
                .unwrap(),
            b"[]"
        );
    }

    #[test]
    fn test_missing_objects() {
        let (_dir, store) = store();
        assert!(store.list_objects("nope", "").unwrap().is_empty());
        assert!(matches!(
            store.get_object(&ObjectUri::new("nope", "x.json")),
            Err(ChurnflowError::StorageError(_))
        ));
        let out = tempfile::tempdir().unwrap();
        assert!(store
            .download_folder(&ObjectUri::new("nope", "dir"), out.path())
            .is_err());
    }

    #[test]
    fn test_rejects_escaping_keys() {
        let (_dir, store) = store();
        assert!(store
            .put_object(&ObjectUri::new("logs", "../outside.json"), b"x")
            .is_err());
    }
}

//! Object storage
//!
//! Bucket/key addressed blobs and folders. The promoter mirrors the champion
//! bundle here, the serving side reads it back and writes request logs, and
//! the drift monitor lists those logs by date partition.

mod local;

pub use local::LocalObjectStore;

use std::fmt;
use std::path::Path;

use crate::error::{ChurnflowError, Result};

/// `s3://bucket/key/...`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectUri {
    pub bucket: String,
    /// Slash separated, no leading or trailing slash; empty for the bucket root
    pub key: String,
}

impl ObjectUri {
    const SCHEME: &'static str = "s3://";

    pub fn new(bucket: impl Into<String>, key: impl AsRef<str>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.as_ref().trim_matches('/').to_string(),
        }
    }

    pub fn parse(uri: &str) -> Result<Self> {
        let rest = uri.strip_prefix(Self::SCHEME).ok_or_else(|| {
            ChurnflowError::InvalidInput(format!("Object URI must start with s3://: {}", uri))
        })?;
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(ChurnflowError::InvalidInput(format!(
                "Object URI has no bucket: {}",
                uri
            )));
        }
        Ok(Self::new(bucket, key))
    }

    /// Append a path segment (or several, slash separated)
    pub fn join(&self, segment: impl AsRef<str>) -> Self {
        let segment = segment.as_ref().trim_matches('/');
        let key = match (self.key.is_empty(), segment.is_empty()) {
            (_, true) => self.key.clone(),
            (true, false) => segment.to_string(),
            (false, false) => format!("{}/{}", self.key, segment),
        };
        Self {
            bucket: self.bucket.clone(),
            key,
        }
    }
}

impl fmt::Display for ObjectUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.key.is_empty() {
            write!(f, "{}{}", Self::SCHEME, self.bucket)
        } else {
            write!(f, "{}{}/{}", Self::SCHEME, self.bucket, self.key)
        }
    }
}

/// Operations the pipeline needs from an object store
pub trait ObjectStore: Send + Sync {
    /// Replace everything under `remote` with the contents of `local_dir`
    ///
    /// Readers see either the previous folder or the complete new one.
    fn upload_folder(&self, local_dir: &Path, remote: &ObjectUri) -> Result<()>;

    /// Copy everything under `remote` into `local_dir`
    fn download_folder(&self, remote: &ObjectUri, local_dir: &Path) -> Result<()>;

    /// Keys in `bucket` starting with `prefix`, sorted
    fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;

    fn put_object(&self, remote: &ObjectUri, bytes: &[u8]) -> Result<()>;

    fn get_object(&self, remote: &ObjectUri) -> Result<Vec<u8>>;
}

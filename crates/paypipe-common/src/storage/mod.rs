//! Object store adapter
//!
//! The pipeline only ever addresses objects by relative `/`-separated paths
//! (see [`crate::paths`]). Backends map those onto a local directory tree or
//! an S3 bucket.

use crate::config::{PipelineEnv, Settings};
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub mod local;
pub mod s3;

pub use local::LocalStore;
pub use s3::S3Store;

/// Storage backend used for every persisted artifact
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `data` to `path`, overwriting. Returns the backend location.
    async fn put_bytes(&self, path: &str, data: Vec<u8>) -> Result<String>;

    /// Write `data` so that readers observe either the old or the new content.
    async fn put_atomic(&self, path: &str, data: Vec<u8>) -> Result<String>;

    /// Read an object, `None` if it does not exist.
    async fn get_bytes(&self, path: &str) -> Result<Option<Vec<u8>>>;

    /// All object paths under `prefix`, recursively, sorted ascending.
    /// An empty prefix lists the whole store.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    async fn exists(&self, path: &str) -> Result<bool>;

    async fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Human-readable location (`/abs/path` or `s3://bucket/key`).
    fn location(&self, path: &str) -> String;

    /// Decode a JSON object, `None` if absent.
    async fn get_json(&self, path: &str) -> Result<Option<serde_json::Value>> {
        match self.get_bytes(path).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn put_json_atomic(&self, path: &str, value: &serde_json::Value) -> Result<String> {
        let body = serde_json::to_vec_pretty(value)?;
        self.put_atomic(path, body).await
    }
}

/// Shared handle to the configured store
pub type SharedStore = Arc<dyn ObjectStore>;

/// Open the backend selected by `PIPELINE_ENV`.
pub async fn open_store(settings: &Settings) -> Result<SharedStore> {
    match settings.pipeline_env {
        PipelineEnv::Local => {
            info!(root = %settings.local_data_dir.display(), "Using local object store");
            Ok(Arc::new(LocalStore::new(&settings.local_data_dir)))
        }
        PipelineEnv::Aws => {
            let store = S3Store::new(&settings.s3).await?;
            info!(bucket = %store.bucket(), "Using S3 object store");
            Ok(Arc::new(store))
        }
    }
}

/// Normalize a relative object path, rejecting anything that could escape
/// the store root.
pub fn validate_relative_path(path: &str) -> Result<String> {
    let normalized = normalize(path, false)?;
    if normalized.is_empty() {
        return Err(PipelineError::UnsafePath(format!("empty path '{path}'")));
    }
    Ok(normalized)
}

/// Like [`validate_relative_path`] but an empty prefix (the root) is allowed.
pub fn validate_prefix(prefix: &str) -> Result<String> {
    normalize(prefix, true)
}

fn normalize(path: &str, allow_empty: bool) -> Result<String> {
    let unified = path.replace('\\', "/");
    if unified.trim().is_empty() {
        return if allow_empty {
            Ok(String::new())
        } else {
            Err(PipelineError::UnsafePath("empty path".to_string()))
        };
    }
    if unified.starts_with('/') || has_drive_prefix(&unified) {
        return Err(PipelineError::UnsafePath(format!("absolute path '{path}'")));
    }

    let mut parts: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(PipelineError::UnsafePath(format!(
                        "path escapes store root '{path}'"
                    )));
                }
            }
            other => parts.push(other),
        }
    }
    Ok(parts.join("/"))
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

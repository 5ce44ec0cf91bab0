//! Filesystem backend

use super::{validate_prefix, validate_relative_path, ObjectStore};
use crate::error::Result;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, instrument};

const TMP_SUFFIX: &str = ".tmp";

/// Object store rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = validate_relative_path(path)?;
        Ok(self.root.join(relative))
    }

    async fn ensure_parent(target: &Path) -> Result<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    #[instrument(skip(self, data), fields(bytes = data.len()))]
    async fn put_bytes(&self, path: &str, data: Vec<u8>) -> Result<String> {
        let target = self.resolve(path)?;
        Self::ensure_parent(&target).await?;
        fs::write(&target, data).await?;
        debug!("Wrote {}", target.display());
        Ok(target.display().to_string())
    }

    #[instrument(skip(self, data), fields(bytes = data.len()))]
    async fn put_atomic(&self, path: &str, data: Vec<u8>) -> Result<String> {
        let target = self.resolve(path)?;
        Self::ensure_parent(&target).await?;

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let tmp = target.with_file_name(format!(
            ".{file_name}.{}{TMP_SUFFIX}",
            uuid::Uuid::new_v4().simple()
        ));

        fs::write(&tmp, data).await?;
        if let Err(e) = fs::rename(&tmp, &target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!("Atomically replaced {}", target.display());
        Ok(target.display().to_string())
    }

    async fn get_bytes(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let target = self.resolve(path)?;
        match fs::read(&target).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = validate_prefix(prefix)?;
        let start = if prefix.is_empty() {
            self.root.clone()
        } else {
            self.root.join(&prefix)
        };

        let mut found = Vec::new();
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) if e.kind() == ErrorKind::NotADirectory => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                let path = entry.path();
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                let name = entry.file_name().to_string_lossy().to_string();
                if name.starts_with('.') && name.ends_with(TMP_SUFFIX) {
                    continue;
                }
                if let Ok(relative) = path.strip_prefix(&self.root) {
                    let parts: Vec<String> = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().to_string())
                        .collect();
                    found.push(parts.join("/"));
                }
            }
        }
        found.sort();
        Ok(found)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let target = self.resolve(path)?;
        Ok(fs::try_exists(&target).await?)
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;
        Self::ensure_parent(&target).await?;
        fs::rename(&source, &target).await?;
        debug!("Renamed {} -> {}", source.display(), target.display());
        Ok(())
    }

    fn location(&self, path: &str) -> String {
        match validate_relative_path(path) {
            Ok(relative) => self.root.join(relative).display().to_string(),
            Err(_) => self.root.join(path).display().to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());

        assert_eq!(store.get_bytes("a/b.json").await.unwrap(), None);
        store.put_bytes("a/b.json", b"{}".to_vec()).await.unwrap();
        assert_eq!(store.get_bytes("a/b.json").await.unwrap(), Some(b"{}".to_vec()));
        assert!(store.exists("a/b.json").await.unwrap());
    }

    #[tokio::test]
    async fn test_put_atomic_replaces_and_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());

        store.put_atomic("state/w.json", b"1".to_vec()).await.unwrap();
        store.put_atomic("state/w.json", b"2".to_vec()).await.unwrap();

        assert_eq!(store.get_bytes("state/w.json").await.unwrap(), Some(b"2".to_vec()));
        let names: Vec<_> = std::fs::read_dir(dir.path().join("state"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["w.json".to_string()]);
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_recursive() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());

        store.put_bytes("p/dt=2/x.jsonl", vec![]).await.unwrap();
        store.put_bytes("p/dt=1/y.jsonl", vec![]).await.unwrap();
        store.put_bytes("q/z.jsonl", vec![]).await.unwrap();

        assert_eq!(
            store.list("p").await.unwrap(),
            vec!["p/dt=1/y.jsonl".to_string(), "p/dt=2/x.jsonl".to_string()]
        );
        assert_eq!(store.list("").await.unwrap().len(), 3);
        assert!(store.list("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rename() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());

        store.put_bytes("a.json", b"x".to_vec()).await.unwrap();
        store.rename("a.json", "q/a.corrupt.json").await.unwrap();
        assert!(!store.exists("a.json").await.unwrap());
        assert!(store.exists("q/a.corrupt.json").await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path().join("root"));

        let err = store.put_bytes("../outside.json", b"x".to_vec()).await.unwrap_err();
        assert!(matches!(err, PipelineError::UnsafePath(_)));
        assert!(!dir.path().join("outside.json").exists());
    }
}

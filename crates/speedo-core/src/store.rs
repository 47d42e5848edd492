//! Result persistence
//!
//! Stored results are files in one directory, named `<id>.<ext>`.
//! Saves write a fresh file keyed by a newly generated identifier, so
//! concurrent saves never touch the same file.

use crate::{Error, Result};
use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Persistence collaborator for result records
pub trait ResultStore: Send + Sync {
    /// Persist a document, returning its identifier
    fn store(&self, document: Value) -> BoxFuture<'_, Result<String>>;

    /// Read a stored artifact by file name (`<id>.<ext>`)
    fn read<'a>(&'a self, filename: &'a str) -> BoxFuture<'a, Result<Bytes>>;
}

/// Filesystem-backed result store
#[derive(Debug, Clone)]
pub struct FsResultStore {
    dir: PathBuf,
}

impl FsResultStore {
    /// Use `dir` without touching the filesystem
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Use `dir`, creating it if missing
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(dir);
        tokio::fs::create_dir_all(&store.dir).await?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Generate a fresh identifier (UUID v4, 32 hex chars)
    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }

    async fn write_new(&self, document: Value) -> Result<String> {
        let body = serde_json::to_vec(&document)?;
        let id = Self::generate_id();
        let path = self.dir.join(format!("{}.json", id));

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| Error::Persistence(format!("{}: {}", path.display(), e)))?;
        file.write_all(&body)
            .await
            .map_err(|e| Error::Persistence(format!("{}: {}", path.display(), e)))?;
        file.flush()
            .await
            .map_err(|e| Error::Persistence(format!("{}: {}", path.display(), e)))?;

        tracing::debug!(id = %id, bytes = body.len(), "Stored result");
        Ok(id)
    }

    async fn read_file(&self, filename: &str) -> Result<Bytes> {
        if !is_plain_filename(filename) {
            return Err(Error::NotFound(filename.to_string()));
        }
        match tokio::fs::read(self.dir.join(filename)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(filename.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl ResultStore for FsResultStore {
    fn store(&self, document: Value) -> BoxFuture<'_, Result<String>> {
        self.write_new(document).boxed()
    }

    fn read<'a>(&'a self, filename: &'a str) -> BoxFuture<'a, Result<Bytes>> {
        self.read_file(filename).boxed()
    }
}

/// A single path segment that cannot escape the results directory
pub fn is_plain_filename(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(&['/', '\\', '\0'][..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_plain_filename() {
        assert!(is_plain_filename("abc.json"));
        assert!(is_plain_filename("abc"));
        assert!(!is_plain_filename(""));
        assert!(!is_plain_filename(".."));
        assert!(!is_plain_filename("../etc/passwd"));
        assert!(!is_plain_filename("a\\b.json"));
    }

    #[test]
    fn test_generate_id() {
        let a = FsResultStore::generate_id();
        let b = FsResultStore::generate_id();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_store_then_read() {
        let dir = tempdir().unwrap();
        let store = FsResultStore::open(dir.path().join("results")).await.unwrap();
        let id = store.store(json!({"download": 93.5, "upload": 12})).await.unwrap();

        let bytes = store.read(&format!("{}.json", id)).await.unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, json!({"download": 93.5, "upload": 12}));
    }

    #[tokio::test]
    async fn test_read_missing() {
        let dir = tempdir().unwrap();
        let store = FsResultStore::open(dir.path().to_path_buf()).await.unwrap();
        let err = store.read("does-not-exist.json").await.unwrap_err();
        assert!(err.is_not_found());
        let err = store.read("../secret.json").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_store_into_missing_dir_fails() {
        let dir = tempdir().unwrap();
        let store = FsResultStore::new(dir.path().join("absent/nested"));
        let err = store.store(json!({"a": 1})).await.unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
    }

    #[tokio::test]
    async fn test_concurrent_saves_get_distinct_ids() {
        let dir = tempdir().unwrap();
        let store = std::sync::Arc::new(FsResultStore::open(dir.path().to_path_buf()).await.unwrap());
        let mut tasks = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move { store.store(json!({ "run": i })).await }));
        }
        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().unwrap());
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 16);
    }
}

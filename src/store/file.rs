//! File-backed store: the durable tier.
//!
//! One JSON file per key under a base directory. Expiry is persisted with
//! the value so entries written by one process instance expire correctly
//! when read by another. This tier is best-effort; callers treat its
//! errors as soft (see the tiered cache).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{now_epoch_secs, StateStore, StoreError};

#[derive(Debug, Serialize, Deserialize)]
struct FileEntry {
    value: String,
    /// Unix timestamp; `None` means no expiry
    expires_at: Option<u64>,
}

/// Durable key-value store writing one file per key
#[derive(Debug, Clone)]
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `base_dir`, creating it if needed
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    /// Store rooted at the platform cache directory
    pub fn default_location() -> Result<Self, StoreError> {
        let dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bibliomerge")
            .join("durable");
        Self::new(dir)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Keys contain `:` and `/`; map them to a flat, filesystem-safe name
    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.base_dir.join(format!("{safe}.json"))
    }
}

#[async_trait]
impl StateStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key);

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: FileEntry = serde_json::from_str(&content)?;

        if entry.expires_at.is_some_and(|at| now_epoch_secs() >= at) {
            let _ = tokio::fs::remove_file(&path).await;
            return Ok(None);
        }

        Ok(Some(entry.value))
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let entry = FileEntry {
            value: value.to_string(),
            expires_at: ttl.map(|t| now_epoch_secs() + t.as_secs()),
        };
        let content = serde_json::to_string(&entry)?;
        tokio::fs::write(self.path_for(key), content).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        store.put("work/9780553418026.json", "payload", None).await.unwrap();
        assert_eq!(
            store.get("work/9780553418026.json").await.unwrap(),
            Some("payload".to_string())
        );
    }

    #[tokio::test]
    async fn test_persisted_expiry() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        store
            .put("k", "v", Some(Duration::from_secs(0)))
            .await
            .unwrap();
        // expires_at == now, so the entry reads as expired
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_key_sanitization() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        store.put("circuit_breaker:isbndb", "{}", None).await.unwrap();
        store.put("ratelimit:isbndb", "12345", None).await.unwrap();

        assert_eq!(
            store.get("circuit_breaker:isbndb").await.unwrap(),
            Some("{}".to_string())
        );
        assert_eq!(
            store.get("ratelimit:isbndb").await.unwrap(),
            Some("12345".to_string())
        );
    }

    #[tokio::test]
    async fn test_delete_missing_ok() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        store.delete("never-written").await.unwrap();
    }
}

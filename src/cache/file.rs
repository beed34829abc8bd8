//! On-disk cache shared between runs.

use super::Cache;
use crate::error::CacheError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// One cached value as stored on disk.
#[derive(Debug, Serialize, Deserialize)]
struct Entry {
    key: String,
    value: String,
    /// `None` when the TTL runs past the end of the calendar.
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }
}

/// Cache with one JSON file per key under a directory.
///
/// File names are the SHA-256 of the key. Writes go to a temporary file that
/// is renamed into place, so a reader never sees a half-written entry.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `adscout` under the user's cache directory.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join("adscout"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir.join(format!("{}.json", hex::encode(digest)))
    }
}

#[async_trait]
impl Cache for FileCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let path = self.entry_path(key);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: Entry = serde_json::from_str(&raw)?;
        if entry.key != key {
            return Ok(None);
        }
        if entry.is_expired() {
            debug!("Evicting expired cache entry {}", key);
            self.delete(key).await?;
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl));
        let entry = Entry { key: key.to_string(), value, expires_at };
        let json = serde_json::to_string(&entry)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.entry_path(key);
        let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, json).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files_in(dir: &Path) -> Vec<String> {
        match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().join("cache"));

        assert_eq!(cache.get("search:abc").await.unwrap(), None);
        cache.set("search:abc", "[1,2]".to_string(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("search:abc").await.unwrap().as_deref(), Some("[1,2]"));

        let files = files_in(cache.dir());
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with(".json"));
        assert_eq!(files[0].len(), 64 + ".json".len());
    }

    #[tokio::test]
    async fn test_entries_survive_a_new_handle() {
        let dir = tempfile::tempdir().unwrap();
        FileCache::new(dir.path())
            .set("listing:7", "{}".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        let reopened = FileCache::new(dir.path());
        assert_eq!(reopened.get("listing:7").await.unwrap().as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn test_expired_entry_is_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());

        cache.set("k", "v".to_string(), Duration::ZERO).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(files_in(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_huge_ttl_never_expires() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());

        cache.set("k", "v".to_string(), Duration::MAX).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());

        cache.set("k", "v".to_string(), Duration::from_secs(60)).await.unwrap();
        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        // Deleting a missing key is fine
        cache.delete("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        std::fs::write(cache.entry_path("k"), "not json").unwrap();

        assert!(matches!(cache.get("k").await, Err(CacheError::Decode(_))));
        // The next write replaces it
        cache.set("k", "v".to_string(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_overwrite_leaves_no_temporary_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());

        cache.set("k", "a".to_string(), Duration::from_secs(60)).await.unwrap();
        cache.set("k", "b".to_string(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("b"));
        assert_eq!(files_in(dir.path()).len(), 1);
    }
}

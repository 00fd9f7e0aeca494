//! Cache Storage Implementation using Tokio
//!
//! Layout on disk:
//!
//! ```text
//! <root>/
//!   <partition-name>/
//!     <sha256(method + " " + url)>.entry
//! ```
//!
//! Each `.entry` file is a single line of JSON metadata followed by a newline
//! and the raw body bytes. Entries are written to a temporary file and
//! renamed into place, so a reader sees either the old entry or the new one.

use async_trait::async_trait;
use bridge_traits::{
    cache::{validate_partition_name, CacheKey, CachePartition, CacheStorage, CachedResponse},
    error::{BridgeError, Result},
    http::HttpMethod,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, warn};

const ENTRY_EXTENSION: &str = "entry";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Entry header persisted in front of the body.
#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    method: String,
    url: String,
    status: u16,
    status_text: String,
    headers: BTreeMap<String, String>,
    stored_at: DateTime<Utc>,
}

/// Filesystem-backed [`CacheStorage`].
pub struct FsCacheStorage {
    root: PathBuf,
}

impl FsCacheStorage {
    /// Store partitions under the platform cache directory
    pub fn new() -> Self {
        let root = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("offline-shell")
            .join("partitions");
        Self { root }
    }

    /// Store partitions under a custom root directory
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn partition_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn map_io_error(context: &str, e: std::io::Error) -> BridgeError {
        BridgeError::Storage(format!("{}: {}", context, e))
    }
}

impl Default for FsCacheStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStorage for FsCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn CachePartition>> {
        validate_partition_name(name)?;
        let dir = self.partition_dir(name);

        fs::create_dir_all(&dir)
            .await
            .map_err(|e| Self::map_io_error(&format!("create partition {}", name), e))?;
        debug!(partition = name, path = ?dir, "Opened partition");

        Ok(Arc::new(FsPartition {
            name: name.to_string(),
            dir,
        }))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        validate_partition_name(name)?;
        let dir = self.partition_dir(name);

        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(partition = name, "Deleted partition");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Self::map_io_error(&format!("delete partition {}", name), e)),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut read_dir = match fs::read_dir(&self.root).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::map_io_error("list partitions", e)),
        };

        let mut found: Vec<(SystemTime, String)> = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| Self::map_io_error("list partitions", e))?
        {
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| Self::map_io_error("stat partition", e))?;
            if !metadata.is_dir() {
                continue;
            }

            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if validate_partition_name(&name).is_err() {
                continue;
            }

            let created = metadata
                .created()
                .or_else(|_| metadata.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            found.push((created, name));
        }

        found.sort();
        Ok(found.into_iter().map(|(_, name)| name).collect())
    }
}

/// One partition directory.
pub struct FsPartition {
    name: String,
    dir: PathBuf,
}

impl FsPartition {
    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir
            .join(format!("{}.{}", fingerprint(key), ENTRY_EXTENSION))
    }

    async fn read_entry(path: &Path) -> Result<Option<(EntryMeta, Bytes)>> {
        let raw = match fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(FsCacheStorage::map_io_error("read entry", e)),
        };

        let split = raw
            .iter()
            .position(|b| *b == b'\n')
            .ok_or_else(|| BridgeError::Storage(format!("Corrupt entry {:?}", path)))?;

        let meta: EntryMeta = serde_json::from_slice(&raw[..split])
            .map_err(|e| BridgeError::Storage(format!("Corrupt entry header {:?}: {}", path, e)))?;
        let body = Bytes::copy_from_slice(&raw[split + 1..]);

        Ok(Some((meta, body)))
    }
}

#[async_trait]
impl CachePartition for FsPartition {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_key(&self, key: &CacheKey) -> Result<Option<CachedResponse>> {
        let path = self.entry_path(key);
        let Some((meta, body)) = Self::read_entry(&path).await? else {
            return Ok(None);
        };

        if meta.method != key.method() || meta.url != key.url() {
            warn!(partition = %self.name, key = %key, "Entry fingerprint collision, ignoring");
            return Ok(None);
        }

        Ok(Some(CachedResponse {
            status: meta.status,
            status_text: meta.status_text,
            headers: meta.headers,
            body,
            stored_at: meta.stored_at,
        }))
    }

    async fn put(&self, key: &CacheKey, entry: CachedResponse) -> Result<()> {
        let meta = EntryMeta {
            method: key.method().to_string(),
            url: key.url().to_string(),
            status: entry.status,
            status_text: entry.status_text,
            headers: entry.headers,
            stored_at: entry.stored_at,
        };

        let mut raw = serde_json::to_vec(&meta)
            .map_err(|e| BridgeError::Storage(format!("Encode entry header: {}", e)))?;
        raw.push(b'\n');
        raw.extend_from_slice(&entry.body);

        let path = self.entry_path(key);
        let temp = self.dir.join(format!(
            ".{}.{}.tmp",
            fingerprint(key),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        fs::write(&temp, &raw)
            .await
            .map_err(|e| FsCacheStorage::map_io_error("write entry", e))?;
        if let Err(e) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(FsCacheStorage::map_io_error("commit entry", e));
        }

        debug!(partition = %self.name, key = %key, size = entry.body.len(), "Stored entry");
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<CacheKey>> {
        let mut read_dir = match fs::read_dir(&self.dir).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(FsCacheStorage::map_io_error("list entries", e)),
        };

        let mut keys = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| FsCacheStorage::map_io_error("list entries", e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }

            match Self::read_entry(&path).await {
                Ok(Some((meta, _))) => {
                    let Some(method) = HttpMethod::parse(&meta.method) else {
                        continue;
                    };
                    if let Ok(key) = CacheKey::parse(method, &meta.url) {
                        keys.push(key);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(path = ?path, error = %e, "Skipping unreadable entry"),
            }
        }

        keys.sort();
        Ok(keys)
    }
}

fn fingerprint(key: &CacheKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.method().as_bytes());
    hasher.update(b" ");
    hasher.update(key.url().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::http::HttpResponse;
    use tempfile::tempdir;

    fn key(url: &str) -> CacheKey {
        CacheKey::parse(HttpMethod::Get, url).unwrap()
    }

    #[test]
    fn test_fingerprint_is_stable_and_method_sensitive() {
        let get = key("https://app.example/index.html");
        let head = CacheKey::parse(HttpMethod::Head, "https://app.example/index.html").unwrap();

        assert_eq!(fingerprint(&get), fingerprint(&get.clone()));
        assert_ne!(fingerprint(&get), fingerprint(&head));
        assert_eq!(fingerprint(&get).len(), 64);
    }

    #[tokio::test]
    async fn test_keys_on_missing_root_is_empty() {
        let dir = tempdir().unwrap();
        let storage = FsCacheStorage::with_root(dir.path().join("absent"));
        assert!(storage.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_storage_error() {
        let dir = tempdir().unwrap();
        let storage = FsCacheStorage::with_root(dir.path());
        let partition = storage.open("shell-static-v1").await.unwrap();
        let k = key("https://app.example/broken");

        let path = dir
            .path()
            .join("shell-static-v1")
            .join(format!("{}.entry", fingerprint(&k)));
        std::fs::write(&path, b"no header terminator").unwrap();

        let err = partition.match_key(&k).await.unwrap_err();
        assert!(matches!(err, BridgeError::Storage(_)));
    }

    #[tokio::test]
    async fn test_binary_body_survives() {
        let dir = tempdir().unwrap();
        let storage = FsCacheStorage::with_root(dir.path());
        let partition = storage.open("shell-static-v1").await.unwrap();
        let k = key("https://app.example/icon-192.png");

        let png = vec![0x89, b'P', b'N', b'G', b'\n', 0x00, 0xff, b'\n'];
        let response = HttpResponse::new(200, png.clone()).with_header("content-type", "image/png");
        partition
            .put(&k, CachedResponse::from_response(&response, Utc::now()))
            .await
            .unwrap();

        let hit = partition.match_key(&k).await.unwrap().unwrap();
        assert_eq!(hit.body.as_ref(), png.as_slice());
        assert_eq!(hit.headers.get("content-type").unwrap(), "image/png");
    }
}

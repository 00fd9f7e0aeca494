//! In-process cache storage
//!
//! Backs partitions with hash maps. Useful for tests, for hosts that only
//! need a session-lifetime cache, and as the reference behaviour for the
//! persistent adapters.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::cache::{validate_partition_name, CacheKey, CachePartition, CacheStorage, CachedResponse};
use crate::error::Result;

/// In-memory [`CacheStorage`] preserving partition creation order.
#[derive(Clone, Default)]
pub struct MemoryCacheStorage {
    partitions: Arc<RwLock<Vec<Arc<MemoryPartition>>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries across all partitions.
    pub fn total_entries(&self) -> usize {
        self.partitions
            .read()
            .iter()
            .map(|p| p.entries.read().len())
            .sum()
    }
}

impl std::fmt::Debug for MemoryCacheStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .partitions
            .read()
            .iter()
            .map(|p| p.name.clone())
            .collect();
        f.debug_struct("MemoryCacheStorage")
            .field("partitions", &names)
            .finish()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn CachePartition>> {
        validate_partition_name(name)?;

        if let Some(existing) = self.partitions.read().iter().find(|p| p.name == name) {
            return Ok(existing.clone());
        }

        let mut partitions = self.partitions.write();
        // Another opener may have won the race between the two locks.
        if let Some(existing) = partitions.iter().find(|p| p.name == name) {
            return Ok(existing.clone());
        }

        let partition = Arc::new(MemoryPartition::new(name));
        partitions.push(partition.clone());
        debug!(partition = name, "Created in-memory partition");
        Ok(partition)
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let mut partitions = self.partitions.write();
        let before = partitions.len();
        partitions.retain(|p| p.name != name);
        Ok(partitions.len() != before)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self
            .partitions
            .read()
            .iter()
            .map(|p| p.name.clone())
            .collect())
    }
}

/// One in-memory partition.
pub struct MemoryPartition {
    name: String,
    entries: RwLock<HashMap<CacheKey, CachedResponse>>,
}

impl MemoryPartition {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl CachePartition for MemoryPartition {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_key(&self, key: &CacheKey) -> Result<Option<CachedResponse>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn put(&self, key: &CacheKey, entry: CachedResponse) -> Result<()> {
        self.entries.write().insert(key.clone(), entry);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<CacheKey>> {
        let mut keys: Vec<CacheKey> = self.entries.read().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpMethod, HttpResponse};
    use chrono::Utc;

    fn entry(body: &'static str) -> CachedResponse {
        CachedResponse::from_response(&HttpResponse::new(200, body), Utc::now())
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let storage = MemoryCacheStorage::new();
        let key = CacheKey::parse(HttpMethod::Get, "https://app.example/").unwrap();

        let first = storage.open("shell-static-v1").await.unwrap();
        first.put(&key, entry("one")).await.unwrap();

        let second = storage.open("shell-static-v1").await.unwrap();
        assert!(second.match_key(&key).await.unwrap().is_some());
        assert_eq!(storage.keys().await.unwrap(), vec!["shell-static-v1"]);
    }

    #[tokio::test]
    async fn test_keys_preserve_creation_order() {
        let storage = MemoryCacheStorage::new();
        storage.open("b-v1").await.unwrap();
        storage.open("a-v1").await.unwrap();
        storage.open("c-v1").await.unwrap();

        assert_eq!(storage.keys().await.unwrap(), vec!["b-v1", "a-v1", "c-v1"]);
    }

    #[tokio::test]
    async fn test_put_replaces_wholesale() {
        let storage = MemoryCacheStorage::new();
        let partition = storage.open("p-v1").await.unwrap();
        let key = CacheKey::parse(HttpMethod::Get, "https://app.example/app.js").unwrap();

        partition.put(&key, entry("old")).await.unwrap();
        partition.put(&key, entry("new")).await.unwrap();

        let hit = partition.match_key(&key).await.unwrap().unwrap();
        assert_eq!(hit.body.as_ref(), b"new");
        assert_eq!(storage.total_entries(), 1);
    }

    #[tokio::test]
    async fn test_delete_and_match_all() {
        let storage = MemoryCacheStorage::new();
        let key = CacheKey::parse(HttpMethod::Get, "https://cdn.example/lib.js").unwrap();

        storage.open("static-v1").await.unwrap();
        let external = storage.open("external-v1").await.unwrap();
        external.put(&key, entry("lib")).await.unwrap();

        assert!(storage.match_all(&key).await.unwrap().is_some());
        assert!(storage.delete("external-v1").await.unwrap());
        assert!(!storage.delete("external-v1").await.unwrap());
        assert!(storage.match_all(&key).await.unwrap().is_none());
        assert_eq!(storage.keys().await.unwrap(), vec!["static-v1"]);
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_name() {
        let storage = MemoryCacheStorage::new();
        assert!(storage.open("../escape").await.is_err());
    }
}

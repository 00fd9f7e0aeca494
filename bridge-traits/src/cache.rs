//! Cache Storage Abstractions
//!
//! Named, versioned partitions mapping a request identity to a stored
//! response snapshot. Mirrors the shape of a browser's `CacheStorage`:
//! - Web: the Cache API
//! - Desktop: one directory per partition
//! - Tests: an in-memory map
//!
//! Every operation may suspend on device I/O and may fail with a storage
//! error. Callers decide whether a failure is fatal.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use url::Url;

use crate::error::{BridgeError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, ResponseType};

/// Normalized request identity.
///
/// Method is upper-case, the URL is parsed and re-serialized with its
/// fragment removed. The query string is significant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    method: String,
    url: String,
}

impl CacheKey {
    pub fn new(method: HttpMethod, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: method.as_str().to_string(),
            url: url.to_string(),
        }
    }

    /// Parse an absolute URL into a key.
    pub fn parse(method: HttpMethod, url: &str) -> Result<Self> {
        let parsed = Url::parse(url)
            .map_err(|e| BridgeError::InvalidInput(format!("Invalid URL '{}': {}", url, e)))?;
        Ok(Self::new(method, &parsed))
    }

    pub fn for_request(request: &HttpRequest) -> Result<Self> {
        Self::parse(request.method, &request.url)
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Immutable snapshot of a response at the time it was stored.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
    pub stored_at: DateTime<Utc>,
}

impl CachedResponse {
    pub fn from_response(response: &HttpResponse, stored_at: DateTime<Utc>) -> Self {
        Self {
            status: response.status,
            status_text: response.status_text.clone(),
            headers: response
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            body: response.body.clone(),
            stored_at,
        }
    }

    /// Materialize the snapshot as a fresh response for a caller.
    pub fn into_response(self) -> HttpResponse {
        HttpResponse {
            status: self.status,
            status_text: self.status_text,
            headers: self.headers.into_iter().collect(),
            body: self.body,
            response_type: ResponseType::Basic,
        }
    }
}

/// A single named partition.
#[async_trait]
pub trait CachePartition: Send + Sync {
    /// Partition name as passed to [`CacheStorage::open`].
    fn name(&self) -> &str;

    /// Look up an entry by key.
    async fn match_key(&self, key: &CacheKey) -> Result<Option<CachedResponse>>;

    /// Store an entry, replacing any previous entry for the key wholesale.
    async fn put(&self, key: &CacheKey, entry: CachedResponse) -> Result<()>;

    /// All keys currently stored in this partition.
    async fn keys(&self) -> Result<Vec<CacheKey>>;
}

/// The set of all partitions on the device.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::cache::{CacheKey, CacheStorage};
///
/// async fn warm(storage: &dyn CacheStorage, key: &CacheKey, entry: CachedResponse) -> Result<()> {
///     let partition = storage.open("shell-static-v1").await?;
///     partition.put(key, entry).await
/// }
/// ```
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a partition, creating it if absent. Idempotent.
    async fn open(&self, name: &str) -> Result<Arc<dyn CachePartition>>;

    /// Delete a partition and all of its entries.
    ///
    /// Returns `false` if no partition had that name.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Names of every existing partition, in creation order where the
    /// backend can tell.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Look a key up across every partition, first match wins.
    async fn match_all(&self, key: &CacheKey) -> Result<Option<CachedResponse>> {
        for name in self.keys().await? {
            let partition = self.open(&name).await?;
            if let Some(entry) = partition.match_key(key).await? {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }
}

/// Reject partition names that cannot be mapped safely onto a backend.
pub fn validate_partition_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(BridgeError::InvalidInput(
            "Partition name cannot be empty".to_string(),
        ));
    }

    if name == "." || name == ".." {
        return Err(BridgeError::InvalidInput(format!(
            "Reserved partition name: {}",
            name
        )));
    }

    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(BridgeError::InvalidInput(format!(
            "Partition name '{}' contains invalid character '{}'",
            name, bad
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_strips_fragment_keeps_query() {
        let key = CacheKey::parse(HttpMethod::Get, "https://app.example/a.js?v=2#top").unwrap();
        assert_eq!(key.url(), "https://app.example/a.js?v=2");
        assert_eq!(key.method(), "GET");

        let other = CacheKey::parse(HttpMethod::Get, "https://app.example/a.js?v=3").unwrap();
        assert_ne!(key, other);
    }

    #[test]
    fn test_cache_key_method_is_part_of_identity() {
        let get = CacheKey::parse(HttpMethod::Get, "https://app.example/").unwrap();
        let head = CacheKey::parse(HttpMethod::Head, "https://app.example/").unwrap();
        assert_ne!(get, head);
        assert_eq!(get.to_string(), "GET https://app.example/");
    }

    #[test]
    fn test_cache_key_rejects_relative_url() {
        let err = CacheKey::parse(HttpMethod::Get, "/index.html").unwrap_err();
        assert!(matches!(err, BridgeError::InvalidInput(_)));
    }

    #[test]
    fn test_cached_response_snapshot() {
        let response = HttpResponse::new(200, "hello").with_header("content-type", "text/plain");
        let stored_at = Utc::now();
        let snapshot = CachedResponse::from_response(&response, stored_at);

        assert_eq!(snapshot.status, 200);
        assert_eq!(snapshot.body.len(), 5);
        assert_eq!(snapshot.stored_at, stored_at);

        let restored = snapshot.into_response();
        assert_eq!(restored.body, response.body);
        assert_eq!(restored.headers, response.headers);
        assert_eq!(restored.status_text, "OK");
    }

    #[test]
    fn test_validate_partition_name() {
        assert!(validate_partition_name("booktracker-static-v2.0").is_ok());
        assert!(validate_partition_name("").is_err());
        assert!(validate_partition_name("..").is_err());
        assert!(validate_partition_name("a/b").is_err());
        assert!(validate_partition_name("with space").is_err());
    }
}

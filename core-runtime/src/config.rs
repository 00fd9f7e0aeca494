//! # Core Configuration Module
//!
//! Provides configuration management for the offline cache engine.
//!
//! ## Overview
//!
//! Configuration is split in two layers:
//!
//! - [`CacheManifest`] is the deploy-time asset declaration. It is fixed per
//!   deployed version and read-only at runtime. It can be shipped as JSON next
//!   to the application bundle and loaded with [`CacheManifest::from_path`].
//! - [`CoreConfig`] couples a manifest with the bridges the engine needs
//!   (network transport, partition storage, clock). It is built with
//!   [`CoreConfigBuilder`], which fails fast when a capability is missing.
//!
//! ## Required Dependencies
//!
//! - `HttpClient` - the network transport (desktop default: reqwest)
//! - `CacheStorage` - the partition store (desktop default: tokio fs)
//!
//! When the `desktop-shims` feature is enabled, desktop-ready defaults for
//! both are injected automatically if not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CacheManifest, CoreConfig};
//!
//! let manifest = CacheManifest::from_path("dist/cache-manifest.json")?;
//! let config = CoreConfig::builder()
//!     .manifest(manifest)
//!     .cache_dir("/var/cache/booktracker")
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! // Fails: no manifest was provided
//! let config = CoreConfig::builder()
//!     .build()
//!     .expect("Should fail - missing manifest");
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{CacheStorage, Clock, HttpClient, SystemClock};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

/// Hosts whose traffic is never intercepted. These back dynamic lookup APIs
/// that are useless offline.
pub const DEFAULT_EXCLUDED_HOSTS: &[&str] = &[
    "googleapis.com",
    "openlibrary.org",
    "isbn.cloud",
    "worldcat.org",
];

pub const DEFAULT_OFFLINE_FALLBACK: &str = "/index.html";

pub const DEFAULT_OFFLINE_NOTICE: &str =
    "You are offline. This page has not been saved for offline use yet.";

const DEFAULT_ORIGIN: &str = "http://localhost:8080/";

/// Which partitions a cache lookup consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupScope {
    /// Only the partitions of the running version.
    #[default]
    Current,
    /// Every partition present in storage, in creation order.
    All,
}

/// The pair of partition names belonging to one deployed version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionNames {
    pub static_partition: String,
    pub external_partition: String,
}

impl PartitionNames {
    pub fn for_version(prefix: &str, version: &str) -> Self {
        Self {
            static_partition: format!("{prefix}-static-v{version}"),
            external_partition: format!("{prefix}-external-v{version}"),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.static_partition == name || self.external_partition == name
    }
}

/// Deploy-time declaration of what a version caches and how it degrades.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheManifest {
    /// Application tag used as the partition name prefix.
    pub prefix: String,

    /// Version tag embedded in every partition name. Bumping it on deploy is
    /// what makes the previous partitions stale.
    pub version: String,

    /// Origin the app is served from; relative asset paths resolve against it.
    pub origin: Url,

    /// App-shell assets. All must be fetched for install to succeed.
    #[serde(default)]
    pub mandatory_assets: Vec<String>,

    /// Third-party libraries cached on a best-effort basis.
    #[serde(default)]
    pub optional_assets: Vec<String>,

    #[serde(default = "default_excluded_hosts")]
    pub excluded_hosts: Vec<String>,

    /// Root document served to navigation requests when the network fails.
    #[serde(default = "default_offline_fallback")]
    pub offline_fallback: String,

    #[serde(default)]
    pub lookup_scope: LookupScope,

    #[serde(default = "default_offline_notice")]
    pub offline_notice: String,
}

fn default_excluded_hosts() -> Vec<String> {
    DEFAULT_EXCLUDED_HOSTS.iter().map(|h| h.to_string()).collect()
}

fn default_offline_fallback() -> String {
    DEFAULT_OFFLINE_FALLBACK.to_string()
}

fn default_offline_notice() -> String {
    DEFAULT_OFFLINE_NOTICE.to_string()
}

impl Default for CacheManifest {
    /// The booktracker shell: five same-origin assets plus the QR decoder.
    fn default() -> Self {
        Self {
            prefix: "booktracker".to_string(),
            version: "1.4".to_string(),
            origin: Url::parse(DEFAULT_ORIGIN).expect("default origin is a valid URL"),
            mandatory_assets: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/manifest.json".to_string(),
                "/icon-192.png".to_string(),
                "/icon-512.png".to_string(),
            ],
            optional_assets: vec![
                "https://cdnjs.cloudflare.com/ajax/libs/jsqr/1.4.0/jsQR.min.js".to_string(),
            ],
            excluded_hosts: default_excluded_hosts(),
            offline_fallback: default_offline_fallback(),
            lookup_scope: LookupScope::default(),
            offline_notice: default_offline_notice(),
        }
    }
}

impl CacheManifest {
    pub fn new(prefix: impl Into<String>, version: impl Into<String>, origin: Url) -> Self {
        Self {
            prefix: prefix.into(),
            version: version.into(),
            origin,
            mandatory_assets: Vec::new(),
            optional_assets: Vec::new(),
            excluded_hosts: default_excluded_hosts(),
            offline_fallback: default_offline_fallback(),
            lookup_scope: LookupScope::default(),
            offline_notice: default_offline_notice(),
        }
    }

    pub fn with_mandatory<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mandatory_assets = assets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_optional<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.optional_assets = assets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_excluded_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_offline_fallback(mut self, path: impl Into<String>) -> Self {
        self.offline_fallback = path.into();
        self
    }

    pub fn with_lookup_scope(mut self, scope: LookupScope) -> Self {
        self.lookup_scope = scope;
        self
    }

    pub fn with_offline_notice(mut self, notice: impl Into<String>) -> Self {
        self.offline_notice = notice.into();
        self
    }

    /// Parses and validates a JSON manifest.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let manifest: CacheManifest = serde_json::from_str(json)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    pub fn partition_names(&self) -> PartitionNames {
        PartitionNames::for_version(&self.prefix, &self.version)
    }

    /// Resolves an asset reference against the origin.
    pub fn resolve(&self, asset: &str) -> Result<Url> {
        self.origin
            .join(asset)
            .map_err(|e| Error::Manifest(format!("cannot resolve asset '{asset}': {e}")))
    }

    pub fn resolved_mandatory(&self) -> Result<Vec<Url>> {
        self.mandatory_assets.iter().map(|a| self.resolve(a)).collect()
    }

    pub fn resolved_optional(&self) -> Result<Vec<Url>> {
        self.optional_assets.iter().map(|a| self.resolve(a)).collect()
    }

    pub fn resolved_fallback(&self) -> Result<Url> {
        self.resolve(&self.offline_fallback)
    }

    /// Validates the manifest.
    ///
    /// This checks:
    /// - prefix and version are non-empty and safe inside a partition name
    /// - the origin is http(s)
    /// - every asset and the fallback resolve to a URL
    /// - excluded hosts are bare hostnames
    pub fn validate(&self) -> Result<()> {
        check_name_fragment("prefix", &self.prefix)?;
        check_name_fragment("version", &self.version)?;

        if !matches!(self.origin.scheme(), "http" | "https") {
            return Err(Error::Manifest(format!(
                "origin must be http or https, got '{}'",
                self.origin.scheme()
            )));
        }

        self.resolved_mandatory()?;
        self.resolved_optional()?;
        self.resolved_fallback()?;

        for host in &self.excluded_hosts {
            if host.is_empty() || host.contains('/') || host.contains(':') {
                return Err(Error::Manifest(format!(
                    "excluded host '{host}' must be a bare hostname"
                )));
            }
        }

        Ok(())
    }
}

fn check_name_fragment(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::Manifest(format!("{field} cannot be empty")));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(Error::Manifest(format!(
            "{field} '{value}' may only contain ASCII letters, digits, '.', '_' or '-'"
        )));
    }
    Ok(())
}

/// Core configuration for the offline cache engine.
///
/// Holds the manifest and every bridge the engine talks to. Use
/// [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    pub manifest: CacheManifest,

    /// Directory used by the default filesystem partition store.
    pub cache_dir: PathBuf,

    pub http_client: Arc<dyn HttpClient>,

    pub cache_storage: Arc<dyn CacheStorage>,

    pub clock: Arc<dyn Clock>,

    /// Capacity of the event broadcast channel.
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("manifest", &self.manifest)
            .field("cache_dir", &self.cache_dir)
            .field("http_client", &"HttpClient { ... }")
            .field("cache_storage", &"CacheStorage { ... }")
            .field("clock", &"Clock { ... }")
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        self.manifest.validate()?;

        if self.cache_dir.as_os_str().is_empty() {
            return Err(Error::Config("Cache directory cannot be empty".to_string()));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required to reach the network. \
                 Desktop: enable the 'desktop-shims' feature to use the default ReqwestHttpClient. \
                 Embedded hosts: inject the platform's fetch primitive."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn cache_storage_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "CacheStorage".to_string(),
        message: "CacheStorage implementation is required for offline partitions. \
                 Desktop: enable the 'desktop-shims' feature to use the default FsCacheStorage. \
                 Tests: inject bridge_traits::MemoryCacheStorage."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::try_with_timeout(std::time::Duration::from_secs(30))
        .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {e}")))?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_cache_storage(cache_dir: &Path) -> Result<Arc<dyn CacheStorage>> {
    use bridge_desktop::FsCacheStorage;

    Ok(Arc::new(FsCacheStorage::with_root(cache_dir.join("partitions"))))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_cache_storage(_cache_dir: &Path) -> Result<Arc<dyn CacheStorage>> {
    Err(cache_storage_missing_error())
}

fn default_cache_dir() -> PathBuf {
    std::env::temp_dir().join("offline-shell")
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    manifest: Option<CacheManifest>,
    cache_dir: Option<PathBuf>,
    http_client: Option<Arc<dyn HttpClient>>,
    cache_storage: Option<Arc<dyn CacheStorage>>,
    clock: Option<Arc<dyn Clock>>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the manifest describing the version being deployed (required).
    pub fn manifest(mut self, manifest: CacheManifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    /// Sets the cache directory.
    ///
    /// Only consulted when the default filesystem store is injected.
    /// Default: `$TMPDIR/offline-shell`
    pub fn cache_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache_dir = Some(path.into());
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, the desktop default (reqwest-based) will be used when
    /// the `desktop-shims` feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the partition store.
    ///
    /// If not provided, the desktop default (one directory per partition
    /// under `cache_dir`) will be used when `desktop-shims` is enabled.
    pub fn cache_storage(mut self, storage: Arc<dyn CacheStorage>) -> Self {
        self.cache_storage = Some(storage);
        self
    }

    /// Overrides the clock used to timestamp cache entries.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Default: 100
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Returns
    ///
    /// Returns `Ok(CoreConfig)` on success, or an error if:
    /// - No manifest was provided
    /// - A required bridge is missing and no desktop default is available
    /// - The manifest or any setting is invalid
    pub fn build(self) -> Result<CoreConfig> {
        let manifest = self.manifest.ok_or_else(|| {
            Error::Config("Cache manifest is required. Use .manifest() to set it.".to_string())
        })?;

        let cache_dir = self.cache_dir.unwrap_or_else(default_cache_dir);

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let cache_storage = match self.cache_storage {
            Some(storage) => storage,
            None => provide_default_cache_storage(&cache_dir)?,
        };

        let config = CoreConfig {
            manifest,
            cache_dir,
            http_client,
            cache_storage,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{BridgeError, HttpRequest, HttpResponse, MemoryCacheStorage};

    struct MockHttpClient;

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn execute(
            &self,
            _request: HttpRequest,
        ) -> std::result::Result<HttpResponse, BridgeError> {
            Err(BridgeError::Network("offline".to_string()))
        }
    }

    fn origin() -> Url {
        Url::parse("https://books.example/").unwrap()
    }

    #[test]
    fn test_partition_names_embed_version() {
        let names = PartitionNames::for_version("booktracker", "2.0");
        assert_eq!(names.static_partition, "booktracker-static-v2.0");
        assert_eq!(names.external_partition, "booktracker-external-v2.0");
        assert!(names.contains("booktracker-static-v2.0"));
        assert!(!names.contains("booktracker-static-v1.4"));
    }

    #[test]
    fn test_default_manifest_is_valid() {
        let manifest = CacheManifest::default();
        manifest.validate().unwrap();
        assert_eq!(manifest.mandatory_assets.len(), 5);
        assert_eq!(manifest.excluded_hosts.len(), 4);
        assert_eq!(manifest.lookup_scope, LookupScope::Current);
    }

    #[test]
    fn test_resolve_relative_and_absolute_assets() {
        let manifest = CacheManifest::new("app", "1", origin())
            .with_mandatory(["/index.html"])
            .with_optional(["https://cdn.example/lib.js"]);

        let mandatory = manifest.resolved_mandatory().unwrap();
        assert_eq!(mandatory[0].as_str(), "https://books.example/index.html");
        let optional = manifest.resolved_optional().unwrap();
        assert_eq!(optional[0].as_str(), "https://cdn.example/lib.js");
    }

    #[test]
    fn test_from_json_applies_defaults() {
        let json = r#"{
            "prefix": "booktracker",
            "version": "2.0",
            "origin": "https://books.example/",
            "mandatory_assets": ["/", "/index.html"]
        }"#;

        let manifest = CacheManifest::from_json_str(json).unwrap();
        assert_eq!(manifest.offline_fallback, "/index.html");
        assert_eq!(manifest.excluded_hosts, default_excluded_hosts());
        assert!(manifest.optional_assets.is_empty());
    }

    #[test]
    fn test_from_json_parses_lookup_scope() {
        let json = r#"{
            "prefix": "booktracker",
            "version": "2.0",
            "origin": "https://books.example/",
            "lookup_scope": "all"
        }"#;

        let manifest = CacheManifest::from_json_str(json).unwrap();
        assert_eq!(manifest.lookup_scope, LookupScope::All);
    }

    #[test]
    fn test_from_json_rejects_unknown_fields() {
        let json = r#"{
            "prefix": "booktracker",
            "version": "2.0",
            "origin": "https://books.example/",
            "max_size_mb": 10
        }"#;

        assert!(matches!(
            CacheManifest::from_json_str(json),
            Err(Error::Manifest(_))
        ));
    }

    #[test]
    fn test_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache-manifest.json");
        std::fs::write(
            &path,
            r#"{"prefix":"shell","version":"7","origin":"http://localhost:3000/"}"#,
        )
        .unwrap();

        let manifest = CacheManifest::from_path(&path).unwrap();
        assert_eq!(manifest.partition_names().static_partition, "shell-static-v7");
    }

    #[test]
    fn test_from_path_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = CacheManifest::from_path(dir.path().join("absent.json"));
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_validate_rejects_empty_version() {
        let manifest = CacheManifest::new("app", "", origin());
        let err = manifest.validate().unwrap_err();
        assert!(err.to_string().contains("version cannot be empty"));
    }

    #[test]
    fn test_validate_rejects_path_separators_in_prefix() {
        let manifest = CacheManifest::new("../app", "1", origin());
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_http_origin() {
        let manifest = CacheManifest::new("app", "1", Url::parse("file:///srv/app/").unwrap());
        let err = manifest.validate().unwrap_err();
        assert!(err.to_string().contains("http or https"));
    }

    #[test]
    fn test_validate_rejects_excluded_host_with_scheme() {
        let manifest =
            CacheManifest::new("app", "1", origin()).with_excluded_hosts(["https://isbn.cloud"]);
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_builder_requires_manifest() {
        let result = CoreConfig::builder()
            .http_client(Arc::new(MockHttpClient))
            .cache_storage(Arc::new(MemoryCacheStorage::new()))
            .build();

        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Cache manifest is required"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_http_client() {
        let result = CoreConfig::builder()
            .manifest(CacheManifest::default())
            .cache_storage(Arc::new(MemoryCacheStorage::new()))
            .build();

        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("HttpClient"));
        assert!(err_msg.contains("reach the network"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_cache_storage() {
        let result = CoreConfig::builder()
            .manifest(CacheManifest::default())
            .http_client(Arc::new(MockHttpClient))
            .build();

        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("CacheStorage"));
        assert!(err_msg.contains("offline partitions"));
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_build_with_desktop_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig::builder()
            .manifest(CacheManifest::default())
            .cache_dir(dir.path())
            .build()
            .expect("desktop defaults should succeed");

        assert_eq!(config.cache_dir, dir.path());
    }

    #[test]
    fn test_builder_with_all_bridges() {
        let config = CoreConfig::builder()
            .manifest(CacheManifest::default())
            .cache_dir("/cache")
            .http_client(Arc::new(MockHttpClient))
            .cache_storage(Arc::new(MemoryCacheStorage::new()))
            .build()
            .unwrap();

        assert_eq!(config.cache_dir, PathBuf::from("/cache"));
        assert_eq!(config.event_buffer_size, DEFAULT_EVENT_BUFFER_SIZE);
        assert_eq!(config.manifest.version, "1.4");
    }

    #[test]
    fn test_validate_rejects_zero_event_buffer() {
        let result = CoreConfig::builder()
            .manifest(CacheManifest::default())
            .http_client(Arc::new(MockHttpClient))
            .cache_storage(Arc::new(MemoryCacheStorage::new()))
            .event_buffer_size(0)
            .build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Event buffer size"));
    }

    #[test]
    fn test_builder_rejects_invalid_manifest() {
        let result = CoreConfig::builder()
            .manifest(CacheManifest::new("app", "", origin()))
            .http_client(Arc::new(MockHttpClient))
            .cache_storage(Arc::new(MemoryCacheStorage::new()))
            .build();

        assert!(matches!(result, Err(Error::Manifest(_))));
    }

    #[test]
    fn test_debug_hides_bridges() {
        let config = CoreConfig::builder()
            .manifest(CacheManifest::default())
            .http_client(Arc::new(MockHttpClient))
            .cache_storage(Arc::new(MemoryCacheStorage::new()))
            .build()
            .unwrap();

        let rendered = format!("{config:?}");
        assert!(rendered.contains("HttpClient { ... }"));
        assert!(rendered.contains("booktracker"));
    }
}

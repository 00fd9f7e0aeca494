//! Install-time population of a version's partitions.
//!
//! Mandatory assets are all-or-nothing: every response is fetched and
//! validated before any is written, and a single failure aborts the install.
//! Optional assets are independent; a failure is logged and skipped.

use std::sync::Arc;

use bridge_traits::cache::{CacheKey, CachePartition, CachedResponse};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use bridge_traits::time::Clock;
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use core_runtime::logging::redact_url;
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::error::{OfflineError, Result};
use crate::partitions::{is_cacheable, PartitionKind, PartitionSet};

/// What an install run left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub cached_mandatory: usize,
    pub cached_optional: usize,
    /// Redacted URLs of optional assets that could not be cached.
    pub failed_optional: Vec<String>,
}

pub struct Installer {
    http: Arc<dyn HttpClient>,
    partitions: PartitionSet,
    clock: Arc<dyn Clock>,
    events: EventBus,
    mandatory: Vec<Url>,
    optional: Vec<Url>,
}

impl Installer {
    pub fn new(
        http: Arc<dyn HttpClient>,
        partitions: PartitionSet,
        clock: Arc<dyn Clock>,
        events: EventBus,
        mandatory: Vec<Url>,
        optional: Vec<Url>,
    ) -> Self {
        Self {
            http,
            partitions,
            clock,
            events,
            mandatory,
            optional,
        }
    }

    /// Populates the static partition, then the external one.
    ///
    /// Safe to run again: entries are replaced wholesale.
    #[instrument(skip(self), fields(partition = %self.partitions.names().static_partition))]
    pub async fn run(&self) -> Result<InstallReport> {
        let cached_mandatory = self.cache_mandatory().await?;
        let (cached_optional, failed_optional) = self.cache_optional().await;

        Ok(InstallReport {
            cached_mandatory,
            cached_optional,
            failed_optional,
        })
    }

    async fn cache_mandatory(&self) -> Result<usize> {
        if self.mandatory.is_empty() {
            debug!("No mandatory assets declared");
            return Ok(0);
        }

        info!(
            "Caching {} mandatory assets into {}",
            self.mandatory.len(),
            self.partitions.name_of(PartitionKind::Static)
        );

        let fetched = join_all(self.mandatory.iter().map(|url| self.fetch_entry(url))).await;

        let mut entries = Vec::with_capacity(fetched.len());
        for (url, outcome) in self.mandatory.iter().zip(fetched) {
            match outcome {
                Ok(entry) => entries.push((url, entry)),
                Err(reason) => {
                    error!("Mandatory asset {} failed: {}", redact_url(url.as_str()), reason);
                    return Err(OfflineError::MandatoryAsset {
                        url: redact_url(url.as_str()),
                        reason,
                    });
                }
            }
        }

        // Only create the partition once every asset is in hand.
        let partition = self.partitions.open(PartitionKind::Static).await?;
        for (url, (key, entry)) in entries {
            partition.put(&key, entry).await.map_err(|e| {
                error!("Storing mandatory asset {} failed: {}", redact_url(url.as_str()), e);
                OfflineError::MandatoryAsset {
                    url: redact_url(url.as_str()),
                    reason: e.to_string(),
                }
            })?;
        }

        Ok(self.mandatory.len())
    }

    async fn cache_optional(&self) -> (usize, Vec<String>) {
        if self.optional.is_empty() {
            return (0, Vec::new());
        }

        let partition = match self.partitions.open(PartitionKind::External).await {
            Ok(partition) => partition,
            Err(e) => {
                warn!("External partition unavailable, skipping optional assets: {}", e);
                let failed = self
                    .optional
                    .iter()
                    .map(|url| self.report_optional_failure(url, &e.to_string()))
                    .collect();
                return (0, failed);
            }
        };

        let outcomes = join_all(self.optional.iter().map(|url| {
            let partition = Arc::clone(&partition);
            async move { self.cache_one(partition.as_ref(), url).await }
        }))
        .await;

        let mut cached = 0;
        let mut failed = Vec::new();
        for (url, outcome) in self.optional.iter().zip(outcomes) {
            match outcome {
                Ok(()) => cached += 1,
                Err(reason) => failed.push(self.report_optional_failure(url, &reason)),
            }
        }

        info!(
            "Cached {}/{} optional assets into {}",
            cached,
            self.optional.len(),
            partition.name()
        );
        (cached, failed)
    }

    async fn cache_one(
        &self,
        partition: &dyn CachePartition,
        url: &Url,
    ) -> std::result::Result<(), String> {
        let (key, entry) = self.fetch_entry(url).await?;
        partition.put(&key, entry).await.map_err(|e| e.to_string())
    }

    fn report_optional_failure(&self, url: &Url, reason: &str) -> String {
        let url = redact_url(url.as_str());
        warn!("Optional asset {} not cached: {}", url, reason);
        self.events
            .emit(CoreEvent::Cache(CacheEvent::OptionalAssetFailed {
                url: url.clone(),
                message: reason.to_string(),
            }))
            .ok();
        url
    }

    /// Single network attempt, validated against the cacheability policy.
    async fn fetch_entry(
        &self,
        url: &Url,
    ) -> std::result::Result<(CacheKey, CachedResponse), String> {
        let response = self
            .http
            .execute(HttpRequest::get(url.as_str()))
            .await
            .map_err(|e| e.to_string())?;

        if !is_cacheable(HttpMethod::Get, &response) {
            return Err(format!(
                "unexpected response {} {} ({:?})",
                response.status, response.status_text, response.response_type
            ));
        }

        let entry = CachedResponse::from_response(&response, self.clock.now());
        Ok((CacheKey::new(HttpMethod::Get, url), entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::BridgeError;
    use bridge_traits::http::{HttpResponse, ResponseType};
    use bridge_traits::{CacheStorage, FixedClock, MemoryCacheStorage};
    use chrono::{TimeZone, Utc};
    use core_runtime::config::{LookupScope, PartitionNames};
    use mockall::mock;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse>;
        }
    }

    fn urls(list: &[&str]) -> Vec<Url> {
        list.iter().map(|u| Url::parse(u).unwrap()).collect()
    }

    fn installer(
        http: MockHttpClient,
        storage: Arc<MemoryCacheStorage>,
        mandatory: &[&str],
        optional: &[&str],
    ) -> Installer {
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
        Installer::new(
            Arc::new(http),
            PartitionSet::new(
                PartitionNames::for_version("shell", "2"),
                storage,
                LookupScope::Current,
            ),
            Arc::new(clock),
            EventBus::new(16),
            urls(mandatory),
            urls(optional),
        )
    }

    #[tokio::test]
    async fn test_empty_manifest_succeeds_without_network() {
        let mut http = MockHttpClient::new();
        http.expect_execute().never();
        let storage = Arc::new(MemoryCacheStorage::new());

        let report = installer(http, storage.clone(), &[], &[]).run().await.unwrap();

        assert_eq!(report, InstallReport::default());
        assert_eq!(storage.total_entries(), 0);
    }

    #[tokio::test]
    async fn test_mandatory_non_200_aborts_before_any_write() {
        let mut http = MockHttpClient::new();
        http.expect_execute().times(2).returning(|req| {
            if req.url.ends_with("/index.html") {
                Ok(HttpResponse::new(500, "boom"))
            } else {
                Ok(HttpResponse::new(200, "ok"))
            }
        });
        let storage = Arc::new(MemoryCacheStorage::new());

        let err = installer(
            http,
            storage.clone(),
            &["https://books.example/", "https://books.example/index.html"],
            &[],
        )
        .run()
        .await
        .unwrap_err();

        match err {
            OfflineError::MandatoryAsset { url, reason } => {
                assert_eq!(url, "https://books.example/index.html");
                assert!(reason.contains("500"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(storage.total_entries(), 0);
    }

    #[tokio::test]
    async fn test_failed_mandatory_install_leaves_no_partition_behind() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .returning(|_| Err(BridgeError::Network("offline".to_string())));
        let storage = Arc::new(MemoryCacheStorage::new());

        let result = installer(
            http,
            storage.clone(),
            &["https://books.example/index.html"],
            &["https://cdn.example/lib.js"],
        )
        .run()
        .await;

        assert!(matches!(result, Err(OfflineError::MandatoryAsset { .. })));
        assert!(storage.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mandatory_opaque_response_is_rejected() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .returning(|_| Ok(HttpResponse::new(200, "").with_type(ResponseType::Opaque)));
        let storage = Arc::new(MemoryCacheStorage::new());

        let result = installer(http, storage, &["https://books.example/"], &[])
            .run()
            .await;

        assert!(matches!(result, Err(OfflineError::MandatoryAsset { .. })));
    }

    #[tokio::test]
    async fn test_optional_failure_is_reported_not_fatal() {
        let mut http = MockHttpClient::new();
        http.expect_execute().returning(|req| {
            if req.url.contains("cdn.example") {
                Err(BridgeError::Network("connection reset".to_string()))
            } else {
                Ok(HttpResponse::new(200, "shell"))
            }
        });
        let storage = Arc::new(MemoryCacheStorage::new());
        let installer = installer(
            http,
            storage.clone(),
            &["https://books.example/index.html"],
            &["https://cdn.example/lib.js", "https://books.example/vendor.js"],
        );
        let mut events = installer.events.subscribe();

        let report = installer.run().await.unwrap();

        assert_eq!(report.cached_mandatory, 1);
        assert_eq!(report.cached_optional, 1);
        assert_eq!(report.failed_optional, vec!["https://cdn.example/lib.js"]);

        let external = storage.open("shell-external-v2").await.unwrap();
        assert_eq!(external.keys().await.unwrap().len(), 1);
        assert!(matches!(
            events.try_recv().unwrap(),
            CoreEvent::Cache(CacheEvent::OptionalAssetFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_entries_are_stamped_with_clock() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .returning(|_| Ok(HttpResponse::new(200, "<html>")));
        let storage = Arc::new(MemoryCacheStorage::new());

        installer(http, storage.clone(), &["https://books.example/index.html"], &[])
            .run()
            .await
            .unwrap();

        let partition = storage.open("shell-static-v2").await.unwrap();
        let key = CacheKey::parse(HttpMethod::Get, "https://books.example/index.html").unwrap();
        let entry = partition.match_key(&key).await.unwrap().unwrap();
        assert_eq!(entry.stored_at, Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
    }
}

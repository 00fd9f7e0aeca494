//! Cache-first request interception.
//!
//! For every intercepted GET: answer from the current partitions if
//! possible, otherwise make a single network attempt. Cacheable network
//! responses are duplicated and one copy is written back before the other
//! is returned. Failed navigations degrade to the cached root document or a
//! synthesized 503; other failures propagate to the caller.

use std::sync::Arc;

use bridge_traits::cache::{CacheKey, CachedResponse};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::time::Clock;
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use core_runtime::logging::redact_url;
use tracing::{debug, warn};

use crate::classify::{Classifier, RequestClass};
use crate::error::{OfflineError, Result};
use crate::partitions::{is_cacheable, PartitionKind, PartitionSet};
use crate::stats::InterceptStats;

pub const OFFLINE_STATUS: u16 = 503;
pub const OFFLINE_STATUS_TEXT: &str = "Service Unavailable (offline)";

/// The engine's answer to an outgoing request.
#[derive(Debug)]
pub enum Intercepted {
    /// The engine produced the response.
    Respond(HttpResponse),
    /// The engine declines; the host performs the request untouched.
    Passthrough,
}

impl Intercepted {
    pub fn into_response(self) -> Option<HttpResponse> {
        match self {
            Intercepted::Respond(response) => Some(response),
            Intercepted::Passthrough => None,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self, Intercepted::Passthrough)
    }
}

pub struct Interceptor {
    classifier: Classifier,
    partitions: PartitionSet,
    http: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    /// Root document served to failed navigations, if it resolves.
    fallback: Option<CacheKey>,
    offline_notice: String,
    stats: InterceptStats,
}

impl Interceptor {
    pub fn new(
        classifier: Classifier,
        partitions: PartitionSet,
        http: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
        events: EventBus,
        fallback: Option<CacheKey>,
        offline_notice: impl Into<String>,
    ) -> Self {
        Self {
            classifier,
            partitions,
            http,
            clock,
            events,
            fallback,
            offline_notice: offline_notice.into(),
            stats: InterceptStats::default(),
        }
    }

    pub fn stats(&self) -> &InterceptStats {
        &self.stats
    }

    pub fn classify(&self, request: &HttpRequest) -> RequestClass {
        self.classifier.classify(request)
    }

    pub async fn handle(&self, request: HttpRequest) -> Result<Intercepted> {
        let class = self.classifier.classify(&request);
        if !class.is_intercepted() {
            debug!("Bypassing {:?} request to {}", class, redact_url(&request.url));
            self.stats.record_passthrough();
            return Ok(Intercepted::Passthrough);
        }

        let key = CacheKey::for_request(&request)?;
        let url = redact_url(key.url());

        if let Some(hit) = self.partitions.lookup(&key).await {
            debug!("Serving from cache: {}", url);
            self.stats.record_hit();
            self.emit(CacheEvent::Hit { url });
            return Ok(Intercepted::Respond(hit.into_response()));
        }

        self.stats.record_miss();
        self.emit(CacheEvent::Miss { url: url.clone() });

        let method = request.method;
        let response = match self.http.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                self.stats.record_network_failure();
                warn!("Fetch failed for {}: {}", url, e);
                if class == RequestClass::Navigable {
                    return Ok(Intercepted::Respond(self.offline_response(url).await));
                }
                return Err(OfflineError::Bridge(e));
            }
        };

        if !is_cacheable(method, &response) {
            debug!(
                "Not caching {} ({} {:?})",
                url, response.status, response.response_type
            );
            return Ok(Intercepted::Respond(response));
        }

        let kind = match class {
            RequestClass::ExternalAsset => PartitionKind::External,
            _ => PartitionKind::Static,
        };
        let copy = response.duplicate();
        self.write_back(kind, &key, &copy, url).await;

        Ok(Intercepted::Respond(response))
    }

    async fn write_back(
        &self,
        kind: PartitionKind,
        key: &CacheKey,
        copy: &HttpResponse,
        url: String,
    ) {
        let partition = self.partitions.name_of(kind).to_string();
        let entry = CachedResponse::from_response(copy, self.clock.now());

        match self.partitions.store(kind, key, entry).await {
            Ok(()) => self.emit(CacheEvent::Stored { partition, url }),
            Err(e) => {
                warn!("Cache write to {} failed for {}: {}", partition, url, e);
                self.stats.record_write_back_failure();
                self.emit(CacheEvent::WriteFailed {
                    partition,
                    url,
                    message: e.to_string(),
                });
            }
        }
    }

    async fn offline_response(&self, url: String) -> HttpResponse {
        self.stats.record_offline_fallback();

        if let Some(fallback) = &self.fallback {
            if let Some(cached) = self.partitions.lookup(fallback).await {
                debug!("Serving cached root document for offline navigation to {}", url);
                self.emit(CacheEvent::OfflineFallback {
                    url,
                    served_cached: true,
                });
                return cached.into_response();
            }
        }

        self.emit(CacheEvent::OfflineFallback {
            url,
            served_cached: false,
        });
        offline_notice_response(&self.offline_notice)
    }

    fn emit(&self, event: CacheEvent) {
        self.events.emit(CoreEvent::Cache(event)).ok();
    }
}

/// The synthesized answer for a navigation with no network and no cached page.
pub fn offline_notice_response(notice: &str) -> HttpResponse {
    HttpResponse::new(OFFLINE_STATUS, notice.to_string())
        .with_status_text(OFFLINE_STATUS_TEXT)
        .with_header("content-type", "text/plain; charset=utf-8")
}

//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (network transport,
//! cache storage, clock) into the offline cache engine. Desktop apps
//! typically enable the `desktop-shims` feature (which depends on
//! `bridge-desktop`) and call [`bootstrap_desktop`]; other hosts build a
//! [`CoreDependencies`] from their own bridges.
//!
//! The façade deploys manifests as new engine versions, routes the host's
//! outgoing requests through whichever version is active, and forwards
//! control messages and client open/close notifications.

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::{
    cache::CacheStorage,
    http::{HttpClient, HttpRequest, HttpResponse},
    time::{Clock, SystemClock},
};
use core_offline::{
    ClientId, InstanceId, MessageOutcome, OfflineWorker, Registered, Registration,
    RegistrationOptions, StatsSnapshot,
};
use core_runtime::config::{CacheManifest, CoreConfig};
use core_runtime::events::{EventBus, EventStream, DEFAULT_EVENT_BUFFER_SIZE};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument};

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop::{FsCacheStorage, ReqwestHttpClient};

/// Aggregated handle to all bridge dependencies the core requires.
pub struct CoreDependencies {
    pub http_client: Arc<dyn HttpClient>,
    pub cache_storage: Arc<dyn CacheStorage>,
    pub clock: Arc<dyn Clock>,
}

impl CoreDependencies {
    /// Construct a dependency bundle from explicit bridge handles.
    pub fn new(http_client: Arc<dyn HttpClient>, cache_storage: Arc<dyn CacheStorage>) -> Self {
        Self {
            http_client,
            cache_storage,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        Self {
            http_client: Arc::clone(&config.http_client),
            cache_storage: Arc::clone(&config.cache_storage),
            clock: Arc::clone(&config.clock),
        }
    }
}

/// Result of deploying a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deployment {
    pub instance_id: String,
    pub version: String,
    /// True when the new version took control straight away.
    pub active: bool,
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    deps: Arc<CoreDependencies>,
    events: EventBus,
    registration: Arc<Registration>,
}

impl CoreService {
    /// Create a new service from the provided dependencies.
    pub fn new(deps: CoreDependencies) -> Self {
        Self::with_options(deps, RegistrationOptions::default(), DEFAULT_EVENT_BUFFER_SIZE)
    }

    pub fn with_options(
        deps: CoreDependencies,
        options: RegistrationOptions,
        event_buffer_size: usize,
    ) -> Self {
        let events = EventBus::new(event_buffer_size);
        let registration = Registration::new(Arc::clone(&deps.http_client), events.clone(), options);
        Self {
            deps: Arc::new(deps),
            events,
            registration: Arc::new(registration),
        }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        Self::with_options(
            CoreDependencies::from_config(config),
            RegistrationOptions::default(),
            config.event_buffer_size,
        )
    }

    /// Installs `manifest` as a new version.
    ///
    /// If install fails the previously active version keeps serving and the
    /// error is returned.
    #[instrument(skip(self, manifest), fields(version = %manifest.version))]
    pub async fn deploy(&self, manifest: CacheManifest) -> Result<Deployment> {
        let worker = Arc::new(OfflineWorker::new(
            manifest,
            Arc::clone(&self.deps.http_client),
            Arc::clone(&self.deps.cache_storage),
            Arc::clone(&self.deps.clock),
            self.events.clone(),
        )?);

        let registered = self.registration.register(Arc::clone(&worker)).await?;
        info!("Deployed version {} ({:?})", worker.version(), registered);

        Ok(Deployment {
            instance_id: worker.id().to_string(),
            version: worker.version().to_string(),
            active: registered == Registered::Active,
        })
    }

    /// Performs `request` through the active version.
    pub async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse> {
        Ok(self.registration.fetch(request).await?)
    }

    pub async fn post_message(&self, message: &Value) -> Result<MessageOutcome> {
        Ok(self.registration.post_message(message).await?)
    }

    pub async fn connect_client(&self) -> ClientId {
        self.registration.connect_client().await
    }

    pub async fn disconnect_client(&self, id: ClientId) -> Result<()> {
        Ok(self.registration.disconnect_client(id).await?)
    }

    pub async fn controller_of(&self, id: ClientId) -> Option<InstanceId> {
        self.registration.controller_of(id).await
    }

    pub async fn active_version(&self) -> Option<String> {
        self.registration.active_version().await
    }

    pub async fn waiting_version(&self) -> Option<String> {
        self.registration.waiting_version().await
    }

    /// Interception counters of the active version.
    pub async fn stats(&self) -> Option<StatsSnapshot> {
        self.registration.active().await.map(|worker| worker.stats())
    }

    pub fn subscribe_events(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Access the bridge dependencies being used by the service.
    pub fn dependencies(&self) -> Arc<CoreDependencies> {
        Arc::clone(&self.deps)
    }
}

/// Convenience bootstrapper for desktop hosts.
///
/// Builds the default reqwest transport and filesystem storage under
/// `cache_dir`, then deploys `manifest`.
///
/// ```no_run
/// # async fn example() -> core_service::Result<()> {
/// use core_runtime::config::CacheManifest;
/// use core_service::bootstrap_desktop;
///
/// let core = bootstrap_desktop(CacheManifest::default(), "/tmp/booktracker").await?;
/// assert_eq!(core.active_version().await.as_deref(), Some("1.4"));
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_desktop(
    manifest: CacheManifest,
    cache_dir: impl Into<std::path::PathBuf>,
) -> Result<CoreService> {
    let config = CoreConfig::builder()
        .manifest(manifest)
        .cache_dir(cache_dir)
        .build()?;

    let service = CoreService::from_config(&config);
    service.deploy(config.manifest.clone()).await?;
    Ok(service)
}

//! One deployed version of the engine.
//!
//! An [`OfflineWorker`] exposes one method per lifecycle trigger: `install`,
//! `activate`, `fetch` and `message`. It moves through [`LifecycleState`]
//! and publishes every transition on a `watch` channel.
//!
//! ```text
//! Parsed ──install──> Installing ──ok──> Installed ──activate──> Activating ──> Activated
//!                          │
//!                          └──failure──> Redundant <──replaced── (any)
//! ```

use std::fmt;
use std::sync::Arc;

use bridge_traits::cache::{CacheKey, CacheStorage};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use bridge_traits::time::Clock;
use core_runtime::config::{CacheManifest, CoreConfig};
use core_runtime::events::{CoreEvent, EventBus, LifecycleEvent};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::classify::Classifier;
use crate::control::{ControlMessage, MessageOutcome};
use crate::error::{OfflineError, Result};
use crate::installer::{InstallReport, Installer};
use crate::interceptor::{Intercepted, Interceptor};
use crate::partitions::PartitionSet;
use crate::reclaimer::{ReclaimReport, Reclaimer};
use crate::stats::StatsSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct InstanceId(Uuid);

impl InstanceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LifecycleState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Parsed => "parsed",
            LifecycleState::Installing => "installing",
            LifecycleState::Installed => "installed",
            LifecycleState::Activating => "activating",
            LifecycleState::Activated => "activated",
            LifecycleState::Redundant => "redundant",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    /// The worker asks not to wait for open clients to close.
    pub skip_waiting: bool,
    pub report: InstallReport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateOutcome {
    pub reclaim: ReclaimReport,
    /// The worker takes control of every open client.
    pub claim_clients: bool,
}

pub struct OfflineWorker {
    id: InstanceId,
    manifest: CacheManifest,
    partitions: PartitionSet,
    installer: Installer,
    interceptor: Interceptor,
    reclaimer: Reclaimer,
    state: watch::Sender<LifecycleState>,
    events: EventBus,
}

impl fmt::Debug for OfflineWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OfflineWorker")
            .field("id", &self.id)
            .field("version", &self.manifest.version)
            .field("state", &self.state())
            .finish()
    }
}

impl OfflineWorker {
    /// Builds a worker from the manifest and bridges carried by `config`.
    pub fn from_config(config: &CoreConfig, events: EventBus) -> Result<Self> {
        Self::new(
            config.manifest.clone(),
            Arc::clone(&config.http_client),
            Arc::clone(&config.cache_storage),
            Arc::clone(&config.clock),
            events,
        )
    }

    pub fn new(
        manifest: CacheManifest,
        http: Arc<dyn HttpClient>,
        storage: Arc<dyn CacheStorage>,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Result<Self> {
        manifest.validate()?;

        let partitions = PartitionSet::new(
            manifest.partition_names(),
            Arc::clone(&storage),
            manifest.lookup_scope,
        );
        let fallback = CacheKey::new(HttpMethod::Get, &manifest.resolved_fallback()?);

        let installer = Installer::new(
            Arc::clone(&http),
            partitions.clone(),
            Arc::clone(&clock),
            events.clone(),
            manifest.resolved_mandatory()?,
            manifest.resolved_optional()?,
        );
        let interceptor = Interceptor::new(
            Classifier::from_manifest(&manifest)?,
            partitions.clone(),
            http,
            clock,
            events.clone(),
            Some(fallback),
            manifest.offline_notice.clone(),
        );
        let reclaimer = Reclaimer::new(storage, events.clone());
        let (state, _) = watch::channel(LifecycleState::Parsed);

        Ok(Self {
            id: InstanceId::new(),
            manifest,
            partitions,
            installer,
            interceptor,
            reclaimer,
            state,
            events,
        })
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn version(&self) -> &str {
        &self.manifest.version
    }

    pub fn manifest(&self) -> &CacheManifest {
        &self.manifest
    }

    pub fn partitions(&self) -> &PartitionSet {
        &self.partitions
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.interceptor.stats().snapshot()
    }

    /// Populates this version's partitions.
    ///
    /// May be repeated once installed; entries are simply rewritten. A
    /// mandatory-asset failure makes the worker redundant.
    #[instrument(skip(self), fields(instance = %self.id, version = %self.manifest.version))]
    pub async fn install(&self) -> Result<InstallOutcome> {
        self.transition(
            &[LifecycleState::Parsed, LifecycleState::Installed],
            LifecycleState::Installing,
        )?;
        self.emit(LifecycleEvent::Installing {
            instance_id: self.id.to_string(),
            version: self.manifest.version.clone(),
        });

        match self.installer.run().await {
            Ok(report) => {
                self.state.send_replace(LifecycleState::Installed);
                info!(
                    "Installed version {} ({} mandatory, {} optional, {} optional failed)",
                    self.manifest.version,
                    report.cached_mandatory,
                    report.cached_optional,
                    report.failed_optional.len()
                );
                self.emit(LifecycleEvent::Installed {
                    instance_id: self.id.to_string(),
                    version: self.manifest.version.clone(),
                    cached_mandatory: report.cached_mandatory,
                    cached_optional: report.cached_optional,
                    failed_optional: report.failed_optional.len(),
                });
                Ok(InstallOutcome {
                    skip_waiting: true,
                    report,
                })
            }
            Err(e) => {
                error!("Install of version {} failed: {}", self.manifest.version, e);
                self.emit(LifecycleEvent::InstallFailed {
                    instance_id: self.id.to_string(),
                    version: self.manifest.version.clone(),
                    message: e.to_string(),
                });
                self.mark_redundant();
                Err(e)
            }
        }
    }

    /// Reclaims stale partitions and starts serving.
    #[instrument(skip(self), fields(instance = %self.id, version = %self.manifest.version))]
    pub async fn activate(&self) -> Result<ActivateOutcome> {
        self.transition(&[LifecycleState::Installed], LifecycleState::Activating)?;

        let reclaim = self.reclaimer.reclaim(self.partitions.names()).await;

        self.state.send_replace(LifecycleState::Activated);
        info!(
            "Activated version {} (reclaimed {} partitions)",
            self.manifest.version,
            reclaim.deleted.len()
        );
        self.emit(LifecycleEvent::Activated {
            instance_id: self.id.to_string(),
            version: self.manifest.version.clone(),
            reclaimed: reclaim.deleted.len(),
        });

        Ok(ActivateOutcome {
            reclaim,
            claim_clients: true,
        })
    }

    /// Answers `request` from cache or network. Before activation every
    /// request passes through.
    pub async fn fetch(&self, request: HttpRequest) -> Result<Intercepted> {
        if self.state() != LifecycleState::Activated {
            return Ok(Intercepted::Passthrough);
        }
        self.interceptor.handle(request).await
    }

    pub fn message(&self, value: &Value) -> MessageOutcome {
        match ControlMessage::parse(value) {
            Some(ControlMessage::SkipWaiting) => {
                debug!("Instance {} received skip-waiting", self.id);
                MessageOutcome::SkipWaiting
            }
            None => {
                debug!("Instance {} ignoring message {}", self.id, value);
                MessageOutcome::Ignored
            }
        }
    }

    pub(crate) fn mark_redundant(&self) {
        let previous = self.state.send_replace(LifecycleState::Redundant);
        if previous != LifecycleState::Redundant {
            debug!("Instance {} is now redundant (was {})", self.id, previous);
            self.emit(LifecycleEvent::Redundant {
                instance_id: self.id.to_string(),
            });
        }
    }

    fn transition(&self, allowed: &[LifecycleState], to: LifecycleState) -> Result<()> {
        let mut rejected = None;
        self.state.send_if_modified(|state| {
            if allowed.contains(state) {
                *state = to;
                true
            } else {
                rejected = Some(*state);
                false
            }
        });

        match rejected {
            None => Ok(()),
            Some(from) => Err(OfflineError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            }),
        }
    }

    fn emit(&self, event: LifecycleEvent) {
        self.events.emit(CoreEvent::Lifecycle(event)).ok();
    }
}

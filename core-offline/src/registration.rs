//! Host-side coordination of worker versions.
//!
//! A [`Registration`] owns at most one active worker (the one answering
//! fetches) and at most one waiting worker (installed, not yet in control).
//! It decides when a waiting worker takes over: immediately when nothing
//! else is serving, when no client is open, when the install asked to skip
//! waiting, or when the host posts `SKIP_WAITING`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use core_runtime::events::{CoreEvent, EventBus, LifecycleEvent};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::control::MessageOutcome;
use crate::error::{OfflineError, Result};
use crate::interceptor::Intercepted;
use crate::worker::{InstanceId, OfflineWorker};

#[derive(Debug, Clone, Copy)]
pub struct RegistrationOptions {
    /// Promote straight after install when the worker asks to skip waiting.
    pub honour_install_skip_waiting: bool,
}

impl Default for RegistrationOptions {
    fn default() -> Self {
        Self {
            honour_install_skip_waiting: true,
        }
    }
}

/// An open page controlled (or not yet controlled) by a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Where a freshly installed worker ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registered {
    Active,
    Waiting,
}

#[derive(Default)]
struct Slots {
    active: Option<Arc<OfflineWorker>>,
    waiting: Option<Arc<OfflineWorker>>,
    clients: HashMap<ClientId, Option<InstanceId>>,
    next_client: u64,
}

pub struct Registration {
    http: Arc<dyn HttpClient>,
    events: EventBus,
    options: RegistrationOptions,
    slots: Mutex<Slots>,
}

impl Registration {
    pub fn new(http: Arc<dyn HttpClient>, events: EventBus, options: RegistrationOptions) -> Self {
        Self {
            http,
            events,
            options,
            slots: Mutex::new(Slots::default()),
        }
    }

    /// Installs `worker` and either promotes it or parks it as waiting.
    ///
    /// On install failure the worker is discarded and the current active
    /// worker, if any, keeps serving.
    #[instrument(skip(self, worker), fields(instance = %worker.id(), version = %worker.version()))]
    pub async fn register(&self, worker: Arc<OfflineWorker>) -> Result<Registered> {
        let outcome = match worker.install().await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Keeping current version, new version failed to install: {}", e);
                return Err(e);
            }
        };

        let mut slots = self.slots.lock().await;
        if let Some(previous) = slots.waiting.take() {
            debug!("Replacing waiting instance {}", previous.id());
            previous.mark_redundant();
        }

        let skip = outcome.skip_waiting && self.options.honour_install_skip_waiting;
        if slots.active.is_none() || slots.clients.is_empty() || skip {
            self.promote(&mut slots, worker).await?;
            return Ok(Registered::Active);
        }

        info!(
            "Version {} installed, waiting for {} clients",
            worker.version(),
            slots.clients.len()
        );
        self.emit(LifecycleEvent::Waiting {
            instance_id: worker.id().to_string(),
            version: worker.version().to_string(),
        });
        slots.waiting = Some(worker);
        Ok(Registered::Waiting)
    }

    /// Delivers a control message to the waiting worker, or the active one
    /// when nothing is waiting.
    pub async fn post_message(&self, value: &Value) -> Result<MessageOutcome> {
        let mut slots = self.slots.lock().await;
        let Some(target) = slots.waiting.clone().or_else(|| slots.active.clone()) else {
            debug!("No worker to receive message {}", value);
            return Ok(MessageOutcome::Ignored);
        };

        let outcome = target.message(value);
        if outcome == MessageOutcome::SkipWaiting {
            if let Some(waiting) = slots.waiting.take() {
                self.promote(&mut slots, waiting).await?;
            }
        }
        Ok(outcome)
    }

    pub async fn connect_client(&self) -> ClientId {
        let mut slots = self.slots.lock().await;
        slots.next_client += 1;
        let id = ClientId(slots.next_client);
        let controller = slots.active.as_ref().map(|worker| worker.id());
        slots.clients.insert(id, controller);
        debug!("Connected {} (controller: {:?})", id, controller);
        id
    }

    /// Closing the last client lets a waiting worker take over.
    pub async fn disconnect_client(&self, id: ClientId) -> Result<()> {
        let mut slots = self.slots.lock().await;
        if slots.clients.remove(&id).is_none() {
            return Err(OfflineError::UnknownClient(id.to_string()));
        }
        debug!("Disconnected {}", id);

        if slots.clients.is_empty() {
            if let Some(waiting) = slots.waiting.take() {
                self.promote(&mut slots, waiting).await?;
            }
        }
        Ok(())
    }

    /// Routes `request` through the active worker. Requests the worker
    /// declines, or any request while nothing is active, go to the network.
    pub async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse> {
        let active = self.slots.lock().await.active.clone();

        if let Some(worker) = active {
            if let Intercepted::Respond(response) = worker.fetch(request.clone()).await? {
                return Ok(response);
            }
        }

        Ok(self.http.execute(request).await?)
    }

    pub async fn active(&self) -> Option<Arc<OfflineWorker>> {
        self.slots.lock().await.active.clone()
    }

    pub async fn waiting(&self) -> Option<Arc<OfflineWorker>> {
        self.slots.lock().await.waiting.clone()
    }

    pub async fn active_version(&self) -> Option<String> {
        self.active().await.map(|worker| worker.version().to_string())
    }

    pub async fn waiting_version(&self) -> Option<String> {
        self.waiting().await.map(|worker| worker.version().to_string())
    }

    pub async fn controller_of(&self, id: ClientId) -> Option<InstanceId> {
        self.slots.lock().await.clients.get(&id).copied().flatten()
    }

    pub async fn client_count(&self) -> usize {
        self.slots.lock().await.clients.len()
    }

    async fn promote(&self, slots: &mut Slots, worker: Arc<OfflineWorker>) -> Result<()> {
        let outcome = worker.activate().await?;

        if let Some(previous) = slots.active.replace(Arc::clone(&worker)) {
            previous.mark_redundant();
        }

        if outcome.claim_clients {
            let id = worker.id();
            for controller in slots.clients.values_mut() {
                *controller = Some(id);
            }
            self.emit(LifecycleEvent::ClientsClaimed {
                instance_id: id.to_string(),
                clients: slots.clients.len(),
            });
        }

        info!("Version {} is now active", worker.version());
        Ok(())
    }

    fn emit(&self, event: LifecycleEvent) {
        self.events.emit(CoreEvent::Lifecycle(event)).ok();
    }
}

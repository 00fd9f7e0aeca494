//! # Event Bus System
//!
//! Provides an event-driven view of the offline cache engine using
//! `tokio::sync::broadcast`. Hosts subscribe to learn about lifecycle
//! transitions (for example to show an "update ready" banner while a new
//! version is waiting) and about cache activity.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     emit      ┌───────────┐
//! │  Installer  ├──────────────>│           │
//! └─────────────┘               │           │
//!                               │ EventBus  │
//! ┌─────────────┐     emit      │ (broadcast│     subscribe    ┌────────────┐
//! │ Interceptor ├──────────────>│  channel) ├─────────────────>│    Host    │
//! └─────────────┘               │           │                  └────────────┘
//!                               │           │
//! ┌─────────────┐     emit      │           │     subscribe    ┌────────────┐
//! │ Registration├──────────────>│           ├─────────────────>│   Logger   │
//! └─────────────┘               └───────────┘                  └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, LifecycleEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Lifecycle(LifecycleEvent::Waiting {
//!         instance_id: "a1".to_string(),
//!         version: "2.0".to_string(),
//!     }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "New version installed and waiting");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber was too slow and missed `n`
//!   events. Non-fatal.
//! - **`RecvError::Closed`**: all senders were dropped. Treat as shutdown.
//!
//! Emitting with no subscribers returns an error; the engine ignores it.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Worker lifecycle transitions
    Lifecycle(LifecycleEvent),
    /// Cache reads, writes and reclamation
    Cache(CacheEvent),
}

impl CoreEvent {
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Lifecycle(e) => e.description(),
            CoreEvent::Cache(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Lifecycle(LifecycleEvent::InstallFailed { .. }) => EventSeverity::Error,
            CoreEvent::Cache(CacheEvent::WriteFailed { .. })
            | CoreEvent::Cache(CacheEvent::ReclaimFailed { .. })
            | CoreEvent::Cache(CacheEvent::OptionalAssetFailed { .. })
            | CoreEvent::Cache(CacheEvent::OfflineFallback { .. }) => EventSeverity::Warning,
            CoreEvent::Lifecycle(LifecycleEvent::Installed { .. })
            | CoreEvent::Lifecycle(LifecycleEvent::Waiting { .. })
            | CoreEvent::Lifecycle(LifecycleEvent::Activated { .. })
            | CoreEvent::Cache(CacheEvent::PartitionDeleted { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Lifecycle Events
// ============================================================================

/// Transitions of an engine instance through install, waiting and activation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LifecycleEvent {
    Installing {
        instance_id: String,
        version: String,
    },
    /// Install finished; the static partition holds every mandatory asset.
    Installed {
        instance_id: String,
        version: String,
        cached_mandatory: usize,
        cached_optional: usize,
        failed_optional: usize,
    },
    /// A mandatory asset could not be cached. The instance is discarded.
    InstallFailed {
        instance_id: String,
        version: String,
        message: String,
    },
    /// Installed while another instance still controls clients.
    Waiting {
        instance_id: String,
        version: String,
    },
    Activated {
        instance_id: String,
        version: String,
        /// Number of stale partitions removed.
        reclaimed: usize,
    },
    /// Open clients are now controlled by this instance.
    ClientsClaimed {
        instance_id: String,
        clients: usize,
    },
    /// The instance failed to install or was replaced.
    Redundant { instance_id: String },
}

impl LifecycleEvent {
    fn description(&self) -> &str {
        match self {
            LifecycleEvent::Installing { .. } => "Installing new version",
            LifecycleEvent::Installed { .. } => "New version installed",
            LifecycleEvent::InstallFailed { .. } => "Install failed",
            LifecycleEvent::Waiting { .. } => "New version installed and waiting",
            LifecycleEvent::Activated { .. } => "New version activated",
            LifecycleEvent::ClientsClaimed { .. } => "Clients claimed",
            LifecycleEvent::Redundant { .. } => "Instance retired",
        }
    }
}

// ============================================================================
// Cache Events
// ============================================================================

/// Cache activity. URLs are already redacted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CacheEvent {
    Hit { url: String },
    Miss { url: String },
    /// A network response was written back to a partition.
    Stored { partition: String, url: String },
    WriteFailed {
        partition: String,
        url: String,
        message: String,
    },
    /// A navigation request failed on the network and was answered locally.
    OfflineFallback {
        url: String,
        /// `true` when the cached root document was served, `false` for the
        /// synthesized 503.
        served_cached: bool,
    },
    OptionalAssetFailed { url: String, message: String },
    PartitionDeleted { name: String },
    /// A stale partition could not be deleted; it is retried next activation.
    ReclaimFailed { name: String, message: String },
}

impl CacheEvent {
    fn description(&self) -> &str {
        match self {
            CacheEvent::Hit { .. } => "Served from cache",
            CacheEvent::Miss { .. } => "Cache miss",
            CacheEvent::Stored { .. } => "Response cached",
            CacheEvent::WriteFailed { .. } => "Cache write failed",
            CacheEvent::OfflineFallback { .. } => "Served offline fallback",
            CacheEvent::OptionalAssetFailed { .. } => "Optional asset not cached",
            CacheEvent::PartitionDeleted { .. } => "Stale partition deleted",
            CacheEvent::ReclaimFailed { .. } => "Stale partition deletion failed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Cloning is cheap; every clone publishes into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    ///   A subscriber that falls further behind receives `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` that can skip unwanted events.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let lifecycle_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Lifecycle(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events that match `predicate` will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Returns `None` if no matching event is currently buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Deletes partitions left behind by earlier versions.
//!
//! Each deletion is independent. A failure is reported and the partition is
//! left for the next activation to retry.

use std::sync::Arc;

use bridge_traits::cache::CacheStorage;
use core_runtime::config::PartitionNames;
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReclaimFailure {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReclaimReport {
    pub deleted: Vec<String>,
    pub failed: Vec<ReclaimFailure>,
}

impl ReclaimReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Reclaimer {
    storage: Arc<dyn CacheStorage>,
    events: EventBus,
}

impl Reclaimer {
    pub fn new(storage: Arc<dyn CacheStorage>, events: EventBus) -> Self {
        Self { storage, events }
    }

    /// Deletes every partition whose name is not in `current`.
    ///
    /// Never fails. If the partition list itself cannot be read, nothing is
    /// deleted and an empty report is returned.
    #[instrument(skip(self, current), fields(static_partition = %current.static_partition))]
    pub async fn reclaim(&self, current: &PartitionNames) -> ReclaimReport {
        let names = match self.storage.keys().await {
            Ok(names) => names,
            Err(e) => {
                warn!("Could not list partitions, skipping reclamation: {}", e);
                return ReclaimReport::default();
            }
        };

        let stale: Vec<String> = names
            .into_iter()
            .filter(|name| !current.contains(name))
            .collect();

        if stale.is_empty() {
            debug!("No stale partitions");
            return ReclaimReport::default();
        }

        let outcomes = join_all(stale.iter().map(|name| self.storage.delete(name))).await;

        let mut report = ReclaimReport::default();
        for (name, outcome) in stale.into_iter().zip(outcomes) {
            match outcome {
                Ok(_) => {
                    self.events
                        .emit(CoreEvent::Cache(CacheEvent::PartitionDeleted {
                            name: name.clone(),
                        }))
                        .ok();
                    report.deleted.push(name);
                }
                Err(e) => {
                    warn!("Failed to delete stale partition {}: {}", name, e);
                    self.events
                        .emit(CoreEvent::Cache(CacheEvent::ReclaimFailed {
                            name: name.clone(),
                            message: e.to_string(),
                        }))
                        .ok();
                    report.failed.push(ReclaimFailure {
                        name,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Reclaimed {} stale partitions ({} failed)",
            report.deleted.len(),
            report.failed.len()
        );
        report
    }
}

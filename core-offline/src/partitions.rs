//! The partition set of one deployed version.
//!
//! Wraps a [`CacheStorage`] with the version's two partition names. Reads
//! never fail: a storage error is logged and reported as a miss. Writes
//! return their error so the caller can decide how fatal it is.

use std::sync::Arc;

use bridge_traits::cache::{CacheKey, CachePartition, CacheStorage, CachedResponse};
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpMethod, HttpResponse, ResponseType};
use core_runtime::config::{LookupScope, PartitionNames};
use core_runtime::logging::redact_url;
use tracing::{debug, warn};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionKind {
    /// Critical app-shell assets.
    Static,
    /// Best-effort third-party libraries.
    External,
}

/// A response may enter a partition only if it is a complete, readable
/// answer to a GET.
pub fn is_cacheable(method: HttpMethod, response: &HttpResponse) -> bool {
    method == HttpMethod::Get
        && response.status == 200
        && response.response_type != ResponseType::Opaque
}

#[derive(Clone)]
pub struct PartitionSet {
    names: PartitionNames,
    storage: Arc<dyn CacheStorage>,
    scope: LookupScope,
}

impl std::fmt::Debug for PartitionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionSet")
            .field("names", &self.names)
            .field("scope", &self.scope)
            .finish()
    }
}

impl PartitionSet {
    pub fn new(names: PartitionNames, storage: Arc<dyn CacheStorage>, scope: LookupScope) -> Self {
        Self {
            names,
            storage,
            scope,
        }
    }

    pub fn names(&self) -> &PartitionNames {
        &self.names
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    pub fn name_of(&self, kind: PartitionKind) -> &str {
        match kind {
            PartitionKind::Static => &self.names.static_partition,
            PartitionKind::External => &self.names.external_partition,
        }
    }

    pub async fn open(&self, kind: PartitionKind) -> Result<Arc<dyn CachePartition>> {
        Ok(self.storage.open(self.name_of(kind)).await?)
    }

    /// Looks `key` up in the merged namespace selected by the lookup scope.
    ///
    /// With [`LookupScope::Current`] the static partition is consulted first,
    /// then the external one.
    pub async fn lookup(&self, key: &CacheKey) -> Option<CachedResponse> {
        let result = match self.scope {
            LookupScope::All => self.storage.match_all(key).await,
            LookupScope::Current => self.lookup_current(key).await,
        };

        match result {
            Ok(hit) => hit,
            Err(e) => {
                warn!(
                    "Cache lookup for {} failed, treating as miss: {}",
                    redact_url(key.url()),
                    e
                );
                None
            }
        }
    }

    async fn lookup_current(&self, key: &CacheKey) -> BridgeResult<Option<CachedResponse>> {
        for kind in [PartitionKind::Static, PartitionKind::External] {
            let partition = self.storage.open(self.name_of(kind)).await?;
            if let Some(hit) = partition.match_key(key).await? {
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }

    pub async fn store(
        &self,
        kind: PartitionKind,
        key: &CacheKey,
        entry: CachedResponse,
    ) -> Result<()> {
        let partition = self.open(kind).await?;
        partition.put(key, entry).await?;
        debug!("Stored {} in {}", redact_url(key.url()), partition.name());
        Ok(())
    }
}

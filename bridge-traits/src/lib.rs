//! # Host Bridge Traits
//!
//! Capability traits that every host of the offline cache engine must
//! provide.
//!
//! ## Overview
//!
//! This crate defines the contract between the engine and the environment it
//! runs in. Each trait represents a capability the engine needs but that is
//! implemented differently per host (native desktop process, browser shim,
//! test harness).
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Single-attempt network transport
//!
//! ### Storage
//! - [`CacheStorage`](cache::CacheStorage) - Named, versioned partitions
//! - [`CachePartition`](cache::CachePartition) - Entries of one partition
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source used to stamp stored entries
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Bundled Implementations
//!
//! | Capability     | Implementation | Crate |
//! |----------------|----------------|-------|
//! | `CacheStorage` | [`MemoryCacheStorage`] | `bridge-traits` |
//! | `CacheStorage` | `FsCacheStorage` | `bridge-desktop` |
//! | `HttpClient`   | `ReqwestHttpClient` | `bridge-desktop` |
//! | `Clock`        | [`SystemClock`], [`FixedClock`] | `bridge-traits` |
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type.
//! Implementations should:
//!
//! - Map transport failures to `Network`/`Timeout`
//! - Map persistence failures to `Storage`/`Io`
//! - Include context (URL, partition name) in messages
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a single instance can serve
//! many concurrent fetch tasks.

pub mod cache;
pub mod error;
pub mod http;
pub mod memory;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use cache::{CacheKey, CachePartition, CacheStorage, CachedResponse};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RequestMode, ResponseType};
pub use memory::MemoryCacheStorage;
pub use time::{Clock, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};

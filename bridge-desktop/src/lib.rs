//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! This crate provides production-ready implementations of the bridge traits
//! the offline cache engine needs:
//! - `HttpClient` using `reqwest` (single attempt, no retry)
//! - `CacheStorage` using `tokio::fs`, one directory per partition
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{FsCacheStorage, ReqwestHttpClient};
//!
//! #[tokio::main]
//! async fn main() {
//!     let http_client = ReqwestHttpClient::new();
//!     let storage = FsCacheStorage::with_root("/var/cache/my-app");
//!
//!     // Hand both to core-service
//! }
//! ```

mod cache_storage;
mod http;

pub use cache_storage::{FsCacheStorage, FsPartition};
pub use http::ReqwestHttpClient;

//! Desktop bootstrap against the real filesystem adapter.

#![cfg(feature = "desktop-shims")]

use bridge_traits::{CacheStorage, HttpRequest};
use core_runtime::config::CacheManifest;
use core_service::{bootstrap_desktop, FsCacheStorage};
use serde_json::json;
use tempfile::TempDir;
use url::Url;

fn local_manifest(version: &str) -> CacheManifest {
    CacheManifest::new("shell", version, Url::parse("http://127.0.0.1:9/").unwrap())
}

#[tokio::test]
async fn test_bootstrap_reclaims_partitions_on_disk() {
    let dir = TempDir::new().unwrap();
    let storage = FsCacheStorage::with_root(dir.path().join("partitions"));
    storage.open("shell-static-v0").await.unwrap();
    storage.open("shell-external-v0").await.unwrap();

    let core = bootstrap_desktop(local_manifest("1"), dir.path()).await.unwrap();

    assert_eq!(core.active_version().await.as_deref(), Some("1"));
    let remaining = storage.keys().await.unwrap();
    assert!(!remaining.iter().any(|name| name.ends_with("-v0")));
}

#[tokio::test]
async fn test_bootstrap_service_propagates_subresource_failures() {
    let dir = TempDir::new().unwrap();
    let core = bootstrap_desktop(local_manifest("1"), dir.path()).await.unwrap();
    let client = core.connect_client().await;

    assert!(core.controller_of(client).await.is_some());
    let outcome = core
        .post_message(&json!({"type": "SKIP_WAITING"}))
        .await
        .unwrap();
    assert_eq!(outcome, core_offline::MessageOutcome::SkipWaiting);

    // Nothing listens on the discard port; the static asset fetch fails and
    // the failure propagates instead of being masked.
    let err = core
        .fetch(HttpRequest::get("http://127.0.0.1:9/app.js"))
        .await
        .unwrap_err();
    assert!(matches!(err, core_service::CoreError::Offline(ref e) if e.is_network()));
    assert_eq!(core.stats().await.unwrap().network_failures, 1);
}

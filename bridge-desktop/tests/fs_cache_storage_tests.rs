//! Integration tests for the filesystem cache storage
//!
//! These tests exercise the partition contract end to end against a
//! temporary directory:
//! - Idempotent open and creation-ordered listing
//! - Wholesale replacement on re-put
//! - Partition deletion and cross-partition lookup

use bridge_desktop::FsCacheStorage;
use bridge_traits::cache::{CacheKey, CacheStorage, CachedResponse};
use bridge_traits::http::{HttpMethod, HttpResponse};
use chrono::{TimeZone, Utc};
use tempfile::tempdir;

fn key(url: &str) -> CacheKey {
    CacheKey::parse(HttpMethod::Get, url).unwrap()
}

fn snapshot(status: u16, body: &'static str) -> CachedResponse {
    let stored_at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
    let response = HttpResponse::new(status, body).with_header("content-type", "text/html");
    CachedResponse::from_response(&response, stored_at)
}

#[tokio::test]
async fn test_open_is_idempotent_and_listed_once() {
    let dir = tempdir().unwrap();
    let storage = FsCacheStorage::with_root(dir.path());

    let first = storage.open("booktracker-static-v2.0").await.unwrap();
    first
        .put(&key("https://app.example/index.html"), snapshot(200, "<html>"))
        .await
        .unwrap();
    let second = storage.open("booktracker-static-v2.0").await.unwrap();

    assert_eq!(second.keys().await.unwrap().len(), 1);
    assert_eq!(
        storage.keys().await.unwrap(),
        vec!["booktracker-static-v2.0".to_string()]
    );
}

#[tokio::test]
async fn test_entry_round_trips_status_headers_and_timestamp() {
    let dir = tempdir().unwrap();
    let storage = FsCacheStorage::with_root(dir.path());
    let partition = storage.open("shell-static-v1").await.unwrap();
    let k = key("https://app.example/index.html?lang=en");
    let stored = snapshot(200, "<html>offline shell</html>");

    partition.put(&k, stored.clone()).await.unwrap();

    let hit = partition.match_key(&k).await.unwrap().unwrap();
    assert_eq!(hit, stored);
    assert!(partition
        .match_key(&key("https://app.example/index.html?lang=fr"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_put_overwrites_previous_entry() {
    let dir = tempdir().unwrap();
    let storage = FsCacheStorage::with_root(dir.path());
    let partition = storage.open("shell-static-v1").await.unwrap();
    let k = key("https://app.example/manifest.json");

    partition.put(&k, snapshot(200, "{\"v\":1}")).await.unwrap();
    partition.put(&k, snapshot(200, "{\"v\":2}")).await.unwrap();

    let hit = partition.match_key(&k).await.unwrap().unwrap();
    assert_eq!(hit.body.as_ref(), b"{\"v\":2}");
    assert_eq!(partition.keys().await.unwrap(), vec![k]);
}

#[tokio::test]
async fn test_delete_partition_removes_entries() {
    let dir = tempdir().unwrap();
    let storage = FsCacheStorage::with_root(dir.path());
    let k = key("https://app.example/index.html");

    let old = storage.open("shell-static-v1").await.unwrap();
    old.put(&k, snapshot(200, "old shell")).await.unwrap();
    storage.open("shell-static-v2").await.unwrap();

    assert!(storage.delete("shell-static-v1").await.unwrap());
    assert!(!storage.delete("shell-static-v1").await.unwrap());

    assert_eq!(
        storage.keys().await.unwrap(),
        vec!["shell-static-v2".to_string()]
    );
    assert!(storage.match_all(&k).await.unwrap().is_none());
}

#[tokio::test]
async fn test_match_all_searches_every_partition() {
    let dir = tempdir().unwrap();
    let storage = FsCacheStorage::with_root(dir.path());
    let lib = key("https://cdnjs.cloudflare.com/ajax/libs/jsqr/1.4.0/jsQR.min.js");

    storage.open("shell-static-v1").await.unwrap();
    let external = storage.open("shell-external-v1").await.unwrap();
    external.put(&lib, snapshot(200, "jsqr")).await.unwrap();

    let hit = storage.match_all(&lib).await.unwrap().unwrap();
    assert_eq!(hit.body.as_ref(), b"jsqr");
}

#[tokio::test]
async fn test_invalid_partition_names_are_rejected() {
    let dir = tempdir().unwrap();
    let storage = FsCacheStorage::with_root(dir.path());

    assert!(storage.open("../outside").await.is_err());
    assert!(storage.delete("a/b").await.is_err());
}

//! The cache file as a bootstrap source.

use beacon_core::Delta;
use beacon_sync::cache::{cache_path_at, load_at};
use beacon_sync::{CacheSource, SnapshotResponse, SnapshotSource};
use tempfile::TempDir;

#[tokio::test]
async fn store_then_fetch() {
    let tmp = TempDir::new().expect("tmp");
    let source = CacheSource::new(tmp.path(), "42");
    assert!(source.fetch().await.expect("fetch").is_none());

    let snapshot = SnapshotResponse::new(3, vec![Delta::new("svc:x", 3, "from-cache")]);
    let path = source.store(snapshot.clone()).await.expect("store");
    assert_eq!(path, cache_path_at(tmp.path(), "42"));

    assert_eq!(source.fetch().await.expect("fetch"), Some(snapshot));
    let raw = std::fs::read_to_string(&path).expect("read");
    assert!(raw.contains("cached_at"));
}

#[tokio::test]
async fn empty_file_is_unavailable() {
    let tmp = TempDir::new().expect("tmp");
    let source = CacheSource::new(tmp.path(), "42");
    std::fs::write(source.path(), "").expect("write");
    assert!(source.fetch().await.expect("fetch").is_none());
    assert!(load_at(tmp.path(), "42").expect("load").is_none());
}

#[tokio::test]
async fn accounts_do_not_share_files() {
    let tmp = TempDir::new().expect("tmp");
    CacheSource::new(tmp.path(), "1")
        .store(SnapshotResponse::new(1, vec![Delta::new("x", 1, "one")]))
        .await
        .expect("store");
    assert!(CacheSource::new(tmp.path(), "2")
        .fetch()
        .await
        .expect("fetch")
        .is_none());
}

//! Local cache as the first bootstrap source. Runs on real time because the
//! cache file is read on the blocking pool.

mod common;

use std::sync::Arc;
use std::time::Duration;

use beacon_core::{ConfigValue, Delta};
use beacon_sync::cache::{cache_path_at, load_at};
use beacon_sync::stats::{CACHE_LOAD, CHECKPOINT_LOAD};
use beacon_sync::MemoryStats;
use tempfile::TempDir;

use common::{builder, options, snapshot, FakeSnapshot, Reply};

async fn wait_for_file(path: &std::path::Path) {
    for _ in 0..200 {
        if path.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} never appeared", path.display());
}

#[tokio::test]
async fn remote_snapshot_is_persisted_then_served_from_cache() {
    let tmp = TempDir::new().expect("tmp");
    let cached_options = || {
        options()
            .with_local_cache(true)
            .with_cache_dir(tmp.path())
            .with_initialization_timeout(Duration::from_secs(5))
    };

    let first = builder(cached_options())
        .snapshot_source(Arc::new(FakeSnapshot::new(
            "primary",
            snapshot(4, vec![Delta::new("x", 4, "remote")]),
        )))
        .build()
        .expect("client");
    first.start().expect("start");
    assert_eq!(
        first.get("x").await.expect("ready"),
        Some(ConfigValue::from("remote"))
    );
    let path = cache_path_at(tmp.path(), "1");
    wait_for_file(&path).await;
    first.stop().await.expect("stop");
    assert_eq!(
        load_at(tmp.path(), "1").expect("load").map(|c| c.snapshot.pointer.highwater),
        Some(4)
    );

    let stats = Arc::new(MemoryStats::new());
    let offline = Arc::new(FakeSnapshot::new("primary", Reply::Fail(503)));
    let second = builder(cached_options())
        .snapshot_source(offline.clone())
        .stats(stats.clone())
        .build()
        .expect("client");
    second.start().expect("start");
    assert_eq!(
        second.get("x").await.expect("ready from cache"),
        Some(ConfigValue::from("remote"))
    );
    assert_eq!(stats.get(CACHE_LOAD), 1);
    assert_eq!(offline.fetches(), 0, "cache hit skips remote bootstrap");
    second.stop().await.expect("stop");
}

#[tokio::test]
async fn empty_cache_file_falls_through_to_remote() {
    let tmp = TempDir::new().expect("tmp");
    std::fs::write(cache_path_at(tmp.path(), "1"), "").expect("write");

    let stats = Arc::new(MemoryStats::new());
    let client = builder(
        options()
            .with_local_cache(true)
            .with_cache_dir(tmp.path())
            .with_initialization_timeout(Duration::from_secs(5)),
    )
    .snapshot_source(Arc::new(FakeSnapshot::new(
        "primary",
        snapshot(2, vec![Delta::new("x", 2, "fresh")]),
    )))
    .stats(stats.clone())
    .build()
    .expect("client");
    client.start().expect("start");

    assert_eq!(
        client.get("x").await.expect("ready"),
        Some(ConfigValue::from("fresh"))
    );
    assert_eq!(stats.get(CACHE_LOAD), 0);
    assert_eq!(stats.get(CHECKPOINT_LOAD), 1);
    client.stop().await.expect("stop");
}

#[tokio::test]
async fn cache_disabled_never_touches_disk() {
    let tmp = TempDir::new().expect("tmp");
    let client = builder(options().with_cache_dir(tmp.path()))
        .snapshot_source(Arc::new(FakeSnapshot::new(
            "primary",
            snapshot(1, vec![Delta::new("x", 1, "v")]),
        )))
        .build()
        .expect("client");
    client.start().expect("start");
    client.get("x").await.expect("ready");
    client.stop().await.expect("stop");
    assert!(!cache_path_at(tmp.path(), "1").exists());
}

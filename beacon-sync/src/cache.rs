//! Local snapshot cache.
//!
//! The last successful remote snapshot is persisted as JSON at
//! `<cache_dir>/beacon.cache.<account>.json` and read back as the first
//! bootstrap source. Writes use an atomic `.tmp` + rename. A missing or empty
//! file means "nothing cached", never an error.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{io_err, SyncError};
use crate::payload::SnapshotResponse;
use crate::source::SnapshotSource;

/// On-disk cache payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedSnapshot {
    pub cached_at: DateTime<Utc>,
    #[serde(flatten)]
    pub snapshot: SnapshotResponse,
}

/// `<dir>/beacon.cache.<account>.json`
pub fn cache_path_at(dir: &Path, account: &str) -> PathBuf {
    dir.join(format!("beacon.cache.{account}.json"))
}

/// Load the cached snapshot for `account`, if there is a non-empty one.
pub fn load_at(dir: &Path, account: &str) -> Result<Option<CachedSnapshot>, SyncError> {
    let path = cache_path_at(dir, account);
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no cache");
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    if contents.trim().is_empty() {
        tracing::info!(path = %path.display(), "File is empty");
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&contents)?))
}

/// Persist `snapshot` for `account` atomically and return the final path.
pub fn save_at(
    dir: &Path,
    account: &str,
    snapshot: &SnapshotResponse,
) -> Result<PathBuf, SyncError> {
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    let path = cache_path_at(dir, account);
    let payload = CachedSnapshot {
        cached_at: Utc::now(),
        snapshot: snapshot.clone(),
    };
    let json = serde_json::to_string(&payload)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(path)
}

/// The cache file as a bootstrap source.
#[derive(Debug, Clone)]
pub struct CacheSource {
    dir: PathBuf,
    account: String,
}

impl CacheSource {
    pub fn new(dir: impl Into<PathBuf>, account: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            account: account.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        cache_path_at(&self.dir, &self.account)
    }

    /// Persist `snapshot` off the async executor.
    pub async fn store(&self, snapshot: SnapshotResponse) -> Result<PathBuf, SyncError> {
        let dir = self.dir.clone();
        let account = self.account.clone();
        tokio::task::spawn_blocking(move || save_at(&dir, &account, &snapshot)).await?
    }
}

#[async_trait]
impl SnapshotSource for CacheSource {
    fn name(&self) -> &str {
        "cache"
    }

    async fn fetch(&self) -> Result<Option<SnapshotResponse>, SyncError> {
        let dir = self.dir.clone();
        let account = self.account.clone();
        let cached = tokio::task::spawn_blocking(move || load_at(&dir, &account)).await??;
        Ok(cached.map(|c| c.snapshot))
    }
}

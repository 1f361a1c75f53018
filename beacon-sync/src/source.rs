//! Collaborator seams the orchestrator drives.
//!
//! Each remote concern is a trait so the runtime can be exercised against
//! in-memory fakes; [`crate::http`] provides the network implementations and
//! [`crate::cache::CacheSource`] the on-disk one.

use async_trait::async_trait;

use beacon_core::Delta;

use crate::error::SyncError;
use crate::payload::{SnapshotResponse, UpsertAck, UpsertRequest};

/// A bulk snapshot provider.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` means the source is reachable but has nothing usable
    /// (missing file, empty body); the caller falls through to the next one.
    async fn fetch(&self) -> Result<Option<SnapshotResponse>, SyncError>;

    /// Drop any cached connection state.
    fn reset(&self) {}
}

/// Opens long-lived delta streams.
#[async_trait]
pub trait StreamSource: Send + Sync {
    fn name(&self) -> &str;

    /// Open a connection delivering only deltas newer than `start_at`.
    async fn connect(&self, start_at: u64) -> Result<Box<dyn StreamConnection>, SyncError>;
}

/// One open stream.
#[async_trait]
pub trait StreamConnection: Send {
    /// Next batch, or `Ok(None)` when the server closed the stream.
    async fn next_batch(&mut self) -> Result<Option<Vec<Delta>>, SyncError>;

    async fn close(&mut self) {}
}

/// The write endpoint.
#[async_trait]
pub trait ConfigWriter: Send + Sync {
    async fn upsert(&self, request: &UpsertRequest) -> Result<UpsertAck, SyncError>;

    fn reset(&self) {}
}

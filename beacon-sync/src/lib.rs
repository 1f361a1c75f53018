//! # beacon-sync
//!
//! Everything the orchestrator needs to talk to the outside world: options,
//! the retry policy, wire payloads, source/writer traits, the local cache and
//! the HTTP bindings.

pub mod cache;
pub mod error;
pub mod http;
pub mod options;
pub mod payload;
pub mod retry;
pub mod source;
pub mod stats;

pub use cache::{CacheSource, CachedSnapshot};
pub use error::{ErrorClass, SyncError};
pub use options::{Datasources, InitFailure, Options, SdkKey};
pub use payload::{ServicePointer, SnapshotResponse, StreamBatch, UpsertAck, UpsertRequest};
pub use retry::RetryPolicy;
pub use source::{ConfigWriter, SnapshotSource, StreamConnection, StreamSource};
pub use stats::{MemoryStats, NoopStats, StatsSink};

//! # beacon-client
//!
//! The sync runtime and the client built on it.
//!
//! Build a [`Client`] from [`Options`], call [`Client::start`] inside a tokio
//! runtime, then read with [`Client::get`], which waits for the first
//! successful source (or the initialization timeout).

mod client;
mod error;
pub mod evaluate;
pub mod global;
pub mod log_level;
mod runtime;

pub use beacon_sync::Options;
pub use client::{Client, ClientBuilder, SDK_KEY_CONTEXT};
pub use error::ClientError;
pub use evaluate::{Evaluator, StaticEvaluator};
pub use log_level::{LogLevelClient, LogLevelFilter};
pub use runtime::{init_tracing, Sources, StreamStatus, SyncOrchestrator, SyncPhase, Timing};

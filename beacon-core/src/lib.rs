//! Beacon core library: delta store, namespace resolver, layered context.
//!
//! - [`types`]: deltas and the tagged value union
//! - [`store`]: [`DeltaStore`], version-gated idempotent application
//! - [`resolver`]: [`NamespaceResolver`] and immutable [`Snapshot`]s
//! - [`state`]: [`ConfigState`], the single-writer unit the sync layer feeds
//! - [`context`]: [`ContextStack`] and the four context layers
//! - [`error`]: [`CoreError`]

pub mod context;
pub mod error;
pub mod resolver;
pub mod state;
pub mod store;
pub mod types;

pub use context::{
    categories, category, Categories, Category, ContextSet, ContextStack, CurrentScope, Layer,
    NamedContext, ResolvedContext, SharedContext,
};
pub use error::CoreError;
pub use resolver::{NamespaceResolver, ResolvedEntry, Snapshot};
pub use state::{BatchOutcome, ConfigState};
pub use store::DeltaStore;
pub use types::{
    join_key, split_key, ConfigValue, Delta, Entry, FeatureFlag, LogLevel, ValueType,
    WeightedValue, NAMESPACE_DELIMITER,
};

/// Validate a bare key and optional namespace for a write and build the raw key.
pub fn write_key(bare: &str, namespace: Option<&str>) -> Result<String, CoreError> {
    if bare.contains(NAMESPACE_DELIMITER) {
        return Err(CoreError::InvalidKey {
            key: bare.to_string(),
        });
    }
    if let Some(ns) = namespace {
        if ns.contains(NAMESPACE_DELIMITER) {
            return Err(CoreError::InvalidNamespace {
                namespace: ns.to_string(),
            });
        }
    }
    Ok(join_key(namespace, bare))
}

//! Error types for beacon-core.

use thiserror::Error;

/// Errors raised when building writes against the store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The bare key contained the reserved namespace delimiter.
    #[error("key `{key}` must not contain ':'; set namespaces separately")]
    InvalidKey { key: String },

    /// The namespace contained the reserved namespace delimiter.
    #[error("namespace `{namespace}` must not contain ':'")]
    InvalidNamespace { namespace: String },
}

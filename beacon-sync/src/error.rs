//! Error types for beacon-sync.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use beacon_core::CoreError;

/// How a failure should be treated by retry loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth retrying after a backoff or reconnect delay.
    Transient,
    /// Retrying cannot help; stop and surface the error.
    Fatal,
}

/// All errors that can arise from configuration, transports and the cache.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no SDK key configured; set BEACON_SDK_KEY or pass one explicitly")]
    MissingSdkKey,

    #[error("invalid SDK key `{redacted}`: expected <account>-<env>-<secret>-SDK")]
    InvalidSdkKey { redacted: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid write: {0}")]
    InvalidWrite(#[from] CoreError),

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("transport error contacting {url}: {message}")]
    Transport { url: String, message: String },

    #[error("{operation} did not complete within {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("background task failed: {0}")]
    Join(String),
}

impl SyncError {
    /// Configuration problems and authorization rejections are fatal;
    /// everything else is assumed to clear up on its own.
    pub fn class(&self) -> ErrorClass {
        match self {
            SyncError::MissingSdkKey
            | SyncError::InvalidSdkKey { .. }
            | SyncError::Config(_)
            | SyncError::InvalidWrite(_) => ErrorClass::Fatal,
            SyncError::Status { status, .. } if matches!(status, 401 | 403) => ErrorClass::Fatal,
            _ => ErrorClass::Transient,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Fatal
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        SyncError::Join(err.to_string())
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

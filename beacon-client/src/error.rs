//! Error types for beacon-client.

use std::time::Duration;

use thiserror::Error;

use beacon_sync::SyncError;

/// Error surface for the client, its runtime and the global accessor.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(
        "couldn't initialize in {} second timeout. Trying to fetch key `{key}`.",
        .timeout.as_secs_f64()
    )]
    InitializationTimeout { timeout: Duration, key: String },

    #[error("client has not been started")]
    NotStarted,

    #[error("client was already started")]
    AlreadyStarted,

    #[error("no global client; call beacon_client::global::init first")]
    Uninitialized,

    #[error("global client is already initialized")]
    AlreadyInitialized,

    #[error("{task} task join failure: {message}")]
    Join { task: &'static str, message: String },
}

impl ClientError {
    pub fn is_initialization_timeout(&self) -> bool {
        matches!(self, ClientError::InitializationTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::CoreError;

    #[test]
    fn invalid_write_keys_surface_through_sync() {
        let err: ClientError = SyncError::from(CoreError::InvalidKey { key: "a:b".into() })
        .into();
        assert!(matches!(err, ClientError::Sync(SyncError::InvalidWrite(_))));
        assert!(!err.is_initialization_timeout());
    }

    #[test]
    fn timeout_message_names_the_key() {
        let err = ClientError::InitializationTimeout {
            timeout: Duration::from_secs(2),
            key: "x".into(),
        };
        assert_eq!(
            err.to_string(),
            "couldn't initialize in 2 second timeout. Trying to fetch key `x`."
        );
    }
}

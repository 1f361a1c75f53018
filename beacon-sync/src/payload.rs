//! Wire payloads exchanged with snapshot, stream and write endpoints.

use serde::{Deserialize, Serialize};

use beacon_core::{write_key, ConfigValue, Delta};

use crate::error::SyncError;

/// What a bulk snapshot represents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePointer {
    #[serde(default)]
    pub highwater: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_id: Option<u64>,
}

/// Bulk snapshot: every delta the server holds as of `pointer.highwater`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotResponse {
    #[serde(default)]
    pub pointer: ServicePointer,
    #[serde(default)]
    pub deltas: Vec<Delta>,
}

impl SnapshotResponse {
    pub fn new(highwater: u64, deltas: Vec<Delta>) -> Self {
        Self {
            pointer: ServicePointer {
                highwater,
                ..ServicePointer::default()
            },
            deltas,
        }
    }
}

/// One batch delivered over the streaming connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamBatch {
    #[serde(default)]
    pub deltas: Vec<Delta>,
}

impl StreamBatch {
    /// Parse one line of the stream body.
    ///
    /// Lines are JSON batches, optionally carrying an SSE `data:` prefix.
    /// Blank lines and `:` comment lines yield `None`.
    pub fn parse_line(line: &str) -> Result<Option<Self>, SyncError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with(':') {
            return Ok(None);
        }
        let body = line.strip_prefix("data:").unwrap_or(line).trim();
        if body.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(body)?))
    }
}

/// A single-key write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertRequest {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub value: ConfigValue,
    /// Raw key this write replaces; removed locally once the write is applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_key: Option<String>,
    #[serde(default)]
    pub version_hint: u64,
}

impl UpsertRequest {
    pub fn new(key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        Self {
            key: key.into(),
            namespace: None,
            value: value.into(),
            previous_key: None,
            version_hint: 0,
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into()).filter(|ns: &String| !ns.is_empty());
        self
    }

    pub fn replacing(mut self, previous_key: impl Into<String>) -> Self {
        self.previous_key = Some(previous_key.into());
        self
    }

    /// Validated `namespace:key` form of the target key.
    pub fn raw_key(&self) -> Result<String, SyncError> {
        Ok(write_key(&self.key, self.namespace.as_deref())?)
    }

    /// The delta this write produces at `version`.
    pub fn to_delta(&self, version: u64) -> Result<Delta, SyncError> {
        Ok(Delta::new(self.raw_key()?, version, self.value.clone()))
    }
}

/// Writer acknowledgement. `version` is the server-assigned version, if any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertAck {
    #[serde(default)]
    pub version: Option<u64>,
}

//! Domain types for configuration deltas and their values.
//!
//! A raw key may carry a namespace prefix separated by [`NAMESPACE_DELIMITER`]
//! (`namespace:bare.key`); a key without the delimiter is unscoped.
//!
//! Values travel as `{ "type": <tag>, "value": <payload> }`. A tag this crate
//! does not know, or a payload that does not fit its tag, is kept verbatim as
//! [`ConfigValue::Opaque`] instead of being rejected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Separates the namespace prefix from the bare key in a raw key.
pub const NAMESPACE_DELIMITER: char = ':';

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Split a raw key into `(namespace, bare_key)`.
///
/// Unscoped keys yield an empty namespace.
pub fn split_key(raw: &str) -> (&str, &str) {
    match raw.split_once(NAMESPACE_DELIMITER) {
        Some((namespace, bare)) => (namespace, bare),
        None => ("", raw),
    }
}

/// Build a raw key from an optional namespace and a bare key.
pub fn join_key(namespace: Option<&str>, bare: &str) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => format!("{ns}{NAMESPACE_DELIMITER}{bare}"),
        _ => bare.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Log severity carried by `log_level` values, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    #[default]
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    /// Case-insensitive; `not_set` maps to `debug`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" | "not_set" | "not_set_log_level" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "fatal" => Ok(LogLevel::Fatal),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

/// Type tag of a [`ConfigValue`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    String,
    Int,
    Double,
    Bool,
    StringList,
    WeightedValues,
    FeatureFlag,
    LogLevel,
    /// A tag this crate does not interpret.
    Unknown(String),
}

impl ValueType {
    pub fn as_str(&self) -> &str {
        match self {
            ValueType::String => "string",
            ValueType::Int => "int",
            ValueType::Double => "double",
            ValueType::Bool => "bool",
            ValueType::StringList => "string_list",
            ValueType::WeightedValues => "weighted_values",
            ValueType::FeatureFlag => "feature_flag",
            ValueType::LogLevel => "log_level",
            ValueType::Unknown(tag) => tag,
        }
    }
}

impl From<&str> for ValueType {
    fn from(tag: &str) -> Self {
        match tag {
            "string" => ValueType::String,
            "int" => ValueType::Int,
            "double" => ValueType::Double,
            "bool" => ValueType::Bool,
            "string_list" => ValueType::StringList,
            "weighted_values" => ValueType::WeightedValues,
            "feature_flag" => ValueType::FeatureFlag,
            "log_level" => ValueType::LogLevel,
            other => ValueType::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// One member of a weighted value set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedValue {
    pub weight: u32,
    pub value: ConfigValue,
}

/// Feature-flag descriptor. Rules are opaque to this crate; an evaluator
/// interprets them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureFlag {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<ConfigValue>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub rules: Value,
}

/// Tagged union of every value a delta can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "TaggedValue", into = "TaggedValue")]
pub enum ConfigValue {
    String(String),
    Int(i64),
    Double(f64),
    Bool(bool),
    StringList(Vec<String>),
    WeightedValues(Vec<WeightedValue>),
    FeatureFlag(FeatureFlag),
    LogLevel(LogLevel),
    /// Stored as received; see the module docs.
    Opaque { value_type: String, raw: Value },
}

impl ConfigValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            ConfigValue::String(_) => ValueType::String,
            ConfigValue::Int(_) => ValueType::Int,
            ConfigValue::Double(_) => ValueType::Double,
            ConfigValue::Bool(_) => ValueType::Bool,
            ConfigValue::StringList(_) => ValueType::StringList,
            ConfigValue::WeightedValues(_) => ValueType::WeightedValues,
            ConfigValue::FeatureFlag(_) => ValueType::FeatureFlag,
            ConfigValue::LogLevel(_) => ValueType::LogLevel,
            ConfigValue::Opaque { value_type, .. } => ValueType::Unknown(value_type.clone()),
        }
    }

    /// Decode a value from its wire tag and payload. Never fails.
    pub fn from_wire(value_type: &str, raw: Value) -> Self {
        let decoded = match ValueType::from(value_type) {
            ValueType::String => serde_json::from_value(raw.clone()).map(ConfigValue::String),
            ValueType::Int => serde_json::from_value(raw.clone()).map(ConfigValue::Int),
            ValueType::Double => serde_json::from_value(raw.clone()).map(ConfigValue::Double),
            ValueType::Bool => serde_json::from_value(raw.clone()).map(ConfigValue::Bool),
            ValueType::StringList => {
                serde_json::from_value(raw.clone()).map(ConfigValue::StringList)
            }
            ValueType::WeightedValues => {
                serde_json::from_value(raw.clone()).map(ConfigValue::WeightedValues)
            }
            ValueType::FeatureFlag => {
                serde_json::from_value(raw.clone()).map(ConfigValue::FeatureFlag)
            }
            ValueType::LogLevel => serde_json::from_value(raw.clone()).map(ConfigValue::LogLevel),
            ValueType::Unknown(_) => {
                return ConfigValue::Opaque {
                    value_type: value_type.to_string(),
                    raw,
                }
            }
        };
        decoded.unwrap_or_else(|_| ConfigValue::Opaque {
            value_type: value_type.to_string(),
            raw,
        })
    }

    /// Encode to `(tag, payload)`.
    pub fn to_wire(&self) -> (String, Value) {
        let payload = match self {
            ConfigValue::String(v) => serde_json::to_value(v),
            ConfigValue::Int(v) => serde_json::to_value(v),
            ConfigValue::Double(v) => serde_json::to_value(v),
            ConfigValue::Bool(v) => serde_json::to_value(v),
            ConfigValue::StringList(v) => serde_json::to_value(v),
            ConfigValue::WeightedValues(v) => serde_json::to_value(v),
            ConfigValue::FeatureFlag(v) => serde_json::to_value(v),
            ConfigValue::LogLevel(v) => serde_json::to_value(v),
            ConfigValue::Opaque { raw, .. } => Ok(raw.clone()),
        };
        (
            self.value_type().as_str().to_string(),
            payload.unwrap_or(Value::Null),
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::String(v) => f.write_str(v),
            ConfigValue::Int(v) => v.fmt(f),
            ConfigValue::Double(v) => v.fmt(f),
            ConfigValue::Bool(v) => v.fmt(f),
            ConfigValue::StringList(v) => write!(f, "[{}]", v.join(", ")),
            ConfigValue::LogLevel(v) => v.fmt(f),
            other => {
                let (tag, payload) = other.to_wire();
                write!(f, "{tag}:{payload}")
            }
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        ConfigValue::String(v.to_owned())
    }
}

impl From<String> for ConfigValue {
    fn from(v: String) -> Self {
        ConfigValue::String(v)
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        ConfigValue::Int(v)
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        ConfigValue::Double(v)
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        ConfigValue::Bool(v)
    }
}

impl From<Vec<String>> for ConfigValue {
    fn from(v: Vec<String>) -> Self {
        ConfigValue::StringList(v)
    }
}

impl From<LogLevel> for ConfigValue {
    fn from(v: LogLevel) -> Self {
        ConfigValue::LogLevel(v)
    }
}

#[derive(Serialize, Deserialize)]
struct TaggedValue {
    #[serde(rename = "type")]
    value_type: String,
    #[serde(default)]
    value: Value,
}

impl From<TaggedValue> for ConfigValue {
    fn from(tagged: TaggedValue) -> Self {
        ConfigValue::from_wire(&tagged.value_type, tagged.value)
    }
}

impl From<ConfigValue> for TaggedValue {
    fn from(value: ConfigValue) -> Self {
        let (value_type, value) = value.to_wire();
        TaggedValue { value_type, value }
    }
}

// ---------------------------------------------------------------------------
// Delta
// ---------------------------------------------------------------------------

/// A single versioned update to one raw key. The accepted delta for a key is
/// that key's entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub key: String,
    pub version: u64,
    pub value: ConfigValue,
}

/// The most recently accepted delta for a raw key.
pub type Entry = Delta;

impl Delta {
    pub fn new(key: impl Into<String>, version: u64, value: impl Into<ConfigValue>) -> Self {
        Self {
            key: key.into(),
            version,
            value: value.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        split_key(&self.key).0
    }

    pub fn bare_key(&self) -> &str {
        split_key(&self.key).1
    }

    pub fn value_type(&self) -> ValueType {
        self.value.value_type()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn split_and_join_keys() {
        assert_eq!(split_key("a.b:timeout"), ("a.b", "timeout"));
        assert_eq!(split_key("timeout"), ("", "timeout"));
        assert_eq!(join_key(Some("a.b"), "timeout"), "a.b:timeout");
        assert_eq!(join_key(Some(""), "timeout"), "timeout");
        assert_eq!(join_key(None, "timeout"), "timeout");
    }

    #[test]
    fn delta_decodes_known_value() {
        let delta: Delta = serde_json::from_value(json!({
            "key": "app:retries",
            "version": 7,
            "value": { "type": "int", "value": 3 }
        }))
        .expect("decode");
        assert_eq!(delta.value, ConfigValue::Int(3));
        assert_eq!(delta.namespace(), "app");
        assert_eq!(delta.bare_key(), "retries");
        assert_eq!(delta.value_type(), ValueType::Int);
    }

    #[test]
    fn unknown_tag_is_kept_opaque() {
        let delta: Delta = serde_json::from_value(json!({
            "key": "limits",
            "version": 1,
            "value": { "type": "rate_limit", "value": { "per_sec": 5 } }
        }))
        .expect("decode");
        assert_eq!(
            delta.value_type(),
            ValueType::Unknown("rate_limit".to_string())
        );
        let encoded = serde_json::to_value(&delta).expect("encode");
        assert_eq!(encoded["value"]["type"], json!("rate_limit"));
        assert_eq!(encoded["value"]["value"]["per_sec"], json!(5));
    }

    #[test]
    fn mismatched_payload_is_kept_opaque() {
        let value = ConfigValue::from_wire("int", json!("not a number"));
        assert!(matches!(value, ConfigValue::Opaque { ref value_type, .. } if value_type == "int"));
    }

    #[test]
    fn log_level_ordering_and_parse() {
        assert!(LogLevel::Trace < LogLevel::Debug);
        assert!(LogLevel::Error < LogLevel::Fatal);
        assert_eq!("WARN".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!("not_set".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn feature_flag_roundtrip_through_tag() {
        let flag = ConfigValue::FeatureFlag(FeatureFlag {
            enabled: true,
            variants: vec![ConfigValue::from("blue")],
            rules: Value::Null,
        });
        let encoded = serde_json::to_string(&flag).expect("encode");
        let decoded: ConfigValue = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded, flag);
    }
}

//! Remotely configured log levels.
//!
//! The level lives under one config key (`log-levels.default` unless the
//! options say otherwise) and must carry the `log_level` value type. It is
//! evaluated with a `beacon-sdk-logging` category naming the logger path, so
//! an evaluator with rules can vary the level per logger.

use tracing::subscriber::Interest;
use tracing::{Level, Metadata};
use tracing_subscriber::layer::{Context, Filter};

use beacon_core::{categories, category, ConfigValue, ContextStack, LogLevel, ValueType};

use crate::client::Client;

pub const LOGGING_CONTEXT: &str = "beacon-sdk-logging";

/// Severity of a `tracing` level.
pub fn from_tracing(level: &Level) -> LogLevel {
    if *level == Level::TRACE {
        LogLevel::Trace
    } else if *level == Level::DEBUG {
        LogLevel::Debug
    } else if *level == Level::INFO {
        LogLevel::Info
    } else if *level == Level::WARN {
        LogLevel::Warn
    } else {
        LogLevel::Error
    }
}

/// `a::b::c` targets become `a.b.c` logger paths.
pub fn logger_path(target: &str) -> String {
    target.replace("::", ".")
}

#[derive(Debug, Clone)]
pub struct LogLevelClient {
    client: Client,
    key: Option<String>,
}

impl LogLevelClient {
    pub fn new(client: Client) -> Self {
        let key = client.options().logger_key.clone();
        Self { client, key }
    }

    /// Level for `logger_path` under the client's own context. Never waits
    /// for initialization; anything missing means `debug`.
    pub fn get_log_level(&self, logger_path: &str) -> LogLevel {
        self.get_log_level_in(logger_path, &self.client.context())
    }

    pub fn get_log_level_in(&self, logger_path: &str, stack: &ContextStack) -> LogLevel {
        let Some(key) = self.key.as_deref() else {
            return LogLevel::Debug;
        };
        let Some(entry) = self.client.raw_now(key) else {
            return LogLevel::Debug;
        };
        if entry.entry.value_type() != ValueType::LogLevel {
            return LogLevel::Debug;
        }
        let explicit = categories([(
            LOGGING_CONTEXT,
            category([("lang", "rust"), ("logger-path", logger_path)]),
        )]);
        match self.client.evaluate_entry(&entry, stack, explicit) {
            Some(ConfigValue::LogLevel(level)) => level,
            _ => LogLevel::Debug,
        }
    }

    pub fn should_log(&self, level: LogLevel, logger_path: &str) -> bool {
        level >= self.get_log_level(logger_path)
    }
}

/// Per-layer `tracing` filter backed by a [`LogLevelClient`].
///
/// Levels can change at any time, so every callsite is re-checked per event.
#[derive(Debug, Clone)]
pub struct LogLevelFilter {
    levels: LogLevelClient,
}

impl LogLevelFilter {
    pub fn new(levels: LogLevelClient) -> Self {
        Self { levels }
    }
}

impl<S> Filter<S> for LogLevelFilter {
    fn enabled(&self, meta: &Metadata<'_>, _cx: &Context<'_, S>) -> bool {
        self.levels
            .should_log(from_tracing(meta.level()), &logger_path(meta.target()))
    }

    fn callsite_enabled(&self, _meta: &'static Metadata<'static>) -> Interest {
        Interest::sometimes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_sync::{Datasources, Options};

    fn local_client() -> Client {
        Client::new(Options::default().with_datasources(Datasources::LocalOnly)).expect("client")
    }

    #[test]
    fn tracing_levels_map_in_order() {
        assert!(from_tracing(&Level::TRACE) < from_tracing(&Level::DEBUG));
        assert!(from_tracing(&Level::WARN) < from_tracing(&Level::ERROR));
        assert_eq!(logger_path("app::db::pool"), "app.db.pool");
    }

    #[tokio::test]
    async fn missing_or_mistyped_level_falls_back_to_debug() {
        let client = local_client();
        let levels = LogLevelClient::new(client.clone());
        assert_eq!(levels.get_log_level("app"), LogLevel::Debug);

        client
            .upsert("log-levels.default", "warn", None)
            .await
            .expect("write");
        assert_eq!(levels.get_log_level("app"), LogLevel::Debug, "string is not a level");
    }

    #[tokio::test]
    async fn configured_level_gates_logging() {
        let client = local_client();
        client
            .upsert("log-levels.default", LogLevel::Warn, None)
            .await
            .expect("write");
        let levels = LogLevelClient::new(client);
        assert_eq!(levels.get_log_level("app.web"), LogLevel::Warn);
        assert!(!levels.should_log(LogLevel::Info, "app.web"));
        assert!(levels.should_log(LogLevel::Warn, "app.web"));
        assert!(levels.should_log(LogLevel::Fatal, "app.web"));
    }

    #[tokio::test]
    async fn logger_key_can_be_disabled() {
        let client = Client::new(
            Options::default()
                .with_datasources(Datasources::LocalOnly)
                .with_logger_key(None),
        )
        .expect("client");
        client
            .upsert("log-levels.default", LogLevel::Error, None)
            .await
            .expect("write");
        assert_eq!(LogLevelClient::new(client).get_log_level("x"), LogLevel::Debug);
    }
}

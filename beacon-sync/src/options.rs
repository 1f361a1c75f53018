//! Client options.
//!
//! `Options::default()` gives the production defaults; `with_*` methods
//! override single fields and [`Options::from_env`] layers the `BEACON_*`
//! environment variables on top. [`Options::from_lookup`] takes the lookup
//! function explicitly so tests never touch the real environment.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use beacon_core::Categories;

use crate::error::SyncError;
use crate::retry::RetryPolicy;

pub const ENV_SDK_KEY: &str = "BEACON_SDK_KEY";
pub const ENV_NAMESPACE: &str = "BEACON_NAMESPACE";
pub const ENV_DATASOURCES: &str = "BEACON_DATASOURCES";
pub const ENV_API_URL_OVERRIDE: &str = "BEACON_API_URL_OVERRIDE";
pub const ENV_CHECKPOINT_FREQ_SEC: &str = "BEACON_CHECKPOINT_FREQ_SEC";
pub const ENV_XDG_CACHE_HOME: &str = "XDG_CACHE_HOME";

pub const DEFAULT_SOURCES: [&str; 2] = [
    "https://primary.beacon.cloud",
    "https://secondary.beacon.cloud",
];
pub const DEFAULT_LOGGER_KEY: &str = "log-levels.default";

/// Which sources the client may talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Datasources {
    #[default]
    All,
    /// No remote snapshot, stream or writer; the SDK key is not required.
    LocalOnly,
}

/// What a read does when initialization times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitFailure {
    #[default]
    Raise,
    /// Serve whatever the snapshot holds (possibly nothing).
    ReturnAbsent,
}

/// A parsed `<account>-<env>-<secret>-SDK` key.
#[derive(Clone, PartialEq, Eq)]
pub struct SdkKey {
    raw: String,
    account: String,
}

impl SdkKey {
    pub fn parse(raw: &str) -> Result<Self, SyncError> {
        let raw = raw.trim();
        match raw.split_once('-') {
            Some((account, rest)) if !account.is_empty() && !rest.is_empty() => Ok(Self {
                raw: raw.to_string(),
                account: account.to_string(),
            }),
            _ => Err(SyncError::InvalidSdkKey {
                redacted: redact(raw),
            }),
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account
    }

    pub fn expose(&self) -> &str {
        &self.raw
    }
}

impl fmt::Debug for SdkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkKey")
            .field("account", &self.account)
            .field("raw", &redact(&self.raw))
            .finish()
    }
}

fn redact(raw: &str) -> String {
    let visible: String = raw.chars().take(4).collect();
    format!("{visible}***")
}

/// Rewrite a leading `primary.` / `secondary.` host label to `stream.`.
pub fn stream_url(source: &str) -> String {
    let (scheme, rest) = match source.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, source),
    };
    let host = rest
        .strip_prefix("primary.")
        .or_else(|| rest.strip_prefix("secondary."))
        .map(|tail| format!("stream.{tail}"))
        .unwrap_or_else(|| rest.to_string());
    match scheme {
        Some(scheme) => format!("{scheme}://{host}"),
        None => host,
    }
}

#[derive(Debug, Clone)]
pub struct Options {
    pub sdk_key: Option<String>,
    pub namespace: String,
    pub datasources: Datasources,
    pub sources: Vec<String>,
    pub initialization_timeout: Duration,
    pub on_init_failure: InitFailure,
    pub checkpoint_interval: Duration,
    pub reconnect_delay: Duration,
    pub write_timeout: Duration,
    pub retry: RetryPolicy,
    pub use_local_cache: bool,
    pub cache_dir: Option<PathBuf>,
    pub logger_key: Option<String>,
    pub global_context: Categories,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            sdk_key: None,
            namespace: String::new(),
            datasources: Datasources::All,
            sources: DEFAULT_SOURCES.iter().map(|s| s.to_string()).collect(),
            initialization_timeout: Duration::from_secs(10),
            on_init_failure: InitFailure::Raise,
            checkpoint_interval: Duration::from_secs(60),
            reconnect_delay: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
            use_local_cache: false,
            cache_dir: None,
            logger_key: Some(DEFAULT_LOGGER_KEY.to_string()),
            global_context: Categories::new(),
        }
    }
}

impl Options {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for each variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = Self::default();
        let non_blank = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_blank(ENV_SDK_KEY) {
            options.sdk_key = Some(key);
        }
        if let Some(namespace) = non_blank(ENV_NAMESPACE) {
            options.namespace = namespace;
        }
        if let Some(mode) = non_blank(ENV_DATASOURCES) {
            if mode.trim().eq_ignore_ascii_case("LOCAL_ONLY") {
                options.datasources = Datasources::LocalOnly;
            }
        }
        if let Some(url) = non_blank(ENV_API_URL_OVERRIDE) {
            options.sources = vec![url.trim().to_string()];
        }
        if let Some(raw) = non_blank(ENV_CHECKPOINT_FREQ_SEC) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => options.checkpoint_interval = Duration::from_secs(secs),
                _ => tracing::warn!(value = %raw, "ignoring invalid BEACON_CHECKPOINT_FREQ_SEC"),
            }
        }
        if let Some(dir) = non_blank(ENV_XDG_CACHE_HOME) {
            options.cache_dir = Some(PathBuf::from(dir));
        }
        options
    }

    pub fn with_sdk_key(mut self, key: impl Into<String>) -> Self {
        self.sdk_key = Some(key.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_datasources(mut self, datasources: Datasources) -> Self {
        self.datasources = datasources;
        self
    }

    pub fn with_sources(mut self, sources: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_initialization_timeout(mut self, timeout: Duration) -> Self {
        self.initialization_timeout = timeout;
        self
    }

    pub fn with_on_init_failure(mut self, policy: InitFailure) -> Self {
        self.on_init_failure = policy;
        self
    }

    pub fn with_checkpoint_interval(mut self, interval: Duration) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_local_cache(mut self, enabled: bool) -> Self {
        self.use_local_cache = enabled;
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_logger_key(mut self, key: Option<String>) -> Self {
        self.logger_key = key;
        self
    }

    pub fn with_global_context(mut self, context: Categories) -> Self {
        self.global_context = context;
        self
    }

    pub fn is_local_only(&self) -> bool {
        self.datasources == Datasources::LocalOnly
    }

    /// Parse the configured SDK key. `Ok(None)` only in local-only mode.
    pub fn parsed_sdk_key(&self) -> Result<Option<SdkKey>, SyncError> {
        match (&self.sdk_key, self.datasources) {
            (Some(raw), _) if !raw.trim().is_empty() => SdkKey::parse(raw).map(Some),
            (_, Datasources::LocalOnly) => Ok(None),
            _ => Err(SyncError::MissingSdkKey),
        }
    }

    pub fn stream_urls(&self) -> Vec<String> {
        self.sources.iter().map(|s| stream_url(s)).collect()
    }

    /// Configured cache directory, else `<home>/.cache`.
    pub fn resolved_cache_dir(&self) -> Option<PathBuf> {
        self.cache_dir
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(".cache")))
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if !self.is_local_only() && self.sources.is_empty() {
            return Err(SyncError::Config("at least one source URL is required".into()));
        }
        if self.initialization_timeout.is_zero() {
            return Err(SyncError::Config("initialization timeout must be positive".into()));
        }
        if self.checkpoint_interval.is_zero() {
            return Err(SyncError::Config("checkpoint interval must be positive".into()));
        }
        Ok(())
    }
}

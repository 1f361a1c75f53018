//! The constructed client: options in, typed reads and writes out.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use beacon_core::{
    categories, category, Categories, ConfigValue, ContextStack, ResolvedEntry, SharedContext,
    Snapshot,
};
use beacon_sync::http::{HttpConfigWriter, HttpSnapshotSource, HttpStreamSource, HttpTransport};
use beacon_sync::{
    CacheSource, ConfigWriter, NoopStats, Options, SdkKey, SnapshotSource, StatsSink,
    StreamSource, UpsertRequest,
};

use crate::error::ClientError;
use crate::evaluate::{Evaluator, StaticEvaluator};
use crate::runtime::{Sources, StreamStatus, SyncOrchestrator, SyncPhase, Timing};

/// Category seeded into the `default` context layer from the SDK key.
pub const SDK_KEY_CONTEXT: &str = "beacon-sdk-key";

/// Cheap to clone; every clone drives the same runtime. The runtime is told
/// to stop when the last clone is dropped.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    options: Options,
    sdk_key: Option<SdkKey>,
    orchestrator: SyncOrchestrator,
    context: SharedContext,
    evaluator: Arc<dyn Evaluator>,
}

pub struct ClientBuilder {
    options: Options,
    snapshots: Vec<Arc<dyn SnapshotSource>>,
    stream: Option<Arc<dyn StreamSource>>,
    writer: Option<Arc<dyn ConfigWriter>>,
    stats: Arc<dyn StatsSink>,
    evaluator: Arc<dyn Evaluator>,
    network_defaults: Option<bool>,
}

impl ClientBuilder {
    fn new(options: Options) -> Self {
        Self {
            options,
            snapshots: Vec::new(),
            stream: None,
            writer: None,
            stats: Arc::new(NoopStats),
            evaluator: Arc::new(StaticEvaluator),
            network_defaults: None,
        }
    }

    /// Add a bulk snapshot source; sources are tried in the order added.
    pub fn snapshot_source(mut self, source: Arc<dyn SnapshotSource>) -> Self {
        self.snapshots.push(source);
        self
    }

    pub fn stream_source(mut self, source: Arc<dyn StreamSource>) -> Self {
        self.stream = Some(source);
        self
    }

    pub fn writer(mut self, writer: Arc<dyn ConfigWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn stats(mut self, stats: Arc<dyn StatsSink>) -> Self {
        self.stats = stats;
        self
    }

    pub fn evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Whether unset sources fall back to the HTTP bindings. Defaults to
    /// `true` unless the options say local-only.
    pub fn network_defaults(mut self, enabled: bool) -> Self {
        self.network_defaults = Some(enabled);
        self
    }

    pub fn build(self) -> Result<Client, ClientError> {
        let ClientBuilder {
            options,
            mut snapshots,
            mut stream,
            mut writer,
            stats,
            evaluator,
            network_defaults,
        } = self;

        options.validate()?;
        let sdk_key = options.parsed_sdk_key()?;

        let use_network = network_defaults.unwrap_or(!options.is_local_only());
        if let (Some(key), true) = (&sdk_key, use_network) {
            let transport = HttpTransport::new(key);
            if snapshots.is_empty() {
                snapshots = options
                    .sources
                    .iter()
                    .map(|base| {
                        Arc::new(HttpSnapshotSource::new(base, transport.clone()))
                            as Arc<dyn SnapshotSource>
                    })
                    .collect();
            }
            if stream.is_none() {
                stream = Some(Arc::new(HttpStreamSource::new(
                    &options.stream_urls(),
                    transport.clone(),
                )) as Arc<dyn StreamSource>);
            }
            if writer.is_none() {
                writer = options.sources.first().map(|base| {
                    Arc::new(HttpConfigWriter::new(base, transport.clone())) as Arc<dyn ConfigWriter>
                });
            }
        }

        let cache = if options.use_local_cache {
            match (&sdk_key, options.resolved_cache_dir()) {
                (Some(key), Some(dir)) => Some(CacheSource::new(dir, key.account_id())),
                _ => {
                    tracing::warn!("local cache enabled but no account or cache directory; skipping");
                    None
                }
            }
        } else {
            None
        };

        let context = SharedContext::new();
        context.set_global(options.global_context.clone());
        if let Some(key) = &sdk_key {
            context.set_default(categories([(
                SDK_KEY_CONTEXT,
                category([("account-id", key.account_id())]),
            )]));
        }

        let timing = Timing {
            initialization_timeout: options.initialization_timeout,
            on_init_failure: options.on_init_failure,
            checkpoint_interval: options.checkpoint_interval,
            reconnect_delay: options.reconnect_delay,
            write_timeout: options.write_timeout,
            retry: options.retry,
        };
        let sources = Sources {
            cache,
            snapshots,
            stream,
            writer,
            stats,
        };
        let orchestrator = SyncOrchestrator::new(&options.namespace, sources, timing);

        Ok(Client {
            inner: Arc::new(Inner {
                options,
                sdk_key,
                orchestrator,
                context,
                evaluator,
            }),
        })
    }
}

impl Client {
    /// Build a client wired to the HTTP bindings described by `options`.
    pub fn new(options: Options) -> Result<Self, ClientError> {
        Self::builder(options).build()
    }

    pub fn builder(options: Options) -> ClientBuilder {
        ClientBuilder::new(options)
    }

    /// Spawn the sync runtime on the current tokio runtime.
    pub fn start(&self) -> Result<(), ClientError> {
        self.inner.orchestrator.start()
    }

    pub async fn stop(&self) -> Result<(), ClientError> {
        self.inner.orchestrator.stop().await
    }

    /// Signal the runtime to stop without waiting for it.
    pub fn request_stop(&self) {
        self.inner.orchestrator.request_stop();
    }

    /// Value for `key`, waiting for initialization first.
    pub async fn get(&self, key: &str) -> Result<Option<ConfigValue>, ClientError> {
        self.inner.orchestrator.wait_ready(key).await?;
        Ok(self.get_now(key))
    }

    /// Winning raw entry for `key`, waiting for initialization first.
    pub async fn raw(&self, key: &str) -> Result<Option<ResolvedEntry>, ClientError> {
        self.inner.orchestrator.wait_ready(key).await?;
        Ok(self.raw_now(key))
    }

    /// Current value without waiting for initialization.
    pub fn get_now(&self, key: &str) -> Option<ConfigValue> {
        self.inner.orchestrator.state().get(key)
    }

    pub fn raw_now(&self, key: &str) -> Option<ResolvedEntry> {
        self.inner.orchestrator.state().raw(key)
    }

    /// Evaluate `key` against the client's context plus `explicit`.
    pub async fn evaluate(
        &self,
        key: &str,
        explicit: Categories,
    ) -> Result<Option<ConfigValue>, ClientError> {
        let stack = self.context();
        self.evaluate_in(key, &stack, explicit).await
    }

    /// Evaluate `key` against a caller-held context stack plus `explicit`.
    pub async fn evaluate_in(
        &self,
        key: &str,
        stack: &ContextStack,
        explicit: Categories,
    ) -> Result<Option<ConfigValue>, ClientError> {
        self.inner.orchestrator.wait_ready(key).await?;
        Ok(self.evaluate_now(key, stack, explicit))
    }

    /// Evaluate without waiting for initialization.
    pub fn evaluate_now(
        &self,
        key: &str,
        stack: &ContextStack,
        explicit: Categories,
    ) -> Option<ConfigValue> {
        let entry = self.raw_now(key)?;
        self.evaluate_entry(&entry, stack, explicit)
    }

    pub(crate) fn evaluate_entry(
        &self,
        entry: &ResolvedEntry,
        stack: &ContextStack,
        explicit: Categories,
    ) -> Option<ConfigValue> {
        let context = stack.join(explicit);
        self.inner.evaluator.evaluate(entry, &context)
    }

    /// `true` only when `key` evaluates to boolean `true`.
    pub async fn enabled(&self, key: &str, explicit: Categories) -> Result<bool, ClientError> {
        Ok(self
            .evaluate(key, explicit)
            .await?
            .and_then(|value| value.as_bool())
            .unwrap_or(false))
    }

    /// Write `value` to `key` (optionally scoped to `namespace`) and return
    /// the version it was applied at locally.
    pub async fn upsert(
        &self,
        key: &str,
        value: impl Into<ConfigValue>,
        namespace: Option<&str>,
    ) -> Result<u64, ClientError> {
        let mut request = UpsertRequest::new(key, value);
        if let Some(namespace) = namespace {
            request = request.in_namespace(namespace);
        }
        self.upsert_request(request).await
    }

    pub async fn upsert_request(&self, request: UpsertRequest) -> Result<u64, ClientError> {
        Ok(self.inner.orchestrator.upsert(request).await?)
    }

    /// A fresh context stack over the client's `global` and `default` layers.
    pub fn context(&self) -> ContextStack {
        self.inner.context.stack()
    }

    pub fn shared_context(&self) -> &SharedContext {
        &self.inner.context
    }

    pub fn phase(&self) -> SyncPhase {
        self.inner.orchestrator.phase()
    }

    pub fn stream_status(&self) -> StreamStatus {
        self.inner.orchestrator.stream_status()
    }

    /// Highwater mark after every published change.
    pub fn updates(&self) -> watch::Receiver<u64> {
        self.inner.orchestrator.updates()
    }

    pub fn highwater_mark(&self) -> u64 {
        self.inner.orchestrator.state().highwater_mark()
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.orchestrator.state().snapshot()
    }

    pub fn namespace(&self) -> &str {
        &self.inner.options.namespace
    }

    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    pub fn account_id(&self) -> Option<&str> {
        self.inner.sdk_key.as_ref().map(SdkKey::account_id)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("namespace", &self.inner.options.namespace)
            .field("account", &self.account_id())
            .field("phase", &self.phase())
            .field("highwater", &self.highwater_mark())
            .finish()
    }
}

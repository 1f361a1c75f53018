//! Sync runtime: bootstrap, checkpoint refresh and the delta stream.
//!
//! `start` spawns two tokio tasks that share one broadcast shutdown channel:
//!
//! - **snapshot**: cache, then remote snapshot sources in order, retried with
//!   backoff until one succeeds; afterwards the same task refreshes the
//!   checkpoint on a fixed interval.
//! - **stream**: waits for the first bootstrap pass, then holds a connection
//!   seeded at the current highwater mark, reconnecting after a fixed delay on
//!   transient failures and stopping on fatal ones.
//!
//! Readiness is a `watch` channel; readers wait on it with the single
//! initialization deadline fixed when `start` ran.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use beacon_core::{BatchOutcome, ConfigState, Delta};
use beacon_sync::stats::{CACHE_LOAD, CHECKPOINT_LOAD, STREAM_START, UPSERT};
use beacon_sync::{
    CacheSource, ConfigWriter, InitFailure, RetryPolicy, SnapshotResponse, SnapshotSource,
    StatsSink, StreamSource, SyncError, UpsertAck, UpsertRequest,
};

use crate::error::ClientError;

/// Lifecycle of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Uninitialized,
    Bootstrapping,
    Ready,
    Stopped,
}

/// Health of the streaming loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    Idle,
    Connecting,
    Connected,
    Reconnecting,
    /// A fatal error stopped the loop; no further reconnects.
    Failed(String),
    Stopped,
}

/// Everything the orchestrator talks to.
#[derive(Clone)]
pub struct Sources {
    pub cache: Option<CacheSource>,
    pub snapshots: Vec<Arc<dyn SnapshotSource>>,
    pub stream: Option<Arc<dyn StreamSource>>,
    pub writer: Option<Arc<dyn ConfigWriter>>,
    pub stats: Arc<dyn StatsSink>,
}

impl Sources {
    fn has_snapshot_sources(&self) -> bool {
        self.cache.is_some() || !self.snapshots.is_empty()
    }
}

/// Timing knobs copied out of the client options.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub initialization_timeout: Duration,
    pub on_init_failure: InitFailure,
    pub checkpoint_interval: Duration,
    pub reconnect_delay: Duration,
    pub write_timeout: Duration,
    pub retry: RetryPolicy,
}

/// State shared between the orchestrator handle and its tasks.
struct Shared {
    state: ConfigState,
    phase: watch::Sender<SyncPhase>,
    stream_status: watch::Sender<StreamStatus>,
    updates: watch::Sender<u64>,
    stats: Arc<dyn StatsSink>,
}

impl Shared {
    fn apply(&self, origin: &str, deltas: Vec<Delta>) -> BatchOutcome {
        let outcome = self.state.apply_batch(deltas);
        tracing::debug!(
            source = origin,
            applied = outcome.applied,
            discarded = outcome.discarded,
            highwater = outcome.highwater,
            "applied batch",
        );
        if outcome.changed() {
            self.updates.send_replace(outcome.highwater);
        }
        outcome
    }

    fn load(&self, origin: &str, snapshot: SnapshotResponse) -> BatchOutcome {
        let outcome = self.apply(origin, snapshot.deltas);
        self.mark_ready(origin);
        outcome
    }

    fn mark_ready(&self, origin: &str) {
        let changed = self.phase.send_if_modified(|phase| {
            if matches!(phase, SyncPhase::Uninitialized | SyncPhase::Bootstrapping) {
                *phase = SyncPhase::Ready;
                true
            } else {
                false
            }
        });
        if changed {
            tracing::info!(
                source = origin,
                highwater = self.state.highwater_mark(),
                "config ready",
            );
        }
    }

    fn set_stream_status(&self, status: StreamStatus) {
        self.stream_status.send_replace(status);
    }
}

pub struct SyncOrchestrator {
    shared: Arc<Shared>,
    sources: Sources,
    timing: Timing,
    shutdown: broadcast::Sender<()>,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
    deadline: Mutex<Option<Instant>>,
}

impl SyncOrchestrator {
    pub fn new(namespace: &str, sources: Sources, timing: Timing) -> Self {
        let (shutdown, _) = broadcast::channel(4);
        let shared = Shared {
            state: ConfigState::new(namespace),
            phase: watch::channel(SyncPhase::Uninitialized).0,
            stream_status: watch::channel(StreamStatus::Idle).0,
            updates: watch::channel(0).0,
            stats: sources.stats.clone(),
        };
        Self {
            shared: Arc::new(shared),
            sources,
            timing,
            shutdown,
            tasks: Mutex::new(Vec::new()),
            deadline: Mutex::new(None),
        }
    }

    /// Spawn the background tasks. Must run inside a tokio runtime.
    pub fn start(&self) -> Result<(), ClientError> {
        let started = self.shared.phase.send_if_modified(|phase| {
            if *phase == SyncPhase::Uninitialized {
                *phase = SyncPhase::Bootstrapping;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(ClientError::AlreadyStarted);
        }
        *self.deadline.lock() = Some(Instant::now() + self.timing.initialization_timeout);

        if !self.sources.has_snapshot_sources() && self.sources.stream.is_none() {
            self.shared.mark_ready("local");
        }

        let (stream_go, stream_wait) = oneshot::channel::<()>();
        let mut tasks = self.tasks.lock();

        let snapshot_handle = {
            let shared = self.shared.clone();
            let sources = self.sources.clone();
            let timing = self.timing;
            let shutdown_rx = self.shutdown.subscribe();
            tokio::spawn(async move {
                snapshot_task(shared, sources, timing, stream_go, shutdown_rx).await;
            })
        };
        tasks.push(("snapshot", snapshot_handle));

        if let Some(stream) = self.sources.stream.clone() {
            let shared = self.shared.clone();
            let delay = self.timing.reconnect_delay;
            let shutdown_rx = self.shutdown.subscribe();
            let stream_handle = tokio::spawn(async move {
                stream_task(shared, stream, delay, stream_wait, shutdown_rx).await;
            });
            tasks.push(("stream", stream_handle));
        }

        tracing::debug!(
            namespace = %self.shared.state.namespace(),
            snapshot_sources = self.sources.snapshots.len(),
            cache = self.sources.cache.is_some(),
            stream = self.sources.stream.is_some(),
            "sync runtime started",
        );
        Ok(())
    }

    /// Signal every task to stop without waiting for them.
    pub fn request_stop(&self) {
        let _ = self.shutdown.send(());
    }

    /// Stop the tasks, closing any open stream, and wait for them to exit.
    pub async fn stop(&self) -> Result<(), ClientError> {
        self.request_stop();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        let mut first_err = None;
        for (task, handle) in tasks {
            if let Err(err) = handle_join(task, handle.await) {
                first_err.get_or_insert(err);
            }
        }
        self.shared.phase.send_replace(SyncPhase::Stopped);
        self.shared.stream_status.send_if_modified(|status| {
            if matches!(status, StreamStatus::Failed(_)) {
                false
            } else {
                *status = StreamStatus::Stopped;
                true
            }
        });
        first_err.map_or(Ok(()), Err)
    }

    /// Wait until the first source has succeeded or the initialization
    /// deadline passes.
    pub async fn wait_ready(&self, key: &str) -> Result<(), ClientError> {
        let mut phase = self.shared.phase.subscribe();
        let ready = |p: &SyncPhase| matches!(p, SyncPhase::Ready | SyncPhase::Stopped);
        if ready(&*phase.borrow_and_update()) {
            return Ok(());
        }
        let Some(deadline) = *self.deadline.lock() else {
            return Err(ClientError::NotStarted);
        };
        let timed_out = tokio::time::timeout_at(deadline, phase.wait_for(ready))
            .await
            .is_err();
        if !timed_out {
            return Ok(());
        }
        match self.timing.on_init_failure {
            InitFailure::Raise => Err(ClientError::InitializationTimeout {
                timeout: self.timing.initialization_timeout,
                key: key.to_string(),
            }),
            InitFailure::ReturnAbsent => {
                tracing::warn!(key, "initialization timed out; serving current snapshot");
                Ok(())
            }
        }
    }

    /// Send a write through the retry policy, then layer it over the store
    /// locally whatever the outcome. Transport errors still reach the caller.
    ///
    /// The local write never moves the highwater mark; it gives way once the
    /// server delivers its own version of the key.
    pub async fn upsert(&self, mut request: UpsertRequest) -> Result<u64, SyncError> {
        let raw_key = request.raw_key()?;
        let hint = self.shared.state.next_local_version();
        request.version_hint = hint;

        let sent: Result<UpsertAck, SyncError> = match &self.sources.writer {
            Some(writer) => {
                let reset_writer = writer.clone();
                let writer = writer.clone();
                let request = &request;
                self.timing
                    .retry
                    .run(
                        "upsert",
                        self.timing.write_timeout,
                        move || reset_writer.reset(),
                        move || {
                            let writer = writer.clone();
                            async move { writer.upsert(request).await }
                        },
                    )
                    .await
            }
            None => Ok(UpsertAck::default()),
        };

        let confirmed = match &sent {
            Ok(ack) => ack.version,
            Err(err) => {
                tracing::warn!(key = %raw_key, error = %err, "write not acknowledged; applied locally");
                None
            }
        };
        let version = confirmed.unwrap_or(hint);
        self.shared.state.apply_local(
            Delta::new(raw_key.clone(), version, request.value.clone()),
            confirmed,
        );
        if let Some(previous) = request.previous_key.as_deref() {
            if previous != raw_key {
                self.shared.state.remove(previous);
            }
        }
        tracing::debug!(key = %raw_key, version, confirmed = confirmed.is_some(), "local write");
        self.shared.updates.send_replace(self.shared.state.highwater_mark());
        self.shared.stats.increment(UPSERT);
        sent.map(|_| version)
    }

    pub fn state(&self) -> &ConfigState {
        &self.shared.state
    }

    pub fn phase(&self) -> SyncPhase {
        *self.shared.phase.borrow()
    }

    pub fn stream_status(&self) -> StreamStatus {
        self.shared.stream_status.borrow().clone()
    }

    pub fn updates(&self) -> watch::Receiver<u64> {
        self.shared.updates.subscribe()
    }
}

impl Drop for SyncOrchestrator {
    fn drop(&mut self) {
        self.request_stop();
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

async fn snapshot_task(
    shared: Arc<Shared>,
    sources: Sources,
    timing: Timing,
    stream_go: oneshot::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut stream_go = Some(stream_go);
    let mut attempt = 0u32;

    if sources.has_snapshot_sources() {
        loop {
            let loaded = tokio::select! {
                _ = shutdown_rx.recv() => return,
                loaded = bootstrap_once(&shared, &sources) => loaded,
            };
            if let Some(go) = stream_go.take() {
                let _ = go.send(());
            }
            if loaded {
                break;
            }
            attempt += 1;
            let sleep = timing.retry.backoff(attempt);
            tracing::warn!(
                attempt,
                retry_in_ms = sleep.as_millis() as u64,
                "no snapshot source succeeded",
            );
            tokio::select! {
                _ = shutdown_rx.recv() => return,
                _ = tokio::time::sleep(sleep) => {}
            }
        }
    }
    if let Some(go) = stream_go.take() {
        let _ = go.send(());
    }
    if sources.snapshots.is_empty() {
        return;
    }

    let period = timing.checkpoint_interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {
                if !fetch_remote(&shared, &sources).await {
                    tracing::warn!("checkpoint refresh failed on every source");
                }
            }
        }
    }
}

async fn bootstrap_once(shared: &Shared, sources: &Sources) -> bool {
    if let Some(cache) = &sources.cache {
        match cache.fetch().await {
            Ok(Some(snapshot)) => {
                shared.load("cache", snapshot);
                shared.stats.increment(CACHE_LOAD);
                return true;
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "cache load failed"),
        }
    }
    fetch_remote(shared, sources).await
}

/// Try each remote snapshot source in order; first success wins.
async fn fetch_remote(shared: &Shared, sources: &Sources) -> bool {
    for source in &sources.snapshots {
        match source.fetch().await {
            Ok(Some(snapshot)) => {
                let outcome = shared.load(source.name(), snapshot.clone());
                shared.stats.increment(CHECKPOINT_LOAD);
                tracing::info!(
                    source = %source.name(),
                    applied = outcome.applied,
                    highwater = outcome.highwater,
                    "loaded snapshot",
                );
                if let Some(cache) = &sources.cache {
                    if let Err(err) = cache.store(snapshot).await {
                        tracing::warn!(error = %err, "failed to persist snapshot cache");
                    }
                }
                return true;
            }
            Ok(None) => tracing::info!(source = %source.name(), "source unavailable"),
            Err(err) => {
                tracing::warn!(source = %source.name(), error = %err, "snapshot fetch failed");
                source.reset();
            }
        }
    }
    false
}

async fn stream_task(
    shared: Arc<Shared>,
    stream: Arc<dyn StreamSource>,
    reconnect_delay: Duration,
    go: oneshot::Receiver<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    tokio::select! {
        _ = shutdown_rx.recv() => return,
        released = go => {
            if released.is_err() {
                return;
            }
        }
    }

    let mut reconnecting = false;
    loop {
        shared.set_stream_status(if reconnecting {
            StreamStatus::Reconnecting
        } else {
            StreamStatus::Connecting
        });
        let start_at = shared.state.highwater_mark();
        shared.stats.increment(STREAM_START);

        let connected = tokio::select! {
            _ = shutdown_rx.recv() => break,
            connected = stream.connect(start_at) => connected,
        };

        let failure = match connected {
            Ok(mut conn) => {
                tracing::info!(source = %stream.name(), start_at, "stream connected");
                shared.set_stream_status(StreamStatus::Connected);
                let failure = loop {
                    let batch = tokio::select! {
                        _ = shutdown_rx.recv() => {
                            conn.close().await;
                            shared.set_stream_status(StreamStatus::Stopped);
                            return;
                        }
                        batch = conn.next_batch() => batch,
                    };
                    match batch {
                        Ok(Some(deltas)) => {
                            shared.apply("stream", deltas);
                            shared.mark_ready("stream");
                        }
                        Ok(None) => {
                            tracing::info!(source = %stream.name(), "stream closed by server");
                            break None;
                        }
                        Err(err) => break Some(err),
                    }
                };
                conn.close().await;
                failure
            }
            Err(err) => Some(err),
        };

        if let Some(err) = failure {
            if err.is_fatal() {
                tracing::error!(source = %stream.name(), error = %err, "stream stopped");
                shared.set_stream_status(StreamStatus::Failed(err.to_string()));
                return;
            }
            tracing::warn!(source = %stream.name(), error = %err, "stream error; will reconnect");
        }

        reconnecting = true;
        shared.set_stream_status(StreamStatus::Reconnecting);
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
    }
    shared.set_stream_status(StreamStatus::Stopped);
}

fn handle_join(
    task: &'static str,
    result: Result<(), tokio::task::JoinError>,
) -> Result<(), ClientError> {
    result.map_err(|err| ClientError::Join {
        task,
        message: err.to_string(),
    })
}

/// Install a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
/// `BEACON_LOG_FORMAT=json` switches to JSON lines. A second call is a no-op.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("BEACON_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let builder = fmt().with_env_filter(filter).with_target(false);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

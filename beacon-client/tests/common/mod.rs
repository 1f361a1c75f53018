//! In-memory sources and writers for driving the runtime in tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch, Notify};

use beacon_client::{Client, ClientBuilder};
use beacon_core::Delta;
use beacon_sync::{
    ConfigWriter, Options, SnapshotResponse, SnapshotSource, StreamConnection, StreamSource,
    SyncError, UpsertAck, UpsertRequest,
};

pub const SDK_KEY: &str = "1-test-secret-SDK";

pub fn options() -> Options {
    Options::default()
        .with_sdk_key(SDK_KEY)
        .with_initialization_timeout(Duration::from_secs(2))
        .with_write_timeout(Duration::from_secs(1))
}

pub fn builder(options: Options) -> ClientBuilder {
    Client::builder(options).network_defaults(false)
}

pub fn snapshot(highwater: u64, deltas: Vec<Delta>) -> Reply {
    Reply::Snapshot(SnapshotResponse::new(highwater, deltas))
}

fn status(code: u16) -> SyncError {
    SyncError::Status {
        url: "fake".into(),
        status: code,
    }
}

// ---------------------------------------------------------------------------
// Snapshot source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Reply {
    Snapshot(SnapshotResponse),
    Unavailable,
    Fail(u16),
}

impl Reply {
    fn into_result(self) -> Result<Option<SnapshotResponse>, SyncError> {
        match self {
            Reply::Snapshot(s) => Ok(Some(s)),
            Reply::Unavailable => Ok(None),
            Reply::Fail(code) => Err(status(code)),
        }
    }
}

/// Replies from `script` in order, then `steady` forever.
pub struct FakeSnapshot {
    name: String,
    script: Mutex<VecDeque<Reply>>,
    steady: Mutex<Reply>,
    gate: Option<Arc<Notify>>,
    fetches: AtomicUsize,
    resets: AtomicUsize,
}

impl FakeSnapshot {
    pub fn new(name: &str, steady: Reply) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            steady: Mutex::new(steady),
            gate: None,
            fetches: AtomicUsize::new(0),
            resets: AtomicUsize::new(0),
        }
    }

    pub fn then(self, reply: Reply) -> Self {
        self.script.lock().push_back(reply);
        self
    }

    /// Every fetch waits for one `notify_one` on the returned handle.
    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gate = Some(gate.clone());
        (self, gate)
    }

    pub fn set_steady(&self, reply: Reply) {
        *self.steady.lock() = reply;
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotSource for FakeSnapshot {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Option<SnapshotResponse>, SyncError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let scripted = self.script.lock().pop_front();
        let reply = match scripted {
            Some(reply) => reply,
            None => self.steady.lock().clone(),
        };
        reply.into_result()
    }

    fn reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Stream source
// ---------------------------------------------------------------------------

type Item = Result<Option<Vec<Delta>>, SyncError>;

/// Each successful connect opens a fresh channel the test pushes into.
pub struct FakeStream {
    starts: Mutex<Vec<u64>>,
    connect_failures: Mutex<VecDeque<u16>>,
    sender: Mutex<Option<mpsc::UnboundedSender<Item>>>,
    connections: watch::Sender<usize>,
}

impl FakeStream {
    pub fn new() -> Arc<Self> {
        Self::failing_first(&[])
    }

    /// The first connects fail with these HTTP statuses, in order.
    pub fn failing_first(statuses: &[u16]) -> Arc<Self> {
        Arc::new(Self {
            starts: Mutex::new(Vec::new()),
            connect_failures: Mutex::new(statuses.iter().copied().collect()),
            sender: Mutex::new(None),
            connections: watch::channel(0).0,
        })
    }

    /// `start_at` of every connect attempt, failed ones included.
    pub fn starts(&self) -> Vec<u64> {
        self.starts.lock().clone()
    }

    pub fn push(&self, deltas: Vec<Delta>) {
        if let Some(tx) = self.sender.lock().as_ref() {
            let _ = tx.send(Ok(Some(deltas)));
        }
    }

    pub fn fail(&self, code: u16) {
        if let Some(tx) = self.sender.lock().as_ref() {
            let _ = tx.send(Err(status(code)));
        }
    }

    /// Server-side close of the current connection.
    pub fn hang_up(&self) {
        self.sender.lock().take();
    }

    /// Wait until `n` connects have succeeded.
    pub async fn wait_connections(&self, n: usize) {
        let mut rx = self.connections.subscribe();
        let _ = rx.wait_for(|count| *count >= n).await;
    }
}

#[async_trait]
impl StreamSource for FakeStream {
    fn name(&self) -> &str {
        "fake-stream"
    }

    async fn connect(&self, start_at: u64) -> Result<Box<dyn StreamConnection>, SyncError> {
        self.starts.lock().push(start_at);
        if let Some(code) = self.connect_failures.lock().pop_front() {
            return Err(status(code));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *self.sender.lock() = Some(tx);
        self.connections.send_modify(|count| *count += 1);
        Ok(Box::new(FakeConnection { rx }))
    }
}

struct FakeConnection {
    rx: mpsc::UnboundedReceiver<Item>,
}

#[async_trait]
impl StreamConnection for FakeConnection {
    async fn next_batch(&mut self) -> Result<Option<Vec<Delta>>, SyncError> {
        match self.rx.recv().await {
            Some(item) => item,
            None => Ok(None),
        }
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub enum WriterMode {
    Ack(Option<u64>),
    Fail(u16),
}

pub struct FakeWriter {
    mode: Mutex<WriterMode>,
    requests: Mutex<Vec<UpsertRequest>>,
    resets: AtomicUsize,
}

impl FakeWriter {
    pub fn new(mode: WriterMode) -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(mode),
            requests: Mutex::new(Vec::new()),
            resets: AtomicUsize::new(0),
        })
    }

    pub fn set_mode(&self, mode: WriterMode) {
        *self.mode.lock() = mode;
    }

    pub fn requests(&self) -> Vec<UpsertRequest> {
        self.requests.lock().clone()
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigWriter for FakeWriter {
    async fn upsert(&self, request: &UpsertRequest) -> Result<UpsertAck, SyncError> {
        self.requests.lock().push(request.clone());
        let mode = *self.mode.lock();
        match mode {
            WriterMode::Ack(version) => Ok(UpsertAck { version }),
            WriterMode::Fail(code) => Err(status(code)),
        }
    }

    fn reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

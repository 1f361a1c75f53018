//! HTTP transports built on `ureq`.
//!
//! `ureq` is blocking, so request/response calls run on tokio's blocking
//! pool. The stream reader owns a dedicated thread for the life of the
//! connection and hands parsed batches to the async side over a bounded
//! channel. Reads on the stream socket time out, so a quiet or half-open
//! connection is always released.

use std::io::{BufRead, BufReader};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use beacon_core::Delta;

use crate::error::SyncError;
use crate::options::SdkKey;
use crate::payload::{SnapshotResponse, StreamBatch, UpsertAck, UpsertRequest};
use crate::source::{ConfigWriter, SnapshotSource, StreamConnection, StreamSource};

pub const SNAPSHOT_PATH: &str = "/api/v1/configs/0";
pub const WRITE_PATH: &str = "/api/v1/config-deltas";
pub const STREAM_PATH: &str = "/api/v1/stream/configs";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const STREAM_READ_TIMEOUT: Duration = Duration::from_secs(300);
const STREAM_BUFFER: usize = 16;

/// `Authorization` header value for `key`.
pub fn basic_auth(key: &SdkKey) -> String {
    let credentials = format!("authuser:{}", key.expose());
    format!("Basic {}", STANDARD.encode(credentials))
}

/// Join a base URL and an absolute path without doubling the slash.
pub fn endpoint(base: &str, path: &str) -> String {
    format!("{}{path}", base.trim_end_matches('/'))
}

fn map_ureq(url: &str, err: ureq::Error) -> SyncError {
    match err {
        ureq::Error::Status(status, _) => SyncError::Status {
            url: url.to_string(),
            status,
        },
        ureq::Error::Transport(transport) => SyncError::Transport {
            url: url.to_string(),
            message: transport.to_string(),
        },
    }
}

fn new_agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(CONNECT_TIMEOUT)
        .build()
}

/// One agent per stream connection, so nothing is pooled across reconnects.
fn stream_agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(CONNECT_TIMEOUT)
        .timeout_read(STREAM_READ_TIMEOUT)
        .build()
}

/// Shared agent plus credentials. `reset` swaps in a fresh agent, dropping
/// any pooled connections.
#[derive(Clone)]
pub struct HttpTransport {
    agent: Arc<Mutex<ureq::Agent>>,
    auth: Arc<str>,
}

impl HttpTransport {
    pub fn new(key: &SdkKey) -> Self {
        Self {
            agent: Arc::new(Mutex::new(new_agent())),
            auth: Arc::from(basic_auth(key)),
        }
    }

    fn agent(&self) -> ureq::Agent {
        self.agent.lock().clone()
    }

    pub fn reset(&self) {
        *self.agent.lock() = new_agent();
    }

    fn get_text(&self, url: &str) -> Result<String, SyncError> {
        let response = self
            .agent()
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .set("Authorization", &self.auth)
            .set("Accept", "application/json")
            .call()
            .map_err(|e| map_ureq(url, e))?;
        response.into_string().map_err(|e| SyncError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    fn post_json(&self, url: &str, body: serde_json::Value) -> Result<String, SyncError> {
        let response = self
            .agent()
            .post(url)
            .timeout(REQUEST_TIMEOUT)
            .set("Authorization", &self.auth)
            .send_json(body)
            .map_err(|e| map_ureq(url, e))?;
        response.into_string().map_err(|e| SyncError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpSnapshotSource {
    url: String,
    transport: HttpTransport,
}

impl HttpSnapshotSource {
    pub fn new(base: &str, transport: HttpTransport) -> Self {
        Self {
            url: endpoint(base, SNAPSHOT_PATH),
            transport,
        }
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    fn name(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<Option<SnapshotResponse>, SyncError> {
        let url = self.url.clone();
        let transport = self.transport.clone();
        let body = tokio::task::spawn_blocking(move || transport.get_text(&url)).await??;
        if body.trim().is_empty() {
            tracing::warn!(url = %self.url, "Response body is empty");
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&body)?))
    }

    fn reset(&self) {
        self.transport.reset();
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpConfigWriter {
    url: String,
    transport: HttpTransport,
}

impl HttpConfigWriter {
    pub fn new(base: &str, transport: HttpTransport) -> Self {
        Self {
            url: endpoint(base, WRITE_PATH),
            transport,
        }
    }
}

#[async_trait]
impl ConfigWriter for HttpConfigWriter {
    async fn upsert(&self, request: &UpsertRequest) -> Result<UpsertAck, SyncError> {
        let body = serde_json::to_value(request)?;
        let url = self.url.clone();
        let transport = self.transport.clone();
        let reply = tokio::task::spawn_blocking(move || transport.post_json(&url, body)).await??;
        if reply.trim().is_empty() {
            return Ok(UpsertAck::default());
        }
        Ok(serde_json::from_str(&reply)?)
    }

    fn reset(&self) {
        self.transport.reset();
    }
}

// ---------------------------------------------------------------------------
// Stream
// ---------------------------------------------------------------------------

/// Rotates through the stream URLs, one per connection attempt.
#[derive(Debug)]
pub struct HttpStreamSource {
    urls: Vec<String>,
    next: AtomicUsize,
    transport: HttpTransport,
}

impl HttpStreamSource {
    pub fn new(stream_bases: &[String], transport: HttpTransport) -> Self {
        Self {
            urls: stream_bases
                .iter()
                .map(|base| endpoint(base, STREAM_PATH))
                .collect(),
            next: AtomicUsize::new(0),
            transport,
        }
    }

    fn next_url(&self) -> Option<String> {
        if self.urls.is_empty() {
            return None;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.urls.len();
        Some(self.urls[index].clone())
    }
}

#[async_trait]
impl StreamSource for HttpStreamSource {
    fn name(&self) -> &str {
        "http-stream"
    }

    async fn connect(&self, start_at: u64) -> Result<Box<dyn StreamConnection>, SyncError> {
        let url = self
            .next_url()
            .ok_or_else(|| SyncError::Config("no stream URL configured".into()))?;
        let auth = self.transport.auth.clone();
        let open_url = url.clone();
        let response = tokio::task::spawn_blocking(move || {
            stream_agent()
                .get(&open_url)
                .set("Authorization", &auth)
                .set("Accept", "text/event-stream")
                .set("Last-Event-ID", &start_at.to_string())
                .call()
                .map_err(|e| map_ureq(&open_url, e))
        })
        .await??;

        tracing::debug!(url = %url, start_at, "stream connected");
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let closed = Arc::new(AtomicBool::new(false));
        let reader_closed = closed.clone();
        let body = response.into_reader();
        let reader_url = url.clone();
        std::thread::Builder::new()
            .name("beacon-stream".into())
            .spawn(move || read_stream(reader_url, body, tx, reader_closed))
            .map_err(|e| SyncError::Transport {
                url,
                message: e.to_string(),
            })?;
        Ok(Box::new(HttpStreamConnection { rx, closed }))
    }
}

type BatchResult = Result<Vec<Delta>, SyncError>;

/// Forward parsed batches until the body ends, a line fails, the receiver
/// goes away or `closed` is set. Returning drops the body and its socket.
fn read_stream(
    url: String,
    body: impl std::io::Read,
    tx: mpsc::Sender<BatchResult>,
    closed: Arc<AtomicBool>,
) {
    let reader = BufReader::new(body);
    for line in reader.lines() {
        if closed.load(Ordering::Acquire) {
            tracing::debug!(url = %url, "stream reader closed");
            return;
        }
        let item = match line {
            Ok(line) => match StreamBatch::parse_line(&line) {
                Ok(Some(batch)) => Ok(batch.deltas),
                Ok(None) => continue,
                Err(err) => Err(err),
            },
            Err(err) => Err(SyncError::Transport {
                url: url.clone(),
                message: err.to_string(),
            }),
        };
        let failed = item.is_err();
        // Receiver gone means the connection was closed.
        if tx.blocking_send(item).is_err() || failed {
            return;
        }
    }
}

struct HttpStreamConnection {
    rx: mpsc::Receiver<BatchResult>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl StreamConnection for HttpStreamConnection {
    async fn next_batch(&mut self) -> Result<Option<Vec<Delta>>, SyncError> {
        match self.rx.recv().await {
            Some(batch) => batch.map(Some),
            None => Ok(None),
        }
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::Release);
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_header_is_basic_authuser() {
        let key = SdkKey::parse("1-dev-secret-SDK").expect("key");
        let expected = format!("Basic {}", STANDARD.encode("authuser:1-dev-secret-SDK"));
        assert_eq!(basic_auth(&key), expected);
    }

    #[test]
    fn endpoints_join_cleanly() {
        assert_eq!(
            endpoint("https://primary.beacon.cloud/", SNAPSHOT_PATH),
            "https://primary.beacon.cloud/api/v1/configs/0"
        );
        assert_eq!(
            endpoint("http://localhost:8080", WRITE_PATH),
            "http://localhost:8080/api/v1/config-deltas"
        );
    }

    #[test]
    fn stream_urls_rotate() {
        let key = SdkKey::parse("1-dev-secret-SDK").expect("key");
        let source = HttpStreamSource::new(
            &["https://a".to_string(), "https://b".to_string()],
            HttpTransport::new(&key),
        );
        let picked: Vec<String> = (0..3).filter_map(|_| source.next_url()).collect();
        assert_eq!(
            picked,
            [
                "https://a/api/v1/stream/configs",
                "https://b/api/v1/stream/configs",
                "https://a/api/v1/stream/configs",
            ]
        );
    }

    #[tokio::test]
    async fn reader_forwards_batches_and_stops_on_garbage() {
        let body = concat!(
            ": hello\n",
            "\n",
            r#"data: {"deltas":[{"key":"x","version":1,"value":{"type":"string","value":"v1"}}]}"#,
            "\n",
            "garbage\n",
            r#"{"deltas":[]}"#,
            "\n",
        );
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let closed = Arc::new(AtomicBool::new(false));
        let reader_closed = closed.clone();
        let handle = tokio::task::spawn_blocking(move || {
            read_stream(
                "test".into(),
                std::io::Cursor::new(body.as_bytes().to_vec()),
                tx,
                reader_closed,
            )
        });
        let mut conn = HttpStreamConnection { rx, closed };
        let first = conn.next_batch().await.expect("batch").expect("some");
        assert_eq!(first, vec![Delta::new("x", 1, "v1")]);
        assert!(conn.next_batch().await.is_err());
        assert!(conn.next_batch().await.expect("closed").is_none());
        handle.await.expect("reader");
    }

    /// Endless keepalive comments; records when the reader drops it.
    struct Keepalive {
        dropped: Arc<AtomicBool>,
    }

    impl std::io::Read for Keepalive {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            std::thread::sleep(Duration::from_millis(5));
            let line = b": ping\n";
            let n = line.len().min(buf.len());
            buf[..n].copy_from_slice(&line[..n]);
            Ok(n)
        }
    }

    impl Drop for Keepalive {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn close_releases_a_quiet_stream() {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let closed = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(AtomicBool::new(false));
        let body = Keepalive {
            dropped: dropped.clone(),
        };
        let reader_closed = closed.clone();
        let reader = std::thread::spawn(move || read_stream("test".into(), body, tx, reader_closed));

        let mut conn = HttpStreamConnection { rx, closed };
        conn.close().await;
        reader.join().expect("reader thread");
        assert!(dropped.load(Ordering::SeqCst), "body dropped with the reader");
    }
}

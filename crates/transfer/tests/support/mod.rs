//! Scripted in-process transport for manager tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use content_transfer::fs::BoxFuture;
use content_transfer::transport::{ByteStream, FetchResponse, UploadRequest};
use content_transfer::{RequestId, TransferEvent, Transport, TransportError};
use futures_util::StreamExt;
use tokio::sync::{Notify, mpsc};

type Chunk = Result<Vec<u8>, TransportError>;

/// What a fetched URI does.
#[derive(Clone)]
pub enum Script {
    /// Serves the whole body at once.
    Body(Vec<u8>),
    /// Serves `first`, then waits for `release` before finishing.
    Hold {
        first: Vec<u8>,
        total: u64,
        release: Arc<Notify>,
    },
    /// Never sends a byte.
    Stall,
    /// Answers with an HTTP error status.
    Fail(u16),
}

#[derive(Default)]
struct Counters {
    live: AtomicUsize,
    peak: AtomicUsize,
}

/// Decrements the live count when the body stream is dropped.
struct Live(Arc<Counters>);

impl Live {
    fn enter(counters: &Arc<Counters>) -> Self {
        let now = counters.live.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak.fetch_max(now, Ordering::SeqCst);
        Live(Arc::clone(counters))
    }
}

impl Drop for Live {
    fn drop(&mut self) {
        self.0.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Uploaded {
    pub uri: String,
    pub replace: bool,
    pub body: Vec<u8>,
}

#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, Script>>,
    fetched: Mutex<Vec<String>>,
    uploads: Mutex<Vec<Uploaded>>,
    counters: Arc<Counters>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, uri: &str, script: Script) {
        self.scripts.lock().unwrap().insert(uri.to_string(), script);
    }

    /// URIs in the order their fetches started.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<Uploaded> {
        self.uploads.lock().unwrap().clone()
    }

    /// Highest number of body streams alive at once.
    pub fn peak(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    /// Waits until `count` fetches have started.
    pub async fn wait_fetched(&self, count: usize) {
        eventually(|| self.fetched.lock().unwrap().len() >= count).await;
    }
}

impl Transport for ScriptedTransport {
    fn fetch<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, Result<FetchResponse, TransportError>> {
        Box::pin(async move {
            let script = self
                .scripts
                .lock()
                .unwrap()
                .get(uri)
                .cloned()
                .unwrap_or(Script::Fail(404));
            self.fetched.lock().unwrap().push(uri.to_string());

            let live = Live::enter(&self.counters);
            let (total_size, body): (Option<u64>, ByteStream) = match script {
                Script::Body(bytes) => {
                    let total = bytes.len() as u64;
                    let chunks = vec![Ok::<_, TransportError>(bytes)];
                    let stream = futures_util::stream::iter(chunks).map(move |chunk| {
                        let _alive = &live;
                        chunk
                    });
                    (Some(total), Box::pin(stream) as ByteStream)
                }
                Script::Hold {
                    first,
                    total,
                    release,
                } => {
                    let head = futures_util::stream::iter(vec![Ok::<_, TransportError>(first)]);
                    let tail = futures_util::stream::once(async move {
                        release.notified().await;
                        drop(live);
                        Ok::<_, TransportError>(Vec::new())
                    });
                    (Some(total), Box::pin(head.chain(tail)) as ByteStream)
                }
                Script::Stall => {
                    let stream = futures_util::stream::pending::<Chunk>();
                    let stream = stream.map(move |chunk| {
                        let _alive = &live;
                        chunk
                    });
                    (None, Box::pin(stream) as ByteStream)
                }
                Script::Fail(status) => {
                    return Err(TransportError::Server {
                        status,
                        body: format!("scripted {status}"),
                    });
                }
            };
            Ok(FetchResponse { total_size, body })
        })
    }

    fn upload(&self, request: UploadRequest) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            let UploadRequest {
                uri, replace, body, ..
            } = request;
            let mut body = body;
            let mut data = Vec::new();
            while let Some(chunk) = body.next().await {
                data.extend_from_slice(&chunk?);
            }
            self.uploads.lock().unwrap().push(Uploaded {
                uri,
                replace,
                body: data,
            });
            Ok(())
        })
    }
}

/// Polls `check` until it holds or five seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Next non-progress event.
pub async fn next_terminal(rx: &mut mpsc::UnboundedReceiver<TransferEvent>) -> TransferEvent {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no event in time")
            .expect("event channel closed");
        if event.is_terminal() {
            return event;
        }
    }
}

/// The next `count` terminal events, in arrival order.
pub async fn terminals_for(
    rx: &mut mpsc::UnboundedReceiver<TransferEvent>,
    count: usize,
) -> Vec<TransferEvent> {
    let mut out = Vec::with_capacity(count);
    while out.len() < count {
        out.push(next_terminal(rx).await);
    }
    out
}

/// Asserts no terminal event shows up within `wait`.
pub async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<TransferEvent>, wait: Duration) {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Err(_) | Ok(None) => return,
            Ok(Some(event)) if event.is_terminal() => {
                panic!("unexpected terminal event {event:?}")
            }
            Ok(Some(_)) => {}
        }
    }
}

pub fn ids(events: &[TransferEvent]) -> Vec<RequestId> {
    events.iter().map(TransferEvent::request_id).collect()
}

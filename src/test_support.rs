//! In-process HTTP server used by the transfer tests.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use bytes::Bytes;
use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::error::Error;
use crate::signal::ProgressSignal;

pub const FILE_PATH: &str = "/files/image.img";
pub const REDIRECT_PATH: &str = "/redirect/image.img";
pub const BROKEN_PATH: &str = "/broken/image.img";
pub const FLAKY_PATH: &str = "/flaky/image.img";
pub const ROOT_PATH: &str = "/";

/// Deterministic body of `len` bytes.
pub fn test_body(len: usize) -> Vec<u8> {
    #[allow(clippy::cast_possible_truncation)]
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub body: Bytes,
    pub honor_range: bool,
    pub advertise_length: bool,
    pub head_supported: bool,
    pub content_disposition: Option<String>,
    /// Drop the connection halfway through every 206 body.
    pub truncate_ranges: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            body: Bytes::from(test_body(100)),
            honor_range: true,
            advertise_length: true,
            head_supported: true,
            content_disposition: None,
            truncate_ranges: false,
        }
    }
}

struct ServerState {
    options: ServerOptions,
    gets: AtomicUsize,
    heads: AtomicUsize,
    bytes_served: AtomicU64,
    ranges: Mutex<Vec<String>>,
}

pub struct TestServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(options: ServerOptions) -> Self {
        let state = Arc::new(ServerState {
            options,
            gets: AtomicUsize::new(0),
            heads: AtomicUsize::new(0),
            bytes_served: AtomicU64::new(0),
            ranges: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route(FILE_PATH, get(serve_file))
            .route(ROOT_PATH, get(serve_file))
            .route(REDIRECT_PATH, get(|| async { Redirect::temporary(FILE_PATH) }))
            .route(BROKEN_PATH, get(serve_broken))
            .route(FLAKY_PATH, get(serve_flaky))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn file_url(&self) -> String {
        self.url(FILE_PATH)
    }

    pub fn body(&self) -> &[u8] {
        &self.state.options.body
    }

    pub fn gets(&self) -> usize {
        self.state.gets.load(Ordering::SeqCst)
    }

    pub fn heads(&self) -> usize {
        self.state.heads.load(Ordering::SeqCst)
    }

    pub fn bytes_served(&self) -> u64 {
        self.state.bytes_served.load(Ordering::SeqCst)
    }

    pub fn ranges(&self) -> Vec<String> {
        self.state.ranges.lock().unwrap().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn range_start(value: &str) -> Option<usize> {
    value
        .strip_prefix("bytes=")?
        .strip_suffix('-')?
        .parse()
        .ok()
}

async fn serve_file(
    State(state): State<Arc<ServerState>>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let options = &state.options;
    if method == Method::HEAD {
        state.heads.fetch_add(1, Ordering::SeqCst);
        if !options.head_supported {
            return StatusCode::METHOD_NOT_ALLOWED.into_response();
        }
    } else {
        state.gets.fetch_add(1, Ordering::SeqCst);
    }

    let total = options.body.len();
    let mut status = StatusCode::OK;
    let mut body = options.body.clone();
    let mut builder = Response::builder();

    if let Some(range) = headers.get(RANGE).and_then(|v| v.to_str().ok()) {
        state.ranges.lock().unwrap().push(range.to_string());
        if options.honor_range
            && let Some(start) = range_start(range)
            && start < total
        {
            status = StatusCode::PARTIAL_CONTENT;
            body = options.body.slice(start..);
            builder = builder.header(CONTENT_RANGE, format!("bytes {start}-{}/{total}", total - 1));
        }
    }

    if let Some(disposition) = &options.content_disposition {
        builder = builder.header(CONTENT_DISPOSITION, disposition.as_str());
    }

    if method != Method::HEAD {
        state
            .bytes_served
            .fetch_add(body.len() as u64, Ordering::SeqCst);
    }

    let body = if status == StatusCode::PARTIAL_CONTENT && options.truncate_ranges {
        builder = builder.header(CONTENT_LENGTH, body.len());
        truncated_body(body)
    } else if options.advertise_length {
        builder = builder.header(CONTENT_LENGTH, body.len());
        Body::from(body)
    } else {
        Body::from_stream(futures::stream::iter([Ok::<_, std::io::Error>(body)]))
    };

    builder.status(status).body(body).unwrap()
}

/// Sends the first half of `body`, then fails the stream.
///
/// The failure is delayed so the headers and the first half reach the
/// client before the connection is dropped.
fn truncated_body(body: Bytes) -> Body {
    let half = body.slice(..body.len() / 2);
    let stream = futures::stream::iter([Ok(half)]).chain(futures::stream::once(async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Err::<Bytes, _>(std::io::Error::other("connection reset by test server"))
    }));
    Body::from_stream(stream)
}

async fn serve_broken(State(state): State<Arc<ServerState>>, method: Method) -> StatusCode {
    if method != Method::HEAD {
        state.gets.fetch_add(1, Ordering::SeqCst);
    }
    StatusCode::INTERNAL_SERVER_ERROR
}

/// Advertises the full body but drops the connection halfway through it.
async fn serve_flaky(State(state): State<Arc<ServerState>>, method: Method) -> Response {
    let body = state.options.body.clone();
    if method == Method::HEAD {
        return Response::builder()
            .header(CONTENT_LENGTH, body.len())
            .body(Body::empty())
            .unwrap();
    }
    state.gets.fetch_add(1, Ordering::SeqCst);

    Response::builder()
        .header(CONTENT_LENGTH, body.len())
        .body(truncated_body(body))
        .unwrap()
}

/// Reads both queues of a finished transfer to the end.
pub async fn drain(signal: ProgressSignal) -> (Vec<u64>, Vec<Error>) {
    let (mut bytes_rx, mut errors_rx) = signal.into_parts();
    let mut bytes = Vec::new();
    while let Some(n) = bytes_rx.recv().await {
        bytes.push(n);
    }
    let mut errors = Vec::new();
    while let Some(e) = errors_rx.recv().await {
        errors.push(e);
    }
    (bytes, errors)
}

/// Observer that records what it was told.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    pub starts: Mutex<Vec<(String, u64)>>,
    pub bytes: AtomicU64,
    pub cache_hits: AtomicUsize,
    pub corrupted: Mutex<Vec<(u64, u64)>>,
    pub completes: AtomicUsize,
    pub errors: Mutex<Vec<String>>,
}

impl RecordingProgress {
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::SeqCst)
    }

    pub fn completes(&self) -> usize {
        self.completes.load(Ordering::SeqCst)
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl crate::progress::TransferProgress for RecordingProgress {
    fn on_start(&self, path: &Path, total: u64) {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        self.starts.lock().unwrap().push((name, total));
    }

    fn on_progress(&self, _path: &Path, bytes_delta: u64) {
        self.bytes.fetch_add(bytes_delta, Ordering::SeqCst);
    }

    fn on_cache_hit(&self, _path: &Path, _size: u64) {
        self.cache_hits.fetch_add(1, Ordering::SeqCst);
    }

    fn on_corrupted(&self, _path: &Path, local: u64, remote: u64) {
        self.corrupted.lock().unwrap().push((local, remote));
    }

    fn on_complete(&self, _path: &Path, _outcome: &crate::progress::TransferOutcome) {
        self.completes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_error(&self, _path: &Path, error: &str) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}

//! In-process upload server for integration tests.
//!
//! Tracks one confirmed offset per session the way a real server does, and
//! lets tests queue faults for the chunk at a given offset.
//! Note: #[allow(dead_code)] because each test file compiles common/ separately.

#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chunklift_client::UploaderConfig;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Request timeout used by test uploaders; a stall must outlast it.
pub const TEST_REQUEST_TIMEOUT_MS: u64 = 300;

pub fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

/// What the server does to the next attempt at a chunk offset.
#[derive(Clone, Debug)]
pub enum Fault {
    /// Hold the request past the client's timeout.
    Stall,
    /// Answer with this status and `success:false`.
    Status(u16),
    /// Answer 200 with a body that is not a protocol response.
    Garbage,
    /// Store the chunk, then hold the response past the client's timeout.
    CommitThenStall,
}

#[derive(Debug, Default)]
pub struct SessionRecord {
    pub device_id: String,
    pub total_size: u64,
    pub hash: Option<String>,
    pub received: Vec<u8>,
    pub finalized: bool,
}

#[derive(Debug, Default)]
pub struct ServerState {
    pub sessions: HashMap<String, SessionRecord>,
    /// Accepted chunks as (offset, length), in arrival order.
    pub chunk_log: Vec<(u64, u64)>,
    /// Attempts per chunk offset, including faulted ones.
    pub attempts: HashMap<u64, u32>,
    pub faults: HashMap<u64, VecDeque<Fault>>,
    pub status_queries: u32,
    pub finalize_calls: u32,
    /// Result reported by finalize.
    pub verify: bool,
    next_id: u32,
}

pub type SharedState = Arc<Mutex<ServerState>>;

pub struct FakeUploadServer {
    pub addr: SocketAddr,
    pub state: SharedState,
}

impl FakeUploadServer {
    pub async fn start() -> Self {
        let state: SharedState = Arc::new(Mutex::new(ServerState {
            verify: true,
            ..Default::default()
        }));

        let router = Router::new()
            .route("/upload/init", post(init))
            .route("/upload/chunk", post(chunk))
            .route("/upload/status", get(status))
            .route("/upload/finalize", post(finalize))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Failed to read local address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Self { addr, state }
    }

    /// Uploader config pointing at this server with fast retries.
    pub fn config(&self, device_id: &str) -> UploaderConfig {
        UploaderConfig {
            retry_delay_ms: 10,
            request_timeout_ms: Some(TEST_REQUEST_TIMEOUT_MS),
            memory_diagnostics: false,
            ..UploaderConfig::new("127.0.0.1", self.addr.port(), device_id)
        }
    }

    pub fn inject(&self, offset: u64, faults: impl IntoIterator<Item = Fault>) {
        let mut state = self.state.lock().unwrap();
        state.faults.entry(offset).or_default().extend(faults);
    }

    /// Register a session directly, as if an earlier run had created it.
    pub fn seed_session(&self, id: &str, total_size: u64, received: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.sessions.insert(
            id.to_string(),
            SessionRecord {
                device_id: "seeded".to_string(),
                total_size,
                received: received.to_vec(),
                ..Default::default()
            },
        );
    }

    pub fn chunk_log(&self) -> Vec<(u64, u64)> {
        self.state.lock().unwrap().chunk_log.clone()
    }

    pub fn attempts_at(&self, offset: u64) -> u32 {
        self.state
            .lock()
            .unwrap()
            .attempts
            .get(&offset)
            .copied()
            .unwrap_or(0)
    }

    pub fn received(&self, id: &str) -> Vec<u8> {
        self.state
            .lock()
            .unwrap()
            .sessions
            .get(id)
            .map(|s| s.received.clone())
            .unwrap_or_default()
    }

    pub fn clear_log(&self) {
        let mut state = self.state.lock().unwrap();
        state.chunk_log.clear();
        state.attempts.clear();
    }
}

/// Deterministic payload of `len` bytes.
pub fn frame(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn reply(status: StatusCode, body: Value) -> (StatusCode, String) {
    (status, body.to_string())
}

async fn init(State(state): State<SharedState>, Json(req): Json<Value>) -> (StatusCode, String) {
    let Some(total_size) = req["totalSize"].as_u64() else {
        return reply(StatusCode::BAD_REQUEST, json!({ "success": false }));
    };
    let mut state = state.lock().unwrap();
    state.next_id += 1;
    let id = format!("sess-{:04}", state.next_id);
    state.sessions.insert(
        id.clone(),
        SessionRecord {
            device_id: req["deviceId"].as_str().unwrap_or_default().to_string(),
            total_size,
            hash: req["hash"].as_str().map(str::to_string),
            ..Default::default()
        },
    );
    reply(StatusCode::OK, json!({ "sessionId": id, "success": true }))
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.parse().ok()
}

async fn chunk(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let (Some(id), Some(offset), Some(length)) = (
        headers
            .get("x-session-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        header_u64(&headers, "x-chunk-offset"),
        header_u64(&headers, "x-chunk-length"),
    ) else {
        return reply(StatusCode::BAD_REQUEST, json!({ "success": false }));
    };

    let fault = {
        let mut state = state.lock().unwrap();
        *state.attempts.entry(offset).or_default() += 1;
        state.faults.get_mut(&offset).and_then(VecDeque::pop_front)
    };
    let mut stall_after_commit = false;
    match fault {
        Some(Fault::Stall) => {
            tokio::time::sleep(Duration::from_millis(TEST_REQUEST_TIMEOUT_MS * 5)).await;
            return reply(StatusCode::GATEWAY_TIMEOUT, json!({ "success": false }));
        }
        Some(Fault::Status(code)) => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return reply(status, json!({ "success": false }));
        }
        Some(Fault::Garbage) => {
            return (StatusCode::OK, "<html>upstream reset</html>".to_string());
        }
        Some(Fault::CommitThenStall) => stall_after_commit = true,
        None => {}
    }

    let response = {
        let mut state = state.lock().unwrap();
        accept_chunk(&mut state, &id, offset, length, &body)
    };
    if stall_after_commit {
        tokio::time::sleep(Duration::from_millis(TEST_REQUEST_TIMEOUT_MS * 5)).await;
        return reply(StatusCode::GATEWAY_TIMEOUT, json!({ "success": false }));
    }
    response
}

fn accept_chunk(
    state: &mut ServerState,
    id: &str,
    offset: u64,
    length: u64,
    body: &[u8],
) -> (StatusCode, String) {
    let Some(session) = state.sessions.get_mut(id) else {
        return reply(StatusCode::NOT_FOUND, json!({ "success": false }));
    };
    let confirmed = session.received.len() as u64;
    if offset != confirmed
        || length != body.len() as u64
        || confirmed + length > session.total_size
    {
        return reply(
            StatusCode::CONFLICT,
            json!({ "success": false, "resumeOffset": confirmed }),
        );
    }
    session.received.extend_from_slice(body);
    let resume_offset = session.received.len() as u64;
    state.chunk_log.push((offset, length));
    reply(
        StatusCode::OK,
        json!({ "success": true, "resumeOffset": resume_offset }),
    )
}

async fn status(
    State(state): State<SharedState>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    let mut state = state.lock().unwrap();
    state.status_queries += 1;
    let confirmed = params
        .get("sessionId")
        .and_then(|id| state.sessions.get(id))
        .map(|s| s.received.len() as u64);
    match confirmed {
        Some(confirmed) => reply(
            StatusCode::OK,
            json!({ "success": true, "resumeOffset": confirmed }),
        ),
        None => reply(StatusCode::NOT_FOUND, json!({ "success": false })),
    }
}

async fn finalize(
    State(state): State<SharedState>,
    Json(req): Json<Value>,
) -> (StatusCode, String) {
    let mut state = state.lock().unwrap();
    state.finalize_calls += 1;
    let verify = state.verify;
    let id = req["sessionId"].as_str().unwrap_or_default();
    let Some(session) = state.sessions.get_mut(id) else {
        return reply(StatusCode::NOT_FOUND, json!({ "success": false }));
    };
    let verified = verify && session.received.len() as u64 == session.total_size;
    session.finalized = verified;
    reply(
        StatusCode::OK,
        json!({ "success": true, "verified": verified }),
    )
}

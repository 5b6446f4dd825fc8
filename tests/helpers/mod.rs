//! In-process mock of the generation service for integration tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

/// Fields captured from one multipart submission.
#[derive(Debug, Default, Clone)]
pub struct CapturedSubmission {
    pub text_fields: Vec<(String, String)>,
    /// (field name, file name) pairs.
    pub file_fields: Vec<(String, String)>,
    pub shop: Option<String>,
}

impl CapturedSubmission {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.text_fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.text_fields.iter().any(|(field, _)| field == name)
            || self.file_fields.iter().any(|(field, _)| field == name)
    }
}

/// Scriptable state backing the mock service.
pub struct MockState {
    pub submit_status: Mutex<u16>,
    pub submit_body: Mutex<Value>,
    pub submit_requests: AtomicUsize,
    pub captured: Mutex<Option<CapturedSubmission>>,

    /// Scripted status responses, consumed front to back.
    pub statuses: Mutex<VecDeque<(u16, Value)>>,
    /// Served once the script runs dry.
    pub fallback_status: Mutex<(u16, Value)>,
    pub status_requests: AtomicUsize,

    pub history_body: Mutex<Value>,
    pub history_requests: AtomicUsize,

    /// When set, requests must carry this session token (or an accepted
    /// bearer token) to avoid a 401.
    pub required_session: Mutex<Option<String>>,
    pub accepted_bearer: Mutex<Option<String>>,

    pub asset_status: Mutex<u16>,
    pub asset_body: Mutex<Vec<u8>>,
    pub asset_requests: AtomicUsize,

    pub proxy_body: Mutex<Vec<u8>>,
    pub proxy_requests: AtomicUsize,
}

impl MockState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            submit_status: Mutex::new(202),
            submit_body: Mutex::new(json!({"jobId": "job-1"})),
            submit_requests: AtomicUsize::new(0),
            captured: Mutex::new(None),
            statuses: Mutex::new(VecDeque::new()),
            fallback_status: Mutex::new((200, json!({"status": "pending"}))),
            status_requests: AtomicUsize::new(0),
            history_body: Mutex::new(json!({"success": true, "data": []})),
            history_requests: AtomicUsize::new(0),
            required_session: Mutex::new(None),
            accepted_bearer: Mutex::new(None),
            asset_status: Mutex::new(200),
            asset_body: Mutex::new(b"png-bytes".to_vec()),
            asset_requests: AtomicUsize::new(0),
            proxy_body: Mutex::new(b"proxied-bytes".to_vec()),
            proxy_requests: AtomicUsize::new(0),
        })
    }

    pub fn set_submit(&self, status: u16, body: Value) {
        *self.submit_status.lock().unwrap() = status;
        *self.submit_body.lock().unwrap() = body;
    }

    pub fn script_status(&self, status: u16, body: Value) {
        self.statuses.lock().unwrap().push_back((status, body));
    }

    pub fn set_fallback_status(&self, status: u16, body: Value) {
        *self.fallback_status.lock().unwrap() = (status, body);
    }
}

/// Spawn the mock service on an ephemeral port, returning its base URL.
pub async fn spawn_mock(state: Arc<MockState>) -> String {
    let app = Router::new()
        .route("/api/tryon/generate", post(submit_handler))
        .route("/api/tryon/status/{job_id}", get(status_handler))
        .route("/api/tryon/customer", get(history_handler))
        .route("/api/proxy-image", get(proxy_handler))
        .route("/asset", get(asset_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock listener");
    let addr = listener.local_addr().expect("mock addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock server");
    });
    format!("http://{addr}")
}

fn authorized(state: &MockState, headers: &HeaderMap) -> bool {
    let Some(required) = state.required_session.lock().unwrap().clone() else {
        return true;
    };
    let session = headers
        .get("x-tryon-session")
        .and_then(|value| value.to_str().ok());
    if session == Some(required.as_str()) {
        return true;
    }
    if let Some(bearer) = state.accepted_bearer.lock().unwrap().clone() {
        let authorization = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok());
        if authorization == Some(format!("Bearer {bearer}").as_str()) {
            return true;
        }
    }
    false
}

async fn submit_handler(
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    state.submit_requests.fetch_add(1, Ordering::SeqCst);
    if !authorized(&state, &headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({}))).into_response();
    }

    let mut captured = CapturedSubmission {
        shop: params.get("shop").cloned(),
        ..Default::default()
    };
    while let Some(field) = multipart.next_field().await.expect("multipart field") {
        let name = field.name().unwrap_or("").to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let _ = field.bytes().await.expect("file bytes");
                captured.file_fields.push((name, file_name));
            }
            None => {
                let text = field.text().await.expect("text field");
                captured.text_fields.push((name, text));
            }
        }
    }
    *state.captured.lock().unwrap() = Some(captured);

    let status = *state.submit_status.lock().unwrap();
    let body = state.submit_body.lock().unwrap().clone();
    (StatusCode::from_u16(status).unwrap(), Json(body)).into_response()
}

async fn status_handler(
    State(state): State<Arc<MockState>>,
    Path(_job_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.status_requests.fetch_add(1, Ordering::SeqCst);
    if !authorized(&state, &headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({}))).into_response();
    }
    let scripted = state.statuses.lock().unwrap().pop_front();
    let (status, body) = scripted.unwrap_or_else(|| state.fallback_status.lock().unwrap().clone());
    (StatusCode::from_u16(status).unwrap(), Json(body)).into_response()
}

async fn history_handler(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
) -> Response {
    state.history_requests.fetch_add(1, Ordering::SeqCst);
    if !authorized(&state, &headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({}))).into_response();
    }
    let body = state.history_body.lock().unwrap().clone();
    (StatusCode::OK, Json(body)).into_response()
}

async fn proxy_handler(
    State(state): State<Arc<MockState>>,
    Query(_params): Query<HashMap<String, String>>,
) -> Response {
    state.proxy_requests.fetch_add(1, Ordering::SeqCst);
    let body = state.proxy_body.lock().unwrap().clone();
    (StatusCode::OK, body).into_response()
}

async fn asset_handler(State(state): State<Arc<MockState>>) -> Response {
    state.asset_requests.fetch_add(1, Ordering::SeqCst);
    let status = *state.asset_status.lock().unwrap();
    let body = state.asset_body.lock().unwrap().clone();
    (StatusCode::from_u16(status).unwrap(), body).into_response()
}

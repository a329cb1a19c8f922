//! Scriptable OpenAI-compatible backend for proxy and probe tests.
//!
//! Answers every path. Queued responses are served first, in order; after
//! that the backend keeps returning its fallback.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// One request as the backend saw it.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body is JSON")
    }
}

/// Canned answer.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
    pub delay: Duration,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self::json(r#"{"ok": true}"#)
    }
}

impl MockResponse {
    fn new(status: u16, content_type: &'static str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn json(body: &str) -> Self {
        Self::new(200, "application/json", body)
    }

    /// OpenAI-style error object with the given status.
    pub fn error(status: u16, message: &str) -> Self {
        let body = serde_json::json!({ "error": { "message": message, "type": "mock_error" } });
        Self::new(status, "application/json", body.to_string())
    }

    /// Chat-completion chunks in `data: ...` framing, terminated by `[DONE]`.
    pub fn sse(chunks: &[&str]) -> Self {
        let mut body: String = chunks.iter().map(|c| format!("data: {}\n\n", c)).collect();
        body.push_str("data: [DONE]\n\n");
        Self::new(200, "text/event-stream", body)
    }

    /// `/v1/models` listing with the given ids.
    pub fn models(ids: &[&str]) -> Self {
        let data: Vec<_> = ids
            .iter()
            .map(|id| serde_json::json!({ "id": id, "object": "model", "owned_by": "mock" }))
            .collect();
        Self::json(&serde_json::json!({ "object": "list", "data": data }).to_string())
    }

    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, self.body).into_response();
        response.headers_mut().insert(
            HeaderName::from_static("content-type"),
            HeaderValue::from_static(self.content_type),
        );
        response
    }
}

#[derive(Default)]
struct Script {
    seen: Vec<CapturedRequest>,
    queue: VecDeque<MockResponse>,
    fallback: MockResponse,
}

type Shared = Arc<Mutex<Script>>;

pub struct MockBackend {
    pub addr: SocketAddr,
    script: Shared,
    stop: Option<oneshot::Sender<()>>,
}

impl MockBackend {
    /// Backend that answers `{"ok": true}` once the queue is empty.
    pub async fn start() -> Self {
        Self::start_with_fallback(MockResponse::default()).await
    }

    /// Backend that answers `status` to everything not queued.
    pub async fn failing(status: u16) -> Self {
        Self::start_with_fallback(MockResponse::error(status, "unavailable")).await
    }

    pub async fn start_with_fallback(fallback: MockResponse) -> Self {
        let script: Shared = Arc::new(Mutex::new(Script {
            fallback,
            ..Script::default()
        }));
        let app = Router::new().fallback(answer).with_state(script.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock backend");
        let addr = listener.local_addr().expect("mock backend address");
        let (stop, stopped) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = stopped.await;
                })
                .await;
        });

        Self {
            addr,
            script,
            stop: Some(stop),
        }
    }

    pub async fn enqueue_response(&self, resp: MockResponse) {
        self.script.lock().queue.push_back(resp);
    }

    pub async fn captured_requests(&self) -> Vec<CapturedRequest> {
        self.script.lock().seen.clone()
    }

    pub async fn request_count(&self) -> usize {
        self.script.lock().seen.len()
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

async fn answer(State(script): State<Shared>, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .map(|b| b.to_vec())
        .unwrap_or_default();

    let captured = CapturedRequest {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        headers: parts
            .headers
            .iter()
            .map(|(k, v)| (k.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect(),
        body,
    };

    let reply = {
        let mut script = script.lock();
        script.seen.push(captured);
        match script.queue.pop_front() {
            Some(queued) => queued,
            None => script.fallback.clone(),
        }
    };

    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }
    reply.into_response()
}

//! Mock chat-completions backend for integration tests
//!
//! Serves one scripted behavior on `/v1/chat/completions`. Streaming and
//! non-streaming requests are told apart by the `stream` flag of the body.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// What the backend does with a streaming request
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Standard delta events, one per space-separated fragment
    Delta(String),
    /// One complete message sent as the only event of the stream
    CompleteOverStream(String),
    /// Send the given delta fragments, then drop the connection
    Interrupted { sent: Vec<String> },
    /// Send the given delta fragments, then end the body without `[DONE]`
    ClosedEarly { sent: Vec<String> },
    /// Reject every request with 401
    Unauthorized,
    /// Fail the first `failures` requests with 503, then stream deltas
    FlakyThenDelta { failures: u32, content: String },
}

/// Mock backend bound to a random local port
pub struct MockBackend {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

struct MockState {
    behavior: Behavior,
    /// Content of non-streaming responses
    full_content: String,
    request_count: AtomicU32,
    stream_count: AtomicU32,
    complete_count: AtomicU32,
    authorization: Mutex<Vec<String>>,
    bodies: Mutex<Vec<Value>>,
}

impl MockBackend {
    /// Start a backend whose non-streaming answer is `full_content`
    pub async fn start(behavior: Behavior, full_content: &str) -> anyhow::Result<Self> {
        let state = Arc::new(MockState {
            behavior,
            full_content: full_content.to_owned(),
            request_count: AtomicU32::new(0),
            stream_count: AtomicU32::new(0),
            complete_count: AtomicU32::new(0),
            authorization: Mutex::new(Vec::new()),
            bodies: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle_chat_completions))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL including `/v1`, as a provider would be configured
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// All requests, including rejected ones
    pub fn request_count(&self) -> u32 {
        self.state.request_count.load(Ordering::Relaxed)
    }

    /// Requests with `stream: true`
    pub fn stream_count(&self) -> u32 {
        self.state.stream_count.load(Ordering::Relaxed)
    }

    /// Requests with `stream: false`
    pub fn complete_count(&self) -> u32 {
        self.state.complete_count.load(Ordering::Relaxed)
    }

    /// `Authorization` header of every request
    pub fn authorization_headers(&self) -> Vec<String> {
        self.state.authorization.lock().unwrap().clone()
    }

    /// Request bodies in arrival order
    pub fn bodies(&self) -> Vec<Value> {
        self.state.bodies.lock().unwrap().clone()
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionRequest {
    model: String,
    #[serde(default)]
    stream: bool,
}

async fn handle_chat_completions(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let attempt = state.request_count.fetch_add(1, Ordering::Relaxed);
    if let Some(auth) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        state.authorization.lock().unwrap().push(auth.to_owned());
    }
    state.bodies.lock().unwrap().push(body.clone());

    let req: ChatCompletionRequest = match serde_json::from_value(body) {
        Ok(req) => req,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    match &state.behavior {
        Behavior::Unauthorized => return error_response(StatusCode::UNAUTHORIZED, "Incorrect API key provided"),
        Behavior::FlakyThenDelta { failures, .. } if attempt < *failures => {
            return error_response(StatusCode::SERVICE_UNAVAILABLE, "backend overloaded");
        }
        _ => {}
    }

    if !req.stream {
        state.complete_count.fetch_add(1, Ordering::Relaxed);
        return Json(json!({
            "id": "chatcmpl-mock",
            "object": "chat.completion",
            "model": req.model,
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": state.full_content},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 7, "completion_tokens": 3, "total_tokens": 10}
        }))
        .into_response();
    }

    state.stream_count.fetch_add(1, Ordering::Relaxed);

    match &state.behavior {
        Behavior::Delta(content) | Behavior::FlakyThenDelta { content, .. } => {
            let mut frames: Vec<Value> = fragments(content).iter().map(|f| delta(f, None)).collect();
            frames.push(delta("", Some("stop")));
            sse(&frames, true)
        }
        Behavior::CompleteOverStream(content) => sse(
            &[json!({
                "id": "chatcmpl-mock",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": content},
                    "finish_reason": "stop"
                }]
            })],
            true,
        ),
        Behavior::ClosedEarly { sent } => {
            let frames: Vec<Value> = sent.iter().map(|f| delta(f, None)).collect();
            sse(&frames, false)
        }
        Behavior::Interrupted { sent } => {
            let mut parts: Vec<Result<Bytes, std::io::Error>> =
                sent.iter().map(|f| Ok(Bytes::from(frame(&delta(f, None))))).collect();
            parts.push(Err(std::io::Error::other("backend crashed")));

            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/event-stream")
                .body(Body::from_stream(futures_util::stream::iter(parts)))
                .unwrap()
        }
        Behavior::Unauthorized => unreachable!("rejected above"),
    }
}

/// Split like a tokenizer would, keeping leading spaces on later fragments
fn fragments(content: &str) -> Vec<String> {
    content
        .split(' ')
        .enumerate()
        .map(|(i, word)| if i == 0 { word.to_owned() } else { format!(" {word}") })
        .collect()
}

fn delta(content: &str, finish_reason: Option<&str>) -> Value {
    json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion.chunk",
        "choices": [{
            "index": 0,
            "delta": {"role": "assistant", "content": content},
            "finish_reason": finish_reason
        }]
    })
}

fn frame(value: &Value) -> String {
    format!("data: {}\n\n", serde_json::to_string(value).unwrap())
}

fn sse(frames: &[Value], done: bool) -> Response {
    let mut body: String = frames.iter().map(frame).collect();
    if done {
        body.push_str("data: [DONE]\n\n");
    }

    (StatusCode::OK, [(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({"error": {"message": message, "type": "mock_error"}})),
    )
        .into_response()
}

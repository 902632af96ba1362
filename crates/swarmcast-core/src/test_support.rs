//! Scriptable JSON-RPC engine for tests
//!
//! Each method answers with the scripted responses in order; the last one
//! keeps repeating. Every request envelope is recorded.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
enum Scripted {
    Body(Value),
    Http(u16),
}

#[derive(Default)]
struct Inner {
    scripts: HashMap<String, VecDeque<Scripted>>,
    delays: HashMap<String, Duration>,
    calls: Vec<Value>,
}

type Shared = Arc<Mutex<Inner>>;

pub struct FakeEngine {
    addr: SocketAddr,
    inner: Shared,
    server: tokio::task::JoinHandle<()>,
}

impl FakeEngine {
    pub async fn start() -> Self {
        let inner: Shared = Arc::default();
        let app = Router::new()
            .route("/jsonrpc", post(handle_rpc))
            .with_state(inner.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake engine");
        let addr = listener.local_addr().expect("fake engine address");
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, inner, server }
    }

    pub fn url(&self) -> String {
        format!("http://{}/jsonrpc", self.addr)
    }

    /// Queue a response body (`{"result": ..}` or `{"error": ..}`) for `method`
    pub fn respond(&self, method: &str, body: Value) {
        self.push(method, Scripted::Body(body));
    }

    /// Queue a bare HTTP failure for `method`
    pub fn fail_http(&self, method: &str, status: u16) {
        self.push(method, Scripted::Http(status));
    }

    /// Hold every answer to `method` for `delay`
    pub fn delay(&self, method: &str, delay: Duration) {
        self.inner.lock().delays.insert(method.to_string(), delay);
    }

    pub fn calls(&self) -> Vec<Value> {
        self.inner.lock().calls.clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|call| call["method"] == method)
            .count()
    }

    fn push(&self, method: &str, scripted: Scripted) {
        self.inner
            .lock()
            .scripts
            .entry(method.to_string())
            .or_default()
            .push_back(scripted);
    }
}

impl Drop for FakeEngine {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn handle_rpc(State(inner): State<Shared>, Json(request): Json<Value>) -> impl IntoResponse {
    let method = request["method"].as_str().unwrap_or_default().to_string();
    let (scripted, delay) = {
        let mut inner = inner.lock();
        inner.calls.push(request.clone());
        let delay = inner.delays.get(&method).copied();
        let scripted = inner.scripts.get_mut(&method).and_then(|queue| {
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        });
        (scripted, delay)
    };

    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    match scripted {
        Some(Scripted::Body(body)) => {
            let mut response = json!({"jsonrpc": "2.0", "id": request["id"].clone()});
            if let (Some(target), Some(fields)) = (response.as_object_mut(), body.as_object()) {
                for (key, value) in fields {
                    target.insert(key.clone(), value.clone());
                }
            }
            (StatusCode::OK, Json(response)).into_response()
        }
        Some(Scripted::Http(status)) => StatusCode::from_u16(status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
        None => (
            StatusCode::OK,
            Json(json!({
                "jsonrpc": "2.0",
                "id": request["id"].clone(),
                "error": {"code": 1, "message": format!("no script for {}", method)},
            })),
        )
            .into_response(),
    }
}

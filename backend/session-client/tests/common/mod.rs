//! Scripted fakes for integration tests
//!
//! `ScriptedTransport` plays the backend API: one access token is valid at a
//! time, `/auth/refresh` hands out a fixed grant, and individual paths can be
//! overridden with canned responses. `FakeConnector` plays the push socket.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use session_client::error::{Result, SessionError};
use session_client::http::{ApiRequest, ApiResponse, HttpTransport};
use session_client::realtime::{ChannelConnector, ChannelFrame, ChannelHandle};
use session_client::{SessionEndedHandler, TokenPair, TokenStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: String,
    pub path: String,
    pub bearer: Option<String>,
    pub idempotency_key: Option<String>,
}

#[derive(Clone)]
pub struct ScriptedTransport {
    valid_token: Arc<Mutex<String>>,
    /// `None` makes the refresh endpoint reject
    grant: Arc<Mutex<Option<String>>>,
    refresh_delay: Duration,
    routes: Arc<Mutex<HashMap<String, (u16, Value)>>>,
    delays: Arc<Mutex<HashMap<String, Duration>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl ScriptedTransport {
    pub fn new(valid_token: &str, grant: Option<&str>) -> Self {
        Self {
            valid_token: Arc::new(Mutex::new(valid_token.to_string())),
            grant: Arc::new(Mutex::new(grant.map(str::to_string))),
            refresh_delay: Duration::from_millis(50),
            routes: Arc::new(Mutex::new(HashMap::new())),
            delays: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Serve `path` with a fixed response once the bearer is accepted
    pub fn route(&self, path: &str, status: u16, body: Value) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), (status, body));
    }

    /// Hold responses for `path` back by `delay`
    pub fn delay(&self, path: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(path.to_string(), delay);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.path == path)
            .collect()
    }

    pub fn refresh_calls(&self) -> usize {
        self.calls_to("/auth/refresh").len()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: &ApiRequest, bearer: Option<&str>) -> Result<ApiResponse> {
        self.calls.lock().unwrap().push(RecordedCall {
            method: request.method.to_string(),
            path: request.path.clone(),
            bearer: bearer.map(str::to_string),
            idempotency_key: request.idempotency_key.clone(),
        });

        if request.path == "/auth/refresh" {
            tokio::time::sleep(self.refresh_delay).await;
            let grant = self.grant.lock().unwrap().clone();
            return Ok(match grant {
                Some(token) => {
                    *self.valid_token.lock().unwrap() = token.clone();
                    ApiResponse::new(200, json!({ "access_token": token, "token_type": "bearer" }))
                }
                None => ApiResponse::new(401, json!({ "detail": "Invalid refresh token" })),
            });
        }

        let delay = self.delays.lock().unwrap().get(&request.path).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let valid = self.valid_token.lock().unwrap().clone();
        if bearer != Some(valid.as_str()) {
            return Ok(ApiResponse::new(
                401,
                json!({ "detail": "Could not validate credentials" }),
            ));
        }

        let routed = self.routes.lock().unwrap().get(&request.path).cloned();
        Ok(match routed {
            Some((status, body)) => ApiResponse::new(status, body),
            None => ApiResponse::new(200, json!({ "ok": true, "path": request.path })),
        })
    }
}

/// Counts session-ended signals
#[derive(Clone, Default)]
pub struct EndedCounter(Arc<AtomicUsize>);

impl EndedCounter {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    pub fn handler(&self) -> Arc<dyn SessionEndedHandler> {
        let counter = self.0.clone();
        Arc::new(move |_: &SessionError| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }
}

pub fn admin_tokens(access: &str, refresh: Option<&str>) -> TokenStore {
    TokenStore::with_tokens(TokenPair {
        access_token: access.to_string(),
        refresh_token: refresh.map(str::to_string),
        user_id: Some("u-1".to_string()),
        email: Some("admin@example.com".to_string()),
        role: Some("admin".to_string()),
    })
}

struct FakeSocket {
    frames: mpsc::UnboundedSender<ChannelFrame>,
    close: oneshot::Receiver<()>,
}

/// Push socket double; either refuses every open or accepts and lets the
/// test play the server side.
#[derive(Clone)]
pub struct FakeConnector {
    accept: bool,
    opens: Arc<AtomicUsize>,
    urls: Arc<Mutex<Vec<String>>>,
    sockets: Arc<Mutex<Vec<FakeSocket>>>,
}

impl FakeConnector {
    pub fn refusing() -> Self {
        Self::new(false)
    }

    pub fn accepting() -> Self {
        Self::new(true)
    }

    fn new(accept: bool) -> Self {
        Self {
            accept,
            opens: Arc::new(AtomicUsize::new(0)),
            urls: Arc::new(Mutex::new(Vec::new())),
            sockets: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }

    /// Send a text frame on the most recent socket
    pub fn push_text(&self, text: &str) {
        self.push(ChannelFrame::Text(text.to_string()));
    }

    pub fn push(&self, frame: ChannelFrame) {
        let sockets = self.sockets.lock().unwrap();
        let socket = sockets.last().expect("no socket opened");
        socket.frames.send(frame).expect("channel task gone");
    }

    /// Server-side close of the most recent socket
    pub fn close_from_server(&self, code: u16) {
        self.push(ChannelFrame::Closed {
            code,
            reason: "server close".to_string(),
        });
    }

    /// Whether the client asked the most recent socket to close
    pub fn client_closed(&self) -> bool {
        let mut sockets = self.sockets.lock().unwrap();
        let Some(socket) = sockets.last_mut() else {
            return false;
        };
        socket.close.try_recv().is_ok()
    }
}

#[async_trait]
impl ChannelConnector for FakeConnector {
    async fn open(&self, url: &str) -> Result<ChannelHandle> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());

        if !self.accept {
            return Err(SessionError::ChannelError("connection refused".to_string()));
        }

        let (frame_tx, frames) = mpsc::unbounded_channel();
        let (close, close_rx) = oneshot::channel();
        self.sockets.lock().unwrap().push(FakeSocket {
            frames: frame_tx,
            close: close_rx,
        });
        Ok(ChannelHandle { frames, close })
    }
}

pub fn notification_json(id: &str, is_read: bool) -> Value {
    json!({
        "id": id,
        "type": "USER_REGISTRATION",
        "title": "New User Registration",
        "message": format!("user {id} is pending approval"),
        "metadata": { "action_required": true },
        "is_read": is_read,
        "created_at": "2024-06-04T13:45:18.123456",
        "read_at": null
    })
}

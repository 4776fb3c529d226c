//! Realtime connection manager.
//!
//! Drives a [`ConnectionMachine`] with events from callers, channel tasks and
//! reconnect timers, and carries out the effects it returns. Every channel
//! gets a generation number; events tagged with an older generation are
//! dropped, so a socket torn down by `disconnect()` cannot resurrect the
//! connection.

use super::channel::{ChannelConnector, ChannelFrame, ChannelHandle, NORMAL_CLOSURE};
use super::messages::decode_frame;
use super::state::{ConnectionEvent, ConnectionMachine, ConnectionState, ConnectionStatus, Effect};
use crate::auth::TokenStore;
use crate::config::Config;
use crate::error::SessionError;
use crate::notifications::Notification;
use parking_lot::Mutex;
use resilience::with_timeout;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct Shared {
    machine: ConnectionMachine,
    generation: u64,
    channel: Option<oneshot::Sender<()>>,
    reconnect: Option<JoinHandle<()>>,
}

struct Inner {
    shared: Mutex<Shared>,
    enabled: AtomicBool,
    status: watch::Sender<ConnectionStatus>,
    tokens: TokenStore,
    connector: Arc<dyn ChannelConnector>,
    base_url: String,
    connect_timeout: Duration,
    sink: mpsc::UnboundedSender<Notification>,
}

#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Decoded pushed notifications are forwarded to `sink`.
    pub fn new(
        config: &Config,
        tokens: TokenStore,
        connector: Arc<dyn ChannelConnector>,
        sink: mpsc::UnboundedSender<Notification>,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::default());
        Self {
            inner: Arc::new(Inner {
                shared: Mutex::new(Shared {
                    machine: ConnectionMachine::new(config.realtime.backoff_policy()),
                    generation: 0,
                    channel: None,
                    reconnect: None,
                }),
                enabled: AtomicBool::new(true),
                status,
                tokens,
                connector,
                base_url: config.api.base_url.clone(),
                connect_timeout: config.realtime.connect_timeout(),
                sink,
            }),
        }
    }

    /// Open the channel if enabled and a token is held.
    ///
    /// Must be called inside a tokio runtime; the channel task is spawned here.
    pub fn connect(&self) {
        let event = ConnectionEvent::Connect {
            enabled: self.is_enabled(),
            has_token: self.inner.tokens.access_token().is_some(),
            explicit: true,
        };
        self.dispatch(event, None);
    }

    pub fn disconnect(&self) {
        self.dispatch(ConnectionEvent::Disconnect, None);
    }

    /// Enabling connects right away, so it has the same runtime requirement
    /// as [`connect`](Self::connect).
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
        if enabled {
            self.connect();
        } else {
            self.disconnect();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.status.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.status.borrow().state
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    /// Feed `event` to the machine. `generation` tags events from a channel or
    /// timer; they are dropped once that generation is superseded.
    fn dispatch(&self, event: ConnectionEvent, generation: Option<u64>) {
        let mut shared = self.inner.shared.lock();
        if generation.is_some_and(|g| g != shared.generation) {
            debug!(?event, "dropping stale connection event");
            return;
        }
        self.dispatch_locked(&mut shared, event);
    }

    fn dispatch_locked(&self, shared: &mut Shared, event: ConnectionEvent) {
        let before = shared.machine.state();
        let effects = shared.machine.handle(event);
        let after = shared.machine.state();
        if before != after {
            debug!(from = %before, to = %after, "connection state changed");
        }

        for effect in effects {
            self.apply(shared, effect);
        }

        let status = shared.machine.status().clone();
        self.inner.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    fn apply(&self, shared: &mut Shared, effect: Effect) {
        match effect {
            Effect::OpenChannel => {
                shared.generation += 1;
                let generation = shared.generation;
                let manager = self.clone();
                tokio::spawn(async move { manager.run_channel(generation).await });
            }
            Effect::CloseChannel => {
                shared.generation += 1;
                if let Some(close) = shared.channel.take() {
                    let _ = close.send(());
                    info!("realtime channel closed by client");
                }
            }
            Effect::ScheduleReconnect(delay) => {
                if let Some(previous) = shared.reconnect.take() {
                    previous.abort();
                }
                let generation = shared.generation;
                let manager = self.clone();
                info!(
                    attempt = shared.machine.status().attempts,
                    delay_ms = delay.as_millis() as u64,
                    "scheduling realtime reconnect"
                );
                shared.reconnect = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let has_token = manager.inner.tokens.access_token().is_some();
                    manager.dispatch(ConnectionEvent::ReconnectDue { has_token }, Some(generation));
                }));
            }
            Effect::CancelReconnect => {
                if let Some(pending) = shared.reconnect.take() {
                    pending.abort();
                }
            }
            Effect::Exhausted(err) => {
                warn!(error = %err, "giving up on realtime channel");
            }
        }
    }

    async fn run_channel(self, generation: u64) {
        let Some(token) = self.inner.tokens.access_token() else {
            self.dispatch(
                ConnectionEvent::OpenFailed("no access token".to_string()),
                Some(generation),
            );
            return;
        };

        let url = notifications_ws_url(&self.inner.base_url, &token);
        let opened = with_timeout(self.inner.connect_timeout, self.inner.connector.open(&url))
            .await
            .map_err(SessionError::from)
            .and_then(|result| result);

        let ChannelHandle { mut frames, close } = match opened {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "realtime channel open failed");
                self.dispatch(ConnectionEvent::OpenFailed(e.to_string()), Some(generation));
                return;
            }
        };

        {
            let mut shared = self.inner.shared.lock();
            if shared.generation != generation {
                drop(shared);
                let _ = close.send(());
                debug!("discarding channel opened for a superseded connect");
                return;
            }
            shared.channel = Some(close);
            self.dispatch_locked(&mut shared, ConnectionEvent::Opened);
        }
        info!("realtime channel connected");

        while let Some(frame) = frames.recv().await {
            match frame {
                ChannelFrame::Text(text) => {
                    if !self.is_current(generation) {
                        break;
                    }
                    match decode_frame(&text) {
                        Ok(notification) => {
                            debug!(id = %notification.id, "pushed notification received");
                            if self.inner.sink.send(notification).is_err() {
                                debug!("notification sink closed");
                            }
                        }
                        Err(e) => warn!(error = %e, "dropping malformed realtime frame"),
                    }
                }
                ChannelFrame::Error(message) => {
                    warn!(error = %message, "realtime channel error");
                    self.dispatch(ConnectionEvent::ChannelError(message), Some(generation));
                }
                ChannelFrame::Closed { code, reason } => {
                    info!(code, reason = %reason, "realtime channel closed");
                    let intentional = code == NORMAL_CLOSURE;
                    self.dispatch(ConnectionEvent::Closed { intentional }, Some(generation));
                    return;
                }
            }
        }

        // Frame stream dropped without a close frame
        self.dispatch(ConnectionEvent::Closed { intentional: false }, Some(generation));
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.shared.lock().generation == generation
    }
}

/// `http(s)://host` becomes `ws(s)://host/notifications/ws?token=...`
pub fn notifications_ws_url(base_url: &str, token: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{base}/notifications/ws?token={}", urlencoding::encode(token))
}

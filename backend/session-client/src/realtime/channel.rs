//! Push channel transport.
//!
//! A [`ChannelConnector`] opens one socket and hands back a [`ChannelHandle`]:
//! a stream of inbound frames plus a one-shot close trigger. The manager never
//! touches the socket directly.

use crate::error::{Result, SessionError};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};
use tracing::{debug, trace};

/// Close code the server uses for an orderly shutdown
pub const NORMAL_CLOSURE: u16 = 1000;

/// Reported when the socket went away without a close frame
pub const ABNORMAL_CLOSURE: u16 = 1006;

pub const CLIENT_CLOSE_REASON: &str = "Client disconnect";

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelFrame {
    Text(String),
    Error(String),
    /// Always the last frame of a channel
    Closed { code: u16, reason: String },
}

impl ChannelFrame {
    pub fn closed(code: u16, reason: impl Into<String>) -> Self {
        ChannelFrame::Closed {
            code,
            reason: reason.into(),
        }
    }
}

pub struct ChannelHandle {
    pub frames: mpsc::UnboundedReceiver<ChannelFrame>,
    pub close: oneshot::Sender<()>,
}

#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn open(&self, url: &str) -> Result<ChannelHandle>;
}

/// WebSocket connector over `tokio-tungstenite`
#[derive(Debug, Clone, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl ChannelConnector for TungsteniteConnector {
    async fn open(&self, url: &str) -> Result<ChannelHandle> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| SessionError::ChannelError(format!("failed to connect: {e}")))?;

        let (mut write, mut read) = ws_stream.split();
        let (frame_tx, frames) = mpsc::unbounded_channel();
        let (close, mut close_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut close_rx => {
                        let frame = CloseFrame {
                            code: CloseCode::Normal,
                            reason: Utf8Bytes::from_static(CLIENT_CLOSE_REASON),
                        };
                        if let Err(e) = write.send(Message::Close(Some(frame))).await {
                            debug!(error = %e, "close frame not delivered");
                        }
                        let _ = frame_tx.send(ChannelFrame::closed(NORMAL_CLOSURE, CLIENT_CLOSE_REASON));
                        break;
                    }
                    msg = read.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let _ = frame_tx.send(ChannelFrame::Text(text.as_str().to_owned()));
                            }
                            Some(Ok(Message::Ping(data))) => {
                                let _ = write.send(Message::Pong(data)).await;
                            }
                            Some(Ok(Message::Close(frame))) => {
                                let (code, reason) = frame
                                    .map(|f| (u16::from(f.code), f.reason.as_str().to_owned()))
                                    .unwrap_or((ABNORMAL_CLOSURE, String::new()));
                                let _ = frame_tx.send(ChannelFrame::closed(code, reason));
                                break;
                            }
                            Some(Ok(other)) => {
                                trace!(kind = ?other, "ignoring non-text frame");
                            }
                            Some(Err(e)) => {
                                let _ = frame_tx.send(ChannelFrame::Error(e.to_string()));
                                let _ = frame_tx.send(ChannelFrame::closed(ABNORMAL_CLOSURE, e.to_string()));
                                break;
                            }
                            None => {
                                let _ = frame_tx.send(ChannelFrame::closed(ABNORMAL_CLOSURE, "stream ended"));
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(ChannelHandle { frames, close })
    }
}

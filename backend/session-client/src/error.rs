use thiserror::Error;

pub type Result<T> = std::result::Result<T, SessionError>;

/// Failure taxonomy of the session client.
///
/// `Clone` so that a single refresh outcome can be handed to every waiter.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    /// Access token rejected and no refresh token to renew it with
    #[error("session expired: no refresh token available")]
    AuthExpired,

    /// The refresh exchange itself was rejected or could not complete
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// Any non-401 transport or HTTP failure, passed through to the caller
    #[error("request failed (status: {status:?}): {message}")]
    RequestFailed {
        status: Option<u16>,
        message: String,
    },

    #[error("channel error: {0}")]
    ChannelError(String),

    #[error("max reconnection attempts reached ({attempts})")]
    ReconnectExhausted { attempts: u32 },

    #[error("malformed event: {0}")]
    MalformedEvent(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("decode error: {0}")]
    Decode(String),
}

impl SessionError {
    pub fn request_failed(status: Option<u16>, message: impl Into<String>) -> Self {
        SessionError::RequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Errors that end the session and must reach the UI boundary
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, SessionError::AuthExpired | SessionError::RefreshFailed(_))
    }

    /// HTTP status carried by the error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            SessionError::AuthExpired | SessionError::RefreshFailed(_) => Some(401),
            SessionError::RequestFailed { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(e: reqwest::Error) -> Self {
        SessionError::RequestFailed {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        SessionError::Decode(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SessionError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        SessionError::ChannelError(e.to_string())
    }
}

impl From<resilience::TimeoutError> for SessionError {
    fn from(e: resilience::TimeoutError) -> Self {
        SessionError::ChannelError(e.to_string())
    }
}

//! Login/logout and the session-ended boundary.

use super::token_store::{TokenPair, TokenStore};
use crate::error::{Result, SessionError};
use crate::http::{ApiRequest, HttpTransport};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Boundary callback fired when authentication cannot be recovered.
///
/// The receiver is expected to drop any remaining UI state and send the user
/// back to the entry point.
pub trait SessionEndedHandler: Send + Sync {
    fn session_ended(&self, reason: &SessionError);
}

impl<F> SessionEndedHandler for F
where
    F: Fn(&SessionError) + Send + Sync,
{
    fn session_ended(&self, reason: &SessionError) {
        self(reason)
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: Option<String>,
}

impl From<LoginResponse> for TokenPair {
    fn from(resp: LoginResponse) -> Self {
        TokenPair {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token,
            user_id: resp.user_id,
            email: resp.email,
            role: resp.role,
        }
    }
}

pub struct Session {
    transport: Arc<dyn HttpTransport>,
    tokens: TokenStore,
}

impl Session {
    pub fn new(transport: Arc<dyn HttpTransport>, tokens: TokenStore) -> Self {
        Self { transport, tokens }
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Exchange credentials for a token pair and store it.
    ///
    /// Sent bare: a rejected login is a plain request failure, not an expiry.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair> {
        let request =
            ApiRequest::post("/auth/login").json(json!({ "email": email, "password": password }));

        let response = self.transport.execute(&request, None).await?;
        if !response.is_success() {
            warn!(status = response.status, "login rejected");
            return Err(response.into_error());
        }

        let login: LoginResponse = serde_json::from_value(response.body)?;
        let pair = TokenPair::from(login);
        if pair.refresh_token.is_none() {
            warn!("login response carried no refresh token; session cannot be renewed");
        }

        self.tokens.set(pair.clone());
        info!(user_id = ?pair.user_id, role = ?pair.role, "session established");

        Ok(pair)
    }

    pub fn logout(&self) {
        self.tokens.clear();
        info!("session cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ApiResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct LoginTransport {
        status: u16,
        body: serde_json::Value,
    }

    #[async_trait]
    impl HttpTransport for LoginTransport {
        async fn execute(&self, request: &ApiRequest, bearer: Option<&str>) -> Result<ApiResponse> {
            assert_eq!(request.path, "/auth/login");
            assert!(bearer.is_none());
            Ok(ApiResponse::new(self.status, self.body.clone()))
        }
    }

    #[tokio::test]
    async fn test_login_stores_tokens() {
        let transport = Arc::new(LoginTransport {
            status: 200,
            body: json!({
                "access_token": "A1",
                "refresh_token": "R1",
                "token_type": "bearer",
                "user_id": "u-1",
                "email": "admin@example.com",
                "role": "admin",
                "is_first_time_user": false
            }),
        });
        let session = Session::new(transport, TokenStore::new());

        let pair = session.login("admin@example.com", "secret").await.unwrap();

        assert_eq!(pair.role.as_deref(), Some("admin"));
        assert_eq!(session.tokens().access_token().as_deref(), Some("A1"));
        assert_eq!(session.tokens().refresh_token().as_deref(), Some("R1"));
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let transport = Arc::new(LoginTransport {
            status: 401,
            body: json!({"detail": "Invalid credentials"}),
        });
        let session = Session::new(transport, TokenStore::new());

        let err = session.login("admin@example.com", "wrong").await.unwrap_err();

        assert_eq!(
            err,
            SessionError::request_failed(Some(401), "Invalid credentials")
        );
        assert!(session.tokens().snapshot().is_none());
    }

    #[tokio::test]
    async fn test_logout_clears() {
        let tokens = TokenStore::with_tokens(TokenPair::new("A1", Some("R1".into())));
        let session = Session::new(
            Arc::new(LoginTransport {
                status: 200,
                body: serde_json::Value::Null,
            }),
            tokens.clone(),
        );

        session.logout();
        assert!(tokens.snapshot().is_none());
    }

    #[test]
    fn test_closure_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handler: Arc<dyn SessionEndedHandler> = Arc::new(move |_: &SessionError| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        handler.session_ended(&SessionError::AuthExpired);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

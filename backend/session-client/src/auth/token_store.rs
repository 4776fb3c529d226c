//! Session-lifetime credential storage.
//!
//! Only login, the refresh coordinator, and logout write here; everything
//! else reads.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Access/refresh token pair plus the minimal identity returned at login
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            ..Default::default()
        }
    }
}

// Tokens never show up in logs
impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("role", &self.role)
            .finish()
    }
}

#[derive(Clone, Default)]
pub struct TokenStore {
    inner: Arc<RwLock<Option<TokenPair>>>,
    /// Bumped by every `set`, i.e. every login
    logins: Arc<AtomicU64>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(pair: TokenPair) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(pair))),
            logins: Arc::default(),
        }
    }

    pub fn set(&self, pair: TokenPair) {
        let mut guard = self.inner.write();
        *guard = Some(pair);
        self.logins.fetch_add(1, Ordering::SeqCst);
    }

    /// Counter identifying the current login
    pub fn login_epoch(&self) -> u64 {
        self.logins.load(Ordering::SeqCst)
    }

    /// Replace the tokens after a refresh, keeping identity.
    ///
    /// A `None` refresh token keeps the stored one.
    pub fn update_tokens(&self, access_token: String, refresh_token: Option<String>) {
        let mut guard = self.inner.write();
        match guard.as_mut() {
            Some(pair) => {
                pair.access_token = access_token;
                if refresh_token.is_some() {
                    pair.refresh_token = refresh_token;
                }
            }
            None => *guard = Some(TokenPair::new(access_token, refresh_token)),
        }
    }

    pub fn clear(&self) {
        *self.inner.write() = None;
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner
            .read()
            .as_ref()
            .map(|p| p.access_token.clone())
            .filter(|t| !t.is_empty())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner
            .read()
            .as_ref()
            .and_then(|p| p.refresh_token.clone())
            .filter(|t| !t.is_empty())
    }

    pub fn role(&self) -> Option<String> {
        self.inner.read().as_ref().and_then(|p| p.role.clone())
    }

    pub fn snapshot(&self) -> Option<TokenPair> {
        self.inner.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some() && self.refresh_token().is_some()
    }
}

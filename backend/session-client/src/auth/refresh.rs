//! Single-flight access token renewal.
//!
//! State machine: `Idle --acquire--> Refreshing --settle--> Idle`.
//!
//! The `Idle -> Refreshing` transition is a check-and-set under one mutex, so
//! whichever caller observes `Idle` first becomes the leader and performs the
//! only network refresh of the episode. Everyone else queues a waiter and is
//! released, in enqueue order, with the leader's outcome.
//!
//! A failed episode is remembered against the token it was renewing, so a
//! 401 for that token landing after settle gets the same error instead of
//! ending the session a second time. A new login forgets it.

use super::session::SessionEndedHandler;
use super::token_store::TokenStore;
use crate::error::{Result, SessionError};
use crate::http::{ApiRequest, HttpTransport};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

pub const REFRESH_PATH: &str = "/auth/refresh";

type PendingWaiter = oneshot::Sender<Result<String>>;

enum RefreshState {
    Idle,
    Refreshing { waiters: VecDeque<PendingWaiter> },
}

/// Outcome of the check-and-set performed under the state lock
enum Acquire {
    /// A refresh already finished since the rejected token was sent
    Ready(String),
    Wait(oneshot::Receiver<Result<String>>),
    /// The episode for the rejected token already ended the session
    Failed(SessionError),
    Lead,
}

/// Outcome of the last failed episode
struct FailedEpisode {
    login_epoch: u64,
    rejected: Option<String>,
    error: SessionError,
}

#[derive(Debug, Deserialize)]
struct RefreshGrant {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
    last_failure: Mutex<Option<FailedEpisode>>,
    transport: Arc<dyn HttpTransport>,
    tokens: TokenStore,
    on_session_ended: Arc<dyn SessionEndedHandler>,
    refresh_calls: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        tokens: TokenStore,
        on_session_ended: Arc<dyn SessionEndedHandler>,
    ) -> Self {
        Self {
            state: Mutex::new(RefreshState::Idle),
            last_failure: Mutex::new(None),
            transport,
            tokens,
            on_session_ended,
            refresh_calls: AtomicU64::new(0),
        }
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.state.lock(), RefreshState::Refreshing { .. })
    }

    /// Number of refresh exchanges sent over the network
    pub fn refresh_count(&self) -> u64 {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Get an access token that supersedes `rejected`.
    ///
    /// Joins the in-flight refresh if there is one, otherwise leads a new one.
    pub async fn renew(&self, rejected: Option<&str>) -> Result<String> {
        match self.acquire(rejected) {
            Acquire::Ready(token) => {
                debug!("token already renewed by a concurrent request");
                Ok(token)
            }
            Acquire::Wait(rx) => {
                debug!("refresh in flight, waiting for its outcome");
                rx.await.unwrap_or_else(|_| {
                    Err(SessionError::RefreshFailed("refresh abandoned".to_string()))
                })
            }
            Acquire::Failed(err) => {
                debug!("session already ended for the rejected token");
                Err(err)
            }
            Acquire::Lead => {
                let mut guard = SettleGuard {
                    coordinator: self,
                    rejected: rejected.map(str::to_string),
                    login_epoch: self.tokens.login_epoch(),
                    settled: false,
                };
                let outcome = self.refresh().await;
                guard.settle(outcome.clone());
                outcome
            }
        }
    }

    fn acquire(&self, rejected: Option<&str>) -> Acquire {
        let mut state = self.state.lock();
        match &mut *state {
            RefreshState::Refreshing { waiters } => {
                let (tx, rx) = oneshot::channel();
                waiters.push_back(tx);
                Acquire::Wait(rx)
            }
            RefreshState::Idle => {
                // Tokens are stored before a refresh settles, so under Idle the
                // store already holds the newest token.
                if let Some(current) = self.tokens.access_token() {
                    if Some(current.as_str()) != rejected {
                        return Acquire::Ready(current);
                    }
                }
                if let Some(err) = self.recorded_failure(rejected) {
                    return Acquire::Failed(err);
                }
                *state = RefreshState::Refreshing {
                    waiters: VecDeque::new(),
                };
                Acquire::Lead
            }
        }
    }

    /// Error of a failed episode covering `rejected` under the current login.
    /// A request sent without a token after that episode is covered too.
    fn recorded_failure(&self, rejected: Option<&str>) -> Option<SessionError> {
        self.last_failure
            .lock()
            .as_ref()
            .filter(|f| f.login_epoch == self.tokens.login_epoch())
            .filter(|f| rejected.is_none() || f.rejected.as_deref() == rejected)
            .map(|f| f.error.clone())
    }

    /// Release every queued waiter in FIFO order and return to Idle
    ///
    /// `failure` is recorded when the episode ended the session.
    fn settle(&self, failure: Option<FailedEpisode>, outcome: Result<String>) {
        let mut state = self.state.lock();
        *self.last_failure.lock() = failure;
        let waiters = match std::mem::replace(&mut *state, RefreshState::Idle) {
            RefreshState::Refreshing { waiters } => waiters,
            RefreshState::Idle => VecDeque::new(),
        };
        drop(state);

        if !waiters.is_empty() {
            debug!(waiters = waiters.len(), success = outcome.is_ok(), "releasing refresh waiters");
        }
        for waiter in waiters {
            // A waiter whose request was dropped has nobody to tell
            let _ = waiter.send(outcome.clone());
        }
    }

    async fn refresh(&self) -> Result<String> {
        let Some(refresh_token) = self.tokens.refresh_token() else {
            warn!("access token rejected and no refresh token stored");
            self.end_session(&SessionError::AuthExpired);
            return Err(SessionError::AuthExpired);
        };

        match self.exchange(&refresh_token).await {
            Ok(grant) => {
                self.tokens
                    .update_tokens(grant.access_token.clone(), grant.refresh_token);
                info!("access token renewed");
                Ok(grant.access_token)
            }
            Err(reason) => {
                warn!(%reason, "token refresh failed");
                let err = SessionError::RefreshFailed(reason);
                self.end_session(&err);
                Err(err)
            }
        }
    }

    /// Bare token exchange; deliberately bypasses the request pipeline
    async fn exchange(&self, refresh_token: &str) -> std::result::Result<RefreshGrant, String> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);

        let request =
            ApiRequest::post(REFRESH_PATH).json(json!({ "refresh_token": refresh_token }));
        let response = self
            .transport
            .execute(&request, None)
            .await
            .map_err(|e| e.to_string())?;

        if !response.is_success() {
            return Err(response.error_message());
        }

        serde_json::from_value(response.body).map_err(|e| format!("invalid refresh response: {e}"))
    }

    fn end_session(&self, reason: &SessionError) {
        self.tokens.clear();
        self.on_session_ended.session_ended(reason);
    }
}

/// Keeps waiters from hanging if the leader's future is dropped mid-refresh
struct SettleGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    rejected: Option<String>,
    login_epoch: u64,
    settled: bool,
}

impl SettleGuard<'_> {
    fn settle(&mut self, outcome: Result<String>) {
        self.settled = true;
        let failure = outcome.as_ref().err().map(|error| FailedEpisode {
            login_epoch: self.login_epoch,
            rejected: self.rejected.take(),
            error: error.clone(),
        });
        self.coordinator.settle(failure, outcome);
    }
}

impl Drop for SettleGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("refresh leader dropped before completion");
            // Tokens are untouched, so the next 401 may lead a fresh refresh
            self.coordinator.settle(
                None,
                Err(SessionError::RefreshFailed("refresh cancelled".to_string())),
            );
        }
    }
}

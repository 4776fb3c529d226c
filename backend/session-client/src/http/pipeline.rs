//! Authenticated request pipeline.
//!
//! Every outbound call goes through [`RequestPipeline::call`]: the stored
//! access token is attached as a bearer credential, a 401 hands off to the
//! [`RefreshCoordinator`], and the request is re-sent at most once.

use super::transport::{ApiRequest, HttpTransport};
use crate::auth::{RefreshCoordinator, SessionEndedHandler, TokenStore};
use crate::error::{Result, SessionError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Re-sends allowed after a renewed token
const MAX_AUTH_RETRIES: u32 = 1;

/// Per-call bookkeeping, threaded through the call instead of stored on the request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub attempt: u32,
}

impl RequestContext {
    pub fn can_retry(&self) -> bool {
        self.attempt < MAX_AUTH_RETRIES
    }
}

pub struct RequestPipeline {
    transport: Arc<dyn HttpTransport>,
    tokens: TokenStore,
    coordinator: Arc<RefreshCoordinator>,
}

impl RequestPipeline {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        tokens: TokenStore,
        on_session_ended: Arc<dyn SessionEndedHandler>,
    ) -> Self {
        let coordinator = Arc::new(RefreshCoordinator::new(
            transport.clone(),
            tokens.clone(),
            on_session_ended,
        ));
        Self {
            transport,
            tokens,
            coordinator,
        }
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// Send `request` with the session's credentials and return the response body.
    pub async fn call(&self, mut request: ApiRequest) -> Result<Value> {
        // One key per logical call, reused if the call is re-sent
        if !request.is_idempotent() && request.idempotency_key.is_none() {
            request.idempotency_key = Some(Uuid::new_v4().to_string());
        }

        let mut ctx = RequestContext::default();
        let mut bearer = self.tokens.access_token();

        loop {
            let response = self.transport.execute(&request, bearer.as_deref()).await?;

            if response.is_success() {
                return Ok(response.body);
            }
            if !response.is_unauthorized() {
                debug!(
                    method = %request.method,
                    path = %request.path,
                    status = response.status,
                    "request failed"
                );
                return Err(response.into_error());
            }
            if !ctx.can_retry() {
                warn!(
                    method = %request.method,
                    path = %request.path,
                    "request rejected again after token renewal"
                );
                return Err(response.into_error());
            }

            ctx.attempt += 1;
            debug!(
                method = %request.method,
                path = %request.path,
                attempt = ctx.attempt,
                "access token rejected, renewing"
            );
            bearer = Some(self.coordinator.renew(bearer.as_deref()).await?);
        }
    }

    /// [`call`](Self::call) and decode the body into `T`
    pub async fn call_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let body = self.call(request).await?;
        serde_json::from_value(body).map_err(|e| SessionError::Decode(e.to_string()))
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        self.call(ApiRequest::get(path)).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value> {
        self.call(ApiRequest::post(path).json(body)).await
    }

    pub async fn put(&self, path: &str, body: Option<Value>) -> Result<Value> {
        let request = ApiRequest::put(path);
        let request = match body {
            Some(body) => request.json(body),
            None => request,
        };
        self.call(request).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value> {
        self.call(ApiRequest::delete(path)).await
    }
}

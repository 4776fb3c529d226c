/// Preset configurations for the client's outbound channels
use crate::backoff::BackoffPolicy;
use std::time::Duration;

/// Configuration bundle for a channel type
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub timeout: Duration,
    pub backoff: BackoffPolicy,
}

/// REST calls against the backend API
///
/// - Timeout: 10s
/// - No retry (the request pipeline only re-sends after a token refresh)
pub fn http_api_config() -> ServiceConfig {
    ServiceConfig {
        timeout: Duration::from_secs(10),
        backoff: BackoffPolicy::none(),
    }
}

/// Realtime push channel (WebSocket)
///
/// - Connect timeout: 10s
/// - Reconnect: 5 attempts, fixed 3s delay
pub fn realtime_channel_config() -> ServiceConfig {
    ServiceConfig {
        timeout: Duration::from_secs(10),
        backoff: BackoffPolicy::fixed(5, Duration::from_secs(3)),
    }
}

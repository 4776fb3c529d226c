use crate::error::{Result, SessionError};
use resilience::{presets, BackoffPolicy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub realtime: RealtimeConfig,
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    pub max_reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
    pub connect_timeout_secs: u64,
    /// Roles allowed to open the realtime channel (case-insensitive)
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    pub page_size: u32,
}

impl Config {
    /// Defaults come from the resilience presets, overridden by the environment
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();
        Ok(Config {
            api: ApiConfig {
                base_url: std::env::var("API_BASE_URL").unwrap_or(defaults.api.base_url),
                request_timeout_secs: parse_env(
                    "API_REQUEST_TIMEOUT_SECS",
                    defaults.api.request_timeout_secs,
                )?,
            },
            realtime: RealtimeConfig {
                max_reconnect_attempts: parse_env(
                    "REALTIME_MAX_RECONNECT_ATTEMPTS",
                    defaults.realtime.max_reconnect_attempts,
                )?,
                reconnect_delay_ms: parse_env(
                    "REALTIME_RECONNECT_DELAY_MS",
                    defaults.realtime.reconnect_delay_ms,
                )?,
                connect_timeout_secs: parse_env(
                    "REALTIME_CONNECT_TIMEOUT_SECS",
                    defaults.realtime.connect_timeout_secs,
                )?,
                roles: std::env::var("REALTIME_ROLES")
                    .map(|raw| split_roles(&raw))
                    .unwrap_or(defaults.realtime.roles),
            },
            notifications: NotificationsConfig {
                page_size: parse_env("NOTIFICATIONS_PAGE_SIZE", defaults.notifications.page_size)?,
            },
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        let http = presets::http_api_config();
        let realtime = presets::realtime_channel_config();
        Config {
            api: ApiConfig {
                base_url: "http://localhost:8000".to_string(),
                request_timeout_secs: http.timeout.as_secs(),
            },
            realtime: RealtimeConfig {
                max_reconnect_attempts: realtime.backoff.max_attempts,
                reconnect_delay_ms: realtime.backoff.delay.as_millis() as u64,
                connect_timeout_secs: realtime.timeout.as_secs(),
                roles: vec!["admin".to_string()],
            },
            notifications: NotificationsConfig { page_size: 20 },
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl RealtimeConfig {
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::fixed(
            self.max_reconnect_attempts,
            Duration::from_millis(self.reconnect_delay_ms),
        )
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Realtime delivery is an authorization decision made on the session role
    pub fn allows_role(&self, role: Option<&str>) -> bool {
        role.map(|role| self.roles.iter().any(|r| r.eq_ignore_ascii_case(role)))
            .unwrap_or(false)
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| SessionError::Config(format!("{key}={raw:?}: {e}"))),
        Err(_) => Ok(default),
    }
}

fn split_roles(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_realtime_policy() {
        let config = Config::default();
        let policy = config.realtime.backoff_policy();

        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy, presets::realtime_channel_config().backoff);
        assert_eq!(policy.delay, Duration::from_secs(3));
        assert_eq!(config.api.request_timeout(), presets::http_api_config().timeout);
        assert_eq!(config.realtime.connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_allows_role_is_case_insensitive() {
        let realtime = Config::default().realtime;

        assert!(realtime.allows_role(Some("admin")));
        assert!(realtime.allows_role(Some("Admin")));
        assert!(!realtime.allows_role(Some("user")));
        assert!(!realtime.allows_role(None));
    }

    #[test]
    fn test_split_roles() {
        assert_eq!(split_roles("admin, reviewer,,"), vec!["admin", "reviewer"]);
        assert!(split_roles("").is_empty());
    }

    #[test]
    fn test_parse_env_rejects_garbage() {
        std::env::set_var("SESSION_CLIENT_TEST_PAGE_SIZE", "twenty");
        let result: Result<u32> = parse_env("SESSION_CLIENT_TEST_PAGE_SIZE", 20);
        std::env::remove_var("SESSION_CLIENT_TEST_PAGE_SIZE");

        assert!(matches!(result, Err(SessionError::Config(_))));
    }

    #[test]
    fn test_parse_env_default_when_unset() {
        let result: Result<u64> = parse_env("SESSION_CLIENT_TEST_UNSET_KEY", 42);
        assert_eq!(result, Ok(42));
    }
}

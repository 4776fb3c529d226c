/// Resilience primitives for the session client
///
/// - **Timeout**: Enforces time limits on outbound calls and channel opens
/// - **Backoff**: Bounded attempt policy with a fixed delay
/// - **Preset Configurations**: Pre-tuned settings for REST calls and the realtime channel
///
/// # Example: Bounded reconnect loop
///
/// ```rust,no_run
/// use resilience::{presets, with_timeout};
///
/// #[tokio::main]
/// async fn main() {
///     let config = presets::realtime_channel_config();
///     let policy = config.backoff;
///
///     let mut attempts = 0;
///     loop {
///         let opened = with_timeout(config.timeout, async {
///             // Open your channel here
///             Err::<(), _>("connection refused")
///         })
///         .await;
///
///         if matches!(opened, Ok(Ok(()))) || !policy.allows(attempts) {
///             break;
///         }
///         attempts += 1;
///         tokio::time::sleep(policy.delay).await;
///     }
/// }
/// ```

pub mod backoff;
pub mod presets;
pub mod timeout;

// Re-export main types for convenience
pub use backoff::BackoffPolicy;
pub use presets::{http_api_config, realtime_channel_config, ServiceConfig};
pub use timeout::{with_timeout, TimeoutError};

/// Timeout wrapper for async operations
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimeoutError {
    #[error("Operation timed out after {0:?}")]
    Elapsed(Duration),
}

/// Execute a future with timeout
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    timeout(duration, future).await.map_err(|_| {
        tracing::debug!(timeout_ms = duration.as_millis() as u64, "operation timed out");
        TimeoutError::Elapsed(duration)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_success() {
        let result = with_timeout(Duration::from_secs(1), async { 42 }).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_elapsed() {
        let result = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            42
        })
        .await;

        assert_eq!(result, Err(TimeoutError::Elapsed(Duration::from_millis(10))));
    }

    #[tokio::test]
    async fn test_timeout_passes_inner_error_through() {
        let result = with_timeout(Duration::from_secs(1), async {
            Err::<i32, _>("connection refused")
        })
        .await;

        assert_eq!(result, Ok(Err("connection refused")));
    }
}

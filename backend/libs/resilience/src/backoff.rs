/// Bounded backoff policy for reconnect loops
///
/// Attempts are counted from 1. Once `max_attempts` have been spent the
/// policy reports exhaustion and the caller stops trying.
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Maximum number of attempts after the initial one
    pub max_attempts: u32,
    /// Wait before each attempt
    pub delay: Duration,
}

impl BackoffPolicy {
    /// Same delay before every attempt
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Single attempt, never retried
    pub fn none() -> Self {
        Self::fixed(0, Duration::ZERO)
    }

    /// Whether another attempt is allowed after `attempts_made` attempts
    pub fn allows(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

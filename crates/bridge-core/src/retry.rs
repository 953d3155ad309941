use std::time::Duration;

/// Bounded retry policy with linearly increasing backoff.
///
/// `attempt` is 1-based: the delay after the first failure is `base_delay_ms`,
/// after the second `2 * base_delay_ms`, and so on, capped at `max_delay_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
            max_delay_ms: max_delay_ms.max(base_delay_ms),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay_ms(&self) -> u64 {
        self.base_delay_ms
    }

    pub fn max_delay_ms(&self) -> u64 {
        self.max_delay_ms
    }

    /// Whether another attempt is allowed after `attempt` attempts have failed.
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let calculated = self.base_delay_ms.saturating_mul(u64::from(attempt.max(1)));
        Duration::from_millis(calculated.min(self.max_delay_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 500, 5_000)
    }
}

/// Per-operation-class retry parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicies {
    /// History fetch and chat list.
    pub idempotent_read: RetryPolicy,
    /// One-time code submission: at most one reconnect-and-retry.
    pub sensitive_submission: RetryPolicy,
    /// Join group/channel.
    pub membership: RetryPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            idempotent_read: RetryPolicy::new(3, 500, 5_000),
            sensitive_submission: RetryPolicy::new(2, 500, 5_000),
            membership: RetryPolicy::new(3, 600, 5_000),
        }
    }
}

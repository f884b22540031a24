use std::time::Duration;

/// Linear backoff between retries: `min(max_retry_backoff, attempt * min_retry_backoff)`,
/// per the pool's configured bounds. Modeled on the reference codebase's
/// `RetryPolicy`, simplified from its exponential coefficient since
/// spec.md's ConnPool tuning is specified as a linear ramp.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, min_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_retries,
            min_backoff,
            max_backoff,
        }
    }

    /// Backoff duration before the given attempt (1-indexed).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let candidate = self.min_backoff.saturating_mul(attempt.max(1));
        std::cmp::min(candidate, self.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_ramps_linearly_then_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(8), Duration::from_millis(512));
        assert_eq!(policy.backoff_for(1), Duration::from_millis(8));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(16));
        assert_eq!(policy.backoff_for(100), Duration::from_millis(512));
    }
}

use std::time::Duration;

/// High-level classification of an error for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Attempt exceeded its deadline.
    Timeout,
    /// Source asked us to slow down (e.g. 429, 503).
    Throttled,
    /// Network-level failure (connection reset, DNS, etc.).
    Connection,
    /// Retryable HTTP status that is not strictly throttling (5xx).
    Http5xx(u16),
    /// Any other error (not retried).
    Other,
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    NoRetry,
    RetryAfter(Duration),
}

/// Exponential backoff with a fixed attempt budget.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries; handy for tests and one-shot checks.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// `attempt` is 1-based (1 = first attempt).
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::NoRetry;
        }

        match kind {
            ErrorKind::Other => RetryDecision::NoRetry,
            ErrorKind::Timeout
            | ErrorKind::Connection
            | ErrorKind::Throttled
            | ErrorKind::Http5xx(_) => {
                // base * 2^(attempt-1), capped; throttling waits one extra step.
                let step = match kind {
                    ErrorKind::Throttled => attempt,
                    _ => attempt.saturating_sub(1),
                };
                let raw = self.base_delay.saturating_mul(1u32 << step.min(8));
                RetryDecision::RetryAfter(raw.min(self.max_delay))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_retry_for_other() {
        let p = RetryPolicy::default();
        assert_eq!(p.decide(1, ErrorKind::Other), RetryDecision::NoRetry);
    }

    #[test]
    fn backoff_doubles_and_is_capped() {
        let p = RetryPolicy {
            max_attempts: 20,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
        };
        assert_eq!(
            p.decide(1, ErrorKind::Timeout),
            RetryDecision::RetryAfter(Duration::from_millis(100))
        );
        assert_eq!(
            p.decide(2, ErrorKind::Connection),
            RetryDecision::RetryAfter(Duration::from_millis(200))
        );
        assert_eq!(
            p.decide(1, ErrorKind::Throttled),
            RetryDecision::RetryAfter(Duration::from_millis(200))
        );
        assert_eq!(
            p.decide(10, ErrorKind::Timeout),
            RetryDecision::RetryAfter(Duration::from_secs(1))
        );
    }

    #[test]
    fn respects_max_attempts() {
        let p = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        };
        assert!(matches!(p.decide(1, ErrorKind::Throttled), RetryDecision::RetryAfter(_)));
        assert!(matches!(p.decide(2, ErrorKind::Http5xx(502)), RetryDecision::RetryAfter(_)));
        assert_eq!(p.decide(3, ErrorKind::Throttled), RetryDecision::NoRetry);
        assert_eq!(RetryPolicy::no_retry().decide(1, ErrorKind::Timeout), RetryDecision::NoRetry);
    }
}

use std::time::Duration;

/// Concurrency and spacing bounds for one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleLimits {
    /// Maximum concurrent in-flight requests (at least 1).
    pub max_concurrent: usize,
    /// Minimum time between two request starts.
    pub min_interval: Duration,
}

impl ThrottleLimits {
    pub fn new(max_concurrent: usize, min_interval: Duration) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            min_interval,
        }
    }

    /// Concurrency bound only, no spacing.
    pub fn concurrency(max_concurrent: usize) -> Self {
        Self::new(max_concurrent, Duration::ZERO)
    }
}

impl Default for ThrottleLimits {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(500))
    }
}

//! Retry loop: run a fetch until success, budget exhaustion, or cancellation.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::throttle::ThrottlePermit;

use super::classify;
use super::error::FetchError;
use super::policy::{RetryDecision, RetryPolicy};

/// Successful result plus the number of attempts it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

/// Last error once retrying stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFailure {
    pub error: FetchError,
    pub attempts: u32,
}

/// Runs `f` until it succeeds or the policy says to stop.
///
/// Every attempt carries `deadline`; expiry counts as [`FetchError::Timeout`].
/// Between attempts the loop backs off, then waits for the source's spacing
/// interval on the held `permit`. Once `cancel` fires no further attempt is
/// started; the in-flight one is always allowed to finish.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    deadline: Duration,
    permit: &mut ThrottlePermit,
    cancel: &CancellationToken,
    mut f: F,
) -> Result<Attempted<T>, RetryFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 1u32;
    loop {
        let result = match tokio::time::timeout(deadline, f(attempt)).await {
            Ok(r) => r,
            Err(_) => Err(FetchError::Timeout),
        };
        let error = match result {
            Ok(value) => {
                return Ok(Attempted {
                    value,
                    attempts: attempt,
                })
            }
            Err(e) => e,
        };

        if cancel.is_cancelled() {
            return Err(RetryFailure {
                error,
                attempts: attempt,
            });
        }
        match policy.decide(attempt, classify::classify(&error)) {
            RetryDecision::NoRetry => {
                return Err(RetryFailure {
                    error,
                    attempts: attempt,
                })
            }
            RetryDecision::RetryAfter(delay) => {
                tracing::warn!(
                    source_id = %permit.source(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "fetch failed, retrying: {error}"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        return Err(RetryFailure { error, attempts: attempt });
                    }
                }
                permit.pace().await;
                attempt += 1;
            }
        }
    }
}

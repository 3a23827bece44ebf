//! Retry and backoff policy for source fetches.
//!
//! Classifies provider failures (timeouts, throttling, connection errors)
//! and drives the per-item attempt loop so update and download workers
//! share one policy.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{classify, classify_http_status};
pub use error::FetchError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::{run_with_retry, Attempted, RetryFailure};

//! Error type returned by source providers.

/// Failure of a single fetch against a remote source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The attempt did not finish before its deadline.
    #[error("fetch timed out")]
    Timeout,
    /// Network-level failure (reset, DNS, TLS).
    #[error("connection failed: {0}")]
    Connection(String),
    /// Source asked us to slow down.
    #[error("throttled by source: {0}")]
    Throttled(String),
    /// Source answered with a non-success HTTP status.
    #[error("source returned HTTP {status}")]
    Remote { status: u16 },
    /// Manga or chapter no longer exists on the source.
    #[error("not found: {0}")]
    NotFound(String),
    /// Parse failures and anything else not worth retrying.
    #[error("{0}")]
    Other(String),
}

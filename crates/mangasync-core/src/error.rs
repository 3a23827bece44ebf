//! Error types callers are expected to match on.

use crate::run::RunKind;
use crate::source::MangaId;

/// Failure to start a run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// A run of the same kind is active. Not fatal: poll its status instead.
    #[error("a {0} run is already active")]
    AlreadyRunning(RunKind),
    /// The history record or plan could not be written.
    #[error("run store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

/// Failure to commit a chapter's sync state.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// The record changed underneath us (external edit won).
    #[error("chapter {url} of manga {manga_id} was edited during reconciliation")]
    Conflict { manga_id: MangaId, url: String },
    #[error("sync store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

/// Unknown string form of a persisted enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {what}: {value:?}")]
pub struct ParseEnumError {
    pub what: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub(crate) fn new(what: &'static str, value: &str) -> Self {
        Self {
            what,
            value: value.to_string(),
        }
    }
}

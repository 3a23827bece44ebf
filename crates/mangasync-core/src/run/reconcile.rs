//! Reconciliation of dirty chapter records, with one retry on conflict.

use anyhow::Result;

use crate::error::ReconcileError;
use crate::resume_db::{ChapterSyncRecord, ResumeDb, RunId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Committed; `retried` if the first attempt lost to an external edit.
    Committed { retried: bool },
    /// Lost twice (or the record vanished); the caller skips the item.
    Conflicted,
}

/// Commit `staged` for `run_id`. On conflict the record is re-read so the
/// external edit's values win, and the commit is tried exactly once more.
pub async fn reconcile_with_retry(
    db: &ResumeDb,
    staged: &ChapterSyncRecord,
    run_id: RunId,
) -> Result<ReconcileOutcome> {
    match db.reconcile(staged, run_id).await {
        Ok(()) => return Ok(ReconcileOutcome::Committed { retried: false }),
        Err(ReconcileError::Store(e)) => return Err(e),
        Err(err @ ReconcileError::Conflict { .. }) => {
            tracing::warn!(run_id, "{err}; retrying with fresh state");
        }
    }

    let Some(fresh) = db.get_chapter_sync(staged.manga_id, &staged.url).await? else {
        return Ok(ReconcileOutcome::Conflicted);
    };
    match db.reconcile(&fresh, run_id).await {
        Ok(()) => Ok(ReconcileOutcome::Committed { retried: true }),
        Err(ReconcileError::Store(e)) => Err(e),
        Err(err @ ReconcileError::Conflict { .. }) => {
            tracing::warn!(run_id, "{err}; giving up");
            Ok(ReconcileOutcome::Conflicted)
        }
    }
}

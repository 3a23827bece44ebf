//! Processing of a single work item while holding its source permit.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::resume_db::{ResumeDb, RunId};
use crate::retry::{run_with_retry, Attempted, FetchError};
use crate::source::{ChapterRef, MangaId, SourceRegistry};
use crate::storage::{self, ChapterWriteError};
use crate::throttle::ThrottlePermit;

use super::controller::RunSettings;
use super::item::{ItemOutcome, ItemTarget, SkipReason};
use super::kind::RunKind;
use super::reconcile::{reconcile_with_retry, ReconcileOutcome};

/// Everything a worker needs; shared by all workers of one run.
pub(crate) struct WorkerContext {
    pub db: ResumeDb,
    pub sources: SourceRegistry,
    pub settings: Arc<RunSettings>,
    pub kind: RunKind,
    pub run_id: RunId,
    pub cancel: CancellationToken,
}

pub(crate) async fn process_item(
    ctx: Arc<WorkerContext>,
    target: ItemTarget,
    permit: ThrottlePermit,
) -> ItemOutcome {
    match ctx.kind {
        RunKind::Update => update_manga(&ctx, &target, permit).await,
        RunKind::Download => download_chapter(&ctx, &target, permit).await,
    }
}

fn failed(attempts: u32, error: impl ToString) -> ItemOutcome {
    ItemOutcome::Failed {
        attempts,
        error: error.to_string(),
    }
}

async fn update_manga(ctx: &WorkerContext, target: &ItemTarget, mut permit: ThrottlePermit) -> ItemOutcome {
    let Some(provider) = ctx.sources.get(target.source_id) else {
        return failed(0, format!("no provider registered for source {}", target.source_id));
    };
    let (source, manga) = (target.source_id, target.manga_id);

    let fetched = run_with_retry(
        &ctx.settings.retry,
        ctx.settings.fetch_timeout,
        &mut permit,
        &ctx.cancel,
        |attempt| {
            let provider = Arc::clone(&provider);
            tracing::debug!(run_id = ctx.run_id, manga_id = manga, source_id = %source, attempt, "fetching chapter list");
            async move { provider.fetch_chapter_list(source, manga).await }
        },
    )
    .await;
    // Reconciliation is local work; free the source for other workers.
    drop(permit);

    let Attempted {
        value: chapters,
        attempts,
    } = match fetched {
        Ok(a) => a,
        Err(f) => return failed(f.attempts, f.error),
    };

    let new_chapters = match ctx.db.insert_new_chapters(manga, &chapters).await {
        Ok(new) => new,
        Err(e) => return failed(attempts, format!("{e:#}")),
    };
    match reconcile_manga(ctx, manga).await {
        Ok(None) => ItemOutcome::Succeeded {
            attempts,
            new_chapters,
            checksum: None,
        },
        Ok(Some(url)) => ItemOutcome::Skipped {
            reason: SkipReason::Conflict,
            attempts,
            error: Some(format!("chapter {url} kept changing during reconciliation")),
        },
        Err(e) => failed(attempts, format!("{e:#}")),
    }
}

/// Reconcile every dirty record of `manga`. Returns the URL of the first
/// record that stayed in conflict, if any.
async fn reconcile_manga(ctx: &WorkerContext, manga: MangaId) -> anyhow::Result<Option<String>> {
    let mut conflicted = None;
    for record in ctx.db.dirty_chapters(manga).await? {
        match reconcile_with_retry(&ctx.db, &record, ctx.run_id).await? {
            ReconcileOutcome::Committed { .. } => {}
            ReconcileOutcome::Conflicted => {
                conflicted.get_or_insert(record.url);
            }
        }
    }
    Ok(conflicted)
}

impl From<ChapterWriteError> for FetchError {
    fn from(e: ChapterWriteError) -> Self {
        match e {
            // Broken content stream: same as a dropped connection, retryable.
            ChapterWriteError::Source(io) => FetchError::Connection(io.to_string()),
            disk @ ChapterWriteError::Disk { .. } => FetchError::Other(disk.to_string()),
        }
    }
}

async fn download_chapter(
    ctx: &WorkerContext,
    target: &ItemTarget,
    mut permit: ThrottlePermit,
) -> ItemOutcome {
    let Some(chapter) = target.chapter_id else {
        return failed(0, "download item has no chapter id");
    };
    let Some(provider) = ctx.sources.get(target.source_id) else {
        return failed(0, format!("no provider registered for source {}", target.source_id));
    };
    let source = target.source_id;
    let dest = storage::chapter_path(&ctx.settings.download_dir, source, &target.title, chapter);

    let stored = run_with_retry(
        &ctx.settings.retry,
        ctx.settings.fetch_timeout,
        &mut permit,
        &ctx.cancel,
        |attempt| {
            let provider = Arc::clone(&provider);
            let dest = dest.clone();
            tracing::debug!(run_id = ctx.run_id, chapter_id = chapter, source_id = %source, attempt, "downloading chapter");
            async move {
                let stream = provider.fetch_chapter_content(source, chapter).await?;
                Ok::<_, FetchError>(storage::write_chapter(&dest, stream).await?)
            }
        },
    )
    .await;

    match stored {
        Ok(Attempted { value, attempts }) => {
            tracing::info!(
                run_id = ctx.run_id,
                chapter_id = chapter,
                bytes = value.bytes,
                sha256 = %value.sha256,
                "stored {}",
                value.path.display()
            );
            ItemOutcome::Succeeded {
                attempts,
                new_chapters: Vec::<ChapterRef>::new(),
                checksum: Some(value.sha256),
            }
        }
        Err(f) => failed(f.attempts, f.error),
    }
}

//! Dispatch loop of one run.
//!
//! Pending items are queued per source. Whenever a worker slot is free the
//! driver hands out the next item of any source whose throttle grants a
//! permit right now, rotating between sources, so a stalled source never
//! holds up the others. With nothing ready it parks until a permit is
//! released, a spacing interval elapses, a worker finishes, or the run is
//! cancelled.

use anyhow::Result;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;

use crate::resume_db::{RecordStatus, RunItemRecord, TerminalFields, UpdateRecord};
use crate::source::SourceId;
use crate::throttle::{sleep_until_opt, NotReady, SourceThrottle, ThrottlePermit};

use super::gate::{RunGate, RunPhase};
use super::item::{ItemOutcome, ItemState, SkipReason, WorkItem};
use super::progress::ProgressAggregator;
use super::worker::{process_item, WorkerContext};

const FINALIZE_ATTEMPTS: u32 = 3;

/// Pending item indices grouped by source, in first-seen source order.
#[derive(Debug, Default)]
pub(crate) struct SourceQueues {
    order: Vec<SourceId>,
    queues: HashMap<SourceId, VecDeque<usize>>,
    cursor: usize,
    len: usize,
}

pub(crate) enum Ready {
    Item(usize, ThrottlePermit),
    /// Nothing can start now; earliest spacing deadline if any source is only spaced out.
    Wait(Option<Instant>),
    Empty,
}

impl SourceQueues {
    pub fn push(&mut self, source: SourceId, idx: usize) {
        let queue = self.queues.entry(source).or_insert_with(|| {
            self.order.push(source);
            VecDeque::new()
        });
        queue.push_back(idx);
        self.len += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Next item whose source grants a permit, starting after the source served last.
    pub fn next_ready(&mut self, throttle: &SourceThrottle) -> Ready {
        if self.is_empty() {
            return Ready::Empty;
        }
        let mut wake_at: Option<Instant> = None;
        let n = self.order.len();
        for step in 0..n {
            let pos = (self.cursor + step) % n;
            let source = self.order[pos];
            let Some(queue) = self.queues.get_mut(&source) else {
                continue;
            };
            if queue.is_empty() {
                continue;
            }
            match throttle.try_acquire(source) {
                Ok(permit) => {
                    if let Some(idx) = queue.pop_front() {
                        self.len -= 1;
                        self.cursor = (pos + 1) % n;
                        return Ready::Item(idx, permit);
                    }
                }
                Err(NotReady::Busy) => {}
                Err(NotReady::SpacedUntil(at)) => {
                    wake_at = Some(wake_at.map_or(at, |w| w.min(at)));
                }
            }
        }
        Ready::Wait(wake_at)
    }

    /// Remove and return every queued index.
    pub fn drain(&mut self) -> Vec<usize> {
        self.len = 0;
        let mut out: Vec<usize> = self.queues.values_mut().flat_map(|q| q.drain(..)).collect();
        out.sort_unstable();
        out
    }
}

enum Event {
    Joined(Result<(usize, ItemOutcome), JoinError>),
    Wake,
}

pub(crate) struct RunDriver {
    pub ctx: Arc<WorkerContext>,
    pub batch_id: String,
    pub items: Vec<WorkItem>,
    pub throttle: Arc<SourceThrottle>,
    pub progress: Arc<ProgressAggregator>,
    pub gate: Arc<RunGate>,
    pub max_workers: usize,
}

impl RunDriver {
    pub async fn run(mut self) -> Result<UpdateRecord> {
        tracing::info!(
            run_id = self.ctx.run_id,
            kind = %self.ctx.kind,
            batch_id = %self.batch_id,
            total = self.items.len(),
            "run started"
        );
        for idx in 0..self.items.len() {
            if self.items[idx].target.excluded {
                self.skip_pending(idx, SkipReason::Excluded).await;
            }
        }
        self.dispatch().await;
        self.finish().await
    }

    async fn dispatch(&mut self) {
        let throttle = Arc::clone(&self.throttle);
        let cancel = self.ctx.cancel.clone();
        let max_workers = self.max_workers.max(1);

        let mut queues = SourceQueues::default();
        for item in self.items.iter().filter(|i| i.state == ItemState::Pending) {
            queues.push(item.source_id(), item.seq);
        }
        let mut workers: JoinSet<(usize, ItemOutcome)> = JoinSet::new();

        loop {
            if cancel.is_cancelled() && !queues.is_empty() {
                let pending = queues.drain();
                tracing::info!(run_id = self.ctx.run_id, skipped = pending.len(), "cancelled, skipping pending items");
                for idx in pending {
                    self.skip_pending(idx, SkipReason::Cancelled).await;
                }
            }

            // Register for release wakeups before probing, so none is missed.
            let released = throttle.released();
            tokio::pin!(released);
            released.as_mut().enable();

            let mut wake_at = None;
            while workers.len() < max_workers {
                match queues.next_ready(&throttle) {
                    Ready::Item(idx, permit) => self.spawn_item(&mut workers, idx, permit),
                    Ready::Wait(at) => {
                        wake_at = at;
                        break;
                    }
                    Ready::Empty => break,
                }
            }

            if workers.is_empty() && queues.is_empty() {
                break;
            }
            let waiting = !queues.is_empty() && workers.len() < max_workers;
            let watch_cancel = !queues.is_empty() && !cancel.is_cancelled();

            let event = tokio::select! {
                Some(joined) = workers.join_next(), if !workers.is_empty() => Event::Joined(joined),
                _ = released.as_mut(), if waiting => Event::Wake,
                _ = sleep_until_opt(wake_at), if waiting => Event::Wake,
                _ = cancel.cancelled(), if watch_cancel => Event::Wake,
            };
            if let Event::Joined(joined) = event {
                self.complete(joined).await;
            }
        }
    }

    fn spawn_item(
        &mut self,
        workers: &mut JoinSet<(usize, ItemOutcome)>,
        idx: usize,
        permit: ThrottlePermit,
    ) {
        let item = &mut self.items[idx];
        item.mark_running();
        self.progress.start_item(item);
        tracing::debug!(
            run_id = self.ctx.run_id,
            manga_id = item.target.manga_id,
            chapter_id = ?item.target.chapter_id,
            source_id = %item.source_id(),
            "item running"
        );

        let ctx = Arc::clone(&self.ctx);
        let target = item.target.clone();
        workers.spawn(async move {
            // Inner task so a panicking worker still yields an outcome for `idx`.
            let outcome = match tokio::spawn(process_item(ctx, target, permit)).await {
                Ok(outcome) => outcome,
                Err(e) => ItemOutcome::Failed {
                    attempts: 0,
                    error: format!("worker task failed: {e}"),
                },
            };
            (idx, outcome)
        });
    }

    async fn complete(&mut self, joined: Result<(usize, ItemOutcome), JoinError>) {
        let (idx, outcome) = match joined {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(run_id = self.ctx.run_id, "worker wrapper failed: {e}");
                return;
            }
        };
        self.items[idx].apply(&outcome);
        let (new_chapters, checksum) = match outcome {
            ItemOutcome::Succeeded {
                new_chapters,
                checksum,
                ..
            } => (new_chapters, checksum),
            _ => (Vec::new(), None),
        };

        let item = &self.items[idx];
        match item.state {
            ItemState::Failed => tracing::warn!(
                run_id = self.ctx.run_id,
                manga_id = item.target.manga_id,
                chapter_id = ?item.target.chapter_id,
                attempts = item.attempt,
                "item failed: {}",
                item.last_error.as_deref().unwrap_or("unknown error")
            ),
            state => tracing::debug!(
                run_id = self.ctx.run_id,
                manga_id = item.target.manga_id,
                chapter_id = ?item.target.chapter_id,
                new_chapters = new_chapters.len(),
                "item {}",
                state.as_str()
            ),
        }
        self.persist(idx, checksum).await;
        self.progress.finish_item(&self.items[idx], &new_chapters);
    }

    async fn skip_pending(&mut self, idx: usize, reason: SkipReason) {
        self.items[idx].mark_skipped(reason);
        self.persist(idx, None).await;
        self.progress.skip_pending(&self.items[idx]);
    }

    /// Record the terminal outcome for resume. A failed write only costs redoing the item.
    async fn persist(&self, idx: usize, checksum: Option<String>) {
        let item = &self.items[idx];
        let record = RunItemRecord {
            batch_id: self.batch_id.clone(),
            manga_id: item.target.manga_id,
            chapter_id: item.target.chapter_id,
            run_id: self.ctx.run_id,
            state: item.state,
            skip_reason: item.skip_reason,
            attempts: item.attempt,
            last_error: item.last_error.clone(),
            checksum,
        };
        if let Err(e) = self.ctx.db.record_item(&record).await {
            tracing::warn!(run_id = self.ctx.run_id, manga_id = item.target.manga_id, "failed to record item outcome: {e:#}");
        }
    }

    async fn finish(self) -> Result<UpdateRecord> {
        let drained_from = self.gate.begin_drain();
        let cancelled = self.ctx.cancel.is_cancelled() || drained_from == RunPhase::Cancelling;
        let fields = terminal_fields(&self.progress, cancelled);
        let run_id = self.ctx.run_id;

        let written = self.write_terminal(&fields).await;
        match &written {
            Ok(record) => {
                match self.ctx.db.close_abandoned(self.ctx.kind, &self.batch_id, run_id).await {
                    Ok(0) => {}
                    Ok(n) => tracing::info!(run_id, batch_id = %self.batch_id, closed = n, "closed abandoned runs of batch"),
                    Err(e) => tracing::warn!(run_id, "failed to close abandoned runs: {e:#}"),
                }
                tracing::info!(
                    run_id,
                    kind = %self.ctx.kind,
                    status = record.status.as_str(),
                    total = record.total_count,
                    succeeded = record.succ_count,
                    failed = record.failed_count,
                    skipped = record.skip_count,
                    new_chapters = record.new_chapter_count,
                    "run finished"
                );
            }
            // The slot is still released; the row keeps finish_at = 0 and shows up in recover().
            Err(e) => tracing::error!(run_id, "failed to write terminal history record: {e:#}"),
        }
        self.progress.finalize();
        self.gate.finish();
        written
    }

    async fn write_terminal(&self, fields: &TerminalFields) -> Result<UpdateRecord> {
        let mut attempt = 1;
        loop {
            match self.ctx.db.finalize_history(self.ctx.run_id, fields).await {
                Ok(record) => return Ok(record),
                Err(e) if attempt < FINALIZE_ATTEMPTS => {
                    tracing::warn!(run_id = self.ctx.run_id, attempt, "finalize history failed, retrying: {e:#}");
                    tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt))).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn terminal_fields(progress: &ProgressAggregator, cancelled: bool) -> TerminalFields {
    let snap = progress.snapshot();
    let (status, err_code, err_msg) = if cancelled {
        (
            RecordStatus::Aborted,
            Some("CANCELLED".to_string()),
            Some("cancelled by request".to_string()),
        )
    } else if snap.failed_count > 0 {
        (
            RecordStatus::CompletedWithErrors,
            None,
            Some(format!("{} of {} items failed", snap.failed_count, snap.total_count)),
        )
    } else {
        (RecordStatus::Completed, None, None)
    };
    TerminalFields {
        status,
        err_code,
        err_msg,
        total_count: snap.total_count as i64,
        succ_count: snap.finish_count as i64,
        failed_count: snap.failed_count as i64,
        skip_count: snap.skip_count as i64,
        new_chapter_count: snap.new_chapter_count as i64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::throttle::ThrottleLimits;

    fn queues(entries: &[(i64, usize)]) -> SourceQueues {
        let mut q = SourceQueues::default();
        for (source, idx) in entries {
            q.push(SourceId(*source), *idx);
        }
        q
    }

    fn expect_item(ready: Ready) -> (usize, ThrottlePermit) {
        match ready {
            Ready::Item(idx, permit) => (idx, permit),
            _ => panic!("expected a ready item"),
        }
    }

    #[tokio::test]
    async fn busy_source_does_not_block_others() {
        let throttle = SourceThrottle::new(ThrottleLimits::new(1, Duration::ZERO));
        let mut q = queues(&[(1, 0), (1, 1), (2, 2)]);

        let (first, _held) = expect_item(q.next_ready(&throttle));
        assert_eq!(first, 0);
        // Source 1 is at its limit; source 2's item goes next despite later submission.
        let (second, _held2) = expect_item(q.next_ready(&throttle));
        assert_eq!(second, 2);
        assert!(matches!(q.next_ready(&throttle), Ready::Wait(None)));
    }

    #[tokio::test(start_paused = true)]
    async fn spaced_source_reports_deadline() {
        let throttle = SourceThrottle::new(ThrottleLimits::new(4, Duration::from_millis(300)));
        let mut q = queues(&[(5, 0), (5, 1)]);
        let (_, permit) = expect_item(q.next_ready(&throttle));
        drop(permit);
        match q.next_ready(&throttle) {
            Ready::Wait(Some(at)) => assert!(at > Instant::now()),
            _ => panic!("expected a spacing deadline"),
        }
    }

    #[test]
    fn drain_returns_submission_order() {
        let mut q = queues(&[(2, 3), (1, 0), (2, 1), (1, 2)]);
        assert_eq!(q.drain(), [0, 1, 2, 3]);
        assert!(q.is_empty());
    }
}

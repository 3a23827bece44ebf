//! Progress aggregation for one run.
//!
//! Every item transition applies exactly one counter delta under a single
//! lock and publishes a freshly built [`RunSnapshot`] through a `watch`
//! channel. Readers only ever see published snapshots, so the sum invariant
//! holds in every observation and counters never regress.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use crate::resume_db::RunId;
use crate::source::{ChapterId, ChapterRef, MangaId, SourceId};

use super::item::{ItemState, SkipReason, WorkItem};

/// Final per-item summary, exposed once the run is no longer running.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MangaUpdateResult {
    pub manga_id: MangaId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter_id: Option<ChapterId>,
    pub source_id: SourceId,
    pub title: String,
    pub state: ItemState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    pub new_chapters: Vec<ChapterRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Point-in-time view of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    pub running: bool,
    pub total_count: u64,
    pub pending_count: u64,
    pub running_count: u64,
    pub finish_count: u64,
    pub failed_count: u64,
    pub skip_count: u64,
    pub skip_cancelled_count: u64,
    pub skip_excluded_count: u64,
    pub skip_conflict_count: u64,
    pub new_chapter_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_running_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_manga_results: Option<Vec<MangaUpdateResult>>,
}

impl RunSnapshot {
    /// `total == pending + running + finished + failed + skipped`.
    pub fn is_consistent(&self) -> bool {
        self.total_count
            == self.pending_count
                + self.running_count
                + self.finish_count
                + self.failed_count
                + self.skip_count
    }
}

#[derive(Debug)]
struct AggState {
    snapshot: RunSnapshot,
    /// Currently running items keyed by (entry order, submission seq).
    running: BTreeMap<(u64, usize), String>,
    entry_seq: BTreeMap<usize, (u64, usize)>,
    next_entry: u64,
    results: Vec<(usize, MangaUpdateResult)>,
}

impl AggState {
    fn oldest_running_title(&self) -> Option<String> {
        self.running.values().next().cloned()
    }

    fn record_result(&mut self, item: &WorkItem, new_chapters: &[ChapterRef]) {
        self.results.push((
            item.seq,
            MangaUpdateResult {
                manga_id: item.target.manga_id,
                chapter_id: item.target.chapter_id,
                source_id: item.target.source_id,
                title: item.target.title.clone(),
                state: item.state,
                skip_reason: item.skip_reason,
                new_chapters: new_chapters.to_vec(),
                error: item.last_error.clone(),
            },
        ));
    }

    fn count_skip(&mut self, reason: Option<SkipReason>) {
        self.snapshot.skip_count += 1;
        match reason {
            Some(SkipReason::Cancelled) => self.snapshot.skip_cancelled_count += 1,
            Some(SkipReason::Excluded) => self.snapshot.skip_excluded_count += 1,
            Some(SkipReason::Conflict) => self.snapshot.skip_conflict_count += 1,
            None => {}
        }
    }
}

#[derive(Debug)]
pub struct ProgressAggregator {
    state: Mutex<AggState>,
    tx: watch::Sender<Arc<RunSnapshot>>,
}

impl ProgressAggregator {
    /// All items start `Pending`; the run is marked running.
    pub fn new(run_id: RunId, items: &[WorkItem]) -> Self {
        let total = items.len() as u64;
        let snapshot = RunSnapshot {
            run_id: Some(run_id),
            running: true,
            total_count: total,
            pending_count: total,
            ..RunSnapshot::default()
        };
        let (tx, _rx) = watch::channel(Arc::new(snapshot.clone()));
        Self {
            state: Mutex::new(AggState {
                snapshot,
                running: BTreeMap::new(),
                entry_seq: BTreeMap::new(),
                next_entry: 0,
                results: Vec::with_capacity(items.len()),
            }),
            tx,
        }
    }

    /// Aggregator for a kind that has never run.
    pub fn idle() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(RunSnapshot::default()));
        Self {
            state: Mutex::new(AggState {
                snapshot: RunSnapshot::default(),
                running: BTreeMap::new(),
                entry_seq: BTreeMap::new(),
                next_entry: 0,
                results: Vec::new(),
            }),
            tx,
        }
    }

    pub fn snapshot(&self) -> Arc<RunSnapshot> {
        Arc::clone(&self.tx.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<RunSnapshot>> {
        self.tx.subscribe()
    }

    fn update(&self, f: impl FnOnce(&mut AggState)) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state);
        self.tx.send_replace(Arc::new(state.snapshot.clone()));
    }

    /// `Pending → Running`.
    pub fn start_item(&self, item: &WorkItem) {
        self.update(|s| {
            s.snapshot.pending_count -= 1;
            s.snapshot.running_count += 1;
            let key = (s.next_entry, item.seq);
            s.next_entry += 1;
            s.running.insert(key, item.target.title.clone());
            s.entry_seq.insert(item.seq, key);
            if s.snapshot.first_running_title.is_none() {
                s.snapshot.first_running_title = Some(item.target.title.clone());
            }
        });
    }

    /// `Running → Succeeded | Failed | Skipped`, with the new chapters an update found.
    pub fn finish_item(&self, item: &WorkItem, new_chapters: &[ChapterRef]) {
        self.update(|s| {
            s.snapshot.running_count -= 1;
            match item.state {
                ItemState::Succeeded => {
                    s.snapshot.finish_count += 1;
                    s.snapshot.new_chapter_count += new_chapters.len() as u64;
                }
                ItemState::Failed => s.snapshot.failed_count += 1,
                _ => s.count_skip(item.skip_reason),
            }
            let oldest = s.running.keys().next().copied();
            if let Some(key) = s.entry_seq.remove(&item.seq) {
                s.running.remove(&key);
                if oldest == Some(key) {
                    s.snapshot.first_running_title = s.oldest_running_title();
                }
            }
            s.record_result(item, new_chapters);
        });
    }

    /// `Pending → Skipped` without dispatch (cancellation or exclusion).
    pub fn skip_pending(&self, item: &WorkItem) {
        self.update(|s| {
            s.snapshot.pending_count -= 1;
            s.count_skip(item.skip_reason);
            s.record_result(item, &[]);
        });
    }

    /// Mark the run finished and attach per-item results ordered by submission.
    pub fn finalize(&self) -> Arc<RunSnapshot> {
        self.update(|s| {
            s.snapshot.running = false;
            s.snapshot.first_running_title = None;
            s.results.sort_by_key(|(seq, _)| *seq);
            s.snapshot.per_manga_results =
                Some(s.results.iter().map(|(_, r)| r.clone()).collect());
        });
        self.snapshot()
    }
}

//! Turn a selector into the ordered item list of a run.
//!
//! Items a previous unfinished run of the same batch already brought to
//! `succeeded`/`skipped` are dropped so completed work is never redone.

use anyhow::Result;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::resume_db::ResumeDb;

use super::item::{ItemTarget, WorkItem};
use super::kind::RunKind;

/// What a run should process.
#[derive(Debug, Clone, Default)]
pub struct ItemSelector {
    /// Logical batch; reuse it to resume a run that never finished.
    /// A fresh id is generated when absent.
    pub batch_id: Option<String>,
    pub targets: Vec<ItemTarget>,
}

impl ItemSelector {
    pub fn new(targets: Vec<ItemTarget>) -> Self {
        Self {
            batch_id: None,
            targets,
        }
    }

    pub fn with_batch_id(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = Some(batch_id.into());
        self
    }
}

#[derive(Debug)]
pub(crate) struct RunPlan {
    pub batch_id: String,
    pub items: Vec<WorkItem>,
    /// Items left out because an earlier run of the batch finished them.
    pub resumed: usize,
}

static BATCH_SEQ: AtomicU32 = AtomicU32::new(0);

fn new_batch_id(kind: RunKind) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let seq = BATCH_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{kind}-{nanos:x}-{seq}")
}

/// Whether the target has the shape `kind` expects (chapter set iff download).
fn fits(kind: RunKind, target: &ItemTarget) -> bool {
    match kind {
        RunKind::Update => target.chapter_id.is_none(),
        RunKind::Download => target.chapter_id.is_some(),
    }
}

pub(crate) async fn plan_run(db: &ResumeDb, kind: RunKind, selector: ItemSelector) -> Result<RunPlan> {
    let batch_id = selector.batch_id.unwrap_or_else(|| new_batch_id(kind));
    let mut seen = HashSet::new();
    let mut items = Vec::with_capacity(selector.targets.len());
    let mut resumed = 0;

    for target in selector.targets {
        if !fits(kind, &target) {
            tracing::warn!(
                %kind,
                manga_id = target.manga_id,
                chapter_id = ?target.chapter_id,
                "target does not match run kind, ignored"
            );
            continue;
        }
        if !seen.insert((target.manga_id, target.chapter_id)) {
            continue;
        }
        if db.is_done(&batch_id, target.manga_id, target.chapter_id).await? {
            resumed += 1;
            continue;
        }
        items.push(WorkItem::new(items.len(), target));
    }

    Ok(RunPlan {
        batch_id,
        items,
        resumed,
    })
}

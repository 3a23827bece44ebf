//! Types stored in the resume database.

use serde::{Deserialize, Serialize};

use crate::run::{ItemState, RunKind, SkipReason};
use crate::source::{ChapterId, MangaId};

/// History record identifier; doubles as the commit id written by reconciliation.
pub type RunId = i64;

/// Terminal (or running) outcome of a run, stored as a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordStatus {
    Running,
    Completed,
    CompletedWithErrors,
    Aborted,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Running => "running",
            RecordStatus::Completed => "completed",
            RecordStatus::CompletedWithErrors => "completed-with-errors",
            RecordStatus::Aborted => "aborted",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "running" => RecordStatus::Running,
            "completed" => RecordStatus::Completed,
            "completed-with-errors" => RecordStatus::CompletedWithErrors,
            _ => RecordStatus::Aborted,
        }
    }
}

/// One row of run history.
///
/// Created with `status = running, finish_at = 0` when a run starts and
/// finalized exactly once when it drains. Never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecord {
    pub id: RunId,
    pub batch_id: String,
    #[serde(rename = "type")]
    pub kind: RunKind,
    pub status: RecordStatus,
    pub err_code: Option<String>,
    pub err_msg: Option<String>,
    pub total_count: i64,
    pub succ_count: i64,
    pub failed_count: i64,
    pub skip_count: i64,
    pub new_chapter_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub finish_at: i64,
}

impl UpdateRecord {
    pub fn is_finished(&self) -> bool {
        self.finish_at != 0
    }
}

/// Values written by `finalize_history`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalFields {
    pub status: RecordStatus,
    pub err_code: Option<String>,
    pub err_msg: Option<String>,
    pub total_count: i64,
    pub succ_count: i64,
    pub failed_count: i64,
    pub skip_count: i64,
    pub new_chapter_count: i64,
}

/// Persisted per-chapter sync state, keyed by (manga id, chapter URL).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterSyncRecord {
    pub manga_id: MangaId,
    pub url: String,
    pub name: String,
    pub chapter_number: f32,
    pub is_read: bool,
    pub is_bookmarked: bool,
    pub last_page_read: i64,
    pub last_read_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
    /// Local mutation not yet reconciled.
    pub dirty: bool,
    /// Run id of the last successful reconciliation (0 = never).
    pub commit_id: RunId,
    /// Bumped by every local edit; used for the optimistic check.
    pub revision: i64,
}

/// A user-originated change to a chapter's reading state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalEdit {
    pub is_read: Option<bool>,
    pub is_bookmarked: Option<bool>,
    pub last_page_read: Option<i64>,
}

impl LocalEdit {
    pub fn is_empty(&self) -> bool {
        self.is_read.is_none() && self.is_bookmarked.is_none() && self.last_page_read.is_none()
    }
}

/// Terminal outcome of one work item, as persisted for resume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunItemRecord {
    pub batch_id: String,
    pub manga_id: MangaId,
    pub chapter_id: Option<ChapterId>,
    pub run_id: RunId,
    pub state: ItemState,
    pub skip_reason: Option<SkipReason>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub checksum: Option<String>,
}

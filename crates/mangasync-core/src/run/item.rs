//! Work items: one (manga, optional chapter) pair processed within a run.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ParseEnumError;
use crate::source::{ChapterId, ChapterRef, MangaId, SourceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl ItemState {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemState::Pending => "pending",
            ItemState::Running => "running",
            ItemState::Succeeded => "succeeded",
            ItemState::Failed => "failed",
            ItemState::Skipped => "skipped",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ItemState::Succeeded | ItemState::Failed | ItemState::Skipped)
    }
}

impl FromStr for ItemState {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ItemState::Pending),
            "running" => Ok(ItemState::Running),
            "succeeded" => Ok(ItemState::Succeeded),
            "failed" => Ok(ItemState::Failed),
            "skipped" => Ok(ItemState::Skipped),
            other => Err(ParseEnumError::new("item state", other)),
        }
    }
}

/// Why an item ended `Skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipReason {
    /// Still pending when the run was cancelled.
    Cancelled,
    /// Excluded by the user (e.g. manga marked not-for-update).
    Excluded,
    /// Reconciliation kept losing to concurrent edits.
    Conflict,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::Cancelled => "cancelled",
            SkipReason::Excluded => "excluded",
            SkipReason::Conflict => "conflict",
        }
    }
}

impl FromStr for SkipReason {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cancelled" => Ok(SkipReason::Cancelled),
            "excluded" => Ok(SkipReason::Excluded),
            "conflict" => Ok(SkipReason::Conflict),
            other => Err(ParseEnumError::new("skip reason", other)),
        }
    }
}

/// What a selector asks a run to process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemTarget {
    pub manga_id: MangaId,
    #[serde(default)]
    pub chapter_id: Option<ChapterId>,
    pub source_id: SourceId,
    /// Manga title, shown as `firstRunningTitle` and used for the storage folder.
    pub title: String,
    /// User-level exclusion; counted in the total but never dispatched.
    #[serde(default)]
    pub excluded: bool,
}

impl ItemTarget {
    pub fn manga(manga_id: MangaId, source_id: SourceId, title: impl Into<String>) -> Self {
        Self {
            manga_id,
            chapter_id: None,
            source_id,
            title: title.into(),
            excluded: false,
        }
    }

    pub fn chapter(
        manga_id: MangaId,
        chapter_id: ChapterId,
        source_id: SourceId,
        title: impl Into<String>,
    ) -> Self {
        Self {
            chapter_id: Some(chapter_id),
            ..Self::manga(manga_id, source_id, title)
        }
    }

    pub fn excluded(mut self) -> Self {
        self.excluded = true;
        self
    }
}

/// Result of processing one item, produced by a worker.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Succeeded {
        attempts: u32,
        /// Chapters first seen by this update (empty for downloads).
        new_chapters: Vec<ChapterRef>,
        /// SHA-256 of stored content (downloads only).
        checksum: Option<String>,
    },
    Failed {
        attempts: u32,
        error: String,
    },
    Skipped {
        reason: SkipReason,
        attempts: u32,
        error: Option<String>,
    },
}

impl ItemOutcome {
    pub fn state(&self) -> ItemState {
        match self {
            ItemOutcome::Succeeded { .. } => ItemState::Succeeded,
            ItemOutcome::Failed { .. } => ItemState::Failed,
            ItemOutcome::Skipped { .. } => ItemState::Skipped,
        }
    }
}

/// One unit of orchestration, owned by the run driver until terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    /// Submission order within the run.
    pub seq: usize,
    pub target: ItemTarget,
    pub state: ItemState,
    pub skip_reason: Option<SkipReason>,
    pub attempt: u32,
    pub last_error: Option<String>,
}

impl WorkItem {
    pub fn new(seq: usize, target: ItemTarget) -> Self {
        Self {
            seq,
            target,
            state: ItemState::Pending,
            skip_reason: None,
            attempt: 0,
            last_error: None,
        }
    }

    pub fn source_id(&self) -> SourceId {
        self.target.source_id
    }

    pub(crate) fn mark_running(&mut self) {
        debug_assert_eq!(self.state, ItemState::Pending);
        self.state = ItemState::Running;
    }

    pub(crate) fn mark_skipped(&mut self, reason: SkipReason) {
        debug_assert!(!self.state.is_terminal());
        self.state = ItemState::Skipped;
        self.skip_reason = Some(reason);
    }

    /// Fold a worker's outcome into the item.
    pub(crate) fn apply(&mut self, outcome: &ItemOutcome) {
        debug_assert_eq!(self.state, ItemState::Running);
        self.state = outcome.state();
        match outcome {
            ItemOutcome::Succeeded { attempts, .. } => self.attempt = *attempts,
            ItemOutcome::Failed { attempts, error } => {
                self.attempt = *attempts;
                self.last_error = Some(error.clone());
            }
            ItemOutcome::Skipped {
                reason,
                attempts,
                error,
            } => {
                self.attempt = *attempts;
                self.skip_reason = Some(*reason);
                self.last_error = error.clone();
            }
        }
    }
}

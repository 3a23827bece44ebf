//! Read-only status payloads derived from [`RunSnapshot`].

use serde::Serialize;

use super::progress::{MangaUpdateResult, RunSnapshot};

/// Library-update status. `mangaChapterList` only appears once the run is over.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatus {
    pub running: bool,
    pub total_count: u64,
    pub pending_count: u64,
    pub running_count: u64,
    pub finish_count: u64,
    pub failed_count: u64,
    pub skip_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manga_chapter_list: Option<Vec<MangaUpdateResult>>,
}

impl From<&RunSnapshot> for UpdateStatus {
    fn from(s: &RunSnapshot) -> Self {
        Self {
            running: s.running,
            total_count: s.total_count,
            pending_count: s.pending_count,
            running_count: s.running_count,
            finish_count: s.finish_count,
            failed_count: s.failed_count,
            skip_count: s.skip_count,
            manga_chapter_list: if s.running {
                None
            } else {
                s.per_manga_results.clone()
            },
        }
    }
}

/// Update status plus live detail for polling clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuedUpdateStatus {
    #[serde(flatten)]
    pub base: UpdateStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_running_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_chapter_count: Option<u64>,
}

impl From<&RunSnapshot> for ContinuedUpdateStatus {
    fn from(s: &RunSnapshot) -> Self {
        Self {
            base: UpdateStatus::from(s),
            first_running_title: s.first_running_title.clone(),
            new_chapter_count: s.run_id.map(|_| s.new_chapter_count),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadStatus {
    pub running: bool,
    pub total_count: u64,
    pub finish_count: u64,
    pub failed_count: u64,
}

impl From<&RunSnapshot> for DownloadStatus {
    fn from(s: &RunSnapshot) -> Self {
        Self {
            running: s.running,
            total_count: s.total_count,
            finish_count: s.finish_count,
            failed_count: s.failed_count,
        }
    }
}

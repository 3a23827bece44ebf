//! Source-provider capability.
//!
//! The orchestrator is source-agnostic: each remote source implements
//! [`SourceProvider`] and is registered under its [`SourceId`]. Providers do
//! not rate-limit themselves; every call is made while holding a permit from
//! the per-source throttle.

mod registry;
mod types;

use async_trait::async_trait;

use crate::retry::FetchError;

pub use registry::SourceRegistry;
pub use types::{ChapterId, ChapterRef, ChapterStream, MangaId, SourceId};

#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Human-readable source name, used in logs only.
    fn name(&self) -> &str;

    /// Full chapter list for a manga, in source order.
    async fn fetch_chapter_list(
        &self,
        source: SourceId,
        manga: MangaId,
    ) -> Result<Vec<ChapterRef>, FetchError>;

    /// Raw chapter content as a byte stream.
    async fn fetch_chapter_content(
        &self,
        source: SourceId,
        chapter: ChapterId,
    ) -> Result<ChapterStream, FetchError>;
}

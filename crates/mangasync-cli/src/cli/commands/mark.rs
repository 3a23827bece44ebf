//! `mangasync mark` – user edit of a chapter's reading state.

use anyhow::{bail, Result};
use mangasync_core::resume_db::{LocalEdit, ResumeDb};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkArgs {
    pub manga_id: i64,
    pub url: String,
    pub read: Option<bool>,
    pub bookmark: Option<bool>,
    pub page: Option<i64>,
}

impl MarkArgs {
    fn edit(&self) -> LocalEdit {
        LocalEdit {
            is_read: self.read,
            is_bookmarked: self.bookmark,
            last_page_read: self.page,
        }
    }
}

pub async fn run_mark(db: &ResumeDb, args: &MarkArgs) -> Result<()> {
    let edit = args.edit();
    if edit.is_empty() {
        bail!("nothing to change: pass --read/--unread, --bookmark/--unbookmark or --page");
    }
    if !db.apply_local_edit(args.manga_id, &args.url, &edit).await? {
        bail!("no chapter {} for manga {}", args.url, args.manga_id);
    }
    tracing::info!(manga_id = args.manga_id, url = %args.url, "chapter marked");
    println!("Marked {} (manga {}); it will be reconciled by the next update run.", args.url, args.manga_id);
    Ok(())
}

use anyhow::Result;

use super::super::db::{unix_timestamp, ResumeDb};
use super::super::types::{ChapterSyncRecord, LocalEdit, RunId};
use crate::error::ReconcileError;
use crate::source::{ChapterRef, MangaId};

impl ResumeDb {
    /// Insert chapters not seen before as dirty records. Existing rows are left
    /// untouched. Returns the chapters that were actually new, in input order.
    pub async fn insert_new_chapters(
        &self,
        manga_id: MangaId,
        chapters: &[ChapterRef],
    ) -> Result<Vec<ChapterRef>> {
        let now = unix_timestamp();
        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::new();
        for chapter in chapters {
            let r = sqlx::query(
                r#"
                INSERT OR IGNORE INTO chapter_sync (
                    manga_id, url, name, chapter_number,
                    created_at, updated_at, dirty, commit_id, revision
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, 0, 0)
                "#,
            )
            .bind(manga_id)
            .bind(&chapter.url)
            .bind(&chapter.name)
            .bind(chapter.chapter_number as f64)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            if r.rows_affected() > 0 {
                inserted.push(chapter.clone());
            }
        }
        tx.commit().await?;
        Ok(inserted)
    }

    /// Apply a user edit: writes the given fields, marks the record dirty and
    /// bumps its revision so an in-flight reconciliation of the old values loses.
    /// Returns false if the chapter is unknown.
    pub async fn apply_local_edit(
        &self,
        manga_id: MangaId,
        url: &str,
        edit: &LocalEdit,
    ) -> Result<bool> {
        if edit.is_empty() {
            return Ok(self.get_chapter_sync(manga_id, url).await?.is_some());
        }
        let now = unix_timestamp();
        let read_at = edit.is_read.filter(|r| *r).map(|_| now);
        let r = sqlx::query(
            r#"
            UPDATE chapter_sync
            SET is_read = COALESCE(?1, is_read),
                is_bookmarked = COALESCE(?2, is_bookmarked),
                last_page_read = COALESCE(?3, last_page_read),
                last_read_at = COALESCE(?4, last_read_at),
                dirty = 1,
                revision = revision + 1,
                updated_at = ?5
            WHERE manga_id = ?6 AND url = ?7
            "#,
        )
        .bind(edit.is_read)
        .bind(edit.is_bookmarked)
        .bind(edit.last_page_read)
        .bind(read_at)
        .bind(now)
        .bind(manga_id)
        .bind(url)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected() > 0)
    }

    /// Commit a record's read/bookmark/progress fields on behalf of run `run_id`.
    ///
    /// Succeeds only if nobody edited the row since `record` was read (same
    /// revision) and its commit id is not ahead of `run_id`. On success the row
    /// is clean (`dirty = 0`) with `commit_id = run_id`.
    pub async fn reconcile(
        &self,
        record: &ChapterSyncRecord,
        run_id: RunId,
    ) -> Result<(), ReconcileError> {
        let now = unix_timestamp();
        let r = sqlx::query(
            r#"
            UPDATE chapter_sync
            SET is_read = ?1,
                is_bookmarked = ?2,
                last_page_read = ?3,
                last_read_at = ?4,
                dirty = 0,
                commit_id = ?5,
                updated_at = ?6
            WHERE manga_id = ?7 AND url = ?8
              AND revision = ?9
              AND commit_id <= ?5
            "#,
        )
        .bind(record.is_read)
        .bind(record.is_bookmarked)
        .bind(record.last_page_read)
        .bind(record.last_read_at)
        .bind(run_id)
        .bind(now)
        .bind(record.manga_id)
        .bind(&record.url)
        .bind(record.revision)
        .execute(&self.pool)
        .await
        .map_err(|e| ReconcileError::Store(e.into()))?;

        if r.rows_affected() == 0 {
            return Err(ReconcileError::Conflict {
                manga_id: record.manga_id,
                url: record.url.clone(),
            });
        }
        Ok(())
    }
}

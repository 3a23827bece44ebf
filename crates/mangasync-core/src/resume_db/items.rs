//! Per-item outcomes (`run_items`) used to resume a batch after a crash.

use anyhow::{Context, Result};
use sqlx::Row;

use super::db::{unix_timestamp, ResumeDb, NO_CHAPTER};
use super::types::{RunId, RunItemRecord};
use crate::run::{ItemState, SkipReason};
use crate::source::{ChapterId, MangaId};

impl ResumeDb {
    /// Upsert the outcome of one item; a resumed run overwrites the row of the run it replaces.
    pub async fn record_item(&self, item: &RunItemRecord) -> Result<()> {
        let now = unix_timestamp();
        sqlx::query(
            r#"
            INSERT INTO run_items (
                batch_id, manga_id, chapter_id, run_id, state,
                skip_reason, attempts, last_error, checksum, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT (batch_id, manga_id, chapter_id) DO UPDATE SET
                run_id = excluded.run_id,
                state = excluded.state,
                skip_reason = excluded.skip_reason,
                attempts = excluded.attempts,
                last_error = excluded.last_error,
                checksum = excluded.checksum,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&item.batch_id)
        .bind(item.manga_id)
        .bind(item.chapter_id.unwrap_or(NO_CHAPTER))
        .bind(item.run_id)
        .bind(item.state.as_str())
        .bind(item.skip_reason.map(|r| r.as_str()))
        .bind(i64::from(item.attempts))
        .bind(&item.last_error)
        .bind(&item.checksum)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// True if an unfinished (abandoned) run of `batch_id` already brought this
    /// item to `succeeded` or `skipped`. Failed items, and items skipped only
    /// because that run was being cancelled, are retried on resume.
    pub async fn is_done(
        &self,
        batch_id: &str,
        manga_id: MangaId,
        chapter_id: Option<ChapterId>,
    ) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT 1 AS done
            FROM run_items i
            JOIN update_records r ON r.id = i.run_id
            WHERE i.batch_id = ?1
              AND i.manga_id = ?2
              AND i.chapter_id = ?3
              AND (i.state = 'succeeded'
                   OR (i.state = 'skipped' AND COALESCE(i.skip_reason, '') != 'cancelled'))
              AND r.finish_at = 0
            LIMIT 1
            "#,
        )
        .bind(batch_id)
        .bind(manga_id)
        .bind(chapter_id.unwrap_or(NO_CHAPTER))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// All recorded item outcomes of one run, in key order.
    pub async fn list_run_items(&self, run_id: RunId) -> Result<Vec<RunItemRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT batch_id, manga_id, chapter_id, run_id, state,
                   skip_reason, attempts, last_error, checksum
            FROM run_items
            WHERE run_id = ?1
            ORDER BY manga_id ASC, chapter_id ASC
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let chapter_id: i64 = row.get("chapter_id");
            let state: String = row.get("state");
            let skip_reason: Option<String> = row.get("skip_reason");
            let attempts: i64 = row.get("attempts");
            out.push(RunItemRecord {
                batch_id: row.get("batch_id"),
                manga_id: row.get("manga_id"),
                chapter_id: (chapter_id != NO_CHAPTER).then_some(chapter_id),
                run_id: row.get("run_id"),
                state: state
                    .parse::<ItemState>()
                    .with_context(|| format!("bad item state: {state}"))?,
                skip_reason: skip_reason
                    .as_deref()
                    .map(str::parse::<SkipReason>)
                    .transpose()
                    .context("bad skip reason")?,
                attempts: u32::try_from(attempts).unwrap_or(0),
                last_error: row.get("last_error"),
                checksum: row.get("checksum"),
            });
        }
        Ok(out)
    }
}

//! Append-only run history (`update_records`).

use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::db::{unix_timestamp, ResumeDb};
use super::types::{RecordStatus, RunId, TerminalFields, UpdateRecord};
use crate::run::RunKind;

const COLUMNS: &str = r#"
    id, batch_id, type, status, err_code, err_msg,
    total_count, succ_count, failed_count, skip_count, new_chapter_count,
    created_at, updated_at, finish_at
"#;

fn row_to_record(row: &SqliteRow) -> Result<UpdateRecord> {
    let kind: String = row.get("type");
    let status: String = row.get("status");
    Ok(UpdateRecord {
        id: row.get("id"),
        batch_id: row.get("batch_id"),
        kind: kind.parse().with_context(|| format!("bad run type in history: {kind}"))?,
        status: RecordStatus::parse(&status),
        err_code: row.get("err_code"),
        err_msg: row.get("err_msg"),
        total_count: row.get("total_count"),
        succ_count: row.get("succ_count"),
        failed_count: row.get("failed_count"),
        skip_count: row.get("skip_count"),
        new_chapter_count: row.get("new_chapter_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        finish_at: row.get("finish_at"),
    })
}

impl ResumeDb {
    /// Create the history row for a starting run (`status = running`, `finish_at = 0`).
    pub async fn append_history(&self, kind: RunKind, batch_id: &str) -> Result<UpdateRecord> {
        let now = unix_timestamp();
        let id = sqlx::query(
            r#"
            INSERT INTO update_records (batch_id, type, status, created_at, updated_at, finish_at)
            VALUES (?1, ?2, ?3, ?4, ?4, 0)
            "#,
        )
        .bind(batch_id)
        .bind(kind.as_str())
        .bind(RecordStatus::Running.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        self.get_history(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("history record {id} vanished after insert"))
    }

    /// Write the terminal values of a run. The only mutation path for a
    /// history row; fails if the row is unknown or already finalized.
    pub async fn finalize_history(&self, id: RunId, fields: &TerminalFields) -> Result<UpdateRecord> {
        let now = unix_timestamp().max(1);
        let r = sqlx::query(
            r#"
            UPDATE update_records
            SET status = ?1,
                err_code = ?2,
                err_msg = ?3,
                total_count = ?4,
                succ_count = ?5,
                failed_count = ?6,
                skip_count = ?7,
                new_chapter_count = ?8,
                updated_at = ?9,
                finish_at = ?9
            WHERE id = ?10 AND finish_at = 0
            "#,
        )
        .bind(fields.status.as_str())
        .bind(&fields.err_code)
        .bind(&fields.err_msg)
        .bind(fields.total_count)
        .bind(fields.succ_count)
        .bind(fields.failed_count)
        .bind(fields.skip_count)
        .bind(fields.new_chapter_count)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if r.rows_affected() == 0 {
            anyhow::bail!("history record {id} is missing or already finalized");
        }
        self.get_history(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("history record {id} vanished after finalize"))
    }

    pub async fn get_history(&self, id: RunId) -> Result<Option<UpdateRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM update_records WHERE id = ?1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(row_to_record).transpose()
    }

    /// Newest first; `kind = None` lists both kinds.
    pub async fn list_history(&self, kind: Option<RunKind>, limit: u32) -> Result<Vec<UpdateRecord>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM update_records WHERE (?1 IS NULL OR type = ?1) ORDER BY id DESC LIMIT ?2"
        );
        let rows = sqlx::query(&sql)
            .bind(kind.map(|k| k.as_str()))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_record).collect()
    }

    /// Most recent finalized run of a kind.
    pub async fn last_finished(&self, kind: RunKind) -> Result<Option<UpdateRecord>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM update_records WHERE type = ?1 AND finish_at != 0 ORDER BY id DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(kind.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    /// Runs that started but never finalized (process died mid-run).
    pub async fn abandoned_runs(&self) -> Result<Vec<UpdateRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM update_records WHERE finish_at = 0 ORDER BY id ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_record).collect()
    }

    /// Close abandoned `kind` rows of `batch_id` once run `superseded_by` has
    /// finished the batch. Returns the number of rows closed.
    ///
    /// Only rows of the same kind are touched: a kind has at most one live
    /// run, which is `superseded_by` itself, so the other kind's live run
    /// sharing the batch id keeps its row open.
    pub async fn close_abandoned(
        &self,
        kind: RunKind,
        batch_id: &str,
        superseded_by: RunId,
    ) -> Result<u64> {
        let now = unix_timestamp().max(1);
        let r = sqlx::query(
            r#"
            UPDATE update_records
            SET status = ?1,
                err_code = 'ABANDONED',
                err_msg = ?2,
                updated_at = ?3,
                finish_at = ?3
            WHERE batch_id = ?4 AND type = ?5 AND finish_at = 0 AND id != ?6
            "#,
        )
        .bind(RecordStatus::Aborted.as_str())
        .bind(format!("superseded by run {superseded_by}"))
        .bind(now)
        .bind(batch_id)
        .bind(kind.as_str())
        .bind(superseded_by)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected())
    }
}

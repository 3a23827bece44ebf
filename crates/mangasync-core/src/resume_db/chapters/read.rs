use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::super::db::ResumeDb;
use super::super::types::ChapterSyncRecord;
use crate::source::MangaId;

const COLUMNS: &str = r#"
    manga_id, url, name, chapter_number, is_read, is_bookmarked,
    last_page_read, last_read_at, created_at, updated_at,
    dirty, commit_id, revision
"#;

pub(in crate::resume_db) fn row_to_record(row: &SqliteRow) -> ChapterSyncRecord {
    let chapter_number: f64 = row.get("chapter_number");
    ChapterSyncRecord {
        manga_id: row.get("manga_id"),
        url: row.get("url"),
        name: row.get("name"),
        chapter_number: chapter_number as f32,
        is_read: row.get("is_read"),
        is_bookmarked: row.get("is_bookmarked"),
        last_page_read: row.get("last_page_read"),
        last_read_at: row.get("last_read_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        dirty: row.get("dirty"),
        commit_id: row.get("commit_id"),
        revision: row.get("revision"),
    }
}

impl ResumeDb {
    /// All known chapters of a manga, ordered by chapter number.
    pub async fn list_chapter_sync(&self, manga_id: MangaId) -> Result<Vec<ChapterSyncRecord>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM chapter_sync WHERE manga_id = ?1 ORDER BY chapter_number ASC, url ASC"
        );
        let rows = sqlx::query(&sql).bind(manga_id).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    /// Chapters of a manga with unreconciled local changes.
    pub async fn dirty_chapters(&self, manga_id: MangaId) -> Result<Vec<ChapterSyncRecord>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM chapter_sync WHERE manga_id = ?1 AND dirty = 1 ORDER BY chapter_number ASC, url ASC"
        );
        let rows = sqlx::query(&sql).bind(manga_id).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    pub async fn get_chapter_sync(
        &self,
        manga_id: MangaId,
        url: &str,
    ) -> Result<Option<ChapterSyncRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM chapter_sync WHERE manga_id = ?1 AND url = ?2");
        let row = sqlx::query(&sql)
            .bind(manga_id)
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_record))
    }
}

//! SQLite-backed store: connection, migrations, and timestamp helpers.
//!
//! Table CRUD lives in `chapters`, `history`, and `items`.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the resume store. Cheap to clone; clones share the pool.
///
/// The default database lives at `~/.local/state/mangasync/sync.db`.
#[derive(Clone)]
pub struct ResumeDb {
    pub(crate) pool: Pool<Sqlite>,
}

impl std::fmt::Debug for ResumeDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResumeDb").finish_non_exhaustive()
    }
}

impl ResumeDb {
    /// Open (or create) the default database and run migrations.
    pub async fn open_default() -> Result<Self> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("mangasync")?;
        Self::open_at(xdg_dirs.get_state_home().join("sync.db")).await
    }

    /// Open (or create) the database at a specific path. Creates parent dirs if needed.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Workers write through the pool concurrently.
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;
        let db = ResumeDb { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        // `revision` is bumped by every local (user) edit; reconciliation
        // only commits a record whose revision it has seen.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chapter_sync (
                manga_id INTEGER NOT NULL,
                url TEXT NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                chapter_number REAL NOT NULL DEFAULT -1,
                is_read INTEGER NOT NULL DEFAULT 0,
                is_bookmarked INTEGER NOT NULL DEFAULT 0,
                last_page_read INTEGER NOT NULL DEFAULT 0,
                last_read_at INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                dirty INTEGER NOT NULL DEFAULT 1,
                commit_id INTEGER NOT NULL DEFAULT 0,
                revision INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (manga_id, url)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS update_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                batch_id TEXT NOT NULL,
                type TEXT NOT NULL,
                status TEXT NOT NULL,
                err_code TEXT,
                err_msg TEXT,
                total_count INTEGER NOT NULL DEFAULT 0,
                succ_count INTEGER NOT NULL DEFAULT 0,
                failed_count INTEGER NOT NULL DEFAULT 0,
                skip_count INTEGER NOT NULL DEFAULT 0,
                new_chapter_count INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                finish_at INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        // chapter_id = -1 marks a manga-level (update) item.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS run_items (
                batch_id TEXT NOT NULL,
                manga_id INTEGER NOT NULL,
                chapter_id INTEGER NOT NULL DEFAULT -1,
                run_id INTEGER NOT NULL,
                state TEXT NOT NULL,
                skip_reason TEXT,
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                checksum TEXT,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (batch_id, manga_id, chapter_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Current time as Unix seconds (for DB timestamps).
pub(crate) fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

pub(crate) const NO_CHAPTER: i64 = -1;

#[cfg(test)]
/// Open an in-memory database for tests (no disk I/O).
pub(crate) async fn open_memory() -> Result<ResumeDb> {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    let db = ResumeDb { pool };
    db.migrate().await?;
    Ok(db)
}

#[cfg(test)]
mod open_tests {
    use super::*;
    use sqlx::Row;

    #[tokio::test]
    async fn file_database_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let db = ResumeDb::open_at(dir.path().join("my lib#1").join("sync.db"))
            .await
            .unwrap();
        let row = sqlx::query("PRAGMA journal_mode").fetch_one(&db.pool).await.unwrap();
        let mode: String = row.get(0);
        assert_eq!(mode.to_lowercase(), "wal");
    }
}

//! Persistent resume store (SQLite via sqlx).
//!
//! Holds three tables:
//! - `chapter_sync`: per-chapter read/bookmark/progress state with a
//!   dirty flag and commit id for reconciliation;
//! - `update_records`: append-only history, one row per run;
//! - `run_items`: terminal outcome of every work item, keyed by batch id,
//!   consulted when a crashed run is resumed.

mod chapters;
mod db;
mod history;
mod items;
mod types;

pub use db::*;
pub use types::*;

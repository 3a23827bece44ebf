//! `mangasync history` – list finished and unfinished runs.

use anyhow::Result;
use mangasync_core::resume_db::{ResumeDb, UpdateRecord};
use mangasync_core::RunKind;

pub(super) fn print_header() {
    println!(
        "{:<6} {:<9} {:<22} {:>6} {:>6} {:>6} {:>6} {:>5}  {}",
        "ID", "TYPE", "STATUS", "TOTAL", "OK", "FAIL", "SKIP", "NEW", "BATCH"
    );
}

pub(super) fn print_record(r: &UpdateRecord) {
    let status = if r.is_finished() {
        r.status.as_str()
    } else {
        "unfinished"
    };
    println!(
        "{:<6} {:<9} {:<22} {:>6} {:>6} {:>6} {:>6} {:>5}  {}",
        r.id,
        r.kind.as_str(),
        status,
        r.total_count,
        r.succ_count,
        r.failed_count,
        r.skip_count,
        r.new_chapter_count,
        r.batch_id
    );
    if let Some(msg) = &r.err_msg {
        println!("       {msg}");
    }
}

pub async fn run_history(db: &ResumeDb, kind: Option<RunKind>, limit: u32) -> Result<()> {
    let records = db.list_history(kind, limit).await?;
    if records.is_empty() {
        println!("No runs recorded.");
        return Ok(());
    }
    print_header();
    for r in &records {
        print_record(r);
    }
    Ok(())
}

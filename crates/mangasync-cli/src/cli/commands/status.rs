//! `mangasync status` – last finished run and any unfinished one, per kind.
//!
//! Unfinished rows are either running in another process or were abandoned
//! by a crash; `mangasync recover` lists the latter.

use anyhow::Result;
use mangasync_core::resume_db::ResumeDb;
use mangasync_core::RunKind;

use super::history::{print_header, print_record};

pub async fn run_status(db: &ResumeDb, kind: Option<RunKind>) -> Result<()> {
    let kinds = match kind {
        Some(k) => vec![k],
        None => RunKind::ALL.to_vec(),
    };
    let unfinished = db.abandoned_runs().await?;

    for k in kinds {
        println!("{k}:");
        let last = db.last_finished(k).await?;
        let open: Vec<_> = unfinished.iter().filter(|r| r.kind == k).collect();
        if last.is_none() && open.is_empty() {
            println!("  never run");
            continue;
        }
        print_header();
        if let Some(last) = &last {
            print_record(last);
        }
        for r in open {
            print_record(r);
        }
    }
    Ok(())
}

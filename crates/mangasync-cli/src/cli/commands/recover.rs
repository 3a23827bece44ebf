//! `mangasync recover` – report runs left unfinished by a dead process.

use anyhow::Result;
use mangasync_core::config::SyncConfig;
use mangasync_core::resume_db::ResumeDb;
use mangasync_core::source::SourceRegistry;
use mangasync_core::RunController;

pub async fn run_recover(db: ResumeDb, cfg: &SyncConfig) -> Result<()> {
    let controller = RunController::from_config(db, SourceRegistry::new(), cfg)?;
    let abandoned = controller.recover().await?;
    if abandoned.is_empty() {
        println!("No abandoned runs.");
        return Ok(());
    }
    for r in &abandoned {
        println!(
            "run {} ({}) of batch {} never finished; start the batch again to resume it",
            r.id, r.kind, r.batch_id
        );
    }
    Ok(())
}

//! CLI for inspecting mangasync runs and sync state.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use mangasync_core::config;
use mangasync_core::resume_db::ResumeDb;
use mangasync_core::RunKind;
use std::path::PathBuf;

use commands::{run_checksum, run_completions, run_history, run_mark, run_recover, run_status, MarkArgs};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "mangasync")]
#[command(about = "mangasync: library update and chapter download runs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Show whether a run is active and the last finished run, per kind.
    Status {
        /// Only this kind (update or download).
        #[arg(long)]
        kind: Option<RunKind>,
    },

    /// List run history, newest first.
    History {
        #[arg(long)]
        kind: Option<RunKind>,
        /// Maximum number of records.
        #[arg(long, default_value = "20", value_name = "N")]
        limit: u32,
    },

    /// List runs a previous process left unfinished.
    Recover,

    /// Change a chapter's read/bookmark/progress state (marks it for reconciliation).
    Mark {
        manga_id: i64,
        /// Chapter URL as stored by the sync.
        url: String,
        #[arg(long, conflicts_with = "unread")]
        read: bool,
        #[arg(long)]
        unread: bool,
        #[arg(long, conflicts_with = "unbookmark")]
        bookmark: bool,
        #[arg(long)]
        unbookmark: bool,
        /// Last page read.
        #[arg(long, value_name = "N")]
        page: Option<i64>,
    },

    /// Compute SHA-256 of a stored chapter file.
    Checksum {
        path: PathBuf,
        /// Expected digest; exits with an error on mismatch.
        #[arg(long, value_name = "HEX")]
        expect: Option<String>,
    },

    /// Print shell completions to stdout.
    Completions { shell: Shell },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Checksum { path, expect } => return run_checksum(&path, expect.as_deref()).await,
            CliCommand::Completions { shell } => return run_completions(shell),
            _ => {}
        }

        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);
        let db = ResumeDb::open_default().await?;

        match cli.command {
            CliCommand::Status { kind } => run_status(&db, kind).await?,
            CliCommand::History { kind, limit } => run_history(&db, kind, limit).await?,
            CliCommand::Recover => run_recover(db, &cfg).await?,
            CliCommand::Mark {
                manga_id,
                url,
                read,
                unread,
                bookmark,
                unbookmark,
                page,
            } => {
                let args = MarkArgs {
                    manga_id,
                    url,
                    read: flag_pair(read, unread),
                    bookmark: flag_pair(bookmark, unbookmark),
                    page,
                };
                run_mark(&db, &args).await?
            }
            CliCommand::Checksum { .. } | CliCommand::Completions { .. } => {}
        }

        Ok(())
    }
}

/// `--x` → Some(true), `--unx` → Some(false), neither → None.
fn flag_pair(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (false, true) => Some(false),
        (false, false) => None,
    }
}

#[cfg(test)]
mod tests;

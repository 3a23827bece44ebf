//! mangasync core: orchestration of library-update and chapter-download runs
//! against throttled remote sources, with crash-resumable persistence.

pub mod config;
pub mod logging;

pub mod checksum;
pub mod error;
pub mod resume_db;
pub mod retry;
pub mod run;
pub mod source;
pub mod storage;
pub mod throttle;

pub use error::{ReconcileError, RunError};
pub use run::{ItemSelector, ItemTarget, RunController, RunHandle, RunKind, RunSettings, RunSnapshot};

//! Run orchestration: library-update and chapter-download runs.
//!
//! [`RunController`] is the entry point. Each run plans its items, then a
//! driver task dispatches them to a bounded worker pool through the shared
//! [`SourceThrottle`](crate::throttle::SourceThrottle), folds outcomes into
//! the [`ProgressAggregator`], persists them for resume, and finally writes
//! the run's terminal history record.

mod controller;
mod driver;
mod gate;
mod item;
mod kind;
mod plan;
mod progress;
mod reconcile;
mod status;
mod worker;

pub use controller::{CancelAck, RunController, RunHandle, RunSettings, RunStatus};
pub use gate::{RunGate, RunPhase};
pub use item::{ItemOutcome, ItemState, ItemTarget, SkipReason, WorkItem};
pub use kind::RunKind;
pub use plan::ItemSelector;
pub use progress::{MangaUpdateResult, ProgressAggregator, RunSnapshot};
pub use reconcile::{reconcile_with_retry, ReconcileOutcome};
pub use status::{ContinuedUpdateStatus, DownloadStatus, UpdateStatus};

//! Public entry point: start, cancel and observe runs.
//!
//! One slot per [`RunKind`]. A slot holds the kind's [`RunGate`] and the
//! aggregator of its current (or last) run, whose final snapshot stays
//! readable until the next run of that kind starts.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::SyncConfig;
use crate::error::RunError;
use crate::resume_db::{ResumeDb, RunId, UpdateRecord};
use crate::retry::RetryPolicy;
use crate::source::SourceRegistry;
use crate::throttle::SourceThrottle;

use super::driver::RunDriver;
use super::gate::{RunGate, RunPhase, StartGuard};
use super::kind::RunKind;
use super::plan::{plan_run, ItemSelector};
use super::progress::{ProgressAggregator, RunSnapshot};
use super::worker::WorkerContext;

/// Settings shared by every run a controller starts.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub max_update_workers: usize,
    pub max_download_workers: usize,
    pub fetch_timeout: Duration,
    pub retry: RetryPolicy,
    pub download_dir: PathBuf,
}

impl RunSettings {
    /// Built-in defaults with chapters stored under `download_dir`.
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        let cfg = SyncConfig::default();
        Self {
            max_update_workers: cfg.max_update_workers,
            max_download_workers: cfg.max_download_workers,
            fetch_timeout: cfg.fetch_timeout(),
            retry: cfg.retry_policy(),
            download_dir: download_dir.into(),
        }
    }

    pub fn from_config(cfg: &SyncConfig) -> Result<Self> {
        Ok(Self {
            max_update_workers: cfg.max_update_workers,
            max_download_workers: cfg.max_download_workers,
            fetch_timeout: cfg.fetch_timeout(),
            retry: cfg.retry_policy(),
            download_dir: cfg.resolved_download_dir()?,
        })
    }

    pub fn workers(&self, kind: RunKind) -> usize {
        match kind {
            RunKind::Update => self.max_update_workers,
            RunKind::Download => self.max_download_workers,
        }
        .max(1)
    }
}

/// Answer to a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelAck {
    /// Cancellation was requested by this call.
    Requested,
    /// An earlier call already requested it.
    AlreadyRequested,
    /// The run is past dispatch and only writing its history.
    Finishing,
    NotRunning,
}

/// Activity of one kind, as reported by [`RunController::status`].
#[derive(Debug, Clone)]
pub struct RunStatus {
    pub kind: RunKind,
    pub phase: RunPhase,
    pub snapshot: Arc<RunSnapshot>,
    /// Last finished history record, only looked up when no run is active.
    pub last_record: Option<UpdateRecord>,
}

impl RunStatus {
    pub fn is_active(&self) -> bool {
        self.phase.is_active()
    }
}

/// Handle to a started run.
#[derive(Debug)]
pub struct RunHandle {
    run_id: RunId,
    kind: RunKind,
    batch_id: String,
    snapshots: watch::Receiver<Arc<RunSnapshot>>,
    join: JoinHandle<Result<UpdateRecord>>,
}

impl RunHandle {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn kind(&self) -> RunKind {
        self.kind
    }

    /// Pass this back in an [`ItemSelector`] to resume the batch after a crash.
    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    /// Snapshots are pushed here on every item transition.
    pub fn subscribe(&self) -> watch::Receiver<Arc<RunSnapshot>> {
        self.snapshots.clone()
    }

    /// Wait for the run to drain; yields its terminal history record.
    pub async fn wait(self) -> Result<UpdateRecord> {
        self.join
            .await
            .with_context(|| format!("run {} task failed", self.run_id))?
    }
}

struct ActiveRun {
    progress: Arc<ProgressAggregator>,
    cancel: CancellationToken,
}

struct KindSlot {
    gate: Arc<RunGate>,
    current: Mutex<ActiveRun>,
}

impl KindSlot {
    fn new() -> Self {
        Self {
            gate: Arc::new(RunGate::default()),
            current: Mutex::new(ActiveRun {
                progress: Arc::new(ProgressAggregator::idle()),
                cancel: CancellationToken::new(),
            }),
        }
    }

    fn progress(&self) -> Arc<ProgressAggregator> {
        let current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&current.progress)
    }
}

struct Inner {
    db: ResumeDb,
    sources: SourceRegistry,
    throttle: Arc<SourceThrottle>,
    settings: Arc<RunSettings>,
    update: KindSlot,
    download: KindSlot,
}

/// Orchestrates library-update and chapter-download runs. Cheap to clone.
#[derive(Clone)]
pub struct RunController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RunController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunController")
            .field("sources", &self.inner.sources)
            .field("update", &self.inner.update.gate.phase())
            .field("download", &self.inner.download.gate.phase())
            .finish_non_exhaustive()
    }
}

impl RunController {
    /// `throttle` may be shared with other controllers talking to the same sources.
    pub fn new(
        db: ResumeDb,
        sources: SourceRegistry,
        throttle: Arc<SourceThrottle>,
        settings: RunSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                db,
                sources,
                throttle,
                settings: Arc::new(settings),
                update: KindSlot::new(),
                download: KindSlot::new(),
            }),
        }
    }

    /// Controller with throttle limits and settings taken from `cfg`.
    pub fn from_config(db: ResumeDb, sources: SourceRegistry, cfg: &SyncConfig) -> Result<Self> {
        let throttle = SourceThrottle::with_overrides(
            cfg.throttle.default_limits(),
            cfg.throttle.overrides(),
        );
        Ok(Self::new(
            db,
            sources,
            Arc::new(throttle),
            RunSettings::from_config(cfg)?,
        ))
    }

    fn slot(&self, kind: RunKind) -> &KindSlot {
        match kind {
            RunKind::Update => &self.inner.update,
            RunKind::Download => &self.inner.download,
        }
    }

    pub fn db(&self) -> &ResumeDb {
        &self.inner.db
    }

    pub fn throttle(&self) -> &Arc<SourceThrottle> {
        &self.inner.throttle
    }

    /// Start a run of `kind` over the selected items.
    ///
    /// Fails with [`RunError::AlreadyRunning`] while another run of the same
    /// kind is active. Returns as soon as the run is planned and its history
    /// record exists; items are processed in the background.
    pub async fn start(&self, kind: RunKind, selector: ItemSelector) -> Result<RunHandle, RunError> {
        let slot = self.slot(kind);
        if !slot.gate.try_begin() {
            return Err(RunError::AlreadyRunning(kind));
        }
        let guard = StartGuard::new(&slot.gate);

        let plan = plan_run(&self.inner.db, kind, selector).await?;
        let record = self.inner.db.append_history(kind, &plan.batch_id).await?;
        let run_id = record.id;
        if plan.resumed > 0 {
            tracing::info!(run_id, batch_id = %plan.batch_id, resumed = plan.resumed, "resuming batch, skipping finished items");
        }

        let progress = Arc::new(ProgressAggregator::new(run_id, &plan.items));
        let cancel = CancellationToken::new();
        {
            let mut current = slot.current.lock().unwrap_or_else(|e| e.into_inner());
            *current = ActiveRun {
                progress: Arc::clone(&progress),
                cancel: cancel.clone(),
            };
        }
        // A cancel that raced the swap above found the previous token.
        if slot.gate.phase() == RunPhase::Cancelling {
            cancel.cancel();
        }

        let snapshots = progress.subscribe();
        let driver = RunDriver {
            ctx: Arc::new(WorkerContext {
                db: self.inner.db.clone(),
                sources: self.inner.sources.clone(),
                settings: Arc::clone(&self.inner.settings),
                kind,
                run_id,
                cancel,
            }),
            batch_id: plan.batch_id.clone(),
            items: plan.items,
            throttle: Arc::clone(&self.inner.throttle),
            progress,
            gate: Arc::clone(&slot.gate),
            max_workers: self.inner.settings.workers(kind),
        };
        guard.disarm();
        let join = tokio::spawn(driver.run());

        Ok(RunHandle {
            run_id,
            kind,
            batch_id: plan.batch_id,
            snapshots,
            join,
        })
    }

    /// Request cooperative cancellation of the active run of `kind`.
    pub fn cancel(&self, kind: RunKind) -> CancelAck {
        let slot = self.slot(kind);
        if slot.gate.transition(RunPhase::Running, RunPhase::Cancelling) {
            let current = slot.current.lock().unwrap_or_else(|e| e.into_inner());
            current.cancel.cancel();
            tracing::info!(%kind, "cancellation requested");
            return CancelAck::Requested;
        }
        match slot.gate.phase() {
            RunPhase::Cancelling => CancelAck::AlreadyRequested,
            RunPhase::Draining | RunPhase::Finished => CancelAck::Finishing,
            RunPhase::Idle | RunPhase::Running => CancelAck::NotRunning,
        }
    }

    /// Last published snapshot; never blocks on item processing.
    pub fn snapshot(&self, kind: RunKind) -> Arc<RunSnapshot> {
        self.slot(kind).progress().snapshot()
    }

    /// Snapshot stream of the current (or last) run of `kind`.
    pub fn subscribe(&self, kind: RunKind) -> watch::Receiver<Arc<RunSnapshot>> {
        self.slot(kind).progress().subscribe()
    }

    pub async fn status(&self, kind: RunKind) -> Result<RunStatus> {
        let slot = self.slot(kind);
        let phase = slot.gate.phase();
        let snapshot = slot.progress().snapshot();
        let last_record = if phase.is_active() {
            None
        } else {
            self.inner.db.last_finished(kind).await?
        };
        Ok(RunStatus {
            kind,
            phase,
            snapshot,
            last_record,
        })
    }

    /// Report runs a previous process left unfinished.
    ///
    /// Their kind slots are free in a fresh controller; resubmitting the same
    /// batch id resumes them and closes the abandoned records.
    pub async fn recover(&self) -> Result<Vec<UpdateRecord>> {
        let active: Vec<RunId> = RunKind::ALL
            .iter()
            .filter(|k| self.slot(**k).gate.phase().is_active())
            .filter_map(|k| self.slot(*k).progress().snapshot().run_id)
            .collect();
        let abandoned: Vec<UpdateRecord> = self
            .inner
            .db
            .abandoned_runs()
            .await?
            .into_iter()
            .filter(|r| !active.contains(&r.id))
            .collect();
        for record in &abandoned {
            tracing::warn!(
                run_id = record.id,
                kind = %record.kind,
                batch_id = %record.batch_id,
                "found abandoned run"
            );
        }
        Ok(abandoned)
    }
}

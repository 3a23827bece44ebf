//! Shared harness for controller integration tests.
#![allow(dead_code)]

pub mod fake_source;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use mangasync_core::resume_db::ResumeDb;
use mangasync_core::retry::RetryPolicy;
use mangasync_core::source::{SourceId, SourceProvider, SourceRegistry};
use mangasync_core::throttle::{SourceThrottle, ThrottleLimits};
use mangasync_core::{ItemTarget, RunController, RunSettings};

use fake_source::FakeSource;

pub const SOURCE: SourceId = SourceId(1);
pub const OTHER_SOURCE: SourceId = SourceId(2);

pub struct Harness {
    pub controller: RunController,
    pub db: ResumeDb,
    pub source: Arc<FakeSource>,
    pub other: Arc<FakeSource>,
    pub download_dir: TempDir,
    pub state_dir: TempDir,
}

pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
    }
}

pub struct HarnessOptions {
    pub limits: ThrottleLimits,
    pub workers: usize,
    pub latency: Duration,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            limits: ThrottleLimits::new(4, Duration::ZERO),
            workers: 4,
            latency: Duration::from_millis(5),
        }
    }
}

pub async fn harness(opts: HarnessOptions) -> Harness {
    let state_dir = tempfile::tempdir().unwrap();
    let db = ResumeDb::open_at(state_dir.path().join("sync.db")).await.unwrap();
    harness_with(db, state_dir, opts)
}

/// Build a fresh controller over an existing database (a "restarted process").
pub fn harness_with(db: ResumeDb, state_dir: TempDir, opts: HarnessOptions) -> Harness {
    let download_dir = tempfile::tempdir().unwrap();
    let source = Arc::new(FakeSource::new(opts.latency));
    let other = Arc::new(FakeSource::new(opts.latency));
    let registry = SourceRegistry::new()
        .with(SOURCE, Arc::clone(&source) as Arc<dyn SourceProvider>)
        .with(OTHER_SOURCE, Arc::clone(&other) as Arc<dyn SourceProvider>);

    let mut settings = RunSettings::new(download_dir.path());
    settings.max_update_workers = opts.workers;
    settings.max_download_workers = opts.workers;
    settings.fetch_timeout = Duration::from_secs(5);
    settings.retry = fast_retry(3);

    let throttle = Arc::new(SourceThrottle::new(opts.limits));
    let controller = RunController::new(db.clone(), registry, throttle, settings);
    Harness {
        controller,
        db,
        source,
        other,
        download_dir,
        state_dir,
    }
}

pub fn mangas(ids: &[i64]) -> Vec<ItemTarget> {
    ids.iter()
        .map(|id| ItemTarget::manga(*id, SOURCE, format!("Manga {id}")))
        .collect()
}

/// Fail the test instead of hanging.
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(10), fut)
        .await
        .expect("timed out")
}

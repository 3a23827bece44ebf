//! Integration tests: per-source throttle behavior during real runs.

mod common;

use std::time::Duration;
use tokio::time::Instant;

use common::fake_source::FetchSpan;
use common::{harness, mangas, within, HarnessOptions, OTHER_SOURCE, SOURCE};
use mangasync_core::throttle::ThrottleLimits;
use mangasync_core::{ItemSelector, ItemTarget, RunKind};

/// Largest number of spans running at any span's start instant.
fn max_overlap(spans: &[FetchSpan]) -> usize {
    spans
        .iter()
        .map(|s| {
            spans
                .iter()
                .filter(|t| t.start <= s.start && s.start < t.end)
                .count()
        })
        .max()
        .unwrap_or(0)
}

#[tokio::test]
async fn concurrency_limit_holds_for_whole_run() {
    let h = harness(HarnessOptions {
        limits: ThrottleLimits::new(2, Duration::ZERO),
        workers: 6,
        latency: Duration::from_millis(30),
    })
    .await;

    let handle = h
        .controller
        .start(RunKind::Update, ItemSelector::new(mangas(&[1, 2, 3, 4, 5, 6, 7, 8])))
        .await
        .unwrap();
    let record = within(handle.wait()).await.unwrap();
    assert_eq!(record.succ_count, 8);

    let spans = h.source.spans();
    assert_eq!(spans.len(), 8);
    assert!(max_overlap(&spans) <= 2);
    assert!(h.source.peak_in_flight() <= 2);
    let stats = h.controller.throttle().stats(SOURCE);
    assert_eq!(stats.peak_in_flight, 2);
    assert_eq!(stats.requests_started, 8);
    assert_eq!(stats.in_flight, 0);
}

#[tokio::test]
async fn spacing_is_enforced_between_request_starts() {
    let h = harness(HarnessOptions {
        limits: ThrottleLimits::new(4, Duration::from_millis(80)),
        workers: 4,
        latency: Duration::ZERO,
    })
    .await;

    let started = Instant::now();
    let handle = h
        .controller
        .start(RunKind::Update, ItemSelector::new(mangas(&[1, 2, 3, 4])))
        .await
        .unwrap();
    within(handle.wait()).await.unwrap();

    // Four starts need at least three full intervals.
    assert!(started.elapsed() >= Duration::from_millis(240));
    assert_eq!(h.source.fetched_ids().len(), 4);
}

#[tokio::test]
async fn stalled_source_does_not_block_other_sources() {
    let h = harness(HarnessOptions {
        limits: ThrottleLimits::new(1, Duration::ZERO),
        workers: 2,
        latency: Duration::from_millis(1),
    })
    .await;
    let release = h.source.hold(1);

    let targets = vec![
        ItemTarget::manga(1, SOURCE, "Stalled"),
        ItemTarget::manga(2, SOURCE, "Queued behind"),
        ItemTarget::manga(3, OTHER_SOURCE, "Independent"),
    ];
    let handle = h
        .controller
        .start(RunKind::Update, ItemSelector::new(targets))
        .await
        .unwrap();
    let mut rx = handle.subscribe();

    within(h.other.wait_started(3)).await;
    let snap = within(rx.wait_for(|s| s.finish_count == 1)).await.unwrap().clone();
    assert_eq!(snap.first_running_title.as_deref(), Some("Stalled"));
    assert_eq!(snap.pending_count, 1);

    release.add_permits(1);
    let record = within(handle.wait()).await.unwrap();
    assert_eq!(record.succ_count, 3);
    assert_eq!(h.source.fetched_ids(), [1, 2]);
}

#[tokio::test]
async fn update_and_download_runs_share_source_budget() {
    let h = harness(HarnessOptions {
        limits: ThrottleLimits::new(1, Duration::ZERO),
        workers: 2,
        latency: Duration::from_millis(1),
    })
    .await;
    let release = h.source.hold(1);
    h.source.set_content(50, b"bytes");

    let update = h
        .controller
        .start(RunKind::Update, ItemSelector::new(mangas(&[1])))
        .await
        .unwrap();
    within(h.source.wait_started(1)).await;

    let download = h
        .controller
        .start(
            RunKind::Download,
            ItemSelector::new(vec![ItemTarget::chapter(9, 50, SOURCE, "Shared")]),
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.source.fetched_ids(), Vec::<i64>::new());
    assert_eq!(h.controller.snapshot(RunKind::Download).pending_count, 1);

    release.add_permits(1);
    within(update.wait()).await.unwrap();
    let record = within(download.wait()).await.unwrap();
    assert_eq!(record.succ_count, 1);
    assert_eq!(h.source.fetched_ids(), [1, 50]);
}

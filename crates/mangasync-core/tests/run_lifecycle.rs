//! Integration tests: full runs through the controller against a scripted source.

mod common;

use std::sync::Arc;

use common::{harness, mangas, within, HarnessOptions, SOURCE};
use mangasync_core::checksum;
use mangasync_core::resume_db::RecordStatus;
use mangasync_core::run::{CancelAck, ItemState, RunPhase, SkipReason, UpdateStatus};
use mangasync_core::source::ChapterRef;
use mangasync_core::storage;
use mangasync_core::{ItemSelector, ItemTarget, RunError, RunKind, RunSnapshot};

#[tokio::test]
async fn three_items_all_succeed() {
    let h = harness(HarnessOptions::default()).await;
    h.source.set_chapters(
        1,
        vec![ChapterRef::new("/1/1", "Ch. 1", 1.0), ChapterRef::new("/1/2", "Ch. 2", 2.0)],
    );
    h.source.set_chapters(3, vec![ChapterRef::new("/3/1", "Ch. 1", 1.0)]);

    let handle = h
        .controller
        .start(RunKind::Update, ItemSelector::new(mangas(&[1, 2, 3])))
        .await
        .unwrap();
    let record = within(handle.wait()).await.unwrap();

    assert_eq!(record.status, RecordStatus::Completed);
    assert_eq!(record.total_count, 3);
    assert_eq!(record.succ_count, 3);
    assert_eq!(record.failed_count, 0);
    assert_eq!(record.skip_count, 0);
    assert_eq!(record.new_chapter_count, 3);
    assert!(record.is_finished());

    // New chapters were inserted and reconciled by this run.
    let synced = h.db.list_chapter_sync(1).await.unwrap();
    assert_eq!(synced.len(), 2);
    assert!(synced.iter().all(|c| !c.dirty && c.commit_id == record.id));

    let snap = h.controller.snapshot(RunKind::Update);
    assert!(!snap.running);
    assert_eq!((snap.pending_count, snap.running_count), (0, 0));
    let results = snap.per_manga_results.as_ref().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].new_chapters.len(), 2);
    assert!(results.iter().all(|r| r.state == ItemState::Succeeded));

    let status = h.controller.status(RunKind::Update).await.unwrap();
    assert!(!status.is_active());
    assert_eq!(status.last_record, Some(record));
}

#[tokio::test]
async fn exhausted_retries_fail_one_item_but_run_finishes() {
    let h = harness(HarnessOptions::default()).await;
    h.source.fail(2, u32::MAX);

    let handle = h
        .controller
        .start(RunKind::Update, ItemSelector::new(mangas(&[1, 2, 3])))
        .await
        .unwrap();
    let run_id = handle.run_id();
    let record = within(handle.wait()).await.unwrap();

    assert_eq!(record.status, RecordStatus::CompletedWithErrors);
    assert_eq!(record.failed_count, 1);
    assert_eq!(record.succ_count, 2);
    assert_eq!(h.source.fetched_ids().iter().filter(|id| **id == 2).count(), 3);

    let items = h.db.list_run_items(run_id).await.unwrap();
    let failed = items.iter().find(|i| i.manga_id == 2).unwrap();
    assert_eq!(failed.state, ItemState::Failed);
    assert_eq!(failed.attempts, 3);
    assert!(failed.last_error.as_deref().unwrap().contains("scripted failure"));
}

#[tokio::test]
async fn transient_failure_is_retried_to_success() {
    let h = harness(HarnessOptions::default()).await;
    h.source.fail(1, 2);
    let handle = h
        .controller
        .start(RunKind::Update, ItemSelector::new(mangas(&[1])))
        .await
        .unwrap();
    let record = within(handle.wait()).await.unwrap();
    assert_eq!(record.status, RecordStatus::Completed);
    assert_eq!(h.source.fetched_ids(), [1, 1, 1]);
}

#[tokio::test]
async fn cancel_skips_pending_and_lets_running_item_finish() {
    let h = harness(HarnessOptions {
        workers: 1,
        ..HarnessOptions::default()
    })
    .await;
    let release = h.source.hold(1);

    let handle = h
        .controller
        .start(RunKind::Update, ItemSelector::new(mangas(&[1, 2])))
        .await
        .unwrap();
    let mut rx = handle.subscribe();
    within(h.source.wait_started(1)).await;

    assert_eq!(h.controller.cancel(RunKind::Update), CancelAck::Requested);
    assert_eq!(h.controller.cancel(RunKind::Update), CancelAck::AlreadyRequested);

    // Item 2 is skipped while item 1 is still in flight.
    let snap = within(rx.wait_for(|s| s.skip_count == 1)).await.unwrap().clone();
    assert_eq!(snap.running_count, 1);
    assert_eq!(snap.skip_cancelled_count, 1);

    release.add_permits(1);
    let record = within(handle.wait()).await.unwrap();
    assert_eq!(record.status, RecordStatus::Aborted);
    assert_eq!(record.succ_count, 1);
    assert_eq!(record.skip_count, 1);
    assert_eq!(h.source.fetched_ids(), [1]);
    assert_eq!(h.controller.cancel(RunKind::Update), CancelAck::NotRunning);
}

#[tokio::test]
async fn second_start_of_same_kind_is_rejected() {
    let h = harness(HarnessOptions::default()).await;
    let release = h.source.hold(1);

    let first = h
        .controller
        .start(RunKind::Update, ItemSelector::new(mangas(&[1])))
        .await
        .unwrap();
    let err = h
        .controller
        .start(RunKind::Update, ItemSelector::new(mangas(&[2])))
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::AlreadyRunning(RunKind::Update)));
    let status = h.controller.status(RunKind::Update).await.unwrap();
    assert_eq!(status.phase, RunPhase::Running);
    assert!(status.last_record.is_none());

    // The other kind has its own slot.
    h.source.set_content(10, b"page data");
    let download = h
        .controller
        .start(
            RunKind::Download,
            ItemSelector::new(vec![ItemTarget::chapter(5, 10, SOURCE, "Other")]),
        )
        .await
        .unwrap();
    within(download.wait()).await.unwrap();

    release.add_permits(1);
    within(first.wait()).await.unwrap();
    let again = h
        .controller
        .start(RunKind::Update, ItemSelector::new(mangas(&[2])))
        .await
        .unwrap();
    within(again.wait()).await.unwrap();
}

#[tokio::test]
async fn every_published_snapshot_is_consistent() {
    let h = harness(HarnessOptions {
        workers: 3,
        ..HarnessOptions::default()
    })
    .await;
    h.source.fail(4, u32::MAX);
    let mut targets = mangas(&[1, 2, 3, 4, 5, 6]);
    targets[5] = targets[5].clone().excluded();

    let handle = h
        .controller
        .start(RunKind::Update, ItemSelector::new(targets))
        .await
        .unwrap();
    let mut rx = handle.subscribe();
    let watcher = tokio::spawn(async move {
        let mut seen: Vec<Arc<RunSnapshot>> = Vec::new();
        loop {
            let snap = rx.borrow_and_update().clone();
            let done = !snap.running;
            seen.push(snap);
            if done || rx.changed().await.is_err() {
                break;
            }
        }
        seen
    });
    let record = within(handle.wait()).await.unwrap();
    let seen = within(watcher).await.unwrap();

    assert!(seen.iter().all(|s| s.is_consistent()));
    for pair in seen.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(b.finish_count >= a.finish_count);
        assert!(b.failed_count >= a.failed_count);
        assert!(b.skip_count >= a.skip_count);
    }
    let last = seen.last().unwrap();
    assert!(!last.running);
    assert_eq!(last.skip_excluded_count, 1);
    assert_eq!(record.skip_count, 1);
    assert_eq!(record.failed_count, 1);
    assert!(!h.source.fetched_ids().contains(&6));
}

#[tokio::test]
async fn repeated_snapshots_are_byte_identical() {
    let h = harness(HarnessOptions::default()).await;
    let handle = h
        .controller
        .start(RunKind::Update, ItemSelector::new(mangas(&[1, 2])))
        .await
        .unwrap();
    within(handle.wait()).await.unwrap();

    let a = serde_json::to_vec(&*h.controller.snapshot(RunKind::Update)).unwrap();
    let b = serde_json::to_vec(&*h.controller.snapshot(RunKind::Update)).unwrap();
    assert_eq!(a, b);

    let status = UpdateStatus::from(&*h.controller.snapshot(RunKind::Update));
    assert_eq!(status.manga_chapter_list.map(|l| l.len()), Some(2));
}

#[tokio::test]
async fn download_run_stores_chapters_with_checksums() {
    let h = harness(HarnessOptions::default()).await;
    h.source.set_content(100, b"chapter one");
    h.source.set_content(101, b"chapter two");

    let targets = vec![
        ItemTarget::chapter(7, 100, SOURCE, "Blame!"),
        ItemTarget::chapter(7, 101, SOURCE, "Blame!"),
        ItemTarget::chapter(7, 102, SOURCE, "Blame!"),
    ];
    let handle = h
        .controller
        .start(RunKind::Download, ItemSelector::new(targets))
        .await
        .unwrap();
    let run_id = handle.run_id();
    let record = within(handle.wait()).await.unwrap();

    // Chapter 102 has no content: NotFound is not retried.
    assert_eq!(record.succ_count, 2);
    assert_eq!(record.failed_count, 1);
    assert_eq!(h.source.fetched_ids().iter().filter(|id| **id == 102).count(), 1);

    let items = h.db.list_run_items(run_id).await.unwrap();
    for item in items.iter().filter(|i| i.state == ItemState::Succeeded) {
        let path = storage::chapter_path(
            h.download_dir.path(),
            SOURCE,
            "Blame!",
            item.chapter_id.unwrap(),
        );
        let digest = checksum::sha256_file(&path).await.unwrap();
        assert_eq!(item.checksum.as_deref(), Some(digest.as_str()));
    }
    let stored = storage::chapter_path(h.download_dir.path(), SOURCE, "Blame!", 100);
    assert_eq!(std::fs::read(stored).unwrap(), b"chapter one");
}

#[tokio::test]
async fn excluded_items_are_skipped_without_fetching() {
    let h = harness(HarnessOptions::default()).await;
    let targets = vec![
        ItemTarget::manga(1, SOURCE, "Kept"),
        ItemTarget::manga(2, SOURCE, "Excluded").excluded(),
    ];
    let handle = h
        .controller
        .start(RunKind::Update, ItemSelector::new(targets))
        .await
        .unwrap();
    let run_id = handle.run_id();
    let record = within(handle.wait()).await.unwrap();
    assert_eq!(record.status, RecordStatus::Completed);
    assert_eq!(record.skip_count, 1);
    assert_eq!(h.source.fetched_ids(), [1]);

    let items = h.db.list_run_items(run_id).await.unwrap();
    let skipped = items.iter().find(|i| i.manga_id == 2).unwrap();
    assert_eq!(skipped.skip_reason, Some(SkipReason::Excluded));
}

#[tokio::test]
async fn empty_selection_completes_immediately() {
    let h = harness(HarnessOptions::default()).await;
    let handle = h
        .controller
        .start(RunKind::Update, ItemSelector::new(vec![]))
        .await
        .unwrap();
    let record = within(handle.wait()).await.unwrap();
    assert_eq!(record.status, RecordStatus::Completed);
    assert_eq!(record.total_count, 0);
    assert_eq!(
        h.controller.status(RunKind::Update).await.unwrap().phase,
        RunPhase::Idle
    );
}

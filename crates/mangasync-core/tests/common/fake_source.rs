//! Scripted source provider for integration tests.
//!
//! Records the start/end instant of every fetch, tracks how many fetches are
//! in flight at once, can fail a fetch N times, can hold a fetch until the
//! test releases it, and can apply a local edit while a fetch is running.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio::time::Instant;

use mangasync_core::resume_db::{LocalEdit, ResumeDb};
use mangasync_core::retry::FetchError;
use mangasync_core::source::{ChapterId, ChapterRef, ChapterStream, MangaId, SourceId, SourceProvider};

/// One fetch call as seen by the provider.
#[derive(Debug, Clone, Copy)]
pub struct FetchSpan {
    pub id: i64,
    pub start: Instant,
    pub end: Instant,
}

#[derive(Default)]
struct Script {
    chapters: HashMap<MangaId, Vec<ChapterRef>>,
    content: HashMap<ChapterId, Vec<u8>>,
    failures: HashMap<i64, u32>,
    holds: HashMap<i64, Arc<Semaphore>>,
    edits: HashMap<MangaId, (ResumeDb, String, LocalEdit)>,
}

pub struct FakeSource {
    latency: Duration,
    script: Mutex<Script>,
    spans: Mutex<Vec<FetchSpan>>,
    started: Mutex<Vec<i64>>,
    started_notify: Notify,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeSource {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            script: Mutex::new(Script::default()),
            spans: Mutex::new(Vec::new()),
            started: Mutex::new(Vec::new()),
            started_notify: Notify::new(),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn set_chapters(&self, manga: MangaId, chapters: Vec<ChapterRef>) {
        self.script.lock().unwrap().chapters.insert(manga, chapters);
    }

    pub fn set_content(&self, chapter: ChapterId, bytes: &[u8]) {
        self.script.lock().unwrap().content.insert(chapter, bytes.to_vec());
    }

    /// Fail the next `times` fetches of `id` with a connection error.
    pub fn fail(&self, id: i64, times: u32) {
        self.script.lock().unwrap().failures.insert(id, times);
    }

    /// Park fetches of `id` until the returned semaphore gets a permit.
    pub fn hold(&self, id: i64) -> Arc<Semaphore> {
        let sem = Arc::new(Semaphore::new(0));
        self.script.lock().unwrap().holds.insert(id, Arc::clone(&sem));
        sem
    }

    /// Apply `edit` to chapter `url` of `manga` while its list fetch is in flight.
    pub fn edit_during_fetch(&self, manga: MangaId, db: ResumeDb, url: &str, edit: LocalEdit) {
        self.script
            .lock()
            .unwrap()
            .edits
            .insert(manga, (db, url.to_string(), edit));
    }

    pub fn spans(&self) -> Vec<FetchSpan> {
        self.spans.lock().unwrap().clone()
    }

    /// Ids fetched, in start order.
    pub fn fetched_ids(&self) -> Vec<i64> {
        let mut spans = self.spans();
        spans.sort_by_key(|s| s.start);
        spans.into_iter().map(|s| s.id).collect()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Resolves once a fetch of `id` has started.
    pub async fn wait_started(&self, id: i64) {
        loop {
            let notified = self.started_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.started.lock().unwrap().contains(&id) {
                return;
            }
            notified.await;
        }
    }

    async fn fetch(&self, id: i64) -> Result<(), FetchError> {
        let start = Instant::now();
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_in_flight, Ordering::SeqCst);
        self.started.lock().unwrap().push(id);
        self.started_notify.notify_waiters();

        let hold = self.script.lock().unwrap().holds.get(&id).cloned();
        if let Some(sem) = hold {
            let _ = sem.acquire().await;
        }
        tokio::time::sleep(self.latency).await;

        let edit = self.script.lock().unwrap().edits.remove(&id);
        if let Some((db, url, edit)) = edit {
            db.apply_local_edit(id, &url, &edit).await.unwrap();
        }
        let fail = {
            let mut script = self.script.lock().unwrap();
            match script.failures.get_mut(&id) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    true
                }
                _ => false,
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.spans.lock().unwrap().push(FetchSpan {
            id,
            start,
            end: Instant::now(),
        });
        if fail {
            Err(FetchError::Connection("scripted failure".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SourceProvider for FakeSource {
    fn name(&self) -> &str {
        "fake"
    }

    async fn fetch_chapter_list(
        &self,
        _source: SourceId,
        manga: MangaId,
    ) -> Result<Vec<ChapterRef>, FetchError> {
        self.fetch(manga).await?;
        Ok(self
            .script
            .lock()
            .unwrap()
            .chapters
            .get(&manga)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_chapter_content(
        &self,
        _source: SourceId,
        chapter: ChapterId,
    ) -> Result<ChapterStream, FetchError> {
        self.fetch(chapter).await?;
        let bytes = self
            .script
            .lock()
            .unwrap()
            .content
            .get(&chapter)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(format!("chapter {chapter}")))?;
        Ok(Box::new(std::io::Cursor::new(bytes)))
    }
}

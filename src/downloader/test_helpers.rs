//! Shared fakes and fixtures for tests across the crate.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::tempdir;
use tokio::sync::{Semaphore, watch};

use crate::config::Config;
use crate::db::{Bookmark, Content, Database, Group, Progression};
use crate::downloader::Downloader;
use crate::engine::{Transfer, TransferEngine, TransferEvent, TransferListener, TransferRequest, TransferState};
use crate::error::{Error, Result};
use crate::paging::UiState;
use crate::remote::{ContentDetail, ContentGateway, Page};
use crate::types::{ContentFilters, DownloadId};

/// In-memory content API
#[derive(Default)]
pub(crate) struct FakeGateway {
    pages: Mutex<HashMap<u32, Page>>,
    failing_pages: Mutex<HashSet<u32>>,
    details: Mutex<HashMap<String, ContentDetail>>,
    urls: Mutex<HashMap<i64, String>>,
    fail_marks: AtomicBool,
    gate: Mutex<Option<Arc<Semaphore>>>,
    url_gate: Mutex<Option<Arc<Semaphore>>>,
    observed: Mutex<Option<watch::Receiver<UiState>>>,
    states_at_fetch: Mutex<Vec<UiState>>,
    calls: Mutex<Vec<String>>,
}

impl FakeGateway {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn set_page(&self, page_number: u32, page: Page) {
        self.pages.lock().unwrap().insert(page_number, page);
    }

    pub(crate) fn fail_page(&self, page_number: u32, failing: bool) {
        let mut failing_pages = self.failing_pages.lock().unwrap();
        if failing {
            failing_pages.insert(page_number);
        } else {
            failing_pages.remove(&page_number);
        }
    }

    pub(crate) fn set_detail(&self, detail: ContentDetail) {
        self.details
            .lock()
            .unwrap()
            .insert(detail.content.id.clone(), detail);
    }

    pub(crate) fn set_url(&self, video_id: i64, url: &str) {
        self.urls.lock().unwrap().insert(video_id, url.to_string());
    }

    pub(crate) fn fail_marks(&self, failing: bool) {
        self.fail_marks.store(failing, Ordering::SeqCst);
    }

    /// Make page fetches wait for a permit on the returned semaphore
    pub(crate) fn gate(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Make URL resolution wait for a permit on the returned semaphore
    pub(crate) fn hold_urls(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.url_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Record the loader's UiState each time a page fetch starts
    pub(crate) fn observe(&self, rx: watch::Receiver<UiState>) {
        *self.observed.lock().unwrap() = Some(rx);
    }

    pub(crate) fn states_at_fetch(&self) -> Vec<UiState> {
        self.states_at_fetch.lock().unwrap().clone()
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls whose log entry starts with `prefix`
    pub(crate) fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_marks(&self) -> Result<()> {
        if self.fail_marks.load(Ordering::SeqCst) {
            return Err(Error::Api {
                status: 500,
                message: "mutation failed".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ContentGateway for FakeGateway {
    async fn fetch_page(
        &self,
        page_number: u32,
        _page_size: u32,
        _filters: &ContentFilters,
    ) -> Result<Page> {
        self.log(format!("page:{}", page_number));
        if let Some(rx) = self.observed.lock().unwrap().as_ref() {
            let state = *rx.borrow();
            self.states_at_fetch.lock().unwrap().push(state);
        }

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        if self.failing_pages.lock().unwrap().contains(&page_number) {
            return Err(Error::Api {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        Ok(self
            .pages
            .lock()
            .unwrap()
            .get(&page_number)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_detail(&self, content_id: &str) -> Result<ContentDetail> {
        self.log(format!("detail:{}", content_id));
        self.details
            .lock()
            .unwrap()
            .get(content_id)
            .cloned()
            .ok_or_else(|| Error::Api {
                status: 404,
                message: format!("no content {}", content_id),
            })
    }

    async fn resolve_download_url(&self, video_id: i64) -> Result<Option<String>> {
        self.log(format!("url:{}", video_id));
        let gate = self.url_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
        Ok(self.urls.lock().unwrap().get(&video_id).cloned())
    }

    async fn create_bookmark(&self, content_id: &str) -> Result<Bookmark> {
        self.log(format!("create_bookmark:{}", content_id));
        self.check_marks()?;
        Ok(Bookmark {
            id: format!("bm-{}", content_id),
            content_id: content_id.to_string(),
        })
    }

    async fn delete_bookmark(&self, bookmark_id: &str) -> Result<()> {
        self.log(format!("delete_bookmark:{}", bookmark_id));
        self.check_marks()
    }

    async fn update_progression(
        &self,
        content_id: &str,
        progress: i64,
        finished: bool,
    ) -> Result<Progression> {
        self.log(format!("update_progression:{}", content_id));
        self.check_marks()?;
        Ok(Progression {
            id: format!("pr-{}", content_id),
            content_id: content_id.to_string(),
            progress,
            finished,
        })
    }

    async fn delete_progression(&self, progression_id: &str) -> Result<()> {
        self.log(format!("delete_progression:{}", progression_id));
        self.check_marks()
    }
}

/// In-memory transfer engine
#[derive(Default)]
pub(crate) struct FakeEngine {
    listener: Mutex<Option<Arc<dyn TransferListener>>>,
    listener_installs: AtomicUsize,
    submitted: Mutex<Vec<TransferRequest>>,
    cancelled: Mutex<Vec<DownloadId>>,
    paused: Mutex<Vec<DownloadId>>,
    transfers: Mutex<HashMap<DownloadId, Transfer>>,
    reject_submits: AtomicBool,
    fail_queries: AtomicBool,
}

impl FakeEngine {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Push an event through the installed listener
    pub(crate) fn emit(&self, id: &str, state: TransferState) {
        let listener = self.listener.lock().unwrap().clone();
        if let Some(listener) = listener {
            listener.on_event(TransferEvent {
                request_id: DownloadId::from(id),
                state,
            });
        }
    }

    pub(crate) fn set_transfer(&self, id: &str, percent: u8, state: TransferState) {
        self.transfers.lock().unwrap().insert(
            DownloadId::from(id),
            Transfer {
                request_id: DownloadId::from(id),
                percent,
                state,
            },
        );
    }

    /// Forget every transfer, as after the engine lost its state
    pub(crate) fn drop_all(&self) {
        self.transfers.lock().unwrap().clear();
    }

    pub(crate) fn reject_submits(&self, reject: bool) {
        self.reject_submits.store(reject, Ordering::SeqCst);
    }

    pub(crate) fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn submitted_ids(&self) -> Vec<DownloadId> {
        self.submitted
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.id.clone())
            .collect()
    }

    pub(crate) fn submitted(&self) -> Vec<TransferRequest> {
        self.submitted.lock().unwrap().clone()
    }

    pub(crate) fn cancelled(&self) -> Vec<DownloadId> {
        self.cancelled.lock().unwrap().clone()
    }

    pub(crate) fn paused(&self) -> Vec<DownloadId> {
        self.paused.lock().unwrap().clone()
    }

    pub(crate) fn listener_installs(&self) -> usize {
        self.listener_installs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransferEngine for FakeEngine {
    async fn submit(&self, request: TransferRequest) -> Result<()> {
        if self.reject_submits.load(Ordering::SeqCst) {
            return Err(Error::Engine("storage full".to_string()));
        }
        self.set_transfer(request.id.as_str(), 0, TransferState::Queued);
        self.submitted.lock().unwrap().push(request);
        Ok(())
    }

    async fn cancel(&self, id: &DownloadId) -> Result<()> {
        self.transfers.lock().unwrap().remove(id);
        self.cancelled.lock().unwrap().push(id.clone());
        Ok(())
    }

    async fn pause(&self, id: &DownloadId) -> Result<()> {
        if let Some(transfer) = self.transfers.lock().unwrap().get_mut(id) {
            transfer.state = TransferState::Paused;
        }
        self.paused.lock().unwrap().push(id.clone());
        Ok(())
    }

    async fn resume(&self, id: &DownloadId) -> Result<bool> {
        match self.transfers.lock().unwrap().get_mut(id) {
            Some(transfer) => {
                transfer.state = TransferState::Downloading;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn current_transfers(&self) -> Result<Vec<Transfer>> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(Error::Engine("engine unavailable".to_string()));
        }
        let mut transfers: Vec<Transfer> =
            self.transfers.lock().unwrap().values().cloned().collect();
        transfers.sort_by(|a, b| a.request_id.cmp(&b.request_id));
        Ok(transfers)
    }

    fn set_listener(&self, listener: Arc<dyn TransferListener>) {
        *self.listener.lock().unwrap() = Some(listener);
        self.listener_installs.fetch_add(1, Ordering::SeqCst);
    }
}

/// A downloader over fakes and a temporary database
pub(crate) struct TestDownloader {
    pub(crate) downloader: Downloader,
    pub(crate) gateway: Arc<FakeGateway>,
    pub(crate) engine: Arc<FakeEngine>,
    /// Keeps the database directory alive
    pub(crate) _temp_dir: tempfile::TempDir,
}

/// Helper to create a test Downloader with a persistent database.
pub(crate) async fn create_test_downloader() -> TestDownloader {
    create_test_downloader_with(|_| {}).await
}

/// Like [`create_test_downloader`], with a hook to adjust the config
pub(crate) async fn create_test_downloader_with(adjust: impl FnOnce(&mut Config)) -> TestDownloader {
    let temp_dir = tempdir().unwrap();

    let mut config = Config::default();
    config.persistence.database_path = temp_dir.path().join("test.db");
    config.download.max_concurrent_downloads = 2;
    adjust(&mut config);

    let db = Database::new(&config.persistence.database_path)
        .await
        .unwrap();

    let gateway = FakeGateway::new();
    let engine = FakeEngine::new();
    let downloader = Downloader::with_database(
        config,
        Arc::new(db),
        gateway.clone(),
        engine.clone(),
    );

    TestDownloader {
        downloader,
        gateway,
        engine,
        _temp_dir: temp_dir,
    }
}

/// Let the sequencer dispatch without running the startup sweep
pub(crate) fn mark_reconciled(downloader: &Downloader) {
    downloader.dispatch.reconciled.store(true, Ordering::SeqCst);
}

/// A single-unit screencast
pub(crate) fn screencast(id: &str, video_id: i64) -> Content {
    Content {
        id: id.to_string(),
        content_type: "screencast".to_string(),
        name: format!("Screencast {}", id),
        description: None,
        duration_secs: 300,
        card_artwork_url: None,
        technologies: vec!["Swift".to_string()],
        difficulty: Some("beginner".to_string()),
        released_at: 1_700_000_000,
        popularity: 1.0,
        video_id: Some(video_id),
    }
}

/// A collection with one group holding the given `(episode id, video id)` pairs
pub(crate) fn collection(id: &str, episodes: &[(&str, i64)]) -> ContentDetail {
    let episodes = episodes
        .iter()
        .map(|(episode_id, video_id)| Content {
            content_type: "episode".to_string(),
            ..screencast(episode_id, *video_id)
        })
        .collect();

    ContentDetail {
        content: Content {
            content_type: "collection".to_string(),
            video_id: None,
            ..screencast(id, 0)
        },
        groups: vec![Group {
            id: format!("{}-g1", id),
            content_id: id.to_string(),
            name: "Part 1".to_string(),
            ordinal: 0,
            episodes,
        }],
    }
}

/// Register a downloadable screencast with the fake API
pub(crate) fn serve_screencast(gateway: &FakeGateway, id: &str, video_id: i64) {
    gateway.set_detail(ContentDetail {
        content: screencast(id, video_id),
        groups: Vec::new(),
    });
    gateway.set_url(video_id, &format!("https://cdn.example.com/{}.mp4", video_id));
}

/// Register a collection and the URLs of its episodes with the fake API
pub(crate) fn serve_collection(gateway: &FakeGateway, id: &str, episodes: &[(&str, i64)]) {
    gateway.set_detail(collection(id, episodes));
    for (_, video_id) in episodes {
        gateway.set_url(*video_id, &format!("https://cdn.example.com/{}.mp4", video_id));
    }
}

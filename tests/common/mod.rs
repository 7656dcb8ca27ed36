//! Shared harness for the offline-catalog integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use offline_catalog::{
    Config, DownloadId, Downloader, HttpContentGateway, RetryConfig, Transfer, TransferEngine,
    TransferEvent, TransferListener, TransferRequest, TransferState,
};
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// In-memory transfer engine driven by the test
#[derive(Default)]
pub struct MemoryEngine {
    transfers: Mutex<HashMap<DownloadId, Transfer>>,
    submitted: Mutex<Vec<TransferRequest>>,
    listener: Mutex<Option<Arc<dyn TransferListener>>>,
}

impl MemoryEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn submitted(&self) -> Vec<TransferRequest> {
        self.submitted.lock().unwrap().clone()
    }

    /// Move a transfer forward and notify the listener
    pub fn report(&self, id: &str, percent: u8, state: TransferState) {
        let id = DownloadId::from(id);
        self.transfers.lock().unwrap().insert(
            id.clone(),
            Transfer {
                request_id: id.clone(),
                percent,
                state,
            },
        );
        let listener = self.listener.lock().unwrap().clone();
        if let Some(listener) = listener {
            listener.on_event(TransferEvent {
                request_id: id,
                state,
            });
        }
    }
}

#[async_trait]
impl TransferEngine for MemoryEngine {
    async fn submit(&self, request: TransferRequest) -> offline_catalog::Result<()> {
        self.transfers
            .lock()
            .unwrap()
            .entry(request.id.clone())
            .or_insert(Transfer {
                request_id: request.id.clone(),
                percent: 0,
                state: TransferState::Queued,
            });
        self.submitted.lock().unwrap().push(request);
        Ok(())
    }

    async fn cancel(&self, id: &DownloadId) -> offline_catalog::Result<()> {
        self.transfers.lock().unwrap().remove(id);
        Ok(())
    }

    async fn pause(&self, id: &DownloadId) -> offline_catalog::Result<()> {
        if let Some(transfer) = self.transfers.lock().unwrap().get_mut(id) {
            transfer.state = TransferState::Paused;
        }
        Ok(())
    }

    async fn resume(&self, id: &DownloadId) -> offline_catalog::Result<bool> {
        match self.transfers.lock().unwrap().get_mut(id) {
            Some(transfer) => {
                transfer.state = TransferState::Downloading;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn current_transfers(&self) -> offline_catalog::Result<Vec<Transfer>> {
        Ok(self.transfers.lock().unwrap().values().cloned().collect())
    }

    fn set_listener(&self, listener: Arc<dyn TransferListener>) {
        *self.listener.lock().unwrap() = Some(listener);
    }
}

/// A downloader wired to a mock content API and a [`MemoryEngine`]
pub struct Harness {
    pub downloader: Downloader,
    pub engine: Arc<MemoryEngine>,
    pub server: MockServer,
    _temp_dir: TempDir,
}

pub async fn harness() -> Harness {
    let server = MockServer::start().await;
    let temp_dir = tempfile::tempdir().unwrap();

    let mut config = Config::default();
    config.api.base_url = url::Url::parse(&format!("{}/api/", server.uri())).unwrap();
    config.api.retry = RetryConfig {
        max_attempts: 1,
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(10),
        backoff_multiplier: 2.0,
        jitter: false,
    };
    config.download.progress_poll_interval = Duration::from_millis(20);
    config.persistence.database_path = temp_dir.path().join("catalog.db");

    let gateway = Arc::new(HttpContentGateway::new(config.api.clone()).unwrap());
    let engine = MemoryEngine::new();
    let downloader = Downloader::new(config, gateway, engine.clone())
        .await
        .unwrap();

    Harness {
        downloader,
        engine,
        server,
        _temp_dir: temp_dir,
    }
}

pub fn content_json(id: &str, content_type: &str, video_id: i64) -> Value {
    json!({
        "id": id,
        "type": "contents",
        "attributes": {
            "name": format!("Item {}", id),
            "content_type": content_type,
            "duration": 600,
            "released_at": "2021-06-01T12:00:00Z",
            "video_identifier": video_id
        }
    })
}

pub fn media_url(video_id: i64) -> String {
    format!("https://cdn.example.com/{}.mp4", video_id)
}

/// Serve the download rendition of a video
pub async fn serve_video(server: &MockServer, video_id: i64) {
    Mock::given(method("GET"))
        .and(path(format!("/api/videos/{}/download", video_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{
                "id": format!("r{}", video_id),
                "type": "attachments",
                "attributes": { "kind": "sd", "url": media_url(video_id) }
            }]
        })))
        .mount(server)
        .await;
}

pub async fn serve_screencast(server: &MockServer, id: &str, video_id: i64) {
    Mock::given(method("GET"))
        .and(path(format!("/api/contents/{}", id)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": content_json(id, "screencast", video_id) })),
        )
        .mount(server)
        .await;
    serve_video(server, video_id).await;
}

/// Serve a one-group collection and the videos of its episodes
pub async fn serve_collection(server: &MockServer, id: &str, episodes: &[(&str, i64)]) {
    let mut collection = content_json(id, "collection", 0);
    collection["relationships"] = json!({
        "groups": { "data": [{ "id": format!("{}-g", id), "type": "groups" }] }
    });

    let mut included = vec![json!({
        "id": format!("{}-g", id),
        "type": "groups",
        "attributes": { "name": "Part 1", "ordinal": 1 },
        "relationships": { "contents": { "data": episodes
            .iter()
            .map(|(ep, _)| json!({ "id": ep, "type": "contents" }))
            .collect::<Vec<_>>() } }
    })];
    for (ep, video_id) in episodes {
        included.push(content_json(ep, "episode", *video_id));
        serve_video(server, *video_id).await;
    }

    Mock::given(method("GET"))
        .and(path(format!("/api/contents/{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": collection,
            "included": included
        })))
        .mount(server)
        .await;
}

/// Poll `check` until it holds, failing after five seconds
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached within 5 seconds");
}

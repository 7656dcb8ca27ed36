
use std::time::Duration;

use tokio::sync::broadcast;

use super::Downloader;
use super::test_helpers::*;
use crate::db::DownloadRecord;
use crate::engine::{TransferEvent, TransferState};
use crate::error::{DownloadError, Error, ExpansionError};
use crate::types::{Connectivity, DownloadId, DownloadState, Event, FailureReason};

fn id(raw: &str) -> DownloadId {
    DownloadId::from(raw)
}

fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

async fn record(downloader: &Downloader, raw: &str) -> DownloadRecord {
    downloader
        .db
        .get_download(&id(raw))
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("no record {}", raw))
}

async fn engine_event(downloader: &Downloader, raw: &str, state: TransferState) {
    downloader
        .adapter
        .handle_event(TransferEvent {
            request_id: id(raw),
            state,
        })
        .await
        .unwrap();
}

/// Enqueue and dispatch screencasts in order
async fn dispatch_screencasts(h: &TestDownloader, ids: &[(&str, i64)]) {
    for (content_id, video_id) in ids {
        serve_screencast(&h.gateway, content_id, *video_id);
        h.downloader.enqueue(content_id, None).await.unwrap();
    }
    mark_reconciled(&h.downloader);
    h.downloader.process_queue_once().await.unwrap();
}

async fn wait_for_state(downloader: &Downloader, raw: &str, state: DownloadState) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(r) = downloader.db.get_download(&id(raw)).await.unwrap()
                && r.state == state
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {} to reach {:?}", raw, state));
}

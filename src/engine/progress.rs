//! Pulled progress reporting.
//!
//! The engine does not push progress. While at least one download is tracked
//! and the observing surface is visible, a timer asks the engine for its
//! current transfers and persists the percentages of the tracked ids. The
//! timer is torn down as soon as either condition stops holding.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, broadcast};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::TransferEngine;
use crate::Result;
use crate::db::Database;
use crate::downloader::marker::refresh_marker;
use crate::types::{DownloadId, Event};

struct PollerInner {
    engine: Arc<dyn TransferEngine>,
    db: Arc<Database>,
    event_tx: broadcast::Sender<Event>,
    interval: Duration,
    shutdown: CancellationToken,
    tracked: Mutex<HashSet<DownloadId>>,
    visible: AtomicBool,
    /// Cancels the running timer task, None while stopped
    timer: Mutex<Option<CancellationToken>>,
}

/// Polls the engine for progress of tracked downloads
#[derive(Clone)]
pub struct ProgressPoller {
    inner: Arc<PollerInner>,
}

impl ProgressPoller {
    /// Create a stopped poller
    ///
    /// The surface starts invisible; call [`set_visible`](Self::set_visible)
    /// once a UI observes download progress.
    pub fn new(
        engine: Arc<dyn TransferEngine>,
        db: Arc<Database>,
        event_tx: broadcast::Sender<Event>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                engine,
                db,
                event_tx,
                interval,
                shutdown,
                tracked: Mutex::new(HashSet::new()),
                visible: AtomicBool::new(false),
                timer: Mutex::new(None),
            }),
        }
    }

    /// Start reporting progress for a download
    pub async fn track(&self, id: DownloadId) {
        self.inner.tracked.lock().await.insert(id);
        self.update_timer().await;
    }

    /// Stop reporting progress for a download
    pub async fn untrack(&self, id: &DownloadId) {
        self.inner.tracked.lock().await.remove(id);
        self.update_timer().await;
    }

    /// Stop reporting progress for every download
    pub async fn untrack_all(&self) {
        self.inner.tracked.lock().await.clear();
        self.update_timer().await;
    }

    /// Whether a download is tracked
    pub async fn is_tracked(&self, id: &DownloadId) -> bool {
        self.inner.tracked.lock().await.contains(id)
    }

    /// The observing surface became visible or invisible
    pub async fn set_visible(&self, visible: bool) {
        self.inner.visible.store(visible, Ordering::Release);
        self.update_timer().await;
    }

    /// Whether the timer is currently running
    pub async fn is_running(&self) -> bool {
        self.inner.timer.lock().await.is_some()
    }

    /// Run one poll immediately, returning how many records were updated
    pub async fn poll_once(&self) -> Result<usize> {
        self.inner.poll_once().await
    }

    async fn update_timer(&self) {
        let should_run = self.inner.visible.load(Ordering::Acquire)
            && !self.inner.tracked.lock().await.is_empty()
            && !self.inner.shutdown.is_cancelled();

        let mut timer = self.inner.timer.lock().await;
        match (should_run, timer.is_some()) {
            (true, false) => {
                let token = self.inner.shutdown.child_token();
                *timer = Some(token.clone());
                tokio::spawn(run_timer(Arc::clone(&self.inner), token));
                tracing::debug!(
                    interval_secs = self.inner.interval.as_secs(),
                    "Progress polling started"
                );
            }
            (false, true) => {
                if let Some(token) = timer.take() {
                    token.cancel();
                }
                tracing::debug!("Progress polling stopped");
            }
            _ => {}
        }
    }
}

async fn run_timer(inner: Arc<PollerInner>, token: CancellationToken) {
    let mut ticker = tokio::time::interval(inner.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = inner.poll_once().await {
                    tracing::warn!(error = %e, "Progress poll failed");
                }
            }
        }
    }
}

impl PollerInner {
    async fn poll_once(&self) -> Result<usize> {
        let tracked = self.tracked.lock().await.clone();
        if tracked.is_empty() {
            return Ok(0);
        }

        let transfers = self.engine.current_transfers().await?;

        let mut touched_contents = HashSet::new();
        let mut updates = 0;
        for transfer in transfers
            .into_iter()
            .filter(|t| tracked.contains(&t.request_id))
        {
            if !self
                .db
                .update_progress(&transfer.request_id, transfer.percent)
                .await?
            {
                continue;
            }
            let Some(record) = self.db.get_download(&transfer.request_id).await? else {
                continue;
            };

            self.event_tx
                .send(Event::Progress {
                    id: record.download_id.clone(),
                    percent: record.progress,
                })
                .ok();
            touched_contents.insert(record.content_id);
            updates += 1;
        }

        for content_id in touched_contents {
            refresh_marker(&self.db, &content_id).await?;
        }

        tracing::trace!(tracked = tracked.len(), updates, "Progress poll complete");
        Ok(updates)
    }
}

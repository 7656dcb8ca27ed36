//! Queue processor: dispatches CREATED records to the transfer engine.

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::db::DownloadRecord;
use crate::error::Result;
use crate::types::{Connectivity, DownloadId, DownloadState, Event, FailureReason};

use super::Downloader;
use super::marker::refresh_marker;

/// Fallback interval between queue passes when nothing wakes the processor
const QUEUE_POLL_INTERVAL: Duration = Duration::from_secs(5);

impl Downloader {
    /// Start the queue processor task
    ///
    /// The task runs one pass, then sleeps until an enqueue, a settled
    /// transfer or a connectivity change wakes it (or the fallback interval
    /// elapses), until shutdown.
    pub(crate) fn start_queue_processor(&self) -> tokio::task::JoinHandle<()> {
        let downloader = self.clone();

        tokio::spawn(async move {
            loop {
                if let Err(e) = downloader.process_queue_once().await {
                    tracing::error!(error = %e, "Queue pass failed");
                }

                tokio::select! {
                    _ = downloader.dispatch.shutdown.cancelled() => break,
                    _ = downloader.dispatch.wakeup.notified() => {}
                    _ = tokio::time::sleep(QUEUE_POLL_INTERVAL) => {}
                }
            }
            tracing::debug!("Queue processor stopped");
        })
    }

    /// Dispatch CREATED records in enqueue order until the concurrency bound
    ///
    /// Does nothing before the startup reconciliation finished or while the
    /// network does not allow transfers. Returns how many records left
    /// CREATED during this pass.
    pub(crate) async fn process_queue_once(&self) -> Result<usize> {
        if !self.dispatch.reconciled.load(Ordering::SeqCst) {
            tracing::trace!("Reconciliation pending, not dispatching");
            return Ok(0);
        }
        if !self.dispatch_allowed().await {
            tracing::trace!("Network does not allow transfers, not dispatching");
            return Ok(0);
        }

        let _pass = self.dispatch.dispatch_lock.lock().await;
        let max = self.config.download.max_concurrent_downloads;
        let mut dispatched = 0;
        // Records that could not leave CREATED during this pass
        let mut skipped: HashSet<DownloadId> = HashSet::new();

        while !self.dispatch.shutdown.is_cancelled() {
            if self.db.count_in_progress().await? >= max {
                break;
            }
            let Some(record) = self
                .db
                .next_created(skipped.len() + 1)
                .await?
                .into_iter()
                .find(|r| !skipped.contains(&r.download_id))
            else {
                break;
            };

            let id = record.download_id.clone();
            if self.dispatch_record(record).await? {
                dispatched += 1;
            } else {
                skipped.insert(id);
            }
        }

        if dispatched > 0 {
            tracing::debug!(dispatched, "Queue pass finished");
        }
        Ok(dispatched)
    }

    /// Whether the current network allows transfers
    pub(crate) async fn dispatch_allowed(&self) -> bool {
        match *self.dispatch.connectivity.read().await {
            Connectivity::Offline => false,
            Connectivity::Metered => !self.config.download.wifi_only,
            Connectivity::Unmetered => true,
        }
    }

    /// Resolve the media URL of one record and hand it to the engine
    ///
    /// The record leaves CREATED: to IN_PROGRESS when the engine took it, to
    /// FAILED when no URL resolves or the engine refuses it. Returns false when
    /// the record could not be moved at all (removed or changed concurrently);
    /// it is skipped for the rest of the pass.
    async fn dispatch_record(&self, record: DownloadRecord) -> Result<bool> {
        let id = record.download_id.clone();

        let url = match self.resolve_url(&record).await {
            Ok(Some(url)) => url,
            Ok(None) => {
                tracing::warn!(download_id = %id, "No media URL for download");
                return self.fail_record(&record, FailureReason::UrlResolution).await;
            }
            Err(e) => {
                tracing::warn!(download_id = %id, error = %e, "Media URL resolution failed");
                return self.fail_record(&record, FailureReason::UrlResolution).await;
            }
        };

        if let Err(e) = self
            .db
            .transition_state(&id, DownloadState::InProgress)
            .await
        {
            tracing::warn!(download_id = %id, error = %e, "Could not start download, skipping");
            return Ok(false);
        }
        self.db.set_download_url(&id, &url).await?;

        match self.adapter.submit(&id, &url).await {
            Ok(true) => tracing::debug!(download_id = %id, "Download dispatched"),
            Ok(false) => tracing::debug!(download_id = %id, "Download already held by engine"),
            Err(e) => {
                tracing::warn!(download_id = %id, error = %e, "Transfer engine rejected download");
                return self.fail_record(&record, FailureReason::EngineRejected).await;
            }
        }

        self.emit_event(Event::Started { id });
        refresh_marker(&self.db, &record.content_id).await?;
        Ok(true)
    }

    /// Look up the media URL of a record through its content's video id
    ///
    /// Fetches (and caches) the content detail when the cached row carries no
    /// video id.
    pub(crate) async fn resolve_url(&self, record: &DownloadRecord) -> Result<Option<String>> {
        let content_id = record.download_id.as_str();

        let video_id = match self.db.get_content(content_id).await? {
            Some(content) if content.video_id.is_some() => content.video_id,
            _ => {
                let detail = self.gateway.fetch_detail(content_id).await?;
                self.db.upsert_content(&detail.content).await?;
                detail.content.video_id
            }
        };

        match video_id {
            Some(video_id) => self.gateway.resolve_download_url(video_id).await,
            None => Ok(None),
        }
    }

    async fn fail_record(&self, record: &DownloadRecord, reason: FailureReason) -> Result<bool> {
        let id = &record.download_id;
        if let Err(e) = self.db.fail_download(id, reason).await {
            tracing::warn!(download_id = %id, error = %e, "Could not record download failure, skipping");
            return Ok(false);
        }
        self.emit_event(Event::Failed {
            id: id.clone(),
            reason,
        });
        refresh_marker(&self.db, &record.content_id).await?;
        Ok(true)
    }
}

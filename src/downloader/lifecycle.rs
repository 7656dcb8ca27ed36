//! Startup and shutdown coordination, plus the queries the UI reads.

use std::collections::HashSet;
use std::sync::atomic::Ordering;

use crate::aggregate::{DisplayState, aggregate};
use crate::db::DownloadRecord;
use crate::error::Result;
use crate::paging::{ContentMutator, PageLoader};
use crate::types::{Connectivity, ContentFilters, DownloadId, Event};

use super::Downloader;

impl Downloader {
    /// Subscribe to the engine, reconcile, then start dispatching
    ///
    /// The reconciliation runs to completion before the queue processor is
    /// spawned, so no record is dispatched against stale state.
    pub async fn start(&self) -> Result<()> {
        if self.dispatch.reconciled.load(Ordering::SeqCst) {
            tracing::debug!("Download orchestration already started");
            return Ok(());
        }
        tracing::info!("Starting download orchestration");

        self.adapter.start(self.dispatch.shutdown.child_token());

        let demoted = self.reconcile().await?;
        self.dispatch.reconciled.store(true, Ordering::SeqCst);

        self.start_queue_processor();
        tracing::info!(
            demoted = demoted.len(),
            max_concurrent = self.config.download.max_concurrent_downloads,
            "Download orchestration started"
        );
        Ok(())
    }

    /// Stop accepting work and stop every background task
    ///
    /// Transfers keep running in the engine; the next start reconciles with
    /// whatever the engine holds by then.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.dispatch.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new downloads");

        // Stops the queue processor, the engine event loop and the poll timer
        self.dispatch.shutdown.cancel();

        // Wait for an in-flight queue pass to finish its current record
        drop(self.dispatch.dispatch_lock.lock().await);

        self.emit_event(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Forget everything (logout)
    ///
    /// Cancels every outstanding transfer without waiting for the engine and
    /// deletes all cached content, marks and download records.
    pub async fn purge(&self) -> Result<()> {
        let _pass = self.dispatch.dispatch_lock.lock().await;
        self.adapter.cancel_all().await;
        self.db.purge_all().await?;
        tracing::info!("Downloads and cache purged");
        Ok(())
    }

    /// Report the current network state
    ///
    /// Wakes the sequencer when the new state allows transfers.
    pub async fn set_connectivity(&self, connectivity: Connectivity) {
        *self.dispatch.connectivity.write().await = connectivity;
        tracing::debug!(?connectivity, "Connectivity changed");

        if self.dispatch_allowed().await {
            self.dispatch.wakeup.notify_one();
        }
    }

    /// Last reported network state
    pub async fn connectivity(&self) -> Connectivity {
        *self.dispatch.connectivity.read().await
    }

    /// The download progress surface became visible or invisible
    ///
    /// Progress is only polled from the engine while it is visible.
    pub async fn set_progress_visible(&self, visible: bool) {
        self.adapter.poller().set_visible(visible).await;
    }

    /// A download record by id
    pub async fn download(&self, id: &DownloadId) -> Result<Option<DownloadRecord>> {
        self.db.get_download(id).await
    }

    /// Every download record of a content item, marker included
    pub async fn downloads_for(&self, content_id: &str) -> Result<Vec<DownloadRecord>> {
        self.db.list_downloads_for_content(content_id).await
    }

    /// Every download record
    pub async fn all_downloads(&self) -> Result<Vec<DownloadRecord>> {
        self.db.list_downloads().await
    }

    /// Aggregated download state of a content item
    ///
    /// A collection expects one record per episode; any other content expects
    /// its own record.
    pub async fn collection_state(&self, content_id: &str) -> Result<DisplayState> {
        let mut expected: HashSet<DownloadId> = self
            .db
            .episode_ids_for(content_id)
            .await?
            .into_iter()
            .map(DownloadId::from)
            .collect();
        if expected.is_empty() {
            expected.insert(DownloadId::from(content_id));
        }

        let records: Vec<DownloadRecord> = self
            .db
            .list_downloads_for_content(content_id)
            .await?
            .into_iter()
            .filter(|r| !r.is_marker)
            .collect();

        Ok(aggregate(&expected, &records))
    }

    /// A page loader for one catalog surface, sharing this cache and API
    pub fn page_loader(&self, filters: ContentFilters) -> PageLoader {
        PageLoader::new(
            self.db.clone(),
            self.gateway.clone(),
            filters,
            self.config.api.page_size,
        )
    }

    /// Bookmark and progress mutations sharing this cache and API
    pub fn mutator(&self) -> ContentMutator {
        ContentMutator::new(self.db.clone(), self.gateway.clone())
    }
}

//! Enqueueing download records.

use std::sync::atomic::Ordering;

use crate::error::{Error, Result};
use crate::types::{DownloadId, Event};

use super::Downloader;
use super::marker::refresh_marker;

impl Downloader {
    /// Request a download of a content item, or of one episode of a collection
    ///
    /// Persists one CREATED record per expanded id and wakes the sequencer.
    /// Ids that already have a live record are left untouched; FAILED records
    /// are reset so the request retries them. Returns every expanded id.
    ///
    /// # Errors
    ///
    /// - [`Error::ShuttingDown`] after [`shutdown`](Self::shutdown)
    /// - [`Error::Expansion`] when the content detail is unavailable or the
    ///   content cannot be downloaded; nothing is persisted then
    pub async fn enqueue(
        &self,
        content_id: &str,
        episode_id: Option<&str>,
    ) -> Result<Vec<DownloadId>> {
        if !self.dispatch.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let downloads = self.expand(content_id, episode_id).await?;

        let mut created = Vec::new();
        for download in &downloads {
            if self.db.insert_download_if_absent(download).await? {
                created.push(download.download_id.clone());
            }
        }

        if created.is_empty() {
            tracing::debug!(content_id, "Download request already queued");
        } else {
            tracing::info!(content_id, records = created.len(), "Download enqueued");
            self.emit_event(Event::Enqueued {
                content_id: content_id.to_string(),
                download_ids: created,
            });
        }

        refresh_marker(&self.db, content_id).await?;
        self.dispatch.wakeup.notify_one();

        Ok(downloads.into_iter().map(|d| d.download_id).collect())
    }
}

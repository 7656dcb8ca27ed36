//! Download lifecycle control (pause/resume/remove).

use crate::db::DownloadRecord;
use crate::error::{DownloadError, Error, Result};
use crate::types::{DownloadId, DownloadState, Event};

use super::Downloader;
use super::marker::refresh_marker;

impl Downloader {
    /// Pause an in-progress download
    ///
    /// Pausing a collection marker pauses every in-progress episode of the
    /// collection. The freed slot lets the sequencer dispatch the next record.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::NotFound`] if no record exists
    /// - [`DownloadError::InvalidState`] if the record is not IN_PROGRESS
    pub async fn pause(&self, id: &DownloadId) -> Result<()> {
        let record = self.require_download(id).await?;

        if record.is_marker {
            for episode in self.episode_records(&record.content_id).await? {
                if episode.state == DownloadState::InProgress {
                    self.pause_record(&episode).await?;
                }
            }
            return Ok(());
        }

        if record.state != DownloadState::InProgress {
            return Err(DownloadError::InvalidState {
                id: id.to_string(),
                operation: "pause".to_string(),
                current_state: record.state,
            }
            .into());
        }
        self.pause_record(&record).await
    }

    /// Resume a paused download
    ///
    /// The engine resumes the transfer it still holds; when it dropped the
    /// transfer, the stored URL is resubmitted.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::NotFound`] if no record exists
    /// - [`DownloadError::InvalidState`] if the record is not PAUSED
    pub async fn resume(&self, id: &DownloadId) -> Result<()> {
        let record = self.require_download(id).await?;

        if record.is_marker {
            for episode in self.episode_records(&record.content_id).await? {
                if episode.state == DownloadState::Paused {
                    self.resume_record(&episode).await?;
                }
            }
            return Ok(());
        }

        if record.state != DownloadState::Paused {
            return Err(DownloadError::InvalidState {
                id: id.to_string(),
                operation: "resume".to_string(),
                current_state: record.state,
            }
            .into());
        }
        self.resume_record(&record).await
    }

    /// Remove a download record, cancelling its transfer if one is outstanding
    ///
    /// Removing a collection marker removes the whole collection. The engine
    /// cancel is not confirmed; the record is deleted regardless.
    pub async fn remove(&self, id: &DownloadId) -> Result<()> {
        let record = self.require_download(id).await?;

        if record.is_marker {
            self.remove_content(&record.content_id).await?;
            return Ok(());
        }

        self.remove_record(&record).await?;
        refresh_marker(&self.db, &record.content_id).await?;
        self.dispatch.wakeup.notify_one();
        Ok(())
    }

    /// Remove every download record of a content item
    ///
    /// Returns how many records were deleted.
    pub async fn remove_content(&self, content_id: &str) -> Result<usize> {
        let records = self.db.list_downloads_for_content(content_id).await?;
        for record in &records {
            self.remove_record(record).await?;
        }

        if !records.is_empty() {
            tracing::info!(content_id, removed = records.len(), "Downloads removed");
            self.dispatch.wakeup.notify_one();
        }
        Ok(records.len())
    }

    async fn pause_record(&self, record: &DownloadRecord) -> Result<()> {
        let id = &record.download_id;
        self.adapter.pause(id).await?;
        self.db.transition_state(id, DownloadState::Paused).await?;

        tracing::info!(download_id = %id, "Download paused");
        self.emit_event(Event::Paused { id: id.clone() });
        refresh_marker(&self.db, &record.content_id).await?;
        self.dispatch.wakeup.notify_one();
        Ok(())
    }

    async fn resume_record(&self, record: &DownloadRecord) -> Result<()> {
        let id = &record.download_id;
        let url = match &record.url {
            Some(url) => url.clone(),
            None => self
                .resolve_url(record)
                .await?
                .ok_or_else(|| Error::NotFound(format!("media URL for download {}", id)))?,
        };

        self.db
            .transition_state(id, DownloadState::InProgress)
            .await?;
        if let Err(e) = self.adapter.resume_or_resubmit(id, &url).await {
            self.db.transition_state(id, DownloadState::Paused).await?;
            return Err(e);
        }

        tracing::info!(download_id = %id, "Download resumed");
        self.emit_event(Event::Resumed { id: id.clone() });
        refresh_marker(&self.db, &record.content_id).await
    }

    async fn remove_record(&self, record: &DownloadRecord) -> Result<()> {
        let id = &record.download_id;
        let held_by_engine = matches!(
            record.state,
            DownloadState::InProgress | DownloadState::Paused
        ) || self.adapter.is_outstanding(id).await;
        if held_by_engine && !record.is_marker {
            self.adapter.cancel(id).await;
        }

        if self.db.delete_download(id).await? {
            tracing::debug!(download_id = %id, "Download removed");
            self.emit_event(Event::Removed { id: id.clone() });
        }
        Ok(())
    }

    async fn require_download(&self, id: &DownloadId) -> Result<DownloadRecord> {
        self.db
            .get_download(id)
            .await?
            .ok_or_else(|| DownloadError::NotFound { id: id.to_string() }.into())
    }

    async fn episode_records(&self, content_id: &str) -> Result<Vec<DownloadRecord>> {
        Ok(self
            .db
            .list_downloads_for_content(content_id)
            .await?
            .into_iter()
            .filter(|r| !r.is_marker)
            .collect())
    }
}

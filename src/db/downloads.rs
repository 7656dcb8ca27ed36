//! Download record CRUD and guarded state transitions.

use crate::error::{DatabaseError, DownloadError};
use crate::types::{DownloadId, DownloadState, FailureReason};
use crate::{Error, Result};

use super::{Database, DownloadRecord, DownloadRow, NewDownload};

const DOWNLOAD_COLUMNS: &str =
    "download_id, content_id, url, progress, state, failure_reason, is_marker, created_at";

impl Database {
    /// Insert a download record unless a live one already exists
    ///
    /// A FAILED record with the same id is reset to CREATED so that a repeated
    /// request retries it. Returns true when a row was inserted or reset.
    pub async fn insert_download_if_absent(&self, download: &NewDownload) -> Result<bool> {
        let now = chrono::Utc::now().timestamp_millis();

        let result = sqlx::query(
            r#"
            INSERT INTO downloads (
                download_id, content_id, url, progress, state, failure_reason, is_marker, created_at
            ) VALUES (?, ?, NULL, 0, 0, NULL, ?, ?)
            ON CONFLICT(download_id) DO UPDATE SET
                state = 0,
                progress = 0,
                url = NULL,
                failure_reason = NULL,
                created_at = excluded.created_at
            WHERE downloads.state = 4
            "#,
        )
        .bind(&download.download_id)
        .bind(&download.content_id)
        .bind(download.is_marker)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert download: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Get a download record by id
    pub async fn get_download(&self, id: &DownloadId) -> Result<Option<DownloadRecord>> {
        let sql = format!("SELECT {} FROM downloads WHERE download_id = ?", DOWNLOAD_COLUMNS);
        let row = sqlx::query_as::<_, DownloadRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to get download: {}",
                    e
                )))
            })?;

        Ok(row.map(DownloadRecord::from))
    }

    /// List all download records in enqueue order
    pub async fn list_downloads(&self) -> Result<Vec<DownloadRecord>> {
        let sql = format!(
            "SELECT {} FROM downloads ORDER BY created_at ASC, rowid ASC",
            DOWNLOAD_COLUMNS
        );
        let rows = sqlx::query_as::<_, DownloadRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to list downloads: {}",
                    e
                )))
            })?;

        Ok(rows.into_iter().map(DownloadRecord::from).collect())
    }

    /// List download records in a given state, in enqueue order
    pub async fn list_downloads_by_state(
        &self,
        state: DownloadState,
    ) -> Result<Vec<DownloadRecord>> {
        let sql = format!(
            "SELECT {} FROM downloads WHERE state = ? ORDER BY created_at ASC, rowid ASC",
            DOWNLOAD_COLUMNS
        );
        let rows = sqlx::query_as::<_, DownloadRow>(&sql)
            .bind(state.to_i32())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to list downloads by state: {}",
                    e
                )))
            })?;

        Ok(rows.into_iter().map(DownloadRecord::from).collect())
    }

    /// List every record belonging to a content item, marker included
    pub async fn list_downloads_for_content(
        &self,
        content_id: &str,
    ) -> Result<Vec<DownloadRecord>> {
        let sql = format!(
            "SELECT {} FROM downloads WHERE content_id = ? ORDER BY created_at ASC, rowid ASC",
            DOWNLOAD_COLUMNS
        );
        let rows = sqlx::query_as::<_, DownloadRow>(&sql)
            .bind(content_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to list downloads for content: {}",
                    e
                )))
            })?;

        Ok(rows.into_iter().map(DownloadRecord::from).collect())
    }

    /// Count dispatched (IN_PROGRESS) records, markers excluded
    pub async fn count_in_progress(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM downloads WHERE state = 2 AND is_marker = 0",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to count in-progress downloads: {}",
                e
            )))
        })?;

        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Oldest dispatchable CREATED records, markers excluded
    pub async fn next_created(&self, limit: usize) -> Result<Vec<DownloadRecord>> {
        let sql = format!(
            "SELECT {} FROM downloads WHERE state = 0 AND is_marker = 0 \
             ORDER BY created_at ASC, rowid ASC LIMIT ?",
            DOWNLOAD_COLUMNS
        );
        let rows = sqlx::query_as::<_, DownloadRow>(&sql)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to fetch next created downloads: {}",
                    e
                )))
            })?;

        Ok(rows.into_iter().map(DownloadRecord::from).collect())
    }

    /// Move a record along a valid edge of the state machine
    ///
    /// The update is a compare-and-set on the current state, so two racing
    /// writers cannot both apply a transition from the same state.
    pub async fn transition_state(&self, id: &DownloadId, to: DownloadState) -> Result<()> {
        let current = self
            .get_download(id)
            .await?
            .ok_or_else(|| DownloadError::NotFound { id: id.to_string() })?;

        if !current.state.can_transition_to(to) {
            return Err(DownloadError::InvalidTransition {
                id: id.to_string(),
                from: current.state,
                to,
            }
            .into());
        }

        let applied = sqlx::query(
            "UPDATE downloads SET state = ?, failure_reason = NULL WHERE download_id = ? AND state = ?",
        )
        .bind(to.to_i32())
        .bind(id)
        .bind(current.state.to_i32())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update download state: {}",
                e
            )))
        })?
        .rows_affected();

        if applied == 0 {
            // Another writer moved the record between the read and the update
            let now = self
                .get_download(id)
                .await?
                .ok_or_else(|| DownloadError::NotFound { id: id.to_string() })?;
            return Err(DownloadError::InvalidTransition {
                id: id.to_string(),
                from: now.state,
                to,
            }
            .into());
        }

        Ok(())
    }

    /// Mark a record FAILED with a reason
    pub async fn fail_download(&self, id: &DownloadId, reason: FailureReason) -> Result<()> {
        self.transition_state(id, DownloadState::Failed).await?;

        sqlx::query("UPDATE downloads SET failure_reason = ? WHERE download_id = ?")
            .bind(reason.to_i32())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to set failure reason: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Mark a record COMPLETED at 100%
    pub async fn complete_download(&self, id: &DownloadId) -> Result<()> {
        self.transition_state(id, DownloadState::Completed).await?;

        sqlx::query("UPDATE downloads SET progress = 100 WHERE download_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to set final progress: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Persist progress for an IN_PROGRESS record
    ///
    /// Progress never decreases. Returns false when the record is not
    /// IN_PROGRESS (or does not exist) and nothing was written.
    pub async fn update_progress(&self, id: &DownloadId, percent: u8) -> Result<bool> {
        let percent = i64::from(percent.min(100));
        let result = sqlx::query(
            "UPDATE downloads SET progress = MAX(progress, ?) WHERE download_id = ? AND state = 2",
        )
        .bind(percent)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update download progress: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Store the resolved media URL
    pub async fn set_download_url(&self, id: &DownloadId, url: &str) -> Result<()> {
        sqlx::query("UPDATE downloads SET url = ? WHERE download_id = ?")
            .bind(url)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to set download url: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Demote an IN_PROGRESS record back to CREATED
    ///
    /// Only for drift repair, when the engine no longer holds the transfer.
    /// Returns false if the record had already left IN_PROGRESS.
    pub async fn demote_to_created(&self, id: &DownloadId) -> Result<bool> {
        let result =
            sqlx::query("UPDATE downloads SET state = 0 WHERE download_id = ? AND state = 2")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to demote download: {}",
                        e
                    )))
                })?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a download record
    pub async fn delete_download(&self, id: &DownloadId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM downloads WHERE download_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete download: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }
}

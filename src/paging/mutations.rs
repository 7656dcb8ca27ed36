//! Local mutations (bookmark and completion toggles).
//!
//! Each mutation holds the surface's [`BoundaryNotifier`] for its whole
//! duration, so boundary loads defer to it and restart from the first page
//! once it finishes.

use std::sync::Arc;

use super::notifier::BoundaryNotifier;
use crate::db::{Database, Progression};
use crate::error::Error;
use crate::remote::ContentGateway;
use crate::Result;

/// Applies user toggles remotely, then to the cache
#[derive(Clone)]
pub struct ContentMutator {
    db: Arc<Database>,
    gateway: Arc<dyn ContentGateway>,
}

impl ContentMutator {
    /// Create a mutator
    pub fn new(db: Arc<Database>, gateway: Arc<dyn ContentGateway>) -> Self {
        Self { db, gateway }
    }

    /// Bookmark or un-bookmark a content item
    ///
    /// Returns whether the content is bookmarked afterwards. On a remote
    /// failure the cache is left unchanged and the error is returned.
    pub async fn toggle_bookmark(
        &self,
        content_id: &str,
        notifier: &BoundaryNotifier,
    ) -> Result<bool> {
        let _mutation = notifier.begin_mutation();

        match self.db.get_bookmark(content_id).await? {
            Some(bookmark) => {
                self.gateway.delete_bookmark(&bookmark.id).await?;
                self.db.delete_bookmark(content_id).await?;
                tracing::debug!(content_id, "Bookmark removed");
                Ok(false)
            }
            None => {
                let bookmark = self.gateway.create_bookmark(content_id).await?;
                self.db.upsert_bookmark(&bookmark).await?;
                tracing::debug!(content_id, bookmark_id = %bookmark.id, "Bookmark added");
                Ok(true)
            }
        }
    }

    /// Mark a content item watched, or clear a finished progression
    ///
    /// Returns whether the content is finished afterwards.
    pub async fn toggle_completion(
        &self,
        content_id: &str,
        notifier: &BoundaryNotifier,
    ) -> Result<bool> {
        let _mutation = notifier.begin_mutation();

        match self.db.get_progression(content_id).await? {
            Some(progression) if progression.finished => {
                self.gateway.delete_progression(&progression.id).await?;
                self.db.delete_progression(content_id).await?;
                tracing::debug!(content_id, "Progression cleared");
                Ok(false)
            }
            _ => {
                let duration = self
                    .db
                    .get_content(content_id)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("content {}", content_id)))?
                    .duration_secs;
                let progression = self
                    .gateway
                    .update_progression(content_id, duration, true)
                    .await?;
                self.db.upsert_progression(&progression).await?;
                tracing::debug!(content_id, "Marked as finished");
                Ok(true)
            }
        }
    }

    /// Record watch progress in seconds
    pub async fn update_progress(
        &self,
        content_id: &str,
        progress_secs: i64,
        notifier: &BoundaryNotifier,
    ) -> Result<Progression> {
        let _mutation = notifier.begin_mutation();

        let progression = self
            .gateway
            .update_progression(content_id, progress_secs.max(0), false)
            .await?;
        self.db.upsert_progression(&progression).await?;
        Ok(progression)
    }
}

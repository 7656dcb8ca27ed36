//! Download request expansion.

use crate::db::{Content, NewDownload};
use crate::error::{ExpansionError, Result};
use crate::types::{ContentType, DownloadId};

use super::Downloader;

impl Downloader {
    /// Expand a download request into the records to persist
    ///
    /// - content without episodes → the content id alone
    /// - an explicit episode of a collection → that episode alone
    /// - a whole collection → every episode plus a marker keyed by the
    ///   collection id
    ///
    /// Content detail is fetched (and cached) only when it is not cached yet.
    /// Nothing is written to the download table here.
    pub(crate) async fn expand(
        &self,
        content_id: &str,
        episode_id: Option<&str>,
    ) -> Result<Vec<NewDownload>> {
        let (content, episodes) = self.load_layout(content_id).await?;

        if content.kind().is_none() {
            return Err(ExpansionError::UnrecognizedType {
                content_id: content_id.to_string(),
                content_type: content.content_type,
            }
            .into());
        }

        let single = |id: &str, is_marker: bool| NewDownload {
            download_id: DownloadId::from(id),
            content_id: content_id.to_string(),
            is_marker,
        };

        if episodes.is_empty() {
            return Ok(vec![single(content_id, false)]);
        }

        if let Some(episode_id) = episode_id {
            if !episodes.iter().any(|e| e == episode_id) {
                return Err(ExpansionError::UnknownEpisode {
                    content_id: content_id.to_string(),
                    episode_id: episode_id.to_string(),
                }
                .into());
            }
            return Ok(vec![single(episode_id, false)]);
        }

        let mut downloads: Vec<NewDownload> =
            episodes.iter().map(|id| single(id, false)).collect();
        downloads.push(single(content_id, true));
        tracing::debug!(
            content_id,
            episodes = episodes.len(),
            "Expanded full collection request"
        );
        Ok(downloads)
    }

    /// The content and its episode ids, from the cache or the API
    async fn load_layout(&self, content_id: &str) -> Result<(Content, Vec<String>)> {
        if let Some(content) = self.db.get_content(content_id).await? {
            match content.kind() {
                Some(ContentType::Collection) => {
                    if self.db.has_groups(content_id).await? {
                        let episodes = self.db.episode_ids_for(content_id).await?;
                        return Ok((content, episodes));
                    }
                }
                Some(_) => return Ok((content, Vec::new())),
                None => {}
            }
        }

        let detail = self.gateway.fetch_detail(content_id).await.map_err(|e| {
            tracing::warn!(content_id, error = %e, "Content detail unavailable");
            ExpansionError::DetailUnavailable {
                content_id: content_id.to_string(),
                reason: e.to_string(),
            }
        })?;

        self.db.upsert_content(&detail.content).await?;
        if !detail.groups.is_empty() {
            self.db.upsert_groups(content_id, &detail.groups).await?;
        }

        let episodes = detail.episodes().map(|e| e.id.clone()).collect();
        Ok((detail.content, episodes))
    }
}

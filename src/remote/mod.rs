//! Remote content gateway
//!
//! [`ContentGateway`] is the seam between the core and the content API. The
//! page loader, the request expander and the sequencer only talk to this
//! trait; [`HttpContentGateway`] is the production implementation.

use async_trait::async_trait;

use crate::Result;
use crate::db::{Bookmark, Content, Group, Progression};
use crate::types::ContentFilters;

mod http;

pub use http::HttpContentGateway;

/// One page of catalog results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Items on this page, in server order
    pub items: Vec<Content>,
    /// Next page number, None when this was the last page
    pub next_page_number: Option<u32>,
}

/// Content detail including the collection layout
#[derive(Debug, Clone, PartialEq)]
pub struct ContentDetail {
    /// The content itself
    pub content: Content,
    /// Groups of episodes (empty for single-unit content)
    pub groups: Vec<Group>,
}

impl ContentDetail {
    /// Whether the content is playable on its own
    pub fn has_episodes(&self) -> bool {
        self.groups.iter().any(|g| !g.episodes.is_empty())
    }

    /// Episodes across all groups in play order
    pub fn episodes(&self) -> impl Iterator<Item = &Content> {
        self.groups.iter().flat_map(|g| g.episodes.iter())
    }
}

/// Access to the content API
#[async_trait]
pub trait ContentGateway: Send + Sync {
    /// Fetch one page of the catalog (page 0 is the first page)
    async fn fetch_page(
        &self,
        page_number: u32,
        page_size: u32,
        filters: &ContentFilters,
    ) -> Result<Page>;

    /// Fetch a content item with its groups and episodes
    async fn fetch_detail(&self, content_id: &str) -> Result<ContentDetail>;

    /// Resolve the media URL for a video, None when no rendition is available
    async fn resolve_download_url(&self, video_id: i64) -> Result<Option<String>>;

    /// Bookmark a content item
    async fn create_bookmark(&self, content_id: &str) -> Result<Bookmark>;

    /// Remove a bookmark by its server id
    async fn delete_bookmark(&self, bookmark_id: &str) -> Result<()>;

    /// Create or update watch progress for a content item
    async fn update_progression(
        &self,
        content_id: &str,
        progress: i64,
        finished: bool,
    ) -> Result<Progression>;

    /// Remove a progression by its server id
    async fn delete_progression(&self, progression_id: &str) -> Result<()>;
}

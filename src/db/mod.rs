//! Local cache for offline-catalog
//!
//! SQLite persistence for content, bookmarks, progressions, collection groups
//! and download records.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`contents`] - Content upserts and filtered catalog queries
//! - [`groups`] - Collection groups and their episodes
//! - [`marks`] - Bookmarks and progressions
//! - [`downloads`] - Download records and guarded state transitions
//!
//! Writes of server-owned rows follow an ignore-then-update policy: the row is
//! inserted with `INSERT OR IGNORE`, and if that hit a uniqueness constraint the
//! existing row is updated in place.

use crate::types::{ContentType, DownloadId, DownloadState, FailureReason};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, sqlite::SqlitePool};

mod contents;
mod downloads;
mod groups;
mod marks;
mod migrations;

/// Content attributes as delivered by the content API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    /// Stable content id
    pub id: String,
    /// Raw type tag ("screencast", "collection", "episode", ...)
    pub content_type: String,
    /// Display name
    pub name: String,
    /// Long description
    pub description: Option<String>,
    /// Duration in seconds
    pub duration_secs: i64,
    /// Artwork URL
    pub card_artwork_url: Option<String>,
    /// Technology tags
    pub technologies: Vec<String>,
    /// Difficulty level
    pub difficulty: Option<String>,
    /// Unix timestamp of release
    pub released_at: i64,
    /// Popularity score used for sorting
    pub popularity: f64,
    /// Video identifier used to resolve download URLs (None for collections)
    pub video_id: Option<i64>,
}

impl Content {
    /// Parsed type tag, None when the tag is not recognized
    pub fn kind(&self) -> Option<ContentType> {
        ContentType::parse(&self.content_type)
    }
}

/// Content row from database
#[derive(Debug, Clone, FromRow)]
pub(crate) struct ContentRow {
    pub id: String,
    pub content_type: String,
    pub name: String,
    pub description: Option<String>,
    pub duration: i64,
    pub card_artwork_url: Option<String>,
    pub technologies: String,
    pub difficulty: Option<String>,
    pub released_at: i64,
    pub popularity: f64,
    pub video_id: Option<i64>,
}

impl From<ContentRow> for Content {
    fn from(row: ContentRow) -> Self {
        Content {
            id: row.id,
            content_type: row.content_type,
            name: row.name,
            description: row.description,
            duration_secs: row.duration,
            card_artwork_url: row.card_artwork_url,
            technologies: split_tags(&row.technologies),
            difficulty: row.difficulty,
            released_at: row.released_at,
            popularity: row.popularity,
            video_id: row.video_id,
        }
    }
}

/// Watch progress for a content item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Progression {
    /// Server-side progression id
    pub id: String,
    /// Content this progression belongs to
    pub content_id: String,
    /// Seconds watched
    pub progress: i64,
    /// Whether the content was watched to the end
    pub finished: bool,
}

/// Bookmark on a content item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Bookmark {
    /// Server-side bookmark id
    pub id: String,
    /// Bookmarked content
    pub content_id: String,
}

/// Download state attached to a content row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadSummary {
    /// Persisted state of the record keyed by the content id
    pub state: DownloadState,
    /// Progress percentage (0-100)
    pub progress: u8,
}

/// Content merged with the locally cached user state
#[derive(Debug, Clone, PartialEq)]
pub struct ContentRecord {
    /// Content attributes
    pub content: Content,
    /// Bookmark id when bookmarked
    pub bookmark_id: Option<String>,
    /// Watch progress
    pub progression: Option<Progression>,
    /// Download record keyed by this content id
    pub download: Option<DownloadSummary>,
}

/// Flattened join row for [`ContentRecord`]
#[derive(Debug, Clone, FromRow)]
pub(crate) struct ContentRecordRow {
    #[sqlx(flatten)]
    pub content: ContentRow,
    pub bookmark_id: Option<String>,
    pub progression_id: Option<String>,
    pub progression_progress: Option<i64>,
    pub progression_finished: Option<bool>,
    pub download_state: Option<i32>,
    pub download_progress: Option<i64>,
}

impl From<ContentRecordRow> for ContentRecord {
    fn from(row: ContentRecordRow) -> Self {
        let content_id = row.content.id.clone();
        let progression = row.progression_id.map(|id| Progression {
            id,
            content_id,
            progress: row.progression_progress.unwrap_or(0),
            finished: row.progression_finished.unwrap_or(false),
        });
        let download = row.download_state.map(|state| DownloadSummary {
            state: DownloadState::from_i32(state),
            progress: clamp_percent(row.download_progress.unwrap_or(0)),
        });
        ContentRecord {
            content: row.content.into(),
            bookmark_id: row.bookmark_id,
            progression,
            download,
        }
    }
}

/// A named group of episodes inside a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    /// Group id
    pub id: String,
    /// Parent collection id
    pub content_id: String,
    /// Display name
    pub name: String,
    /// Position inside the collection
    pub ordinal: i64,
    /// Episodes in play order
    pub episodes: Vec<Content>,
}

/// New download record to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewDownload {
    /// Episode id, or content id for single-unit content
    pub download_id: DownloadId,
    /// Parent content id
    pub content_id: String,
    /// True for the parent marker of a full-collection request
    pub is_marker: bool,
}

/// Download record from database
#[derive(Debug, Clone, FromRow)]
pub struct DownloadRow {
    /// Episode id, or content id for single-unit content
    pub download_id: DownloadId,
    /// Parent content id
    pub content_id: String,
    /// Resolved media URL
    pub url: Option<String>,
    /// Progress percentage (0-100)
    pub progress: i64,
    /// State code (see [`DownloadState`])
    pub state: i32,
    /// Failure reason code (see [`FailureReason`])
    pub failure_reason: Option<i32>,
    /// Parent marker of a full-collection request (0 = no, 1 = yes)
    pub is_marker: bool,
    /// Unix timestamp when the record was created
    pub created_at: i64,
}

/// A persisted download record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRecord {
    /// Episode id, or content id for single-unit content
    pub download_id: DownloadId,
    /// Parent content id
    pub content_id: String,
    /// Resolved media URL (None until resolved)
    pub url: Option<String>,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Current state
    pub state: DownloadState,
    /// Why the record failed
    pub failure_reason: Option<FailureReason>,
    /// Parent marker of a full-collection request
    pub is_marker: bool,
    /// Unix timestamp when the record was created
    pub created_at: i64,
}

impl From<DownloadRow> for DownloadRecord {
    fn from(row: DownloadRow) -> Self {
        DownloadRecord {
            download_id: row.download_id,
            content_id: row.content_id,
            url: row.url,
            progress: clamp_percent(row.progress),
            state: DownloadState::from_i32(row.state),
            failure_reason: row.failure_reason.map(FailureReason::from_i32),
            is_marker: row.is_marker,
            created_at: row.created_at,
        }
    }
}

/// Database handle for offline-catalog
pub struct Database {
    pool: SqlitePool,
}

pub(crate) fn join_tags(tags: &[String]) -> String {
    tags.join(",")
}

fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn clamp_percent(value: i64) -> u8 {
    value.clamp(0, 100) as u8
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

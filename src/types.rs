//! Core types for offline-catalog

use serde::{Deserialize, Serialize};

/// Identifier of a download record
///
/// Equal to the episode id, or to the content id when the content has no
/// episodes. Also used verbatim as the transfer engine request id.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownloadId(pub String);

impl DownloadId {
    /// Create a new DownloadId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DownloadId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DownloadId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl PartialEq<&str> for DownloadId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl std::fmt::Display for DownloadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::borrow::Borrow<str> for DownloadId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for DownloadId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <String as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for DownloadId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for DownloadId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <String as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Persisted state of a download record
///
/// Valid edges:
///
/// ```text
/// Created    -> InProgress | Failed
/// InProgress -> Completed | Failed | Paused
/// Paused     -> InProgress
/// ```
///
/// Completed and Failed records only leave their state by deletion. The one
/// extra edge, InProgress -> Created, is reserved for the reconciliation sweep
/// and is not reachable through [`DownloadState::can_transition_to`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    /// Persisted, waiting for URL resolution and dispatch
    Created,
    /// Paused by the user
    Paused,
    /// Submitted to the transfer engine
    InProgress,
    /// Transfer finished
    Completed,
    /// URL resolution or transfer failed
    Failed,
}

impl DownloadState {
    /// Convert integer state code to DownloadState
    pub fn from_i32(state: i32) -> Self {
        match state {
            0 => DownloadState::Created,
            1 => DownloadState::Paused,
            2 => DownloadState::InProgress,
            3 => DownloadState::Completed,
            4 => DownloadState::Failed,
            _ => DownloadState::Failed, // Default to Failed for unknown state
        }
    }

    /// Convert DownloadState to integer state code
    pub fn to_i32(self) -> i32 {
        match self {
            DownloadState::Created => 0,
            DownloadState::Paused => 1,
            DownloadState::InProgress => 2,
            DownloadState::Completed => 3,
            DownloadState::Failed => 4,
        }
    }

    /// Whether the state can only be left by deleting the record
    pub fn is_terminal(self) -> bool {
        matches!(self, DownloadState::Completed | DownloadState::Failed)
    }

    /// Whether `next` is a valid edge from this state
    pub fn can_transition_to(self, next: DownloadState) -> bool {
        use DownloadState::*;
        matches!(
            (self, next),
            (Created, InProgress)
                | (Created, Failed)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, Paused)
                | (Paused, InProgress)
        )
    }
}

/// Reason code stored on a failed download record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Unclassified failure
    Unknown,
    /// No media URL could be resolved for the record
    UrlResolution,
    /// The transfer engine refused the submit
    EngineRejected,
    /// The transfer engine reported the transfer as failed
    TransferFailed,
}

impl FailureReason {
    /// Convert integer reason code to FailureReason
    pub fn from_i32(code: i32) -> Self {
        match code {
            1 => FailureReason::UrlResolution,
            2 => FailureReason::EngineRejected,
            3 => FailureReason::TransferFailed,
            _ => FailureReason::Unknown,
        }
    }

    /// Convert FailureReason to integer reason code
    pub fn to_i32(self) -> i32 {
        match self {
            FailureReason::Unknown => 0,
            FailureReason::UrlResolution => 1,
            FailureReason::EngineRejected => 2,
            FailureReason::TransferFailed => 3,
        }
    }
}

/// Type tag of a content item
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// A single playable video
    Screencast,
    /// A multi-episode course
    Collection,
    /// One video inside a collection
    Episode,
}

impl ContentType {
    /// Parse the API/database tag, returning None for unrecognized tags
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "screencast" => Some(ContentType::Screencast),
            "collection" => Some(ContentType::Collection),
            "episode" => Some(ContentType::Episode),
            _ => None,
        }
    }

    /// The API/database tag
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Screencast => "screencast",
            ContentType::Collection => "collection",
            ContentType::Episode => "episode",
        }
    }
}

/// Network availability as reported by the host platform
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    /// No network
    Offline,
    /// Cellular or otherwise metered network
    Metered,
    /// Wi-Fi or otherwise unmetered network
    #[default]
    Unmetered,
}

/// Catalog sort order
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Most recently released first
    #[default]
    Newest,
    /// Most popular first
    Popularity,
}

/// Filters applied to a paginated catalog surface
///
/// The same value drives the remote page request and the local cache query,
/// so both sides agree on which rows belong to the surface.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentFilters {
    /// Restrict to these content types (empty = screencasts and collections)
    #[serde(default)]
    pub content_types: Vec<ContentType>,
    /// Technology tags; a row matches if it carries any of them
    #[serde(default)]
    pub technologies: Vec<String>,
    /// Difficulty levels ("beginner", "intermediate", "advanced")
    #[serde(default)]
    pub difficulties: Vec<String>,
    /// Case-insensitive substring match on the name
    #[serde(default)]
    pub search: Option<String>,
    /// Only bookmarked content
    #[serde(default)]
    pub bookmarked_only: bool,
    /// Only content with a download record
    #[serde(default)]
    pub downloaded_only: bool,
    /// Only content with an unfinished progression
    #[serde(default)]
    pub in_progress_only: bool,
    /// Only content with a finished progression
    #[serde(default)]
    pub completed_only: bool,
    /// Sort order
    #[serde(default)]
    pub sort: SortOrder,
}

/// Event emitted by the download orchestration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Download records were persisted for a content item
    Enqueued {
        /// Parent content id
        content_id: String,
        /// Expanded download ids
        download_ids: Vec<DownloadId>,
    },

    /// A record was submitted to (or started by) the transfer engine
    Started {
        /// Download id
        id: DownloadId,
    },

    /// Progress pulled from the transfer engine
    Progress {
        /// Download id
        id: DownloadId,
        /// Progress percentage (0 to 100)
        percent: u8,
    },

    /// Transfer finished
    Completed {
        /// Download id
        id: DownloadId,
    },

    /// URL resolution or transfer failed
    Failed {
        /// Download id
        id: DownloadId,
        /// Failure reason code
        reason: FailureReason,
    },

    /// Download paused by the user
    Paused {
        /// Download id
        id: DownloadId,
    },

    /// Download resumed by the user
    Resumed {
        /// Download id
        id: DownloadId,
    },

    /// Download record deleted
    Removed {
        /// Download id
        id: DownloadId,
    },

    /// Startup reconciliation finished
    Reconciled {
        /// Records demoted from InProgress back to Created
        demoted: Vec<DownloadId>,
    },

    /// Orchestration shutting down
    Shutdown,
}

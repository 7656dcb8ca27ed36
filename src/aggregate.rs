//! Collection download state derived from its episode records.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::db::DownloadRecord;
use crate::types::{DownloadId, DownloadState};

/// Download status shown for a content item
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    /// Some expected record is missing; nothing is shown as downloaded
    NotDownloaded,
    /// Waiting for dispatch
    Created,
    /// At least one record is transferring
    InProgress,
    /// Paused by the user
    Paused,
    /// Every record finished
    Completed,
    /// At least one record failed
    Failed,
}

impl From<DownloadState> for DisplayStatus {
    fn from(state: DownloadState) -> Self {
        match state {
            DownloadState::Created => DisplayStatus::Created,
            DownloadState::Paused => DisplayStatus::Paused,
            DownloadState::InProgress => DisplayStatus::InProgress,
            DownloadState::Completed => DisplayStatus::Completed,
            DownloadState::Failed => DisplayStatus::Failed,
        }
    }
}

/// Status and progress shown for a content item
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayState {
    /// Aggregated status
    pub status: DisplayStatus,
    /// Mean progress percentage (0 to 100)
    pub progress: u8,
}

impl DisplayState {
    /// The sentinel for partial or missing local state
    pub const NOT_DOWNLOADED: DisplayState = DisplayState {
        status: DisplayStatus::NotDownloaded,
        progress: 0,
    };
}

/// Rank of a non-completed state; the highest rank present wins
fn severity(state: DownloadState) -> u8 {
    match state {
        DownloadState::Completed => 0,
        DownloadState::Created => 1,
        DownloadState::Paused => 2,
        DownloadState::InProgress => 3,
        DownloadState::Failed => 4,
    }
}

/// Aggregate the records of the expected download ids
///
/// Records whose id is not expected are ignored. If any expected id has no
/// record the result is [`DisplayState::NOT_DOWNLOADED`]: partial local state
/// is never averaged. Otherwise the status is `Completed` only when every
/// record completed, else the most severe remaining state under
/// `Failed > InProgress > Paused > Created`. Progress is the floored mean
/// across the records.
pub fn aggregate(expected: &HashSet<DownloadId>, records: &[DownloadRecord]) -> DisplayState {
    let relevant: Vec<&DownloadRecord> = records
        .iter()
        .filter(|r| expected.contains(&r.download_id))
        .collect();

    let covered: HashSet<&DownloadId> = relevant.iter().map(|r| &r.download_id).collect();
    if expected.is_empty() || covered.len() < expected.len() {
        return DisplayState::NOT_DOWNLOADED;
    }

    let worst = relevant
        .iter()
        .map(|r| r.state)
        .max_by_key(|state| severity(*state))
        .unwrap_or(DownloadState::Completed);

    let total: u32 = relevant.iter().map(|r| u32::from(r.progress)).sum();
    let progress = (total / relevant.len() as u32).min(100) as u8;

    DisplayState {
        status: worst.into(),
        progress,
    }
}

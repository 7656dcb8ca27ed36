//! Derived state of a full-collection marker record.
//!
//! The marker is never dispatched. After every change to one of its episodes
//! the marker's state is re-derived from the episode records and walked there
//! through the guarded transitions, one valid edge at a time. A marker left
//! IN_PROGRESS while its episodes fell back to CREATED takes the same drift
//! edge as its episodes.

use std::collections::{HashSet, VecDeque};

use crate::aggregate::{DisplayStatus, aggregate};
use crate::db::{Database, DownloadRecord};
use crate::error::{DownloadError, Error};
use crate::types::{DownloadId, DownloadState};
use crate::Result;

const STATES: [DownloadState; 5] = [
    DownloadState::Created,
    DownloadState::Paused,
    DownloadState::InProgress,
    DownloadState::Completed,
    DownloadState::Failed,
];

/// Re-derive the marker of `content_id`, if it has one
pub(crate) async fn refresh_marker(db: &Database, content_id: &str) -> Result<()> {
    let records = db.list_downloads_for_content(content_id).await?;
    let Some(marker) = records.iter().find(|r| r.is_marker) else {
        return Ok(());
    };

    let expected: HashSet<DownloadId> = db
        .episode_ids_for(content_id)
        .await?
        .into_iter()
        .map(DownloadId::from)
        .collect();
    let episodes: Vec<DownloadRecord> = records.iter().filter(|r| !r.is_marker).cloned().collect();
    let display = aggregate(&expected, &episodes);

    let target = match display.status {
        DisplayStatus::NotDownloaded | DisplayStatus::Created => DownloadState::Created,
        DisplayStatus::InProgress => DownloadState::InProgress,
        DisplayStatus::Paused => DownloadState::Paused,
        DisplayStatus::Completed => DownloadState::Completed,
        DisplayStatus::Failed => DownloadState::Failed,
    };

    let id = &marker.download_id;
    if marker.state == DownloadState::InProgress && target == DownloadState::Created {
        if db.demote_to_created(id).await? {
            tracing::debug!(download_id = %id, "Marker demoted with its episodes");
        }
        return Ok(());
    }

    if marker.state != target {
        let Some(path) = route(marker.state, target) else {
            tracing::debug!(
                download_id = %id,
                from = ?marker.state,
                to = ?target,
                "Marker state has no route, leaving it"
            );
            return Ok(());
        };

        for step in path {
            let applied = match step {
                DownloadState::Completed => db.complete_download(id).await,
                _ => db.transition_state(id, step).await,
            };
            match applied {
                Ok(()) => {}
                // A concurrent refresh got there first
                Err(Error::Download(DownloadError::InvalidTransition { .. })) => {
                    tracing::debug!(download_id = %id, "Marker moved concurrently");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    }

    if target == DownloadState::InProgress {
        db.update_progress(id, display.progress).await?;
    }
    Ok(())
}

/// Shortest sequence of valid edges from `from` to `to`
fn route(from: DownloadState, to: DownloadState) -> Option<Vec<DownloadState>> {
    let mut queue = VecDeque::from([(from, Vec::new())]);
    let mut visited = HashSet::from([from]);

    while let Some((state, path)) = queue.pop_front() {
        if state == to {
            return Some(path);
        }
        for next in STATES {
            if state.can_transition_to(next) && visited.insert(next) {
                let mut extended = path.clone();
                extended.push(next);
                queue.push_back((next, extended));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_walks_through_in_progress() {
        assert_eq!(
            route(DownloadState::Created, DownloadState::Completed),
            Some(vec![DownloadState::InProgress, DownloadState::Completed])
        );
        assert_eq!(
            route(DownloadState::Paused, DownloadState::Failed),
            Some(vec![DownloadState::InProgress, DownloadState::Failed])
        );
    }

    #[test]
    fn test_route_never_reaches_created() {
        assert_eq!(route(DownloadState::InProgress, DownloadState::Created), None);
        assert_eq!(route(DownloadState::Completed, DownloadState::InProgress), None);
    }

    #[test]
    fn test_route_to_self_is_empty() {
        assert_eq!(
            route(DownloadState::Paused, DownloadState::Paused),
            Some(Vec::new())
        );
    }
}

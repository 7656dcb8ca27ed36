//! Startup reconciliation of persisted state against the engine.

use std::collections::{HashMap, HashSet};

use crate::engine::TransferState;
use crate::error::Result;
use crate::types::{DownloadId, DownloadState, Event};

use super::Downloader;
use super::marker::refresh_marker;

impl Downloader {
    /// Repair drift between IN_PROGRESS records and the engine's transfers
    ///
    /// Runs before the sequencer may dispatch anything. Records the engine no
    /// longer holds are demoted to CREATED so the sequencer re-resolves and
    /// resubmits them. Records whose transfer is still running are adopted
    /// without resubmission; records whose transfer finished while the process
    /// was dead are settled as COMPLETED or FAILED. Transfers the engine holds
    /// without a matching record are left alone.
    ///
    /// Returns the demoted ids.
    pub(crate) async fn reconcile(&self) -> Result<Vec<DownloadId>> {
        let in_progress: Vec<_> = self
            .db
            .list_downloads_by_state(DownloadState::InProgress)
            .await?
            .into_iter()
            .filter(|r| !r.is_marker)
            .collect();

        // Resubmission is idempotent per request id, so an unreachable engine
        // is treated as holding nothing
        let engine_held: HashMap<DownloadId, TransferState> =
            match self.adapter.current_transfers().await {
                Ok(transfers) => transfers
                    .into_iter()
                    .filter(|t| t.state != TransferState::Removed)
                    .map(|t| (t.request_id, t.state))
                    .collect(),
                Err(e) => {
                    tracing::warn!(error = %e, "Could not query engine transfers during reconciliation");
                    HashMap::new()
                }
            };

        let mut demoted = Vec::new();
        let mut settled = 0usize;
        let mut touched_contents = HashSet::new();
        for record in in_progress {
            let id = record.download_id;
            match engine_held.get(&id) {
                Some(state) if state.is_live() => {
                    self.adapter.adopt(&id).await;
                    tracing::debug!(download_id = %id, "Adopted live transfer");
                }
                Some(state) => {
                    self.adapter.settle_finished(&id, *state).await?;
                    tracing::debug!(download_id = %id, state = ?state, "Settled transfer finished while stopped");
                    settled += 1;
                }
                None => {
                    if self.db.demote_to_created(&id).await? {
                        tracing::debug!(download_id = %id, "Demoted orphaned download");
                        touched_contents.insert(record.content_id);
                        demoted.push(id);
                    }
                }
            }
        }

        for content_id in &touched_contents {
            refresh_marker(&self.db, content_id).await?;
        }

        tracing::info!(
            demoted = demoted.len(),
            settled,
            engine_held = engine_held.len(),
            "Reconciliation complete"
        );
        self.emit_event(Event::Reconciled {
            demoted: demoted.clone(),
        });
        Ok(demoted)
    }
}

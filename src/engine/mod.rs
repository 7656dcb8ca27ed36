//! Transfer engine integration
//!
//! The host platform owns a long-running media download engine that outlives
//! this process. [`TransferEngine`] is the contract the host implements for
//! it; everything else in this module wraps that contract:
//!
//! - [`adapter`] - [`TransferEngineAdapter`]: single engine subscription,
//!   duplicate-free dispatch, event-to-record mapping
//! - [`observers`] - per-download fan-out of engine events
//! - [`progress`] - [`ProgressPoller`]: pulled progress while a surface is visible

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::Result;
use crate::types::DownloadId;

pub mod adapter;
pub mod observers;
pub mod progress;

pub use adapter::TransferEngineAdapter;
pub use observers::ObserverRegistry;
pub use progress::ProgressPoller;

/// State of a transfer as reported by the engine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    /// Accepted, waiting for the engine to start it
    Queued,
    /// Bytes are moving
    Downloading,
    /// Restarted by the engine (network change, process restart)
    Restarting,
    /// Paused in the engine
    Paused,
    /// Finished
    Completed,
    /// Gave up
    Failed,
    /// Dropped from the engine
    Removed,
}

impl TransferState {
    /// Whether the engine still holds the transfer
    pub fn is_live(self) -> bool {
        matches!(
            self,
            TransferState::Queued
                | TransferState::Downloading
                | TransferState::Restarting
                | TransferState::Paused
        )
    }
}

/// A transfer to start, keyed by the download id
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferRequest {
    /// Stable request id (the download id)
    pub id: DownloadId,
    /// Media URL
    pub url: String,
}

/// A transfer currently held by the engine
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transfer {
    /// Request id
    pub request_id: DownloadId,
    /// Progress percentage (0 to 100)
    pub percent: u8,
    /// Engine state
    pub state: TransferState,
}

/// State change pushed by the engine
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferEvent {
    /// Request id
    pub request_id: DownloadId,
    /// New engine state
    pub state: TransferState,
}

/// Receives engine events
///
/// Called from the engine's own thread; implementations must not block.
pub trait TransferListener: Send + Sync {
    /// Handle one state change
    fn on_event(&self, event: TransferEvent);
}

/// The host's media download engine
///
/// Submitting a request id the engine already holds must not start a second
/// transfer.
#[async_trait]
pub trait TransferEngine: Send + Sync {
    /// Start a transfer
    async fn submit(&self, request: TransferRequest) -> Result<()>;

    /// Stop and drop a transfer
    async fn cancel(&self, id: &DownloadId) -> Result<()>;

    /// Pause a transfer
    async fn pause(&self, id: &DownloadId) -> Result<()>;

    /// Resume a paused transfer, returning false if the engine no longer holds it
    async fn resume(&self, id: &DownloadId) -> Result<bool>;

    /// Transfers the engine currently holds
    async fn current_transfers(&self) -> Result<Vec<Transfer>>;

    /// Install the engine's single global listener, replacing any previous one
    fn set_listener(&self, listener: Arc<dyn TransferListener>);
}

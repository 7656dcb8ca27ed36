//! Download orchestration split into focused submodules.
//!
//! The `Downloader` struct and its methods are organized by domain:
//! - [`expander`] - Download request expansion into concrete ids
//! - [`queue`] - Enqueueing download records
//! - [`queue_processor`] - The sequencer dispatching records to the engine
//! - [`control`] - Pause, resume and remove
//! - [`reconcile`] - Startup reconciliation against the engine
//! - [`lifecycle`] - Startup, shutdown, purge and UI queries
//! - [`marker`] - Derived state of full-collection marker records

mod control;
mod expander;
mod lifecycle;
pub(crate) mod marker;
mod queue;
mod queue_processor;
mod reconcile;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tokio::sync::{Mutex, Notify, RwLock, broadcast};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db::Database;
use crate::engine::{ProgressPoller, TransferEngine, TransferEngineAdapter};
use crate::error::Result;
use crate::remote::ContentGateway;
use crate::types::{Connectivity, Event};

/// Sequencer gating and wakeup state
#[derive(Clone)]
pub(crate) struct DispatchState {
    /// Wakes the sequencer after an enqueue or a freed slot
    pub(crate) wakeup: Arc<Notify>,
    /// Last network state reported by the host
    pub(crate) connectivity: Arc<RwLock<Connectivity>>,
    /// Set once the startup reconciliation finished; nothing dispatches before
    pub(crate) reconciled: Arc<AtomicBool>,
    /// Flag to indicate whether new downloads are accepted (false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Cancelled on shutdown; background tasks hold child tokens
    pub(crate) shutdown: CancellationToken,
    /// Serializes sequencer passes
    pub(crate) dispatch_lock: Arc<Mutex<()>>,
}

/// Main download orchestrator (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct Downloader {
    /// Local cache, shared with the page loaders of the host's surfaces
    pub db: Arc<Database>,
    /// Content API
    pub(crate) gateway: Arc<dyn ContentGateway>,
    /// The single subscription to the transfer engine
    pub(crate) adapter: TransferEngineAdapter,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Configuration
    pub(crate) config: Arc<Config>,
    /// Sequencer state
    pub(crate) dispatch: DispatchState,
}

impl Downloader {
    /// Create a downloader
    ///
    /// Validates the configuration and opens (or creates) the local cache.
    /// Nothing is dispatched until [`start`](Self::start) has reconciled the
    /// cache with the engine.
    pub async fn new(
        config: Config,
        gateway: Arc<dyn ContentGateway>,
        engine: Arc<dyn TransferEngine>,
    ) -> Result<Self> {
        config.validate()?;
        let db = Database::new(&config.persistence.database_path).await?;
        Ok(Self::with_database(config, Arc::new(db), gateway, engine))
    }

    /// Create a downloader over an already opened cache
    pub fn with_database(
        config: Config,
        db: Arc<Database>,
        gateway: Arc<dyn ContentGateway>,
        engine: Arc<dyn TransferEngine>,
    ) -> Self {
        let (event_tx, _rx) = broadcast::channel(config.download.event_buffer.max(1));
        let shutdown = CancellationToken::new();
        let wakeup = Arc::new(Notify::new());

        let poller = ProgressPoller::new(
            Arc::clone(&engine),
            Arc::clone(&db),
            event_tx.clone(),
            config.download.progress_poll_interval,
            shutdown.clone(),
        );
        let adapter = TransferEngineAdapter::new(
            engine,
            Arc::clone(&db),
            event_tx.clone(),
            poller,
            Arc::clone(&wakeup),
        );

        Self {
            db,
            gateway,
            adapter,
            event_tx,
            config: Arc::new(config),
            dispatch: DispatchState {
                wakeup,
                connectivity: Arc::new(RwLock::new(Connectivity::default())),
                reconciled: Arc::new(AtomicBool::new(false)),
                accepting_new: Arc::new(AtomicBool::new(true)),
                shutdown,
                dispatch_lock: Arc::new(Mutex::new(())),
            },
        }
    }

    /// Subscribe to download events
    ///
    /// Each subscriber receives every event emitted after subscribing. A
    /// subscriber that falls behind by more than `event_buffer` events gets
    /// `RecvError::Lagged` and skips ahead.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Having no subscribers is fine; the event is dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// The configuration this downloader runs with
    pub fn config(&self) -> &Config {
        &self.config
    }
}

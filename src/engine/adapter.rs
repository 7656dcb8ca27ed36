//! The single subscription to the transfer engine.
//!
//! The engine has one global listener slot and outlives this process, so the
//! adapter is the only component talking to it. It keeps the set of request
//! ids it has outstanding so a record is never submitted twice, maps engine
//! events onto download records, and fans events out to per-download
//! observers.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, Notify, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{
    ObserverRegistry, ProgressPoller, Transfer, TransferEngine, TransferEvent, TransferListener,
    TransferRequest, TransferState,
};
use crate::Result;
use crate::db::Database;
use crate::downloader::marker::refresh_marker;
use crate::types::{DownloadId, DownloadState, Event, FailureReason};

/// Forwards engine callbacks into the adapter's event loop
///
/// The engine calls listeners from its own thread, so the callback only
/// enqueues and never touches the database.
struct ChannelListener {
    tx: mpsc::UnboundedSender<TransferEvent>,
}

impl TransferListener for ChannelListener {
    fn on_event(&self, event: TransferEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Engine event dropped, adapter loop has stopped");
        }
    }
}

/// How a transfer ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Outcome {
    Completed,
    Failed,
}

struct AdapterInner {
    engine: Arc<dyn TransferEngine>,
    db: Arc<Database>,
    event_tx: broadcast::Sender<Event>,
    poller: ProgressPoller,
    observers: ObserverRegistry,
    /// Request ids submitted to (or adopted from) the engine and not yet settled
    outstanding: Mutex<HashSet<DownloadId>>,
    /// Signalled whenever a transfer settles and a slot frees up
    wakeup: Arc<Notify>,
    subscribed: AtomicBool,
}

/// Wraps the host's [`TransferEngine`]
#[derive(Clone)]
pub struct TransferEngineAdapter {
    inner: Arc<AdapterInner>,
}

impl TransferEngineAdapter {
    /// Create an adapter; nothing is subscribed until [`start`](Self::start)
    pub fn new(
        engine: Arc<dyn TransferEngine>,
        db: Arc<Database>,
        event_tx: broadcast::Sender<Event>,
        poller: ProgressPoller,
        wakeup: Arc<Notify>,
    ) -> Self {
        Self {
            inner: Arc::new(AdapterInner {
                engine,
                db,
                event_tx,
                poller,
                observers: ObserverRegistry::new(),
                outstanding: Mutex::new(HashSet::new()),
                wakeup,
                subscribed: AtomicBool::new(false),
            }),
        }
    }

    /// Install the engine listener and spawn the event loop
    ///
    /// Subscribes at most once per adapter; later calls return None. Events
    /// are handled one at a time in arrival order.
    pub fn start(&self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        if self.inner.subscribed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Transfer engine already subscribed");
            return None;
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        self.inner
            .engine
            .set_listener(Arc::new(ChannelListener { tx }));
        tracing::debug!("Subscribed to transfer engine events");

        let adapter = self.clone();
        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("Transfer event loop stopped");
                        break;
                    }
                    event = rx.recv() => {
                        let Some(event) = event else { break };
                        if let Err(e) = adapter.handle_event(event.clone()).await {
                            tracing::warn!(
                                download_id = %event.request_id,
                                state = ?event.state,
                                error = %e,
                                "Failed to apply transfer event"
                            );
                        }
                    }
                }
            }
        }))
    }

    /// Submit a transfer unless the request id is already outstanding
    ///
    /// Returns false for a duplicate; the engine is not called in that case.
    pub async fn submit(&self, id: &DownloadId, url: &str) -> Result<bool> {
        if !self.inner.outstanding.lock().await.insert(id.clone()) {
            tracing::debug!(download_id = %id, "Transfer already outstanding, not resubmitting");
            return Ok(false);
        }

        let request = TransferRequest {
            id: id.clone(),
            url: url.to_string(),
        };
        if let Err(e) = self.inner.engine.submit(request).await {
            self.inner.outstanding.lock().await.remove(id);
            return Err(e);
        }

        self.inner.poller.track(id.clone()).await;
        tracing::debug!(download_id = %id, "Transfer submitted");
        Ok(true)
    }

    /// Claim a transfer the engine already holds without resubmitting it
    pub async fn adopt(&self, id: &DownloadId) {
        self.inner.outstanding.lock().await.insert(id.clone());
        self.inner.poller.track(id.clone()).await;
    }

    /// Pause a transfer in the engine
    pub async fn pause(&self, id: &DownloadId) -> Result<()> {
        self.inner.engine.pause(id).await?;
        self.inner.poller.untrack(id).await;
        Ok(())
    }

    /// Resume a transfer, resubmitting it if the engine dropped it
    pub async fn resume_or_resubmit(&self, id: &DownloadId, url: &str) -> Result<()> {
        if self.inner.engine.resume(id).await? {
            self.adopt(id).await;
            return Ok(());
        }

        tracing::debug!(download_id = %id, "Engine no longer holds transfer, resubmitting");
        self.inner.outstanding.lock().await.remove(id);
        self.submit(id, url).await?;
        Ok(())
    }

    /// Drop a transfer
    ///
    /// The engine's answer is not awaited by callers: a failed cancel is
    /// logged, and local bookkeeping is cleared either way.
    pub async fn cancel(&self, id: &DownloadId) {
        self.forget(id).await;
        if let Err(e) = self.inner.engine.cancel(id).await {
            tracing::warn!(download_id = %id, error = %e, "Transfer cancel failed");
        }
    }

    /// Drop every outstanding transfer
    pub async fn cancel_all(&self) {
        let ids: Vec<DownloadId> = self.inner.outstanding.lock().await.drain().collect();
        futures::future::join_all(ids.iter().map(|id| self.cancel(id))).await;
        self.inner.poller.untrack_all().await;
    }

    /// Whether a request id is outstanding
    pub async fn is_outstanding(&self, id: &DownloadId) -> bool {
        self.inner.outstanding.lock().await.contains(id)
    }

    /// Transfers the engine currently holds
    pub async fn current_transfers(&self) -> Result<Vec<Transfer>> {
        self.inner.engine.current_transfers().await
    }

    /// Observe the engine events of one download
    pub fn observe(&self, id: DownloadId) -> mpsc::UnboundedReceiver<TransferEvent> {
        self.inner.observers.register(id)
    }

    /// The progress poller fed by this adapter
    pub fn poller(&self) -> &ProgressPoller {
        &self.inner.poller
    }

    /// Apply one engine event to the local records
    pub(crate) async fn handle_event(&self, event: TransferEvent) -> Result<()> {
        self.inner.observers.dispatch(&event);

        match event.state {
            TransferState::Downloading | TransferState::Restarting => {
                if !self.is_outstanding(&event.request_id).await {
                    self.on_engine_started(&event.request_id).await?;
                }
                Ok(())
            }
            TransferState::Completed => self.settle(&event.request_id, Outcome::Completed).await,
            TransferState::Failed => self.settle(&event.request_id, Outcome::Failed).await,
            TransferState::Removed => self.on_engine_removed(&event.request_id).await,
            TransferState::Queued | TransferState::Paused => Ok(()),
        }
    }

    /// The engine started (or restarted) a transfer this adapter did not submit
    async fn on_engine_started(&self, id: &DownloadId) -> Result<()> {
        let Some(record) = self.inner.db.get_download(id).await? else {
            tracing::debug!(download_id = %id, "Engine started unknown transfer, ignoring");
            return Ok(());
        };
        if !record.state.can_transition_to(DownloadState::InProgress) {
            if record.state == DownloadState::InProgress {
                self.adopt(id).await;
            }
            return Ok(());
        }

        self.inner
            .db
            .transition_state(id, DownloadState::InProgress)
            .await?;
        self.adopt(id).await;
        self.inner
            .event_tx
            .send(Event::Started { id: id.clone() })
            .ok();
        tracing::info!(download_id = %id, "Engine started transfer");

        refresh_marker(&self.inner.db, &record.content_id).await
    }

    /// Settle a record whose transfer the engine reports as finished
    ///
    /// Used when a finished transfer is discovered by query rather than by
    /// event. Non-final engine states are ignored.
    pub(crate) async fn settle_finished(&self, id: &DownloadId, state: TransferState) -> Result<()> {
        match state {
            TransferState::Completed => self.settle(id, Outcome::Completed).await,
            TransferState::Failed => self.settle(id, Outcome::Failed).await,
            _ => Ok(()),
        }
    }

    /// The engine dropped a transfer on its own
    ///
    /// A record still IN_PROGRESS goes back to CREATED so the sequencer can
    /// resubmit it, and its slot is freed.
    async fn on_engine_removed(&self, id: &DownloadId) -> Result<()> {
        self.forget(id).await;

        let Some(record) = self.inner.db.get_download(id).await? else {
            return Ok(());
        };
        if record.is_marker || !self.inner.db.demote_to_created(id).await? {
            return Ok(());
        }
        tracing::info!(download_id = %id, "Engine dropped transfer, requeued");

        refresh_marker(&self.inner.db, &record.content_id).await?;
        self.inner.wakeup.notify_one();
        Ok(())
    }

    async fn settle(&self, id: &DownloadId, outcome: Outcome) -> Result<()> {
        let Some(record) = self.inner.db.get_download(id).await? else {
            self.forget(id).await;
            return Ok(());
        };
        if record.state.is_terminal() {
            tracing::debug!(download_id = %id, state = ?record.state, "Ignoring repeated terminal event");
            self.forget(id).await;
            return Ok(());
        }

        let needs_dispatch_edge = match outcome {
            Outcome::Completed => record.state != DownloadState::InProgress,
            Outcome::Failed => record.state == DownloadState::Paused,
        };
        if needs_dispatch_edge {
            self.inner
                .db
                .transition_state(id, DownloadState::InProgress)
                .await?;
        }

        let event = match outcome {
            Outcome::Completed => {
                self.inner.db.complete_download(id).await?;
                tracing::info!(download_id = %id, "Transfer completed");
                Event::Completed { id: id.clone() }
            }
            Outcome::Failed => {
                self.inner
                    .db
                    .fail_download(id, FailureReason::TransferFailed)
                    .await?;
                tracing::warn!(download_id = %id, "Transfer failed");
                Event::Failed {
                    id: id.clone(),
                    reason: FailureReason::TransferFailed,
                }
            }
        };
        self.inner.event_tx.send(event).ok();

        self.forget(id).await;
        refresh_marker(&self.inner.db, &record.content_id).await?;
        self.inner.wakeup.notify_one();
        Ok(())
    }

    async fn forget(&self, id: &DownloadId) {
        self.inner.outstanding.lock().await.remove(id);
        self.inner.poller.untrack(id).await;
        self.inner.observers.remove(id);
    }
}

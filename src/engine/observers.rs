//! Per-download fan-out of engine events.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;

use super::TransferEvent;
use crate::types::DownloadId;

/// Observers keyed by request id
///
/// The engine has one global listener slot; the adapter owns it and hands
/// each event to the observers registered for that request id.
#[derive(Debug, Default)]
pub struct ObserverRegistry {
    observers: Mutex<HashMap<DownloadId, Vec<mpsc::UnboundedSender<TransferEvent>>>>,
}

impl ObserverRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe events for one request id
    ///
    /// The receiver yields every later event for `id` and closes when the
    /// transfer settles or is removed.
    pub fn register(&self, id: DownloadId) -> mpsc::UnboundedReceiver<TransferEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut observers = self.observers.lock().unwrap_or_else(|e| e.into_inner());
        observers.entry(id).or_default().push(tx);
        rx
    }

    /// Deliver an event to the observers of its request id
    ///
    /// Returns how many observers received it. Observers whose receiver was
    /// dropped are pruned.
    pub fn dispatch(&self, event: &TransferEvent) -> usize {
        let mut observers = self.observers.lock().unwrap_or_else(|e| e.into_inner());
        let Some(senders) = observers.get_mut(&event.request_id) else {
            return 0;
        };

        senders.retain(|tx| tx.send(event.clone()).is_ok());
        let delivered = senders.len();
        if senders.is_empty() {
            observers.remove(&event.request_id);
        }
        delivered
    }

    /// Drop all observers of a request id, closing their receivers
    pub fn remove(&self, id: &DownloadId) {
        let mut observers = self.observers.lock().unwrap_or_else(|e| e.into_inner());
        observers.remove(id);
    }

    /// Number of request ids with at least one observer
    pub fn len(&self) -> usize {
        self.observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Whether no request id is observed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

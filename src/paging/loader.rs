//! Boundary-driven page loader.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, watch};
use tokio_stream::wrappers::WatchStream;

use super::notifier::BoundaryNotifier;
use super::ui_state::{LoadEvent, UiState};
use crate::Result;
use crate::db::{ContentRecord, Database};
use crate::remote::{ContentGateway, Page};
use crate::types::ContentFilters;

/// Which boundary callback triggered a load
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Boundary {
    ZeroItems,
    ItemAtEnd,
}

/// The last failed fetch, replayed by [`PageLoader::retry_all_failed`]
#[derive(Clone, Copy, Debug)]
struct FailedFetch {
    page: u32,
    started: LoadEvent,
}

struct LoaderInner {
    db: Arc<Database>,
    gateway: Arc<dyn ContentGateway>,
    notifier: Arc<BoundaryNotifier>,
    filters: ContentFilters,
    page_size: u32,
    /// `None` once the server reported the last page
    cursor: Mutex<Option<u32>>,
    running: AtomicBool,
    failed: Mutex<Option<FailedFetch>>,
    state: watch::Sender<UiState>,
}

/// Clears the running flag when the load finishes, whatever path it takes
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Pages one filtered catalog surface from the content API into the cache
///
/// The host's paging primitive calls [`on_zero_items_loaded`](Self::on_zero_items_loaded)
/// when the cached query is empty and [`on_item_at_end_loaded`](Self::on_item_at_end_loaded)
/// when the last cached row becomes visible. At most one fetch runs at a time;
/// a callback arriving while one is running is ignored.
///
/// Progress is reported as a [`UiState`] through [`subscribe`](Self::subscribe).
#[derive(Clone)]
pub struct PageLoader {
    inner: Arc<LoaderInner>,
}

impl PageLoader {
    /// Create a loader for one surface
    pub fn new(
        db: Arc<Database>,
        gateway: Arc<dyn ContentGateway>,
        filters: ContentFilters,
        page_size: u32,
    ) -> Self {
        let (state, _) = watch::channel(UiState::default());
        Self {
            inner: Arc::new(LoaderInner {
                db,
                gateway,
                notifier: Arc::new(BoundaryNotifier::new()),
                filters,
                page_size: page_size.max(1),
                cursor: Mutex::new(Some(0)),
                running: AtomicBool::new(false),
                failed: Mutex::new(None),
                state,
            }),
        }
    }

    /// Notifier to pass to local mutations on this surface
    pub fn notifier(&self) -> Arc<BoundaryNotifier> {
        Arc::clone(&self.inner.notifier)
    }

    /// Filters of this surface
    pub fn filters(&self) -> &ContentFilters {
        &self.inner.filters
    }

    /// Current UiState
    pub fn state(&self) -> UiState {
        *self.inner.state.borrow()
    }

    /// Watch the UiState
    pub fn subscribe(&self) -> watch::Receiver<UiState> {
        self.inner.state.subscribe()
    }

    /// UiState as a stream, starting with the current value
    pub fn ui_states(&self) -> WatchStream<UiState> {
        WatchStream::new(self.subscribe())
    }

    /// Next page to request, `None` at end of list
    pub async fn cursor(&self) -> Option<u32> {
        *self.inner.cursor.lock().await
    }

    /// Whether a failed fetch is waiting for [`retry_all_failed`](Self::retry_all_failed)
    pub async fn has_failed_fetch(&self) -> bool {
        self.inner.failed.lock().await.is_some()
    }

    /// The cached query for this surface returned no rows
    pub async fn on_zero_items_loaded(&self) {
        self.boundary(Boundary::ZeroItems).await;
    }

    /// The last cached row of this surface became visible
    pub async fn on_item_at_end_loaded(&self, item: &ContentRecord) {
        tracing::trace!(content_id = %item.content.id, "End of list reached");
        self.boundary(Boundary::ItemAtEnd).await;
    }

    /// Replay the last failed fetch once
    ///
    /// No-op when nothing failed or a fetch is already running.
    pub async fn retry_all_failed(&self) {
        let Some(_running) = self.try_start() else {
            return;
        };
        let Some(failed) = self.inner.failed.lock().await.take() else {
            return;
        };

        tracing::debug!(page = failed.page, "Retrying failed page fetch");
        self.fetch(failed.page, failed.started).await;
    }

    /// The host reported loss of connectivity
    pub fn connection_lost(&self) {
        self.emit(LoadEvent::ConnectionLost);
    }

    /// Reload the surface from the first page
    pub async fn refresh(&self) {
        self.inner.notifier.request_reset();
        self.boundary(Boundary::ZeroItems).await;
    }

    fn try_start(&self) -> Option<RunningGuard<'_>> {
        self.inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunningGuard(&self.inner.running))
    }

    async fn boundary(&self, boundary: Boundary) {
        let Some(_running) = self.try_start() else {
            tracing::trace!(?boundary, "Fetch already running, ignoring boundary callback");
            return;
        };

        // Defer to the mutation; its decrement will force a reset next time
        if self.inner.notifier.has_in_flight_mutations() {
            self.emit(LoadEvent::DeferredToMutation);
            return;
        }

        let page = {
            let mut cursor = self.inner.cursor.lock().await;
            if self.inner.notifier.consume_pending_reset() {
                tracing::debug!("Pending reset consumed, restarting from first page");
                *cursor = Some(0);
            }
            match boundary {
                Boundary::ZeroItems => 0,
                Boundary::ItemAtEnd => match *cursor {
                    Some(page) => page,
                    None => return,
                },
            }
        };

        let started = match boundary {
            Boundary::ZeroItems => LoadEvent::FirstPageStarted,
            Boundary::ItemAtEnd => LoadEvent::AppendStarted,
        };
        self.fetch(page, started).await;
    }

    async fn fetch(&self, page: u32, started: LoadEvent) {
        self.emit(started);
        let first_page = page == 0;

        match self.load_page(page).await {
            Ok(loaded) => {
                *self.inner.cursor.lock().await = loaded.next_page_number;
                *self.inner.failed.lock().await = None;

                if first_page {
                    self.emit(LoadEvent::FirstPageLoaded {
                        empty: loaded.items.is_empty(),
                    });
                } else {
                    self.emit(LoadEvent::AppendLoaded);
                }
            }
            Err(e) => {
                tracing::warn!(page, error = %e, "Page fetch failed");
                *self.inner.failed.lock().await = Some(FailedFetch { page, started });

                if first_page {
                    let cached_rows = self.has_cached_rows().await;
                    self.emit(LoadEvent::FirstPageFailed { cached_rows });
                } else {
                    self.emit(LoadEvent::AppendFailed);
                }
            }
        }
    }

    async fn load_page(&self, page: u32) -> Result<Page> {
        let loaded = self
            .inner
            .gateway
            .fetch_page(page, self.inner.page_size, &self.inner.filters)
            .await?;
        self.inner.db.upsert_contents(&loaded.items).await?;
        Ok(loaded)
    }

    async fn has_cached_rows(&self) -> bool {
        match self.inner.db.count_contents(&self.inner.filters).await {
            Ok(count) => count > 0,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to count cached rows");
                false
            }
        }
    }

    fn emit(&self, event: LoadEvent) {
        self.inner.state.send_modify(|state| {
            let next = state.on(event);
            tracing::debug!(from = ?*state, to = ?next, ?event, "UiState transition");
            *state = next;
        });
    }
}

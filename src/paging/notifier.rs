//! Coordination between local mutations and boundary loads.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Snapshot of a [`BoundaryNotifier`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoundaryState {
    /// Local mutations (bookmark/progress toggles) still running
    pub in_flight_mutation_count: usize,
    /// Set by every finished mutation; consumed by the next boundary load
    pub pending_page_reset: bool,
}

/// Mutation counter and page-reset flag shared by one paginated surface
///
/// The counter only moves through paired [`increment`](Self::increment) /
/// [`decrement`](Self::decrement) calls. Every decrement raises the reset
/// flag; the next boundary load consumes it exactly once, however many
/// decrements happened in between.
#[derive(Debug, Default)]
pub struct BoundaryNotifier {
    in_flight: AtomicUsize,
    pending_reset: AtomicBool,
}

impl BoundaryNotifier {
    /// Create a notifier with no mutations in flight
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start of a local mutation
    pub fn increment(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    /// Record the end of a local mutation and request a page reset
    pub fn decrement(&self) {
        // The closure always returns Some, so the update cannot fail
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_sub(1))
            })
            .ok();
        self.pending_reset.store(true, Ordering::Release);
    }

    /// Start a mutation that ends when the returned guard is dropped
    pub fn begin_mutation(&self) -> MutationGuard<'_> {
        self.increment();
        MutationGuard { notifier: self }
    }

    /// Whether any mutation is still running
    pub fn has_in_flight_mutations(&self) -> bool {
        self.in_flight.load(Ordering::Acquire) > 0
    }

    /// Take the reset flag, returning whether it was set
    pub fn consume_pending_reset(&self) -> bool {
        self.pending_reset.swap(false, Ordering::AcqRel)
    }

    /// Request a reset without a mutation (pull-to-refresh)
    pub fn request_reset(&self) {
        self.pending_reset.store(true, Ordering::Release);
    }

    /// Current counter and flag
    pub fn snapshot(&self) -> BoundaryState {
        BoundaryState {
            in_flight_mutation_count: self.in_flight.load(Ordering::Acquire),
            pending_page_reset: self.pending_reset.load(Ordering::Acquire),
        }
    }
}

/// Ends a mutation on drop, including on early return or error
#[derive(Debug)]
pub struct MutationGuard<'a> {
    notifier: &'a BoundaryNotifier,
}

impl Drop for MutationGuard<'_> {
    fn drop(&mut self) {
        self.notifier.decrement();
    }
}

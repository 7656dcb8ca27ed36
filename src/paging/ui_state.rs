//! UiState machine of a paginated surface.
//!
//! The transition table is pure: [`UiState::on`] maps the current state and
//! a [`LoadEvent`] to the next state. The loader drives it; tests drive it
//! directly.

use serde::{Deserialize, Serialize};

/// Load state of one paginated surface
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UiState {
    /// First page in flight, nothing cached yet
    #[default]
    Init,
    /// First page cached
    InitLoaded,
    /// First page confirmed empty
    InitEmpty,
    /// First page failed and the cache is empty
    InitFailed,
    /// Append in flight
    Loading,
    /// Append succeeded (or deferred to a local mutation)
    Loaded,
    /// Append failed; cached rows are still shown
    Error,
    /// Caller reported no connectivity before fetching
    ErrorConnection,
}

/// Input to the [`UiState`] machine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadEvent {
    /// A first-page fetch was issued
    FirstPageStarted,
    /// An append fetch was issued
    AppendStarted,
    /// A boundary load was skipped because a local mutation is in flight
    DeferredToMutation,
    /// The first page arrived and was cached
    FirstPageLoaded {
        /// Whether the page had no items
        empty: bool,
    },
    /// The first page failed
    FirstPageFailed {
        /// Whether the cache already holds rows for this surface
        cached_rows: bool,
    },
    /// An append arrived (possibly empty at end of list)
    AppendLoaded,
    /// An append failed
    AppendFailed,
    /// No connectivity
    ConnectionLost,
}

impl UiState {
    /// Next state after `event`
    ///
    /// Every state is re-enterable, so the event alone decides the target.
    pub fn on(self, event: LoadEvent) -> UiState {
        match event {
            LoadEvent::FirstPageStarted => UiState::Init,
            LoadEvent::AppendStarted => UiState::Loading,
            LoadEvent::DeferredToMutation => UiState::Loaded,
            LoadEvent::FirstPageLoaded { empty: false } => UiState::InitLoaded,
            LoadEvent::FirstPageLoaded { empty: true } => UiState::InitEmpty,
            // Cache supersedes a network failure for the first page only
            LoadEvent::FirstPageFailed { cached_rows: true } => UiState::InitLoaded,
            LoadEvent::FirstPageFailed { cached_rows: false } => UiState::InitFailed,
            LoadEvent::AppendLoaded => UiState::Loaded,
            LoadEvent::AppendFailed => UiState::Error,
            LoadEvent::ConnectionLost => UiState::ErrorConnection,
        }
    }

    /// States reached by a first-page fetch
    pub fn is_initial(self) -> bool {
        matches!(
            self,
            UiState::Init | UiState::InitLoaded | UiState::InitEmpty | UiState::InitFailed
        )
    }

    /// Whether a fetch is in flight
    pub fn is_loading(self) -> bool {
        matches!(self, UiState::Init | UiState::Loading)
    }

    /// Whether the surface shows a failure the user can retry
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            UiState::InitFailed | UiState::Error | UiState::ErrorConnection
        )
    }
}

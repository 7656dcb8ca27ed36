//! Paged content synchronization
//!
//! - [`notifier`] - mutation counter and page-reset flag shared by a surface
//! - [`ui_state`] - the pure UiState transition table
//! - [`loader`] - boundary callbacks driving remote page fetches into the cache
//! - [`mutations`] - bookmark/progress toggles coordinated through the notifier

pub mod loader;
pub mod mutations;
pub mod notifier;
pub mod ui_state;

pub use loader::PageLoader;
pub use mutations::ContentMutator;
pub use notifier::{BoundaryNotifier, BoundaryState, MutationGuard};
pub use ui_state::{LoadEvent, UiState};

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

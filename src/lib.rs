//! # offline-catalog
//!
//! Catalog synchronization and offline download orchestration for a video
//! content client.
//!
//! ## Design Philosophy
//!
//! offline-catalog is designed to be:
//! - **Cache-first** - Every surface reads the local cache; the network only fills it
//! - **Engine-agnostic** - The platform transfer engine is a trait the host implements
//! - **Crash-tolerant** - Records are reconciled with the engine on every start
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use offline_catalog::{Config, Downloader, HttpContentGateway, TransferEngine};
//! # fn platform_engine() -> Arc<dyn TransferEngine> { unimplemented!() }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let gateway = Arc::new(HttpContentGateway::new(config.api.clone())?);
//!     let downloader = Downloader::new(config, gateway, platform_engine()).await?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     downloader.start().await?;
//!     downloader.enqueue("collection-42", None).await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Collection display state aggregation
pub mod aggregate;
/// Configuration types
pub mod config;
/// Local cache persistence layer
pub mod db;
/// Download orchestration
pub mod downloader;
/// Transfer engine contract and adapter
pub mod engine;
/// Error types
pub mod error;
/// Boundary-driven paging and content mutations
pub mod paging;
/// Content API gateway
pub mod remote;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;

pub use aggregate::{DisplayState, DisplayStatus, aggregate};
pub use config::{ApiConfig, Config, DownloadConfig, PersistenceConfig, RetryConfig};
pub use db::{ContentRecord, Database, DownloadRecord};
pub use downloader::Downloader;
pub use engine::{
    Transfer, TransferEngine, TransferEngineAdapter, TransferEvent, TransferListener,
    TransferRequest, TransferState,
};
pub use error::{DatabaseError, DownloadError, Error, ExpansionError, Result};
pub use paging::{BoundaryNotifier, ContentMutator, PageLoader, UiState};
pub use remote::{ContentDetail, ContentGateway, HttpContentGateway, Page};
pub use types::{
    Connectivity, ContentFilters, ContentType, DownloadId, DownloadState, Event, FailureReason,
    SortOrder,
};

/// Run the downloader until a termination signal arrives, then shut it down
///
/// For hosts that run the orchestrator as a long-lived process. Listens for
/// SIGTERM and SIGINT on unix, Ctrl+C elsewhere.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use offline_catalog::{Config, Downloader, HttpContentGateway, TransferEngine, run_with_shutdown};
/// # fn platform_engine() -> Arc<dyn TransferEngine> { unimplemented!() }
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let gateway = Arc::new(HttpContentGateway::new(config.api.clone())?);
///     let downloader = Downloader::new(config, gateway, platform_engine()).await?;
///     downloader.start().await?;
///
///     run_with_shutdown(downloader).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: Downloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Handlers can fail to register in restricted environments
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal"),
            }
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}

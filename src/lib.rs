//! # splash-dl
//!
//! Idempotent mirror for splash/wallpaper image listings.
//!
//! ## Design Philosophy
//!
//! splash-dl is designed to be:
//! - **Idempotent** - A URL is fetched at most once across runs, and identical content is stored once
//! - **Tolerant** - Several listing endpoints and several response layouts are accepted
//! - **Library-first** - No CLI, argument parsing or log formatting; embed it and drive it
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Pipeline
//!
//! A run asks the [`EndpointResolver`](resolver::EndpointResolver) for a listing, which tries
//! candidate endpoints until one [normalizes](normalizer::normalize). Each descriptor is then
//! handed to the [`AssetFetcher`](fetcher::AssetFetcher), which consults the
//! [URL ledger](ledger::UrlLedger), downloads with bounded retries, and stores the bytes under
//! their SHA-256 digest unless that digest is already in the [store](store::AssetStore).
//!
//! ## Quick Start
//!
//! ```no_run
//! use splash_dl::{Config, RunCoordinator};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.download.output_dir = PathBuf::from("splash");
//!     config.download.ledger_path = PathBuf::from("splash_urls.txt");
//!
//!     let coordinator = RunCoordinator::new(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = coordinator.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let report = coordinator.run().await;
//!     std::process::exit(report.status.exit_code());
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// HTTP client construction
pub mod client;
/// Configuration types
pub mod config;
/// Run orchestration (decomposed into focused submodules)
pub mod coordinator;
/// Error types
pub mod error;
/// Asset download and store-vs-skip decisions
pub mod fetcher;
/// Append-only URL ledger
pub mod ledger;
/// Listing response normalization
pub mod normalizer;
/// Listing endpoint selection and fallback
pub mod resolver;
/// Retry logic with exponential backoff
pub mod retry;
/// Content-addressed output directory
pub mod store;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{
    ApiConfig, Config, DelayWindow, DownloadConfig, EndpointConfig, HttpConfig, RetryConfig,
};
pub use coordinator::RunCoordinator;
pub use error::{Error, ErrorKind, Result};
pub use types::{
    AssetDescriptor, AssetFailure, AssetMetadata, Event, FetchOutcome, LedgerEntry, RunMetadata,
    RunReport, RunStatus, SkipReason,
};

/// Run once with graceful signal handling.
///
/// Races the run against a termination signal. On a signal the run's cancellation token
/// is triggered; in-flight fetches stop at their next suspension point and the run still
/// returns a complete report (marked `cancelled`).
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use splash_dl::{Config, RunCoordinator, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let coordinator = RunCoordinator::new(Config::default()).await?;
///
///     // Run with automatic signal handling
///     let report = run_with_shutdown(&coordinator).await;
///     std::process::exit(report.status.exit_code());
/// }
/// ```
pub async fn run_with_shutdown(coordinator: &RunCoordinator) -> RunReport {
    let run = coordinator.run();
    tokio::pin!(run);

    tokio::select! {
        report = &mut run => return report,
        _ = wait_for_signal() => {
            if let Err(e) = coordinator.shutdown().await {
                tracing::warn!(error = %e, "Shutdown reported an error");
            }
        }
    }
    run.await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}

//! Construction, shutdown and the run deadline.

use super::{EVENT_CHANNEL_CAPACITY, RunCoordinator};
use crate::client::build_client;
use crate::config::Config;
use crate::error::Result;
use crate::fetcher::AssetFetcher;
use crate::ledger::UrlLedger;
use crate::resolver::EndpointResolver;
use crate::store::AssetStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

impl RunCoordinator {
    /// Create a coordinator from a configuration
    ///
    /// Validates the configuration, builds the HTTP client, creates the output directory,
    /// removes staging files left by an interrupted run, and loads the ledger.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let client = build_client(&config.http)?;

        let store = AssetStore::new(
            &config.download.output_dir,
            config.download.file_label.clone(),
            config.download.timestamp_in_name,
        );
        store.ensure_dir().await?;
        let stale = store.clean_staging().await?;
        if stale > 0 {
            tracing::info!(removed = stale, "Removed staging files from an interrupted run");
        }

        let ledger = Arc::new(UrlLedger::open(&config.download.ledger_path)?);

        let (event_tx, _rx) = tokio::sync::broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let resolver = Arc::new(EndpointResolver::new(
            client.clone(),
            config.clone(),
            event_tx.clone(),
        ));
        let fetcher = AssetFetcher::new(client, config.clone(), ledger.clone(), store.clone());

        tracing::info!(
            output_dir = %config.download.output_dir.display(),
            ledger = %config.download.ledger_path.display(),
            endpoints = config.api.endpoints.len(),
            max_concurrent = config.download.max_concurrent_downloads,
            "Run coordinator initialized"
        );

        Ok(Self {
            config,
            resolver,
            fetcher,
            ledger,
            store,
            event_tx,
            cancel: CancellationToken::new(),
        })
    }

    /// Cancel the current run and refuse further work
    ///
    /// In-flight fetches stop at their next suspension point and are reported as failed;
    /// nothing partially downloaded is written. Subsequent calls to
    /// [`run`](RunCoordinator::run) finish immediately as cancelled.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutting down run coordinator");
        self.cancel.cancel();
        Ok(())
    }

    /// Whether [`shutdown`](RunCoordinator::shutdown) has been called
    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Cancel `token` once `timeout` elapses, unless it is cancelled first
pub(super) fn spawn_deadline(timeout: Duration, token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!(timeout_secs = timeout.as_secs(), "Run deadline reached, cancelling");
                token.cancel();
            }
        }
    })
}

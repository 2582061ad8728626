//! Run coordination split into focused submodules.
//!
//! The `RunCoordinator` struct and its methods are organized by concern:
//! - [`lifecycle`] - Construction, cancellation and the run deadline
//! - [`run`] - Resolve, fan out fetches, tally outcomes
//! - [`report`] - Run summary logging and the JSON report file

mod lifecycle;
mod report;
mod run;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use report::{write_metadata, write_report};

use crate::config::Config;
use crate::fetcher::AssetFetcher;
use crate::ledger::UrlLedger;
use crate::resolver::EndpointResolver;
use crate::store::AssetStore;
use crate::types::Event;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Orchestrates one or more fetch-and-deduplicate runs (cloneable, all fields are shared)
#[derive(Clone)]
pub struct RunCoordinator {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Listing endpoint selection
    pub(crate) resolver: Arc<EndpointResolver>,
    /// Per-asset download and dedup
    pub(crate) fetcher: AssetFetcher,
    /// Processed-URL ledger, shared with the fetcher
    pub(crate) ledger: Arc<UrlLedger>,
    /// Output directory
    pub(crate) store: AssetStore,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Cancelled by [`RunCoordinator::shutdown`]; each run works under a child token
    pub(crate) cancel: CancellationToken,
}

impl RunCoordinator {
    /// Subscribe to run events
    ///
    /// Subscribers that fall more than the channel capacity behind miss events
    /// (`RecvError::Lagged`); the run itself never blocks on slow subscribers.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The URL ledger used by this coordinator
    pub fn ledger(&self) -> &UrlLedger {
        &self.ledger
    }

    /// The asset store used by this coordinator
    pub fn store(&self) -> &AssetStore {
        &self.store
    }

    /// Token that cancels current and future runs when triggered
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn emit_event(&self, event: Event) {
        // No receivers is fine
        self.event_tx.send(event).ok();
    }
}

//! A single run: resolve the listing, fetch every descriptor, tally the outcomes.

use super::RunCoordinator;
use super::lifecycle::spawn_deadline;
use crate::error::Error;
use crate::types::{
    AssetDescriptor, AssetMetadata, Event, FetchOutcome, RunMetadata, RunReport, SkipReason,
};
use futures::stream::{self, StreamExt};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

impl RunCoordinator {
    /// Execute one run and return its report
    ///
    /// Never fails: an unreachable listing API, failing assets and cancellation all end
    /// up in the report, whose [`status`](RunReport::status) tells them apart.
    ///
    /// Dropping the returned future cancels the fetches it already started.
    pub async fn run(&self) -> RunReport {
        let started = Instant::now();
        let mut report = RunReport::start();
        let cancel = self.cancel.child_token();
        let abandoned = cancel.clone().drop_guard();
        let deadline = self
            .config
            .run_timeout
            .map(|timeout| spawn_deadline(timeout, cancel.clone()));

        self.emit_event(Event::RunStarted {
            candidates: self.config.api.endpoints.len(),
        });
        tracing::info!("Starting splash download run");

        let explicitly_empty = match self.resolver.resolve(&cancel).await {
            Ok(resolution) => {
                report.endpoint = Some(resolution.endpoint.clone());
                report.listed = resolution.descriptors.len();
                let items = if resolution.explicitly_empty {
                    tracing::info!("Provider reported an empty listing, nothing to do");
                    Vec::new()
                } else {
                    self.fetch_all(resolution.descriptors, &cancel, &mut report)
                        .await
                };
                self.save_metadata(&RunMetadata {
                    generated_at: chrono::Utc::now(),
                    endpoint: Some(resolution.endpoint),
                    items,
                })
                .await;
                resolution.explicitly_empty
            }
            Err(e) => {
                tracing::error!(error = %e, "Could not obtain a listing");
                report.resolve_error = Some(e.to_string());
                false
            }
        };

        if let Some(deadline) = deadline {
            deadline.abort();
        }
        report.cancelled |= cancel.is_cancelled();
        report.finish(started.elapsed(), explicitly_empty);
        let report = self.complete(report).await;
        abandoned.disarm();
        report
    }

    /// Fetch all descriptors with at most `max_concurrent_downloads` in flight
    ///
    /// Returns one metadata entry per descriptor, in listing order.
    async fn fetch_all(
        &self,
        descriptors: Vec<AssetDescriptor>,
        cancel: &CancellationToken,
        report: &mut RunReport,
    ) -> Vec<AssetMetadata> {
        let limit = self.config.download.max_concurrent_downloads.max(1);
        let total = descriptors.len();
        let mut items: Vec<Option<AssetMetadata>> = vec![None; total];

        let mut outcomes = stream::iter(descriptors.into_iter().enumerate().map(|(index, descriptor)| {
            let fetcher = self.fetcher.clone();
            let cancel = cancel.clone();
            async move {
                let listed = descriptor.clone();
                let url = descriptor.source_url.clone();
                // Own task, so a panic becomes a failed outcome rather than aborting the run
                let handle = tokio::spawn(async move { fetcher.fetch(&descriptor, &cancel).await });
                let outcome = match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::error!(url = %url, error = %e, "Fetch task panicked");
                        FetchOutcome::failed(&Error::Other(format!("fetch task failed: {}", e)))
                    }
                };
                (index, listed, outcome)
            }
        }))
        .buffer_unordered(limit);

        while let Some((index, listed, outcome)) = outcomes.next().await {
            let url = listed.source_url.clone();
            report.record(&url, &outcome);
            items[index] = Some(AssetMetadata::new(listed, &outcome));
            self.emit_event(outcome_event(url, outcome));
            tracing::debug!(processed = report.processed(), total, "Progress");
        }
        items.into_iter().flatten().collect()
    }
}

pub(super) fn outcome_event(url: String, outcome: FetchOutcome) -> Event {
    match outcome {
        FetchOutcome::Downloaded {
            path,
            content_hash,
            size,
        } => Event::AssetDownloaded {
            url,
            path,
            content_hash,
            size,
        },
        FetchOutcome::SkippedDuplicateUrl => Event::AssetSkipped {
            url,
            reason: SkipReason::DuplicateUrl,
        },
        FetchOutcome::SkippedDuplicateContent { .. } => Event::AssetSkipped {
            url,
            reason: SkipReason::DuplicateContent,
        },
        FetchOutcome::Failed { message, .. } => Event::AssetFailed {
            url,
            error: message,
        },
    }
}

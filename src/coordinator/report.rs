//! Run summary logging, the JSON report file and the metadata file.

use super::RunCoordinator;
use crate::error::Result;
use crate::types::{Event, RunMetadata, RunReport, RunStatus};
use serde::Serialize;
use std::path::Path;

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

/// Write `report` as pretty-printed JSON, creating parent directories
pub async fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    write_json(path, report).await
}

/// Write the per-asset `metadata` as pretty-printed JSON, creating parent directories
pub async fn write_metadata(path: &Path, metadata: &RunMetadata) -> Result<()> {
    write_json(path, metadata).await
}

impl RunCoordinator {
    /// Persist the metadata file if configured; failures are logged, not returned
    pub(super) async fn save_metadata(&self, metadata: &RunMetadata) {
        let Some(path) = &self.config.download.metadata_path else {
            return;
        };
        match write_metadata(path, metadata).await {
            Ok(()) => tracing::info!(
                path = %path.display(),
                items = metadata.items.len(),
                "Metadata written"
            ),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to write metadata"),
        }
    }

    /// Log the summary, persist the report if configured, and announce completion
    pub(super) async fn complete(&self, report: RunReport) -> RunReport {
        let elapsed_secs = report.elapsed.as_secs_f64();
        match report.status {
            RunStatus::TotalFailure => tracing::error!(
                listed = report.listed,
                downloaded = report.downloaded,
                skipped = report.skipped,
                failed = report.failed,
                elapsed_secs,
                cancelled = report.cancelled,
                "Run failed"
            ),
            RunStatus::PartialSuccess => tracing::warn!(
                listed = report.listed,
                downloaded = report.downloaded,
                skipped = report.skipped,
                failed = report.failed,
                elapsed_secs,
                cancelled = report.cancelled,
                "Run finished with failures"
            ),
            _ => tracing::info!(
                listed = report.listed,
                downloaded = report.downloaded,
                skipped = report.skipped,
                failed = report.failed,
                elapsed_secs,
                status = ?report.status,
                "Run finished"
            ),
        }

        if let Some(path) = &self.config.download.report_path {
            match write_report(path, &report).await {
                Ok(()) => tracing::info!(path = %path.display(), "Run report written"),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to write run report")
                }
            }
        }

        self.emit_event(Event::RunComplete {
            report: Box::new(report.clone()),
        });
        report
    }
}

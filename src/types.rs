//! Core types for splash-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, ErrorKind};

/// Per-asset failures kept in a [`RunReport`]; later ones are only counted
pub const MAX_REPORTED_FAILURES: usize = 20;

/// One entry from the upstream listing
///
/// Built fresh from each listing response; never persisted directly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    /// Media URL to download
    pub source_url: String,

    /// Upstream-assigned id, if the record had one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,

    /// Upstream display name, if the record had one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Size in bytes advertised by the upstream record, used only for a sanity warning
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_size: Option<u64>,
}

impl AssetDescriptor {
    /// Descriptor with only a source URL
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            identifier: None,
            display_name: None,
            expected_size: None,
        }
    }

    /// Name for log lines: display name, then identifier, then the URL
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.identifier.as_deref())
            .unwrap_or(&self.source_url)
    }
}

/// One line of the URL ledger: `<hex-digest>|<source-url>`
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Hex SHA-256 of the downloaded bytes
    pub content_hash: String,
    /// URL the bytes came from
    pub source_url: String,
}

impl LedgerEntry {
    /// Render as a ledger line, including the trailing newline
    pub fn to_line(&self) -> String {
        format!("{}|{}\n", self.content_hash, self.source_url)
    }
}

/// Why an asset was skipped
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The URL is already recorded in the ledger (or in flight in this run)
    DuplicateUrl,
    /// The downloaded bytes match a file already in the store
    DuplicateContent,
}

/// Result of fetching one descriptor
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Novel content written to the store
    Downloaded {
        /// Path of the new file
        path: PathBuf,
        /// Hex SHA-256 of the content
        content_hash: String,
        /// Size in bytes
        size: u64,
    },
    /// URL already handled; no network call was made
    SkippedDuplicateUrl,
    /// Content already stored under another URL; nothing was written
    SkippedDuplicateContent {
        /// Hex SHA-256 of the content
        content_hash: String,
        /// The file that already holds this content
        existing: PathBuf,
    },
    /// The descriptor could not be fetched
    Failed {
        /// Failure class
        kind: ErrorKind,
        /// Machine-readable error code
        code: String,
        /// Human-readable message
        message: String,
    },
}

impl FetchOutcome {
    /// Build a `Failed` outcome from an error
    pub fn failed(error: &Error) -> Self {
        FetchOutcome::Failed {
            kind: error.kind(),
            code: error.error_code().to_string(),
            message: error.to_string(),
        }
    }
}

/// What a run did with one listed asset, as written to the metadata file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMetadata {
    /// Upstream-assigned id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Upstream display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Media URL
    pub source_url: String,
    /// Size advertised by the listing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_size: Option<u64>,
    /// `downloaded`, `skipped_duplicate_url`, `skipped_duplicate_content` or `failed`
    pub outcome: String,
    /// Stored file holding this asset's content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Hex SHA-256 of the content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AssetMetadata {
    /// Combine a listed descriptor with its fetch outcome
    pub fn new(descriptor: AssetDescriptor, outcome: &FetchOutcome) -> Self {
        let (outcome, path, content_hash, error) = match outcome {
            FetchOutcome::Downloaded {
                path, content_hash, ..
            } => ("downloaded", Some(path.clone()), Some(content_hash.clone()), None),
            FetchOutcome::SkippedDuplicateUrl => ("skipped_duplicate_url", None, None, None),
            FetchOutcome::SkippedDuplicateContent {
                content_hash,
                existing,
            } => (
                "skipped_duplicate_content",
                Some(existing.clone()),
                Some(content_hash.clone()),
                None,
            ),
            FetchOutcome::Failed { message, .. } => ("failed", None, None, Some(message.clone())),
        };
        Self {
            identifier: descriptor.identifier,
            display_name: descriptor.display_name,
            source_url: descriptor.source_url,
            expected_size: descriptor.expected_size,
            outcome: outcome.to_string(),
            path,
            content_hash,
            error,
        }
    }
}

/// Contents of the metadata file: every listed asset of one run, in listing order
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunMetadata {
    /// When the file was produced
    pub generated_at: DateTime<Utc>,
    /// Endpoint whose listing was used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// One entry per listed asset
    pub items: Vec<AssetMetadata>,
}

/// Overall result of a run, used as the process exit signal
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run has not finished yet
    InProgress,
    /// The provider reported an empty listing
    NothingToDo,
    /// Every descriptor was downloaded or skipped
    Success,
    /// Some descriptors failed, others succeeded
    PartialSuccess,
    /// No listing could be obtained, or every descriptor failed
    TotalFailure,
}

impl RunStatus {
    /// Suggested process exit code
    pub fn exit_code(&self) -> i32 {
        match self {
            RunStatus::NothingToDo | RunStatus::Success => 0,
            RunStatus::TotalFailure | RunStatus::InProgress => 1,
            RunStatus::PartialSuccess => 2,
        }
    }
}

/// A failed asset, kept in the report for diagnostics
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetFailure {
    /// Source URL of the descriptor
    pub url: String,
    /// Machine-readable error code
    pub code: String,
    /// Human-readable message
    pub message: String,
}

/// Counters and diagnostics for one execution
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Wall-clock duration (seconds in serialized form)
    #[serde(with = "duration_secs_f64")]
    pub elapsed: Duration,

    /// Endpoint whose listing was used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Number of descriptors in the listing
    pub listed: usize,

    /// Novel files written
    pub downloaded: usize,

    /// Descriptors skipped by URL or content
    pub skipped: usize,

    /// Descriptors that failed
    pub failed: usize,

    /// Why the listing could not be obtained, if it could not
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolve_error: Option<String>,

    /// Whether the run was cut short by cancellation or its deadline
    pub cancelled: bool,

    /// Final status
    pub status: RunStatus,

    /// The first [`MAX_REPORTED_FAILURES`] per-asset failures
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<AssetFailure>,
}

impl RunReport {
    /// Start a new report, stamped with the current time
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            elapsed: Duration::ZERO,
            endpoint: None,
            listed: 0,
            downloaded: 0,
            skipped: 0,
            failed: 0,
            resolve_error: None,
            cancelled: false,
            status: RunStatus::InProgress,
            errors: Vec::new(),
        }
    }

    /// Tally one fetch outcome
    pub fn record(&mut self, url: &str, outcome: &FetchOutcome) {
        match outcome {
            FetchOutcome::Downloaded { .. } => self.downloaded += 1,
            FetchOutcome::SkippedDuplicateUrl | FetchOutcome::SkippedDuplicateContent { .. } => {
                self.skipped += 1
            }
            FetchOutcome::Failed {
                kind,
                code,
                message,
            } => {
                self.failed += 1;
                if *kind == ErrorKind::Cancelled {
                    self.cancelled = true;
                }
                if self.errors.len() < MAX_REPORTED_FAILURES {
                    self.errors.push(AssetFailure {
                        url: url.to_string(),
                        code: code.clone(),
                        message: message.clone(),
                    });
                }
            }
        }
    }

    /// Total descriptors processed so far
    pub fn processed(&self) -> usize {
        self.downloaded + self.skipped + self.failed
    }

    /// Stamp the end time and derive the final status
    ///
    /// `explicitly_empty` marks a run whose listing was a valid empty list.
    pub fn finish(&mut self, elapsed: Duration, explicitly_empty: bool) {
        self.finished_at = Some(Utc::now());
        self.elapsed = elapsed;
        self.status = if self.resolve_error.is_some() {
            RunStatus::TotalFailure
        } else if explicitly_empty {
            RunStatus::NothingToDo
        } else if self.failed == 0 {
            RunStatus::Success
        } else if self.downloaded + self.skipped > 0 {
            RunStatus::PartialSuccess
        } else {
            RunStatus::TotalFailure
        };
    }
}

/// Event emitted during a run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Run started
    RunStarted {
        /// Number of candidate endpoints
        candidates: usize,
    },

    /// A candidate endpoint failed and the resolver moved on
    EndpointFailed {
        /// Endpoint base URL
        url: String,
        /// Failure class
        kind: ErrorKind,
        /// Error message
        error: String,
    },

    /// A candidate endpoint produced a usable listing
    ListResolved {
        /// Endpoint base URL
        url: String,
        /// Number of descriptors
        count: usize,
        /// Records dropped for lacking a usable URL
        dropped: usize,
        /// The provider reported an empty listing
        explicitly_empty: bool,
    },

    /// An asset was written to the store
    AssetDownloaded {
        /// Source URL
        url: String,
        /// New file
        path: PathBuf,
        /// Hex SHA-256
        content_hash: String,
        /// Size in bytes
        size: u64,
    },

    /// An asset was skipped
    AssetSkipped {
        /// Source URL
        url: String,
        /// Why
        reason: SkipReason,
    },

    /// An asset failed
    AssetFailed {
        /// Source URL
        url: String,
        /// Error message
        error: String,
    },

    /// Run finished
    RunComplete {
        /// Final report
        report: Box<RunReport>,
    },
}

// Fractional-seconds Duration serialization helper
mod duration_secs_f64 {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

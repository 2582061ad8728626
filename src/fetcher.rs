//! Asset fetcher
//!
//! Fetches one descriptor's media URL and decides store-vs-skip:
//!
//! 1. Validate the URL (no request for malformed ones)
//! 2. Claim it in the ledger; known or in-flight URLs are skipped without a request
//! 3. Download with bounded retries, hashing the body as it streams in and failing once
//!    it passes `max_body_bytes`
//! 4. Under the ledger lock: skip if the digest is already stored, otherwise write the
//!    file; either way record the URL
//!
//! Bodies are held in memory until step 4, so a failed or cancelled attempt never
//! leaves anything on disk.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ledger::UrlLedger;
use crate::retry::retry_with_backoff;
use crate::store::AssetStore;
use crate::types::{AssetDescriptor, FetchOutcome};
use crate::utils::{is_image_content_type, validate_asset_url};
use reqwest::header::CONTENT_TYPE;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Relative difference from the advertised size that triggers a warning
const SIZE_MISMATCH_TOLERANCE: f64 = 0.10;

/// Upper bound on the buffer reserved up front from `Content-Length`
const MAX_PREALLOCATION: u64 = 8 * 1024 * 1024;

/// Releases a ledger claim when dropped, including while a panicking task unwinds
///
/// After a successful append the URL is no longer in flight and release is a no-op.
struct ClaimGuard<'a> {
    ledger: &'a UrlLedger,
    url: &'a str,
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        self.ledger.release(self.url);
    }
}

/// A fully read asset body
struct Payload {
    bytes: Vec<u8>,
    content_hash: String,
    content_type: String,
}

/// Downloads assets and records them in the ledger and store
#[derive(Clone)]
pub struct AssetFetcher {
    client: reqwest::Client,
    config: Arc<Config>,
    ledger: Arc<UrlLedger>,
    store: AssetStore,
}

impl AssetFetcher {
    /// Create a fetcher sharing the run's client, ledger and store
    pub fn new(
        client: reqwest::Client,
        config: Arc<Config>,
        ledger: Arc<UrlLedger>,
        store: AssetStore,
    ) -> Self {
        Self {
            client,
            config,
            ledger,
            store,
        }
    }

    /// Fetch one descriptor; never fails, errors become [`FetchOutcome::Failed`]
    pub async fn fetch(
        &self,
        descriptor: &AssetDescriptor,
        cancel: &CancellationToken,
    ) -> FetchOutcome {
        let url = descriptor.source_url.as_str();

        if let Err(e) = validate_asset_url(url, self.config.download.min_url_length) {
            tracing::warn!(url = %url, error = %e, "Invalid asset URL");
            return FetchOutcome::failed(&e);
        }

        if !self.ledger.claim(url).await {
            tracing::info!(url = %url, "URL already processed");
            return FetchOutcome::SkippedDuplicateUrl;
        }
        let _claim = ClaimGuard {
            ledger: &self.ledger,
            url,
        };

        match self.download_and_store(descriptor, cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(url = %url, error = %e, "Failed to fetch asset");
                FetchOutcome::failed(&e)
            }
        }
    }

    async fn download_and_store(
        &self,
        descriptor: &AssetDescriptor,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome> {
        let url = descriptor.source_url.as_str();
        tracing::info!(url = %url, name = descriptor.label(), "Downloading");

        let payload = retry_with_backoff(&self.config.retry, cancel, |attempt| {
            tracing::debug!(url = %url, attempt, "Download attempt");
            self.download(url)
        })
        .await?;

        check_expected_size(descriptor, payload.bytes.len() as u64);
        self.persist(url, payload).await
    }

    async fn download(&self, url: &str) -> Result<Payload> {
        let mut response = self
            .client
            .get(url)
            .timeout(self.config.download.request_timeout)
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if self.config.download.require_image_content_type && !is_image_content_type(&content_type)
        {
            return Err(Error::UnexpectedContentType {
                content_type,
                url: url.to_string(),
            });
        }

        let limit = self.config.download.max_body_bytes;
        let too_large = || Error::BodyTooLarge {
            limit,
            url: url.to_string(),
        };
        let advertised = response.content_length().unwrap_or(0);
        if advertised > limit {
            return Err(too_large());
        }

        let mut bytes = Vec::with_capacity(advertised.min(MAX_PREALLOCATION) as usize);
        let mut hasher = Sha256::new();
        while let Some(chunk) = response.chunk().await? {
            if (bytes.len() + chunk.len()) as u64 > limit {
                return Err(too_large());
            }
            hasher.update(&chunk);
            bytes.extend_from_slice(&chunk);
        }
        if bytes.is_empty() {
            return Err(Error::EmptyBody {
                url: url.to_string(),
            });
        }

        Ok(Payload {
            bytes,
            content_hash: format!("{:x}", hasher.finalize()),
            content_type,
        })
    }

    /// Store-or-skip decision and ledger append, atomic with respect to other fetches
    async fn persist(&self, url: &str, payload: Payload) -> Result<FetchOutcome> {
        let mut ledger = self.ledger.lock().await;
        let hash = payload.content_hash;

        if let Some(existing) = self.store.find_by_hash(&hash).await? {
            ledger.append(&hash, url)?;
            tracing::info!(
                url = %url,
                existing = %existing.display(),
                "Duplicate content, not writing"
            );
            return Ok(FetchOutcome::SkippedDuplicateContent {
                content_hash: hash,
                existing,
            });
        }

        let path = self
            .store
            .write(&hash, &payload.bytes, &payload.content_type)
            .await?;
        ledger.append(&hash, url)?;

        let size = payload.bytes.len() as u64;
        tracing::info!(
            url = %url,
            path = %path.display(),
            size_kb = size / 1024,
            "Saved asset"
        );
        Ok(FetchOutcome::Downloaded {
            path,
            content_hash: hash,
            size,
        })
    }
}

/// Warn when the body size strays from the size the listing advertised
fn check_expected_size(descriptor: &AssetDescriptor, actual: u64) -> bool {
    let Some(expected) = descriptor.expected_size.filter(|e| *e > 0) else {
        return true;
    };
    let deviation = (actual as f64 - expected as f64).abs() / expected as f64;
    if deviation > SIZE_MISMATCH_TOLERANCE {
        tracing::warn!(
            url = %descriptor.source_url,
            expected,
            actual,
            "Downloaded size differs from advertised size"
        );
        return false;
    }
    true
}

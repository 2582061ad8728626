//! Retry logic with exponential backoff
//!
//! This module provides the retry policy shared by the endpoint resolver and the asset
//! fetcher. Delays grow geometrically and never repeat or shrink, and every wait is
//! raced against a cancellation token so a run deadline or shutdown is honored between
//! attempts as well as during them.
//!
//! # Example
//!
//! ```no_run
//! use splash_dl::retry::{IsRetryable, retry_with_backoff};
//! use splash_dl::config::RetryConfig;
//! use splash_dl::error::Error;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Error> {
//! let config = RetryConfig::default();
//! let cancel = CancellationToken::new();
//! let body = retry_with_backoff(&config, &cancel, |_attempt| async {
//!     // Your operation here
//!     Ok::<_, Error>(Vec::<u8>::new())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, connection resets, bad status, wrong content type) should
/// return `true`. Permanent failures (invalid URL, cancellation, local disk errors) should
/// return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

/// Implementation of IsRetryable for our Error type
impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Transport errors: DNS, connect, timeout, TLS, truncated body
            Error::Network(_) => true,
            // Protocol errors share the transport retry policy
            Error::HttpStatus { .. } | Error::EmptyBody { .. } => true,
            Error::UnexpectedContentType { .. } => true,
            // Same asset, same size on every attempt
            Error::BodyTooLarge { .. } => false,
            // Some I/O failures are transient
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::Interrupted
            ),
            // Malformed payloads will not fix themselves on the same endpoint
            Error::Parse(_) | Error::Serialization(_) => false,
            Error::Provider { .. } => false,
            Error::InvalidUrl { .. } => false,
            Error::Config { .. } => false,
            Error::Store { .. } => false,
            Error::AllEndpointsFailed { .. } => false,
            Error::Cancelled => false,
            Error::Other(_) => false,
        }
    }
}

/// Delay to wait before retry number `retry` (1-based), before jitter
///
/// `initial_delay * backoff_multiplier^(retry - 1)`
pub fn backoff_delay(config: &RetryConfig, retry: u32) -> Duration {
    let exponent = retry.saturating_sub(1) as i32;
    let secs = config.initial_delay.as_secs_f64() * config.backoff_multiplier.powi(exponent);
    Duration::from_secs_f64(secs)
}

/// Execute an async operation with exponential backoff retry logic
///
/// The operation is called with the 1-based attempt number and is attempted at most
/// `config.max_attempts` times in total. Cancellation is checked before each attempt,
/// during each attempt, and during each backoff sleep; a cancelled run returns
/// `Error::Cancelled` converted into `E`.
///
/// # Returns
///
/// Returns the successful result or the last error after all attempts are exhausted.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display + From<Error>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled.into());
        }
        attempt += 1;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled.into()),
            result = operation(attempt) => result,
        };

        match result {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = backoff_delay(config, attempt);
                let delay = if config.jitter {
                    add_jitter(delay, config.backoff_multiplier)
                } else {
                    delay
                };

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Error::Cancelled.into()),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::debug!(error = %e, "Operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The jittered delay lies in `[delay, delay * multiplier)`, strictly below the next
/// un-jittered step, so successive retry delays keep increasing.
fn add_jitter(delay: Duration, multiplier: f64) -> Duration {
    if multiplier.is_nan() || multiplier <= 1.0 {
        return delay;
    }
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..(multiplier - 1.0));
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}

//! Error types for splash-dl
//!
//! This module provides the error taxonomy for the fetch-and-deduplicate pipeline:
//! - Transport failures (DNS, connect, timeout, TLS)
//! - Protocol failures (non-200 status, wrong content type, oversized body)
//! - Parse failures (invalid JSON, unrecognized response shape)
//! - Provider failures (status code present but not success)
//! - Validation failures (missing or malformed asset URL)
//!
//! Every error is local to the unit of work that produced it (one endpoint trial,
//! one asset fetch). Only [`Error::AllEndpointsFailed`] ends a run early.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for splash-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for splash-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "retry.max_attempts")
        key: Option<String>,
    },

    /// Transport-level failure (DNS, connect, timeout, TLS, body read)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with a status other than 200
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// Status code returned by the server
        status: u16,
        /// Request URL
        url: String,
    },

    /// A 200 response carried no body
    #[error("empty response body from {url}")]
    EmptyBody {
        /// Request URL
        url: String,
    },

    /// Asset response was not an image
    #[error("unexpected content type {content_type:?} from {url}")]
    UnexpectedContentType {
        /// Content-Type header value (empty when absent)
        content_type: String,
        /// Request URL
        url: String,
    },

    /// Response body is larger than the configured limit
    #[error("response body from {url} exceeds {limit} bytes")]
    BodyTooLarge {
        /// Configured limit in bytes
        limit: u64,
        /// Request URL
        url: String,
    },

    /// Response body could not be understood
    #[error("parse error: {0}")]
    Parse(String),

    /// JSON syntax error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The provider reported a non-success status code
    #[error("provider error [{code}]: {message}")]
    Provider {
        /// Provider status code
        code: i64,
        /// Provider message, preserved for diagnostics
        message: String,
    },

    /// Descriptor URL is missing or malformed
    #[error("invalid asset URL {url:?}: {reason}")]
    InvalidUrl {
        /// The offending URL
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// Every candidate endpoint failed to produce a usable listing
    #[error("all {attempted} candidate endpoints failed (last error: {last_error})")]
    AllEndpointsFailed {
        /// Number of candidates tried
        attempted: usize,
        /// Message of the final candidate's failure
        last_error: String,
    },

    /// Output store error
    #[error("store error at {path}: {reason}")]
    Store {
        /// Path involved in the failed operation
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Run was cancelled or its deadline passed
    #[error("operation cancelled")]
    Cancelled,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Coarse classification of an [`Error`], following the pipeline's failure taxonomy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// DNS, connect, timeout, TLS
    Transport,
    /// Non-200 status, empty body, wrong content type
    Protocol,
    /// Invalid JSON or unrecognized shape
    Parse,
    /// Provider status code other than success
    Provider,
    /// Missing or malformed descriptor URL
    Validation,
    /// Local filesystem or configuration problems
    Local,
    /// Cancellation or deadline
    Cancelled,
    /// Run-level failure to obtain any listing
    Exhausted,
}

impl Error {
    /// Classify this error into the pipeline taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Network(_) => ErrorKind::Transport,
            Error::HttpStatus { .. }
            | Error::EmptyBody { .. }
            | Error::UnexpectedContentType { .. }
            | Error::BodyTooLarge { .. } => ErrorKind::Protocol,
            Error::Parse(_) | Error::Serialization(_) => ErrorKind::Parse,
            Error::Provider { .. } => ErrorKind::Provider,
            Error::InvalidUrl { .. } => ErrorKind::Validation,
            Error::Config { .. } | Error::Store { .. } | Error::Io(_) | Error::Other(_) => {
                ErrorKind::Local
            }
            Error::Cancelled => ErrorKind::Cancelled,
            Error::AllEndpointsFailed { .. } => ErrorKind::Exhausted,
        }
    }

    /// Machine-readable error code, used in run reports
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Network(e) if e.is_timeout() => "timeout",
            Error::Network(e) if e.is_connect() => "connect_error",
            Error::Network(_) => "network_error",
            Error::HttpStatus { .. } => "http_status",
            Error::EmptyBody { .. } => "empty_body",
            Error::UnexpectedContentType { .. } => "unexpected_content_type",
            Error::BodyTooLarge { .. } => "body_too_large",
            Error::Parse(_) => "parse_error",
            Error::Serialization(_) => "invalid_json",
            Error::Provider { .. } => "provider_error",
            Error::InvalidUrl { .. } => "invalid_url",
            Error::AllEndpointsFailed { .. } => "all_endpoints_failed",
            Error::Store { .. } => "store_error",
            Error::Io(_) => "io_error",
            Error::Cancelled => "cancelled",
            Error::Other(_) => "internal_error",
        }
    }

    /// Shorthand for a configuration error tied to a key
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

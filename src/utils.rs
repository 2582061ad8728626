//! Utility functions for URL handling, content types and request nonces

use crate::error::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;

/// Absolute (`https://…`) or protocol-relative (`//…`) URL with no whitespace
#[allow(clippy::unwrap_used)] // literal pattern
static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i:https?:)?//[^\s/?#]+[^\s]*$").unwrap());

/// Returns true if `value` looks like an absolute or protocol-relative HTTP(S) URL
///
/// # Examples
///
/// ```
/// use splash_dl::utils::looks_like_url;
///
/// assert!(looks_like_url("https://i0.hdslb.com/bfs/splash/a.jpg"));
/// assert!(looks_like_url("//i0.hdslb.com/bfs/splash/a.jpg"));
/// assert!(!looks_like_url("splash/a.jpg"));
/// ```
pub fn looks_like_url(value: &str) -> bool {
    URL_PATTERN.is_match(value.trim())
}

/// Trim a raw URL value and give protocol-relative URLs an `https:` scheme
///
/// Returns `None` for empty values. The result is not validated; see
/// [`validate_asset_url`].
pub fn resolve_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with("//") {
        return Some(format!("https:{}", trimmed));
    }
    Some(trimmed.to_string())
}

/// Check that a descriptor URL is usable: long enough, absolute, http(s), with a host
///
/// Surrounding whitespace is rejected; ledger lines store the URL verbatim.
pub fn validate_asset_url(raw: &str, min_length: usize) -> Result<url::Url> {
    let invalid = |reason: String| Error::InvalidUrl {
        url: raw.to_string(),
        reason,
    };

    if raw.trim().is_empty() {
        return Err(invalid("URL is empty".into()));
    }
    if raw.trim() != raw {
        return Err(invalid("URL has leading or trailing whitespace".into()));
    }
    if raw.len() < min_length {
        return Err(invalid(format!(
            "URL is shorter than {} characters",
            min_length
        )));
    }

    let parsed = url::Url::parse(raw).map_err(|e| invalid(format!("not an absolute URL: {}", e)))?;
    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(invalid(format!(
                "URL scheme '{}' is not allowed; only http and https are supported",
                scheme
            )));
        }
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(invalid("URL has no host".into()));
    }
    Ok(parsed)
}

/// Media type portion of a Content-Type header, lowercased (`image/png; q=1` -> `image/png`)
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Returns true for `image/*` content types
pub fn is_image_content_type(content_type: &str) -> bool {
    media_type(content_type).starts_with("image/")
}

/// File extension for an image content type, `jpg` when unknown
pub fn image_extension(content_type: &str) -> &'static str {
    match media_type(content_type).as_str() {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/avif" => "avif",
        "image/bmp" => "bmp",
        _ => "jpg",
    }
}

/// Cache-busting nonce: current Unix time in milliseconds
pub fn cache_buster() -> String {
    chrono::Utc::now().timestamp_millis().to_string()
}

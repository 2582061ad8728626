//! Shared HTTP client construction

use crate::config::HttpConfig;
use crate::error::{Error, Result};
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};

/// Accept header sent when the config does not override it
const DEFAULT_ACCEPT: &str = "application/json, text/plain, image/*, */*;q=0.8";

/// Upper bound on redirects followed for one request
const MAX_REDIRECTS: usize = 10;

fn header_value(key: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| Error::config(key, format!("invalid header value {:?}: {}", value, e)))
}

/// Default headers for every request, from the configured browser identity
pub fn default_headers(config: &HttpConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
    headers.insert(
        header::USER_AGENT,
        header_value("http.user_agent", &config.user_agent)?,
    );
    if let Some(referer) = &config.referer {
        headers.insert(header::REFERER, header_value("http.referer", referer)?);
    }
    if let Some(origin) = &config.origin {
        headers.insert(header::ORIGIN, header_value("http.origin", origin)?);
    }
    if let Some(language) = &config.accept_language {
        headers.insert(
            header::ACCEPT_LANGUAGE,
            header_value("http.accept_language", language)?,
        );
    }

    for (name, value) in &config.extra_headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            Error::config(
                "http.extra_headers",
                format!("invalid header name {:?}: {}", name, e),
            )
        })?;
        headers.insert(name, header_value("http.extra_headers", value)?);
    }
    Ok(headers)
}

/// Build the client used for both listing and asset requests
///
/// Per-request timeouts are set by the callers, since the listing and asset timeouts
/// are configured separately.
pub fn build_client(config: &HttpConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .default_headers(default_headers(config)?)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .danger_accept_invalid_certs(config.accept_invalid_certs);

    if let Some(proxy) = &config.proxy {
        let proxy = reqwest::Proxy::all(proxy.as_str())
            .map_err(|e| Error::config("http.proxy", format!("invalid proxy URL: {}", e)))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))
}

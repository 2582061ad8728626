//! Endpoint resolver
//!
//! Tries the configured candidate endpoints one at a time, in shuffled order when
//! configured, and returns the first listing that normalizes. Each candidate gets exactly
//! one request; any failure moves on to the next one.

use crate::config::{Config, DelayWindow, EndpointConfig, RetryConfig};
use crate::error::{Error, Result};
use crate::normalizer::{Normalized, normalize};
use crate::retry::retry_with_backoff;
use crate::types::{AssetDescriptor, Event};
use crate::utils::cache_buster;
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Query parameter carrying the request signature
const SIGN_PARAM: &str = "sign";

/// A listing obtained from one endpoint
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    /// Base URL of the endpoint that answered
    pub endpoint: String,
    /// Descriptors from the listing
    pub descriptors: Vec<AssetDescriptor>,
    /// The provider reported success with zero items
    pub explicitly_empty: bool,
    /// Records dropped for lacking a URL
    pub dropped: usize,
}

/// Picks a working listing endpoint
pub struct EndpointResolver {
    client: reqwest::Client,
    config: Arc<Config>,
    event_tx: broadcast::Sender<Event>,
}

impl EndpointResolver {
    /// Create a resolver over the configured candidates
    pub fn new(
        client: reqwest::Client,
        config: Arc<Config>,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            client,
            config,
            event_tx,
        }
    }

    /// Candidates in the order they will be tried for this run
    pub fn candidates(&self) -> Vec<EndpointConfig> {
        let mut candidates = self.config.api.endpoints.clone();
        if self.config.api.shuffle_endpoints {
            candidates.shuffle(&mut rand::thread_rng());
        }
        candidates
    }

    /// Query parameters for one request to `endpoint`
    ///
    /// Endpoint parameters override the shared defaults; the nonce is always fresh.
    /// With an app secret configured, `sign` covers every other parameter.
    pub fn query_params(&self, endpoint: &EndpointConfig) -> BTreeMap<String, String> {
        let api = &self.config.api;
        let mut params = api.default_params.clone();
        if !api.app_key.is_empty() {
            params.insert("appkey".to_string(), api.app_key.clone());
        }
        params.extend(endpoint.params.clone());
        params.insert(api.nonce_param.clone(), cache_buster());
        if let Some(secret) = api.app_secret.as_deref().filter(|s| !s.is_empty()) {
            params.remove(SIGN_PARAM);
            let sign = sign_params(&params, secret);
            params.insert(SIGN_PARAM.to_string(), sign);
        }
        params
    }

    /// Try candidates until one yields a listing
    ///
    /// # Errors
    ///
    /// - [`Error::AllEndpointsFailed`] if no candidate produced a usable listing
    /// - [`Error::Cancelled`] if `cancel` fired first
    pub async fn resolve(&self, cancel: &CancellationToken) -> Result<Resolution> {
        let candidates = self.candidates();
        let attempted = candidates.len();
        let mut last_error = String::from("no candidate endpoints configured");

        for (index, endpoint) in candidates.iter().enumerate() {
            tracing::info!(
                url = %endpoint.url,
                candidate = index + 1,
                of = attempted,
                "Requesting listing"
            );

            match self.try_endpoint(endpoint, cancel).await {
                Ok(normalized) => {
                    tracing::info!(
                        url = %endpoint.url,
                        count = normalized.descriptors.len(),
                        dropped = normalized.dropped,
                        explicitly_empty = normalized.explicitly_empty,
                        "Listing resolved"
                    );
                    self.event_tx
                        .send(Event::ListResolved {
                            url: endpoint.url.clone(),
                            count: normalized.descriptors.len(),
                            dropped: normalized.dropped,
                            explicitly_empty: normalized.explicitly_empty,
                        })
                        .ok();
                    return Ok(Resolution {
                        endpoint: endpoint.url.clone(),
                        descriptors: normalized.descriptors,
                        explicitly_empty: normalized.explicitly_empty,
                        dropped: normalized.dropped,
                    });
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    tracing::warn!(
                        url = %endpoint.url,
                        error = %e,
                        kind = ?e.kind(),
                        "Endpoint failed, trying next candidate"
                    );
                    self.event_tx
                        .send(Event::EndpointFailed {
                            url: endpoint.url.clone(),
                            kind: e.kind(),
                            error: e.to_string(),
                        })
                        .ok();
                    last_error = e.to_string();
                }
            }
        }

        Err(Error::AllEndpointsFailed {
            attempted,
            last_error,
        })
    }

    async fn try_endpoint(
        &self,
        endpoint: &EndpointConfig,
        cancel: &CancellationToken,
    ) -> Result<Normalized> {
        pause(&self.config.api.pre_request_delay, cancel).await?;
        retry_with_backoff(&RetryConfig::single_attempt(), cancel, |_| {
            self.request(endpoint)
        })
        .await
    }

    async fn request(&self, endpoint: &EndpointConfig) -> Result<Normalized> {
        let response = self
            .client
            .get(&endpoint.url)
            .query(&self.query_params(endpoint))
            .timeout(self.config.api.request_timeout)
            .send()
            .await?;

        let status = response.status();
        let url = response.url().to_string();
        let body = response.bytes().await?;
        tracing::debug!(url = %url, status = status.as_u16(), size = body.len(), "Listing response");

        if status != reqwest::StatusCode::OK {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }
        if body.is_empty() {
            return Err(Error::EmptyBody { url });
        }
        normalize(&body)
    }
}

/// MD5 over `k=v` pairs in key order joined by `&`, followed by `secret`
pub fn sign_params(params: &BTreeMap<String, String>, secret: &str) -> String {
    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    format!("{:x}", md5::compute(format!("{}{}", query, secret)))
}

/// Sleep for a random duration inside `window`, returning early on cancellation
async fn pause(window: &DelayWindow, cancel: &CancellationToken) -> Result<()> {
    if window.is_disabled() {
        return Ok(());
    }
    let delay = if window.max > window.min {
        rand::thread_rng().gen_range(window.min..=window.max)
    } else {
        window.min
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

//! Configuration types for splash-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::PathBuf, time::Duration};

/// One candidate listing endpoint: a base URL plus its own query parameters
///
/// The effective query for a request is `app_key` + [`ApiConfig::default_params`] +
/// these parameters + the cache-busting nonce, later entries overriding earlier ones,
/// then `sign` when [`ApiConfig::app_secret`] is set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Base URL (must be http or https)
    pub url: String,

    /// Endpoint-specific query parameters (e.g. `plat=1`)
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl EndpointConfig {
    /// Create an endpoint with the given parameters
    pub fn new<K, V>(url: impl Into<String>, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            url: url.into(),
            params: params
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Inclusive window for the randomized pause taken before each listing request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayWindow {
    /// Lower bound (milliseconds in serialized form)
    #[serde(with = "duration_ms_serde")]
    pub min: Duration,
    /// Upper bound (milliseconds in serialized form)
    #[serde(with = "duration_ms_serde")]
    pub max: Duration,
}

impl DelayWindow {
    /// A window that never pauses
    pub const NONE: DelayWindow = DelayWindow {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };

    /// Whether this window can produce a non-zero pause
    pub fn is_disabled(&self) -> bool {
        self.max.is_zero()
    }
}

impl Default for DelayWindow {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(500),
            max: Duration::from_millis(1500),
        }
    }
}

/// Listing API settings (candidate endpoints, parameters, pacing)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Candidate endpoints, tried one at a time until one yields a usable listing
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<EndpointConfig>,

    /// Application key sent as `appkey`
    #[serde(default = "default_app_key")]
    pub app_key: String,

    /// Secret for request signing; when set, every listing request carries a `sign`
    /// parameter (MD5 of the sorted `k=v&...` query followed by the secret)
    #[serde(default = "default_app_secret")]
    pub app_secret: Option<String>,

    /// Device/platform hints sent with every listing request
    #[serde(default = "default_api_params")]
    pub default_params: BTreeMap<String, String>,

    /// Name of the cache-busting query parameter (default: "ts")
    #[serde(default = "default_nonce_param")]
    pub nonce_param: String,

    /// Try candidates in random order (default: true)
    #[serde(default = "default_true")]
    pub shuffle_endpoints: bool,

    /// Per-request timeout for listing calls (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Randomized pause before each listing request (default: 500-1500 ms)
    #[serde(default)]
    pub pre_request_delay: DelayWindow,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            app_key: default_app_key(),
            app_secret: default_app_secret(),
            default_params: default_api_params(),
            nonce_param: default_nonce_param(),
            shuffle_endpoints: true,
            request_timeout: default_request_timeout(),
            pre_request_delay: DelayWindow::default(),
        }
    }
}

/// HTTP client identity and transport settings, shared by listing and asset requests
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Referer header
    #[serde(default = "default_referer")]
    pub referer: Option<String>,

    /// Origin header
    #[serde(default = "default_origin")]
    pub origin: Option<String>,

    /// Accept-Language header
    #[serde(default = "default_accept_language")]
    pub accept_language: Option<String>,

    /// Additional headers added to every request
    #[serde(default)]
    pub extra_headers: BTreeMap<String, String>,

    /// Proxy URL for all traffic, e.g. `socks5h://127.0.0.1:1080`
    #[serde(default)]
    pub proxy: Option<String>,

    /// Skip TLS certificate verification (default: false)
    ///
    /// Intercepting proxies often re-sign traffic; only enable this together with `proxy`.
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            referer: default_referer(),
            origin: default_origin(),
            accept_language: default_accept_language(),
            extra_headers: BTreeMap::new(),
            proxy: None,
            accept_invalid_certs: false,
        }
    }
}

/// Asset download and storage settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Output store directory (default: "./splash")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// URL ledger file (default: "./splash_urls.txt")
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,

    /// Human-readable label placed after the digest in file names (default: "splash")
    #[serde(default = "default_file_label")]
    pub file_label: String,

    /// Include a `YYYYmmdd-HHMMSS` timestamp in file names (default: true)
    #[serde(default = "default_true")]
    pub timestamp_in_name: bool,

    /// Maximum concurrent asset downloads; 1 means sequential (default: 4)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Per-request timeout for asset downloads (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// URLs shorter than this are rejected without a network call (default: 10)
    #[serde(default = "default_min_url_length")]
    pub min_url_length: usize,

    /// Reject responses whose Content-Type is not `image/*` (default: true)
    #[serde(default = "default_true")]
    pub require_image_content_type: bool,

    /// Largest accepted asset body in bytes (default: 64 MiB)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,

    /// Where to write the JSON run report (None = don't write one)
    #[serde(default)]
    pub report_path: Option<PathBuf>,

    /// Where to write the per-asset metadata file (None = don't write one)
    #[serde(default)]
    pub metadata_path: Option<PathBuf>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            ledger_path: default_ledger_path(),
            file_label: default_file_label(),
            timestamp_in_name: true,
            max_concurrent_downloads: default_max_concurrent(),
            request_timeout: default_request_timeout(),
            min_url_length: default_min_url_length(),
            require_image_content_type: true,
            max_body_bytes: default_max_body_bytes(),
            report_path: None,
            metadata_path: None,
        }
    }
}

/// Retry behavior for asset downloads (and listing requests, one try per candidate)
///
/// The delay before retry `n` (1-based) is `initial_delay * backoff_multiplier^(n-1)`.
/// With jitter the delay is stretched by less than one multiplier step, so successive
/// delays still strictly increase.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total number of attempts, including the first (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (default: 2 seconds; milliseconds in serialized form)
    #[serde(default = "default_initial_delay", with = "duration_ms_serde")]
    pub initial_delay: Duration,

    /// Multiplier for exponential backoff, must be greater than 1.0 (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// A policy that makes exactly one attempt
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Main configuration for [`RunCoordinator`](crate::RunCoordinator)
///
/// Every field has a default, so an empty JSON object is a valid configuration:
/// - [`api`](ApiConfig): candidate endpoints, parameters, pacing
/// - [`http`](HttpConfig): headers, proxy, TLS
/// - [`download`](DownloadConfig): store, ledger, concurrency, naming
/// - [`retry`](RetryConfig): attempt bound and backoff
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Listing API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Download and storage settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Asset retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Run-level deadline; in-flight work is cancelled when it passes (None = no deadline)
    #[serde(default, with = "optional_duration_serde")]
    pub run_timeout: Option<Duration>,
}

impl Config {
    /// Check the configuration for values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.api.endpoints.is_empty() {
            return Err(Error::config(
                "api.endpoints",
                "at least one candidate endpoint is required",
            ));
        }
        for endpoint in &self.api.endpoints {
            let parsed = url::Url::parse(&endpoint.url).map_err(|e| {
                Error::config("api.endpoints", format!("invalid URL {}: {}", endpoint.url, e))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(Error::config(
                    "api.endpoints",
                    format!("endpoint {} must use http or https", endpoint.url),
                ));
            }
        }
        if self.api.nonce_param.is_empty() {
            return Err(Error::config("api.nonce_param", "must not be empty"));
        }
        if self.api.pre_request_delay.min > self.api.pre_request_delay.max {
            return Err(Error::config(
                "api.pre_request_delay",
                "min must not exceed max",
            ));
        }
        if let Some(proxy) = &self.http.proxy {
            reqwest::Proxy::all(proxy.as_str()).map_err(|e| {
                Error::config("http.proxy", format!("invalid proxy {}: {}", proxy, e))
            })?;
        }
        if self.download.max_concurrent_downloads == 0 {
            return Err(Error::config(
                "download.max_concurrent_downloads",
                "must be at least 1",
            ));
        }
        if self.download.max_body_bytes == 0 {
            return Err(Error::config(
                "download.max_body_bytes",
                "must be greater than zero",
            ));
        }
        if self.download.file_label.contains(['/', '\\']) {
            return Err(Error::config(
                "download.file_label",
                "must not contain path separators",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::config("retry.max_attempts", "must be at least 1"));
        }
        if self.retry.initial_delay.is_zero() {
            return Err(Error::config(
                "retry.initial_delay",
                "must be greater than zero",
            ));
        }
        let multiplier = self.retry.backoff_multiplier;
        if multiplier.is_nan() || multiplier <= 1.0 {
            return Err(Error::config(
                "retry.backoff_multiplier",
                "must be greater than 1.0 so delays strictly increase",
            ));
        }
        Ok(())
    }
}

// Default value functions
fn default_endpoints() -> Vec<EndpointConfig> {
    vec![
        EndpointConfig::new("https://app.bilibili.com/x/v2/splash/show", [("plat", "0")]),
        EndpointConfig::new("https://api.bilibili.com/x/v2/splash/list", [("plat", "1")]),
        EndpointConfig::new("https://app.bilibili.com/x/v2/splash/show", [("plat", "2")]),
        EndpointConfig::new(
            "https://app.bilibili.com/x/v2/splash/brand/list",
            Vec::<(String, String)>::new(),
        ),
    ]
}

fn default_app_key() -> String {
    "1d8b6e7d45233436".into()
}

fn default_app_secret() -> Option<String> {
    Some("560c52ccd288fed045859ed18bffd973".into())
}

fn default_api_params() -> BTreeMap<String, String> {
    [
        ("build", "100000"),
        ("platform", "android"),
        ("device", "phone"),
        ("channel", "xiaomi"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_nonce_param() -> String {
    "ts".into()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/125.0.0.0 Safari/537.36"
        .into()
}

fn default_referer() -> Option<String> {
    Some("https://www.bilibili.com/".into())
}

fn default_origin() -> Option<String> {
    Some("https://www.bilibili.com".into())
}

fn default_accept_language() -> Option<String> {
    Some("zh-CN,zh;q=0.9,en;q=0.8".into())
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("splash")
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("splash_urls.txt")
}

fn default_file_label() -> String {
    "splash".into()
}

fn default_max_concurrent() -> usize {
    4
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_min_url_length() -> usize {
    10
}

fn default_max_body_bytes() -> u64 {
    64 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Millisecond Duration serialization helper
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}

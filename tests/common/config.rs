//! Test configuration helpers for pointing a coordinator at a mock upstream

use splash_dl::{Config, DelayWindow, EndpointConfig, RetryConfig, RunCoordinator};
use std::path::Path;
use std::time::Duration;
use wiremock::MockServer;

/// Listing path served by the mock upstream
pub const LISTING_PATH: &str = "/x/v2/splash/show";

/// Config rooted in `root` with the given listing endpoints, in order, without pacing
///
/// Retries are fast (10 ms initial delay) and `max_attempts` is 3.
pub fn test_config(root: &Path, endpoints: &[String]) -> Config {
    let mut config = Config::default();
    config.api.endpoints = endpoints
        .iter()
        .map(|url| EndpointConfig::new(url.as_str(), [("plat", "0")]))
        .collect();
    config.api.shuffle_endpoints = false;
    config.api.pre_request_delay = DelayWindow::NONE;
    config.api.request_timeout = Duration::from_secs(5);
    config.download.output_dir = root.join("splash");
    config.download.ledger_path = root.join("splash_urls.txt");
    config.download.request_timeout = Duration::from_secs(5);
    config.retry = RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(10),
        backoff_multiplier: 2.0,
        jitter: false,
    };
    config
}

/// Config with the server's listing path as the only endpoint
pub fn single_endpoint_config(root: &Path, server: &MockServer) -> Config {
    test_config(root, &[format!("{}{}", server.uri(), LISTING_PATH)])
}

/// Create a coordinator, panicking on configuration errors
pub async fn create_coordinator(config: Config) -> RunCoordinator {
    match RunCoordinator::new(config).await {
        Ok(coordinator) => coordinator,
        Err(e) => panic!("failed to create coordinator: {e}"),
    }
}

//! Shared test helpers for creating RunCoordinator instances against a mock upstream.

use crate::config::{Config, DelayWindow, EndpointConfig, RetryConfig};
use crate::coordinator::RunCoordinator;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Config with store and ledger inside `temp`, the given listing endpoints, no pacing
/// and a fast retry policy.
pub(crate) fn test_config(temp: &Path, endpoints: Vec<String>) -> Config {
    let mut config = Config::default();
    config.api.endpoints = endpoints
        .into_iter()
        .map(|url| EndpointConfig::new(url, [("plat", "0")]))
        .collect();
    config.api.shuffle_endpoints = false;
    config.api.pre_request_delay = DelayWindow::NONE;
    config.api.request_timeout = Duration::from_secs(5);
    config.download.output_dir = temp.join("splash");
    config.download.ledger_path = temp.join("splash_urls.txt");
    config.download.request_timeout = Duration::from_secs(5);
    config.download.timestamp_in_name = false;
    config.retry = RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(10),
        backoff_multiplier: 2.0,
        jitter: false,
    };
    config
}

/// Coordinator whose single listing endpoint is `{server}/x/v2/splash/show`.
/// Returns the coordinator and the tempdir (which must be kept alive).
pub(crate) async fn create_test_coordinator(server: &MockServer) -> (RunCoordinator, TempDir) {
    let temp = tempfile::tempdir().unwrap();
    let config = test_config(
        temp.path(),
        vec![format!("{}/x/v2/splash/show", server.uri())],
    );
    let coordinator = RunCoordinator::new(config).await.unwrap();
    (coordinator, temp)
}

/// `{"code": 0, "data": {"list": [...]}}` with one `thumb` record per URL
pub(crate) fn listing(urls: &[String]) -> Value {
    let list: Vec<Value> = urls
        .iter()
        .enumerate()
        .map(|(i, url)| json!({"id": i + 1, "thumb": url, "thumb_name": format!("splash {}", i + 1)}))
        .collect();
    json!({"code": 0, "message": "0", "data": {"list": list}})
}

/// Serve `body` as the listing at `/x/v2/splash/show`
pub(crate) async fn mount_listing(server: &MockServer, body: Value) {
    Mock::given(method("GET"))
        .and(path("/x/v2/splash/show"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Serve `bytes` as a PNG at `route`
pub(crate) async fn mount_image(server: &MockServer, route: &str, bytes: &'static [u8]) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(bytes, "image/png"))
        .mount(server)
        .await;
}

/// Final (non-staging) files in the store directory
pub(crate) fn stored_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| {
            !p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".part"))
        })
        .collect();
    files.sort();
    files
}

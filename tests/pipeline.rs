//! End-to-end properties of the fetch-and-deduplicate pipeline
//!
//! Each test drives a real `RunCoordinator` against a wiremock upstream that serves both
//! the listing API and the image host, with the store and ledger in a temp directory.

mod common;

use common::*;
use splash_dl::normalizer::normalize;
use splash_dl::{RunStatus, run_with_shutdown};
use std::time::Duration;
use tempfile::tempdir;
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sha256_of_prefix(bytes: &[u8], len: usize) -> String {
    sha256_hex(&bytes[..len])
}

// ============================================================================
// Idempotence
// ============================================================================

#[tokio::test]
async fn test_second_run_downloads_nothing() {
    let server = MockServer::start().await;
    let urls = vec![
        format!("{}/a.png", server.uri()),
        format!("{}/b.png", server.uri()),
    ];
    mount_json(&server, LISTING_PATH, listing(&urls)).await;
    for (route, body) in [("/a.png", IMAGE_A), ("/b.png", IMAGE_B)] {
        Mock::given(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "image/png"))
            .expect(1)
            .mount(&server)
            .await;
    }
    let temp_dir = tempdir().unwrap();

    let first = create_coordinator(single_endpoint_config(temp_dir.path(), &server))
        .await
        .run()
        .await;
    // Fresh coordinator: state must come from disk, not memory
    let second = create_coordinator(single_endpoint_config(temp_dir.path(), &server))
        .await
        .run()
        .await;

    assert_eq!(first.downloaded, 2);
    assert_eq!(second.downloaded, 0);
    assert_eq!(second.skipped, 2);
    assert_eq!(second.failed, 0);
    assert_eq!(second.status, RunStatus::Success);
    assert_eq!(stored_files(&temp_dir.path().join("splash")).len(), 2);
}

#[tokio::test]
async fn test_legacy_bare_url_ledger_lines_are_honored() {
    let server = MockServer::start().await;
    let url = format!("{}/a.png", server.uri());
    mount_json(&server, LISTING_PATH, listing(std::slice::from_ref(&url))).await;
    Mock::given(path("/a.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(IMAGE_A, "image/png"))
        .expect(0)
        .mount(&server)
        .await;
    let temp_dir = tempdir().unwrap();
    std::fs::write(
        temp_dir.path().join("splash_urls.txt"),
        format!("# Wallpaper URL Record\n{url}\nthis line is junk\n"),
    )
    .unwrap();

    let report = create_coordinator(single_endpoint_config(temp_dir.path(), &server))
        .await
        .run()
        .await;

    assert_eq!(report.skipped, 1);
    assert_eq!(report.downloaded, 0);
}

// ============================================================================
// Content-identity dedup
// ============================================================================

#[tokio::test]
async fn test_identical_payloads_store_one_file_and_record_both_urls() {
    let server = MockServer::start().await;
    let urls = vec![
        format!("{}/cdn1/a.png", server.uri()),
        format!("{}/cdn2/a.png", server.uri()),
    ];
    mount_json(&server, LISTING_PATH, listing(&urls)).await;
    mount_image(&server, "/cdn1/a.png", IMAGE_A).await;
    mount_image(&server, "/cdn2/a.png", IMAGE_A).await;
    let temp_dir = tempdir().unwrap();
    let config = single_endpoint_config(temp_dir.path(), &server);
    let ledger_path = config.download.ledger_path.clone();

    let report = create_coordinator(config).await.run().await;

    assert_eq!(report.downloaded, 1);
    assert_eq!(report.skipped, 1);
    let files = stored_files(&temp_dir.path().join("splash"));
    assert_eq!(files.len(), 1);
    let name = files[0].file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with(&sha256_hex(IMAGE_A)), "file name {name}");
    assert!(name.ends_with("_splash.png"), "file name {name}");

    let mut recorded = assert_ledger_well_formed(&ledger_path);
    recorded.sort();
    assert_eq!(recorded, urls);
}

#[tokio::test]
async fn test_concurrent_duplicates_within_one_run_store_one_file() {
    let server = MockServer::start().await;
    let urls: Vec<String> = (0..8)
        .map(|i| format!("{}/edge{}/a.png", server.uri(), i))
        .collect();
    mount_json(&server, LISTING_PATH, listing(&urls)).await;
    for i in 0..8 {
        Mock::given(path(format!("/edge{}/a.png", i)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(IMAGE_A, "image/png")
                    .set_delay(Duration::from_millis(25)),
            )
            .mount(&server)
            .await;
    }
    let temp_dir = tempdir().unwrap();
    let mut config = single_endpoint_config(temp_dir.path(), &server);
    config.download.max_concurrent_downloads = 8;
    let ledger_path = config.download.ledger_path.clone();

    let report = create_coordinator(config).await.run().await;

    assert_eq!(report.downloaded, 1);
    assert_eq!(report.skipped, 7);
    assert_eq!(stored_files(&temp_dir.path().join("splash")).len(), 1);
    assert_eq!(assert_ledger_well_formed(&ledger_path).len(), 8);
}

// ============================================================================
// Shape tolerance
// ============================================================================

#[test]
fn test_every_shape_yields_the_same_descriptors() {
    let urls = vec![
        "https://i0.hdslb.example/bfs/splash/a.jpg".to_string(),
        "https://i0.hdslb.example/bfs/splash/b.jpg".to_string(),
    ];

    let mut results = Vec::new();
    for (name, payload) in shape_payloads(&urls) {
        let body = serde_json::to_vec(&payload).unwrap();
        let normalized = normalize(&body).unwrap_or_else(|e| panic!("{name}: {e}"));
        assert!(!normalized.explicitly_empty, "{name}");
        results.push((name, normalized.descriptors));
    }

    let (_, canonical) = &results[0];
    assert_eq!(canonical.len(), 2);
    for (name, descriptors) in &results {
        assert_eq!(descriptors, canonical, "shape {name} differs");
    }
}

#[tokio::test]
async fn test_every_shape_drives_a_full_run() {
    let server = MockServer::start().await;
    let url = format!("{}/a.png", server.uri());
    mount_image(&server, "/a.png", IMAGE_A).await;

    for (i, (name, payload)) in shape_payloads(std::slice::from_ref(&url))
        .into_iter()
        .enumerate()
    {
        let route = format!("/shape{}", i);
        mount_json(&server, &route, payload).await;
        let temp_dir = tempdir().unwrap();
        let config = test_config(temp_dir.path(), &[format!("{}{}", server.uri(), route)]);

        let report = create_coordinator(config).await.run().await;
        assert_eq!(report.downloaded, 1, "shape {name}");
    }
}

// ============================================================================
// Retry bound
// ============================================================================

#[tokio::test]
async fn test_transport_failures_are_attempted_exactly_max_attempts_times() {
    let server = MockServer::start().await;
    let url = format!("{}/timeout.png", server.uri());
    mount_json(&server, LISTING_PATH, listing(std::slice::from_ref(&url))).await;
    Mock::given(path("/timeout.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(IMAGE_A, "image/png")
                .set_delay(Duration::from_secs(5)),
        )
        .expect(3)
        .mount(&server)
        .await;
    let temp_dir = tempdir().unwrap();
    let mut config = single_endpoint_config(temp_dir.path(), &server);
    config.download.request_timeout = Duration::from_millis(200);
    let ledger_path = config.download.ledger_path.clone();

    let report = create_coordinator(config).await.run().await;

    assert_eq!(report.failed, 1);
    assert_eq!(report.errors[0].code, "timeout");
    assert_eq!(report.status, RunStatus::TotalFailure);
    assert!(stored_files(&temp_dir.path().join("splash")).is_empty());
    assert!(ledger_lines(&ledger_path).is_empty());
}

// ============================================================================
// Endpoint fallback
// ============================================================================

#[tokio::test]
async fn test_fallback_uses_second_endpoint_and_never_calls_third() {
    let server = MockServer::start().await;
    let url = format!("{}/a.png", server.uri());
    Mock::given(path("/api1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"code\": 0, \"data\": "))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/api2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(std::slice::from_ref(&url))))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/api3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(std::slice::from_ref(&url))))
        .expect(0)
        .mount(&server)
        .await;
    mount_image(&server, "/a.png", IMAGE_A).await;
    let temp_dir = tempdir().unwrap();
    let endpoints: Vec<String> = ["/api1", "/api2", "/api3"]
        .iter()
        .map(|p| format!("{}{}", server.uri(), p))
        .collect();

    let report = create_coordinator(test_config(temp_dir.path(), &endpoints))
        .await
        .run()
        .await;

    assert_eq!(report.endpoint.as_deref(), Some(endpoints[1].as_str()));
    assert_eq!(report.downloaded, 1);
}

// ============================================================================
// Explicit-empty vs failure
// ============================================================================

#[tokio::test]
async fn test_explicit_empty_is_a_successful_no_op() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        LISTING_PATH,
        serde_json::json!({"code": 0, "data": {"list": []}}),
    )
    .await;
    let temp_dir = tempdir().unwrap();

    let report = create_coordinator(single_endpoint_config(temp_dir.path(), &server))
        .await
        .run()
        .await;

    assert_eq!(report.status, RunStatus::NothingToDo);
    assert_eq!(report.failed, 0);
    assert!(report.resolve_error.is_none());
}

#[tokio::test]
async fn test_malformed_everywhere_is_a_resolver_failure() {
    let server = MockServer::start().await;
    for route in ["/api1", "/api2", "/api3"] {
        Mock::given(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string("<!DOCTYPE html><p>502</p>"))
            .expect(1)
            .mount(&server)
            .await;
    }
    let temp_dir = tempdir().unwrap();
    let endpoints: Vec<String> = ["/api1", "/api2", "/api3"]
        .iter()
        .map(|p| format!("{}{}", server.uri(), p))
        .collect();

    let report = create_coordinator(test_config(temp_dir.path(), &endpoints))
        .await
        .run()
        .await;

    assert_eq!(report.status, RunStatus::TotalFailure);
    assert!(report.resolve_error.is_some());
    assert_eq!(report.processed(), 0);
}

// ============================================================================
// Ledger append-only
// ============================================================================

#[tokio::test]
async fn test_ledger_prefix_is_unchanged_across_runs() {
    let server = MockServer::start().await;
    let a = format!("{}/a.png", server.uri());
    let b = format!("{}/b.png", server.uri());
    let c = format!("{}/c.png", server.uri());
    mount_json(&server, LISTING_PATH, listing(&[a.clone(), b.clone()])).await;
    mount_image(&server, "/a.png", IMAGE_A).await;
    mount_image(&server, "/b.png", IMAGE_B).await;
    let temp_dir = tempdir().unwrap();
    let ledger_path = temp_dir.path().join("splash_urls.txt");

    let first = create_coordinator(single_endpoint_config(temp_dir.path(), &server))
        .await
        .run()
        .await;
    let after_first = std::fs::read(&ledger_path).unwrap();
    let prefix_hash = sha256_hex(&after_first);

    // The listing changes between runs
    server.reset().await;
    mount_json(&server, LISTING_PATH, listing(&[a, b, c])).await;
    mount_image(&server, "/c.png", IMAGE_C).await;

    let second = create_coordinator(single_endpoint_config(temp_dir.path(), &server))
        .await
        .run()
        .await;
    let after_second = std::fs::read(&ledger_path).unwrap();

    assert_eq!(first.downloaded + second.downloaded, 3);
    assert_eq!(second.skipped, 2);
    assert_eq!(
        sha256_of_prefix(&after_second, after_first.len()),
        prefix_hash,
        "earlier ledger lines must never be rewritten"
    );
    assert_eq!(assert_ledger_well_formed(&ledger_path).len(), 3);
}

// ============================================================================
// Signal-aware entry point
// ============================================================================

#[tokio::test]
async fn test_run_with_shutdown_returns_report_when_run_completes() {
    let server = MockServer::start().await;
    let url = format!("{}/a.png", server.uri());
    mount_json(&server, LISTING_PATH, listing(std::slice::from_ref(&url))).await;
    mount_image(&server, "/a.png", IMAGE_A).await;
    let temp_dir = tempdir().unwrap();
    let coordinator = create_coordinator(single_endpoint_config(temp_dir.path(), &server)).await;

    let report = run_with_shutdown(&coordinator).await;

    assert_eq!(report.downloaded, 1);
    assert!(!report.cancelled);
    assert!(!coordinator.is_shut_down());
}

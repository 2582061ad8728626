//! Listing payloads and image bodies

use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Small PNG-looking bodies with distinct content
pub const IMAGE_A: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR-image-a";
/// See [`IMAGE_A`]
pub const IMAGE_B: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR-image-b";
/// See [`IMAGE_A`]
pub const IMAGE_C: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR-image-c";

/// Records with one `thumb` URL each
pub fn records(urls: &[String]) -> Vec<Value> {
    urls.iter()
        .enumerate()
        .map(|(i, url)| json!({"id": i + 1, "thumb": url, "thumb_name": format!("splash-{}", i + 1)}))
        .collect()
}

/// The five accepted listing layouts for the same records, in lookup order
pub fn shape_payloads(urls: &[String]) -> Vec<(&'static str, Value)> {
    let list = records(urls);
    let nested: Vec<Value> = list.chunks(1).map(|c| Value::Array(c.to_vec())).collect();
    vec![
        ("data.list", json!({"code": 0, "data": {"list": list}})),
        ("data records", json!({"code": 0, "data": list})),
        ("data nested lists", json!({"code": 0, "data": nested})),
        (
            "data first value",
            json!({"code": 0, "data": {"splash_list": list, "pull_interval": 1800}}),
        ),
        ("top-level list", json!({"code": 0, "list": list})),
    ]
}

/// `data.list` listing for `urls`
pub fn listing(urls: &[String]) -> Value {
    json!({"code": 0, "message": "0", "ttl": 1, "data": {"list": records(urls)}})
}

/// Serve `body` as JSON at `route`
pub async fn mount_json(server: &MockServer, route: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Serve `bytes` as `image/png` at `route`
pub async fn mount_image(server: &MockServer, route: &str, bytes: &'static [u8]) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(bytes, "image/png"))
        .mount(server)
        .await;
}

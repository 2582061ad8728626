//! Listing response normalization
//!
//! The upstream listing has been observed in several layouts. [`normalize`] checks the
//! top-level status, then walks a fixed table of [`Shape`]s and takes the first one that
//! yields a non-empty list. Each record's media URL is then pulled out with a second
//! table of [`UrlStrategy`]s.

use crate::error::{Error, Result};
use crate::types::AssetDescriptor;
use crate::utils::{looks_like_url, resolve_url};
use serde_json::Value;
use tracing::{debug, warn};

/// Successful normalization result
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Normalized {
    /// Descriptors with a usable URL, in listing order
    pub descriptors: Vec<AssetDescriptor>,
    /// The provider reported success with zero items
    pub explicitly_empty: bool,
    /// Records dropped for lacking a URL
    pub dropped: usize,
}

/// Where the item list lives in a listing response
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    /// `{"data": {"list": [...]}}`
    DataList,
    /// `{"data": [record, ...]}`
    DataRecords,
    /// `{"data": [[record, ...], ...]}`, flattened one level
    DataNested,
    /// `{"data": {"<any>": [...], ...}}`, first value of `data`
    DataFirstValue,
    /// `{"list": [...]}`
    TopLevelList,
}

/// Shapes in the order they are tried
pub const SHAPES: [Shape; 5] = [
    Shape::DataList,
    Shape::DataRecords,
    Shape::DataNested,
    Shape::DataFirstValue,
    Shape::TopLevelList,
];

impl Shape {
    /// Records at this shape's location, `None` if the response does not have this shape
    pub fn records<'a>(&self, root: &'a Value) -> Option<Vec<&'a Value>> {
        let data = root.get("data");
        match self {
            Shape::DataList => data?.get("list")?.as_array().map(|l| l.iter().collect()),
            Shape::DataRecords => {
                let list = data?.as_array()?;
                if list.iter().any(Value::is_array) {
                    return None;
                }
                Some(list.iter().collect())
            }
            Shape::DataNested => {
                let list = data?.as_array()?;
                if !list.iter().any(Value::is_array) {
                    return None;
                }
                Some(
                    list.iter()
                        .flat_map(|item| match item {
                            Value::Array(inner) => inner.iter().collect::<Vec<_>>(),
                            other => vec![other],
                        })
                        .collect(),
                )
            }
            Shape::DataFirstValue => data?
                .as_object()?
                .values()
                .next()?
                .as_array()
                .map(|l| l.iter().collect()),
            Shape::TopLevelList => root.get("list")?.as_array().map(|l| l.iter().collect()),
        }
    }
}

/// How a record may carry its media URL
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UrlStrategy {
    /// The record is itself a URL string
    BareString,
    /// The record is an object with the URL under this key
    Field(&'static str),
}

/// URL strategies in priority order
pub const URL_STRATEGIES: [UrlStrategy; 7] = [
    UrlStrategy::BareString,
    UrlStrategy::Field("thumb"),
    UrlStrategy::Field("image"),
    UrlStrategy::Field("url"),
    UrlStrategy::Field("image_url"),
    UrlStrategy::Field("splash_url"),
    UrlStrategy::Field("img_src"),
];

impl UrlStrategy {
    /// Raw URL this strategy finds in `record`, if any
    pub fn extract<'a>(&self, record: &'a Value) -> Option<&'a str> {
        match self {
            UrlStrategy::BareString => record.as_str().filter(|s| looks_like_url(s)),
            UrlStrategy::Field(key) => record
                .get(*key)?
                .as_str()
                .filter(|s| !s.trim().is_empty()),
        }
    }
}

/// First URL any strategy finds in `record`, resolved to an absolute form
fn extract_url(record: &Value) -> Option<String> {
    URL_STRATEGIES
        .iter()
        .find_map(|strategy| strategy.extract(record))
        .and_then(resolve_url)
}

/// String or integer value under `key` as text
fn text_field(record: &Value, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn descriptor_from(record: &Value) -> Option<AssetDescriptor> {
    let source_url = extract_url(record)?;
    let expected_size = match record.get("thumb_size") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };

    Some(AssetDescriptor {
        source_url,
        identifier: text_field(record, "id"),
        display_name: ["thumb_name", "name", "title"]
            .iter()
            .find_map(|key| text_field(record, key)),
        expected_size,
    })
}

/// Top-level status code; `0` is success
fn status_code(root: &Value) -> Result<i64> {
    match root.get("code") {
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| Error::Parse(format!("status code {} is not an integer", n))),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| Error::Parse(format!("status code {:?} is not numeric", s))),
        Some(other) => Err(Error::Parse(format!("unexpected status code value {}", other))),
        None => Err(Error::Parse("response has no status code".into())),
    }
}

/// Turn a raw listing body into asset descriptors
///
/// # Errors
///
/// - [`Error::Serialization`] if the body is not JSON
/// - [`Error::Provider`] if the status code is non-zero
/// - [`Error::Parse`] if the status is missing, no known shape is present, or every
///   record lacks a URL
pub fn normalize(body: &[u8]) -> Result<Normalized> {
    let root: Value = serde_json::from_slice(body)?;
    if !root.is_object() {
        return Err(Error::Parse("response is not a JSON object".into()));
    }

    let code = status_code(&root)?;
    if code != 0 {
        let message = ["message", "msg"]
            .iter()
            .find_map(|key| root.get(*key).and_then(Value::as_str))
            .unwrap_or("Unknown error")
            .to_string();
        return Err(Error::Provider { code, message });
    }

    let mut saw_empty = false;
    for shape in SHAPES {
        let Some(records) = shape.records(&root) else {
            continue;
        };
        if records.is_empty() {
            saw_empty = true;
            continue;
        }

        let total = records.len();
        let descriptors: Vec<_> = records.into_iter().filter_map(descriptor_from).collect();
        let dropped = total - descriptors.len();
        if descriptors.is_empty() {
            return Err(Error::Parse(format!(
                "none of the {} records under {:?} has a media URL",
                total, shape
            )));
        }
        if dropped > 0 {
            warn!(dropped, total, ?shape, "Dropped records without a media URL");
        }
        debug!(?shape, count = descriptors.len(), "Normalized listing");

        return Ok(Normalized {
            descriptors,
            explicitly_empty: false,
            dropped,
        });
    }

    if saw_empty {
        return Ok(Normalized {
            descriptors: Vec::new(),
            explicitly_empty: true,
            dropped: 0,
        });
    }
    Err(Error::Parse("no known list shape in response".into()))
}

use super::test_helpers::*;
use super::*;
use crate::types::{FetchOutcome, RunStatus, SkipReason};
use serde_json::json;
use std::time::Duration;
use tempfile::tempdir;
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, ResponseTemplate};

//! Tests for the garden API client.

#![allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]

use serde_json::json;
use trellis_core::config::ApiConfig;

use super::{ClientError, GardenClient, PatchBody, encode_segment};

fn config(base_url: &str) -> ApiConfig {
    ApiConfig {
        base_url: base_url.into(),
        ..Default::default()
    }
}

#[test]
fn empty_base_url_returns_config_error() {
    let err = GardenClient::new(&config("")).unwrap_err();
    assert!(matches!(err, ClientError::Config(_)));
}

#[test]
fn token_with_newline_is_rejected() {
    let api = ApiConfig {
        token: Some("bad\ntoken".into()),
        ..config("http://localhost:2337")
    };
    let err = GardenClient::new(&api).unwrap_err();
    assert!(matches!(err, ClientError::Config(_)));
}

#[test]
fn client_without_token_is_allowed() {
    assert!(GardenClient::new(&config("http://localhost:2337")).is_ok());
}

#[test]
fn trailing_slash_stripped_from_base_url() {
    let client = GardenClient::new(&config("http://localhost:2337/")).unwrap();
    assert_eq!(
        client.api_url("/gardens/"),
        "http://localhost:2337/api/v1/gardens/"
    );
}

#[test]
fn garden_names_are_encoded() {
    let client = GardenClient::new(&config("http://localhost:2337")).unwrap();
    assert_eq!(
        client.garden_url("child one/two"),
        "http://localhost:2337/api/v1/gardens/child%20one%2Ftwo"
    );
    assert_eq!(encode_segment("plain-name_1.x~"), "plain-name_1.x~");
}

#[test]
fn patch_body_shape() {
    let body = PatchBody::single("sync", json!(""));
    assert_eq!(
        serde_json::to_value(&body).unwrap(),
        json!({"operations": [{"operation": "sync", "path": "", "value": ""}]})
    );
}

//! Garden REST API client.
//!
//! Uses reqwest to call the `/api/v1/gardens` endpoints of a garden server.

#[cfg(test)]
mod tests;

use std::fmt::Write as _;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use trellis_core::config::ApiConfig;
use trellis_core::feedback::ServerError;
use trellis_core::model::GardenRecord;

/// Garden API client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a failure status.
    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// One entry of a PATCH `operations` list.
#[derive(Debug, Serialize)]
pub(crate) struct PatchOperation {
    pub operation: &'static str,
    pub path: &'static str,
    pub value: Value,
}

#[derive(Debug, Serialize)]
pub(crate) struct PatchBody {
    pub operations: Vec<PatchOperation>,
}

impl PatchBody {
    pub(crate) fn single(operation: &'static str, value: Value) -> Self {
        Self {
            operations: vec![PatchOperation {
                operation,
                path: "",
                value,
            }],
        }
    }
}

/// Garden REST API client.
#[derive(Debug)]
pub struct GardenClient {
    http: reqwest::Client,
    base_url: String,
}

impl GardenClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ClientError> {
        if config.base_url.is_empty() {
            return Err(ClientError::Config("base_url is empty".into()));
        }

        let mut headers = HeaderMap::new();
        if let Some(token) = config.token.as_deref().filter(|t| !t.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| ClientError::Config("Invalid token format".into()))?;
            headers.insert(AUTHORIZATION, value);
        }

        // reqwest is built with rustls-no-provider; Err means already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        Ok(Self { http, base_url })
    }

    /// Build the API v1 URL for a given path.
    pub(crate) fn api_url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    pub(crate) fn garden_url(&self, name: &str) -> String {
        self.api_url(&format!("/gardens/{}", encode_segment(name)))
    }

    /// Turn a failure status into a [`ServerError`] built from the body.
    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), "Garden API request failed");
        Err(ServerError::from_response(status.as_u16(), &body).into())
    }

    pub async fn list_gardens(&self) -> Result<Vec<GardenRecord>, ClientError> {
        let resp = self.http.get(self.api_url("/gardens/")).send().await?;
        Ok(Self::check_status(resp).await?.json().await?)
    }

    pub async fn get_garden(&self, name: &str) -> Result<GardenRecord, ClientError> {
        let resp = self.http.get(self.garden_url(name)).send().await?;
        Ok(Self::check_status(resp).await?.json().await?)
    }

    pub async fn create_garden(&self, garden: &GardenRecord) -> Result<GardenRecord, ClientError> {
        let resp = self
            .http
            .post(self.api_url("/gardens/"))
            .json(garden)
            .send()
            .await?;
        Ok(Self::check_status(resp).await?.json().await?)
    }

    pub async fn delete_garden(&self, name: &str) -> Result<(), ClientError> {
        let resp = self.http.delete(self.garden_url(name)).send().await?;
        Self::check_status(resp).await?;
        Ok(())
    }

    /// Submit `garden` as a `config` patch and return the stored record.
    pub async fn update_config(&self, garden: &GardenRecord) -> Result<GardenRecord, ClientError> {
        let value = serde_json::to_value(garden)
            .map_err(|e| ClientError::Config(format!("Unserialisable garden: {e}")))?;
        let resp = self
            .http
            .patch(self.garden_url(&garden.name))
            .json(&PatchBody::single("config", value))
            .send()
            .await?;
        Ok(Self::check_status(resp).await?.json().await?)
    }

    /// Ask one garden, or every garden when `name` is `None`, to sync.
    pub async fn sync(&self, name: Option<&str>) -> Result<(), ClientError> {
        let url = name.map_or_else(|| self.api_url("/gardens/"), |n| self.garden_url(n));
        let resp = self
            .http
            .patch(url)
            .json(&PatchBody::single("sync", Value::String(String::new())))
            .send()
            .await?;
        Self::check_status(resp).await?;
        Ok(())
    }
}

/// Percent-encode everything outside the unreserved URL characters.
pub(crate) fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}

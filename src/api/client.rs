use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client as ReqwestClient, ClientBuilder};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, instrument};

use crate::models::{ErrorReply, InventoryStats, MessageReply, ScanReport, ScanRequest};

/// Client-side allowance for a sleeping backend to spin up. Applied to the
/// upload and stats endpoints only, matching the service's slow paths.
const DEFAULT_WAKE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Request timed out - the service may be waking up. Please try again.")]
    Timeout,

    #[error("Network error: {0}")]
    Network(reqwest::Error),

    #[error("Server error (status {status}): {message}")]
    Server { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Network(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// Async client for the inventory reconciliation service.
#[derive(Clone)]
pub struct ApiClient {
    client: Arc<ReqwestClient>,
    base_url: String,
    wake_timeout: Duration,
}

#[derive(Default)]
pub struct ApiClientBuilder {
    base_url: Option<String>,
    wake_timeout: Option<Duration>,
    accept_invalid_certs: bool,
}

impl ApiClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn wake_timeout(mut self, timeout: Duration) -> Self {
        self.wake_timeout = Some(timeout);
        self
    }

    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    pub fn build(self) -> Result<ApiClient> {
        let base_url = self
            .base_url
            .ok_or_else(|| ApiError::Config("Base URL must be provided".to_string()))?;

        let client = ClientBuilder::new()
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .build()
            .map_err(ApiError::Network)?;

        Ok(ApiClient {
            client: Arc::new(client),
            base_url: base_url.trim_end_matches('/').to_string(),
            wake_timeout: self.wake_timeout.unwrap_or(DEFAULT_WAKE_TIMEOUT),
        })
    }
}

impl ApiClient {
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::new()
    }

    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::builder().base_url(base_url).build()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    /// Read an error body, preferring the `error` field the service uses.
    async fn error_message(response: reqwest::Response) -> (u16, String) {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorReply>(&body)
            .map(|reply| reply.error)
            .unwrap_or_else(|_| {
                if body.is_empty() {
                    String::from("Unknown error")
                } else {
                    body
                }
            });
        (status, message)
    }

    async fn read_json<R: DeserializeOwned>(response: reqwest::Response) -> Result<R> {
        if response.status().is_success() {
            response
                .json::<R>()
                .await
                .map_err(|e| ApiError::Parse(e.to_string()))
        } else {
            let (status, message) = Self::error_message(response).await;
            error!(status, %message, "server rejected request");
            Err(ApiError::Server { status, message })
        }
    }

    /// Upload an inventory spreadsheet as multipart form data.
    #[instrument(skip(self))]
    pub async fn upload(&self, path: &Path) -> Result<String> {
        let bytes = fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("inventory.xlsx"));

        debug!(file = %file_name, size = bytes.len(), "uploading spreadsheet");

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(self.endpoint("/upload"))
            .multipart(form)
            .timeout(self.wake_timeout)
            .send()
            .await?;

        let reply: MessageReply = Self::read_json(response).await?;
        Ok(reply.message)
    }

    /// Submit a barcode with its (possibly empty) scanned location.
    #[instrument(skip(self))]
    pub async fn scan(&self, barcode: &str, location: &str) -> Result<ScanReport> {
        let request = ScanRequest {
            barcode: barcode.to_string(),
            location: location.to_string(),
        };

        let response = self
            .client
            .post(self.endpoint("/scan"))
            .json(&request)
            .send()
            .await?;

        Self::read_json(response).await
    }

    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<InventoryStats> {
        let response = self
            .client
            .get(self.endpoint("/stats"))
            .timeout(self.wake_timeout)
            .send()
            .await?;

        Self::read_json(response).await
    }

    /// Download the reconciliation report to `dest`. Returns bytes written.
    #[instrument(skip(self))]
    pub async fn export(&self, dest: &Path) -> Result<u64> {
        let response = self.client.get(self.endpoint("/export")).send().await?;

        if !response.status().is_success() {
            let (status, message) = Self::error_message(response).await;
            return Err(ApiError::Server { status, message });
        }

        let bytes = response.bytes().await.map_err(ApiError::from)?;
        fs::write(dest, &bytes).await?;
        Ok(bytes.len() as u64)
    }

    /// Clear all scan data on the service. The inventory itself is kept.
    #[instrument(skip(self))]
    pub async fn reset(&self) -> Result<String> {
        let response = self.client.post(self.endpoint("/reset")).send().await?;
        let reply: MessageReply = Self::read_json(response).await?;
        Ok(reply.message)
    }
}

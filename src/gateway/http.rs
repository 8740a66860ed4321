// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! HTTP implementation of the gateway.
//!
//! # Example
//!
//! ```no_run
//! use tubeshelf::gateway::{HttpGateway, TaskGateway};
//! use tubeshelf::types::SearchCriteria;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let gateway = HttpGateway::with_url("http://localhost:8000/api")?;
//!
//! let videos = gateway.list_videos(&SearchCriteria::new("cats", 20)).await?;
//! for video in videos {
//!     println!("{}", video.display_title());
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::TaskGateway;
use crate::config::ClientConfig;
use crate::error::GatewayError;
use crate::types::{
    Channel, DownloadTask, ScanSummary, SearchCriteria, Video, VideoMetadataPreview, VideoPatch,
};

/// Default timeout for every backend call (in seconds).
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Connect timeout (in seconds).
const CONNECT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Serialize)]
struct UrlBody<'a> {
    url: &'a str,
}

#[derive(Debug, Serialize)]
struct DownloadBody<'a> {
    url: &'a str,
    quality: &'a str,
}

#[derive(Debug, Serialize)]
struct ScanBody {
    recursive: bool,
}

/// Response of `POST /download`.
#[derive(Debug, Deserialize)]
struct CreateTaskResponse {
    task_id: String,
    #[serde(default)]
    #[allow(dead_code)]
    message: Option<String>,
}

/// Client for the library backend.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    /// Base URL including the `/api` prefix, without trailing slash.
    base_url: String,
    client: Client,
}

impl HttpGateway {
    /// Build a gateway from the client config.
    pub fn new(config: &ClientConfig) -> Result<Self, GatewayError> {
        Self::with_timeout(&config.api_url, config.request_timeout())
    }

    /// Build a gateway for `url` with the default 30 second timeout.
    pub fn with_url(url: impl Into<String>) -> Result<Self, GatewayError> {
        Self::with_timeout(url, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS).min(timeout))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            base_url: url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and check the status, mapping failures onto the taxonomy.
    async fn send(&self, request: RequestBuilder) -> Result<Response, GatewayError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = extract_detail(&body);
        tracing::debug!(status = status.as_u16(), ?detail, "backend rejected request");
        Err(GatewayError::backend(status.as_u16(), detail))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, GatewayError> {
        let response = self.send(request).await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        decode_body(status, &body)
    }
}

/// Parse a success body. A body that does not match the expected shape is a
/// backend fault and ends the operation instead of being retried.
fn decode_body<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, GatewayError> {
    serde_json::from_str(body).map_err(|e| {
        tracing::debug!(status, error = %e, "unexpected response body");
        GatewayError::backend(status, Some(format!("unreadable response body: {}", e)))
    })
}

/// Pull the `detail` field out of an error body.
///
/// Validation errors carry a list of problems instead of a string; those are
/// kept as compact JSON.
fn extract_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl TaskGateway for HttpGateway {
    async fn probe_metadata(&self, url: &str) -> Result<VideoMetadataPreview, GatewayError> {
        tracing::debug!(url, "probing metadata");
        let request = self
            .client
            .post(self.endpoint("/download/metadata"))
            .json(&UrlBody { url });
        self.send_json(request).await
    }

    async fn create_download_task(&self, url: &str, quality: &str) -> Result<String, GatewayError> {
        let request = self
            .client
            .post(self.endpoint("/download"))
            .json(&DownloadBody { url, quality });
        let created: CreateTaskResponse = self.send_json(request).await?;
        tracing::info!(task_id = %created.task_id, url, quality, "download task created");
        Ok(created.task_id)
    }

    async fn poll_task(&self, task_id: &str) -> Result<DownloadTask, GatewayError> {
        let request = self.client.get(self.endpoint(&format!("/download/{}", task_id)));
        self.send_json(request).await
    }

    async fn cancel_task(&self, task_id: &str) -> Result<(), GatewayError> {
        let request = self.client.delete(self.endpoint(&format!("/download/{}", task_id)));
        self.send(request).await?;
        Ok(())
    }

    async fn list_videos(&self, criteria: &SearchCriteria) -> Result<Vec<Video>, GatewayError> {
        let request = self
            .client
            .get(self.endpoint("/videos"))
            .query(&criteria.query_pairs());
        self.send_json(request).await
    }

    async fn get_video(&self, id: &str) -> Result<Video, GatewayError> {
        let request = self.client.get(self.endpoint(&format!("/videos/{}", id)));
        self.send_json(request).await
    }

    async fn patch_video(&self, id: &str, patch: &VideoPatch) -> Result<Video, GatewayError> {
        let request = self
            .client
            .patch(self.endpoint(&format!("/videos/{}", id)))
            .json(patch);
        self.send_json(request).await
    }

    async fn delete_video(&self, id: &str) -> Result<(), GatewayError> {
        let request = self.client.delete(self.endpoint(&format!("/videos/{}", id)));
        self.send(request).await?;
        tracing::info!(id, "video removed from library");
        Ok(())
    }

    async fn list_channels(&self) -> Result<Vec<Channel>, GatewayError> {
        let request = self.client.get(self.endpoint("/channels"));
        self.send_json(request).await
    }

    async fn trigger_scan(&self, recursive: bool) -> Result<ScanSummary, GatewayError> {
        let request = self
            .client
            .post(self.endpoint("/scan"))
            .json(&ScanBody { recursive });
        self.send_json(request).await
    }

    async fn list_downloads(&self) -> Result<Vec<DownloadTask>, GatewayError> {
        let request = self.client.get(self.endpoint("/downloads"));
        self.send_json(request).await
    }

    async fn health_check(&self) -> Result<serde_json::Value, GatewayError> {
        let request = self.client.get(self.endpoint("/health"));
        self.send_json(request).await
    }
}

// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Remote Task Gateway
//!
//! Typed request/response boundary to the library backend. The orchestrator
//! only ever talks to a [`TaskGateway`]; [`HttpGateway`] is the production
//! implementation and tests inject scripted ones.
//!
//! No retries happen here. Retry and backoff belong to the download state
//! machine, where timing matters.

pub mod http;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::GatewayError;
use crate::types::{
    Channel, DownloadTask, ScanSummary, SearchCriteria, Video, VideoMetadataPreview, VideoPatch,
};

pub use http::HttpGateway;

/// Recognized video-host URL shape.
static VIDEO_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(https?://)?(www\.)?(youtube\.com|youtu\.be)/.+$")
        .expect("video URL pattern is valid")
});

/// Check a URL against the recognized host shape before any probe.
pub fn validate_video_url(url: &str) -> Result<(), GatewayError> {
    if VIDEO_URL_RE.is_match(url) {
        Ok(())
    } else {
        Err(GatewayError::Validation(format!(
            "not a recognized video URL: {}",
            url
        )))
    }
}

/// Backend operations consumed by the orchestrator.
///
/// Every call is asynchronous and bounded by the implementation's timeout.
#[async_trait]
pub trait TaskGateway: Send + Sync {
    /// `POST /download/metadata`
    async fn probe_metadata(&self, url: &str) -> Result<VideoMetadataPreview, GatewayError>;

    /// `POST /download`; returns the backend task id without waiting for the download.
    async fn create_download_task(&self, url: &str, quality: &str) -> Result<String, GatewayError>;

    /// `GET /download/{task_id}`; side-effect free.
    async fn poll_task(&self, task_id: &str) -> Result<DownloadTask, GatewayError>;

    /// `DELETE /download/{task_id}`; best effort.
    async fn cancel_task(&self, task_id: &str) -> Result<(), GatewayError>;

    /// `GET /videos?search=&limit=`, plus whichever filters are set.
    async fn list_videos(&self, criteria: &SearchCriteria) -> Result<Vec<Video>, GatewayError>;

    /// `GET /videos/{id}`
    async fn get_video(&self, id: &str) -> Result<Video, GatewayError>;

    /// `PATCH /videos/{id}`
    async fn patch_video(&self, id: &str, patch: &VideoPatch) -> Result<Video, GatewayError>;

    /// `DELETE /videos/{id}`; removes the catalog record, not the media file.
    async fn delete_video(&self, id: &str) -> Result<(), GatewayError>;

    /// `GET /channels`; distinct channel names in the catalog.
    async fn list_channels(&self) -> Result<Vec<Channel>, GatewayError>;

    /// `POST /scan`
    async fn trigger_scan(&self, recursive: bool) -> Result<ScanSummary, GatewayError>;

    /// `GET /downloads`; every task the backend still tracks.
    async fn list_downloads(&self) -> Result<Vec<DownloadTask>, GatewayError>;

    /// `GET /health`
    async fn health_check(&self) -> Result<serde_json::Value, GatewayError>;
}

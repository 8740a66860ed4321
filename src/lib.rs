// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! tubeshelf - client orchestrator for a self-hosted video library
//!
//! Probe a video URL, start a backend download, follow it to completion and
//! keep the local library view in step with the backend catalog.
//!
//! # Core Modules
//!
//! - [`facade`] - Single entry point: intents in, immutable view snapshots out
//! - [`download`] - Download form state machine, poll loop and confirmation delay
//! - [`library`] - Cached video list, searches and reload triggers
//! - [`watch`] - Mark-watched-on-open reconciliation
//! - [`gateway`] - Typed boundary to the backend REST API
//! - [`config`] - Client configuration file and environment overrides
//! - [`error`] - Gateway errors and consistent error formatting

pub mod config;
pub mod download;
pub mod error;
pub mod events;
pub mod facade;
pub mod gateway;
pub mod library;
pub mod types;
pub mod watch;

pub use config::ClientConfig;
pub use download::{DownloadPhase, DownloadView, Quality};
pub use error::GatewayError;
pub use facade::{Intent, Orchestrator, OrchestratorHandle, ViewState};
pub use gateway::{HttpGateway, TaskGateway};
pub use types::{
    Channel, DownloadTask, ScanSummary, SearchCriteria, TaskStatus, Video, VideoMetadataPreview,
};

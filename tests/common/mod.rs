// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Scripted gateway shared by the scenario tests.
//!
//! Responses are set up front per URL, query or task. Any call can be held
//! behind a gate until the test releases it, which is how out-of-order
//! completions are produced deterministically. Every call is recorded.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

use tubeshelf::config::ClientConfig;
use tubeshelf::facade::{Orchestrator, OrchestratorHandle};
use tubeshelf::types::{
    Channel, DownloadTask, FormatOption, ScanSummary, SearchCriteria, TaskStatus, Video,
    VideoMetadataPreview, VideoPatch,
};
use tubeshelf::{GatewayError, TaskGateway};

/// One recorded gateway call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Probe(String),
    Create { url: String, quality: String },
    Poll(String),
    Cancel(String),
    List(String),
    Get(String),
    Patch { id: String, watched: Option<bool> },
    Delete(String),
    Channels,
    Scan(bool),
    ListDownloads,
    Health,
}

#[derive(Default)]
struct Script {
    probes: HashMap<String, Result<VideoMetadataPreview, GatewayError>>,
    create: VecDeque<Result<String, GatewayError>>,
    polls: VecDeque<Result<DownloadTask, GatewayError>>,
    /// Repeated once the scripted polls run out.
    poll_fallback: Option<Result<DownloadTask, GatewayError>>,
    cancel: Option<Result<(), GatewayError>>,
    listings: HashMap<String, Result<Vec<Video>, GatewayError>>,
    scan: Option<Result<ScanSummary, GatewayError>>,
    patch: Option<GatewayError>,

    probe_gates: HashMap<String, oneshot::Receiver<()>>,
    listing_gates: HashMap<String, oneshot::Receiver<()>>,
    /// Taken in order, one per create call.
    create_gates: VecDeque<oneshot::Receiver<()>>,
    scan_gate: Option<oneshot::Receiver<()>>,

    calls: Vec<Call>,
}

#[derive(Default)]
pub struct ScriptedGateway {
    script: Mutex<Script>,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with<R>(&self, f: impl FnOnce(&mut Script) -> R) -> R {
        let mut script = self.script.lock().unwrap();
        f(&mut script)
    }

    pub fn on_probe(&self, url: &str, result: Result<VideoMetadataPreview, GatewayError>) {
        self.with(|s| s.probes.insert(url.to_string(), result));
    }

    pub fn on_create(&self, result: Result<String, GatewayError>) {
        self.with(|s| s.create.push_back(result));
    }

    /// Queue poll responses, returned in order.
    pub fn on_polls(&self, results: Vec<Result<DownloadTask, GatewayError>>) {
        self.with(|s| s.polls.extend(results));
    }

    pub fn poll_fallback(&self, result: Result<DownloadTask, GatewayError>) {
        self.with(|s| s.poll_fallback = Some(result));
    }

    pub fn on_cancel(&self, result: Result<(), GatewayError>) {
        self.with(|s| s.cancel = Some(result));
    }

    pub fn on_listing(&self, query: &str, result: Result<Vec<Video>, GatewayError>) {
        self.with(|s| s.listings.insert(query.to_string(), result));
    }

    pub fn on_scan(&self, result: Result<ScanSummary, GatewayError>) {
        self.with(|s| s.scan = Some(result));
    }

    pub fn fail_patches(&self, error: GatewayError) {
        self.with(|s| s.patch = Some(error));
    }

    /// Hold the probe for `url` until the returned sender fires.
    pub fn gate_probe(&self, url: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.with(|s| s.probe_gates.insert(url.to_string(), rx));
        tx
    }

    /// Hold the listing for `query` until the returned sender fires.
    pub fn gate_listing(&self, query: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.with(|s| s.listing_gates.insert(query.to_string(), rx));
        tx
    }

    /// Hold the next create call that has not been gated yet.
    pub fn gate_create(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.with(|s| s.create_gates.push_back(rx));
        tx
    }

    pub fn gate_scan(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.with(|s| s.scan_gate = Some(rx));
        tx
    }

    pub fn calls(&self) -> Vec<Call> {
        self.with(|s| s.calls.clone())
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.with(|s| s.calls.iter().filter(|c| pred(c)).count())
    }

    pub fn probes(&self) -> usize {
        self.count(|c| matches!(c, Call::Probe(_)))
    }

    pub fn polls(&self) -> usize {
        self.count(|c| matches!(c, Call::Poll(_)))
    }

    pub fn listings(&self) -> usize {
        self.count(|c| matches!(c, Call::List(_)))
    }

    pub fn patches(&self) -> usize {
        self.count(|c| matches!(c, Call::Patch { .. }))
    }

    pub fn cancels(&self) -> usize {
        self.count(|c| matches!(c, Call::Cancel(_)))
    }

    fn record(&self, call: Call) {
        self.with(|s| s.calls.push(call));
    }
}

async fn pass(gate: Option<oneshot::Receiver<()>>) {
    if let Some(gate) = gate {
        let _ = gate.await;
    }
}

#[async_trait]
impl TaskGateway for ScriptedGateway {
    async fn probe_metadata(&self, url: &str) -> Result<VideoMetadataPreview, GatewayError> {
        self.record(Call::Probe(url.to_string()));
        let gate = self.with(|s| s.probe_gates.remove(url));
        pass(gate).await;
        self.with(|s| s.probes.get(url).cloned())
            .unwrap_or_else(|| Err(GatewayError::backend(404, Some("Video not found".into()))))
    }

    async fn create_download_task(&self, url: &str, quality: &str) -> Result<String, GatewayError> {
        self.record(Call::Create {
            url: url.to_string(),
            quality: quality.to_string(),
        });
        let gate = self.with(|s| s.create_gates.pop_front());
        pass(gate).await;
        self.with(|s| s.create.pop_front())
            .unwrap_or_else(|| Err(GatewayError::backend(500, None)))
    }

    async fn poll_task(&self, task_id: &str) -> Result<DownloadTask, GatewayError> {
        self.record(Call::Poll(task_id.to_string()));
        self.with(|s| s.polls.pop_front().or_else(|| s.poll_fallback.clone()))
            .unwrap_or_else(|| Err(GatewayError::backend(404, Some("Task not found".into()))))
    }

    async fn cancel_task(&self, task_id: &str) -> Result<(), GatewayError> {
        self.record(Call::Cancel(task_id.to_string()));
        self.with(|s| s.cancel.clone()).unwrap_or(Ok(()))
    }

    async fn list_videos(&self, criteria: &SearchCriteria) -> Result<Vec<Video>, GatewayError> {
        self.record(Call::List(criteria.query.clone()));
        let gate = self.with(|s| s.listing_gates.remove(&criteria.query));
        pass(gate).await;
        self.with(|s| s.listings.get(&criteria.query).cloned())
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn get_video(&self, id: &str) -> Result<Video, GatewayError> {
        self.record(Call::Get(id.to_string()));
        Ok(video(id, "Clip", false))
    }

    async fn patch_video(&self, id: &str, patch: &VideoPatch) -> Result<Video, GatewayError> {
        self.record(Call::Patch {
            id: id.to_string(),
            watched: patch.watched,
        });
        match self.with(|s| s.patch.clone()) {
            Some(e) => Err(e),
            None => Ok(video(id, "Clip", true)),
        }
    }

    async fn delete_video(&self, id: &str) -> Result<(), GatewayError> {
        self.record(Call::Delete(id.to_string()));
        Ok(())
    }

    async fn list_channels(&self) -> Result<Vec<Channel>, GatewayError> {
        self.record(Call::Channels);
        Ok(vec![Channel { name: "Channel".into() }])
    }

    async fn trigger_scan(&self, recursive: bool) -> Result<ScanSummary, GatewayError> {
        self.record(Call::Scan(recursive));
        let gate = self.with(|s| s.scan_gate.take());
        pass(gate).await;
        self.with(|s| s.scan.clone()).unwrap_or_else(|| {
            Ok(ScanSummary {
                status: "completed".into(),
                videos_found: 0,
                videos_added: 0,
                errors: Vec::new(),
            })
        })
    }

    async fn list_downloads(&self) -> Result<Vec<DownloadTask>, GatewayError> {
        self.record(Call::ListDownloads);
        Ok(Vec::new())
    }

    async fn health_check(&self) -> Result<serde_json::Value, GatewayError> {
        self.record(Call::Health);
        Ok(serde_json::json!({ "status": "ok" }))
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub fn video(id: &str, title: &str, watched: bool) -> Video {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "title": title,
        "channel_name": "Channel",
        "file_path": format!("/media/{}.mp4", id),
        "watched": watched,
    }))
    .unwrap()
}

pub fn preview(title: &str) -> VideoMetadataPreview {
    VideoMetadataPreview {
        title: Some(title.to_string()),
        uploader: Some("Uploader".into()),
        duration: Some(212.0),
        formats: vec![
            FormatOption {
                format_id: "137".into(),
                resolution: "1080p".into(),
                ext: "mp4".into(),
                filesize: None,
            },
            FormatOption {
                format_id: "22".into(),
                resolution: "720p".into(),
                ext: "mp4".into(),
                filesize: Some(50_000_000),
            },
        ],
        ..Default::default()
    }
}

pub fn task(id: &str, status: TaskStatus, progress: f64) -> Result<DownloadTask, GatewayError> {
    let mut t = DownloadTask::pending(id);
    t.status = status;
    t.progress = progress;
    Ok(t)
}

pub fn config() -> ClientConfig {
    ClientConfig {
        poll_interval_ms: 1000,
        completion_delay_ms: 2000,
        max_poll_failures: 3,
        ..ClientConfig::default()
    }
}

/// Start an orchestrator and wait for the initial listing to land.
pub async fn start(gateway: &Arc<ScriptedGateway>) -> OrchestratorHandle {
    let handle = Orchestrator::spawn(gateway.clone(), &config());
    handle.wait_for(|v| !v.loading && v.revision > 1).await.unwrap();
    handle
}

/// Let spawned tasks run without advancing time.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

pub const SECOND: Duration = Duration::from_secs(1);

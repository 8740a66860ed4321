// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Orchestration facade.
//!
//! The single entry point for a presentation layer. Intents are sent to a
//! background worker that owns every component and processes them strictly one
//! at a time, in submission order. After each intent, and after each backend
//! completion that changes something, the worker publishes a fresh immutable
//! [`ViewState`].
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tubeshelf::config::ClientConfig;
//! use tubeshelf::facade::Orchestrator;
//! use tubeshelf::gateway::HttpGateway;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ClientConfig::default();
//! let gateway = Arc::new(HttpGateway::new(&config)?);
//! let handle = Orchestrator::spawn(gateway, &config);
//!
//! let view = handle.search("cats").await?;
//! println!("{} videos, loading: {}", view.videos.len(), view.loading);
//!
//! handle.open_download_form().await?;
//! handle.edit_url("https://youtu.be/abc123").await?;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::download::{CloseOutcome, DownloadMachine, DownloadView, PollSettings, Quality};
use crate::events::{Event, EventSender};
use crate::gateway::TaskGateway;
use crate::library::LibrarySync;
use crate::types::{ScanSummary, SearchCriteria, Video};
use crate::watch::WatchReconciler;

/// Capacity of the intent channel.
const COMMAND_BUFFER: usize = 100;

/// Shown when a scan reports an error status without any messages.
const SCAN_FAILURE: &str = "Scan failed";

/// User intents accepted by the facade.
#[derive(Debug, Clone)]
pub enum Intent {
    Search(String),
    OpenDownloadForm,
    EditUrl(String),
    SelectQuality(Quality),
    SubmitDownload,
    CancelDownload,
    CloseDownloadForm,
    TriggerScan,
    OpenVideo(Video),
    CloseVideo,
}

impl Intent {
    fn name(&self) -> &'static str {
        match self {
            Intent::Search(_) => "search",
            Intent::OpenDownloadForm => "open_download_form",
            Intent::EditUrl(_) => "edit_url",
            Intent::SelectQuality(_) => "select_quality",
            Intent::SubmitDownload => "submit_download",
            Intent::CancelDownload => "cancel_download",
            Intent::CloseDownloadForm => "close_download_form",
            Intent::TriggerScan => "trigger_scan",
            Intent::OpenVideo(_) => "open_video",
            Intent::CloseVideo => "close_video",
        }
    }
}

/// Immutable snapshot of everything the presentation layer shows.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct ViewState {
    /// Incremented on every published snapshot.
    pub revision: u64,
    pub query: String,
    pub videos: Vec<Video>,
    pub loading: bool,
    pub scanning: bool,
    /// Present while the download form is open.
    pub download: Option<DownloadView>,
    pub opened_video: Option<Video>,
    /// Last listing failure; the previous list is still shown.
    pub library_error: Option<String>,
    pub last_scan: Option<ScanSummary>,
    pub scan_error: Option<String>,
}

impl ViewState {
    /// Non-blocking notice for a recovered error, if any.
    pub fn notice(&self) -> Option<&str> {
        self.scan_error
            .as_deref()
            .or(self.library_error.as_deref())
            .or_else(|| self.download.as_ref().and_then(|d| d.probe_error.as_deref()))
    }

    /// Progress of the tracked download in `[0, 100]`.
    pub fn download_progress(&self) -> Option<f64> {
        self.download
            .as_ref()
            .and_then(|d| d.phase.task())
            .map(|t| t.progress_percent())
    }
}

enum Command {
    Intent {
        intent: Intent,
        reply: oneshot::Sender<ViewState>,
    },
    Shutdown,
}

/// Handle to a running orchestrator.
///
/// Each intent method resolves to the snapshot published right after the
/// intent was applied. Later changes caused by backend completions are
/// observable through [`OrchestratorHandle::subscribe`].
#[derive(Debug)]
pub struct OrchestratorHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<ViewState>,
    worker: JoinHandle<()>,
}

impl OrchestratorHandle {
    /// Send an intent and wait for the resulting snapshot.
    pub async fn dispatch(&self, intent: Intent) -> Result<ViewState> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Intent { intent, reply })
            .await
            .map_err(|_| anyhow::anyhow!("orchestrator worker has stopped"))?;
        rx.await.context("orchestrator worker dropped the intent")
    }

    pub async fn search(&self, query: impl Into<String>) -> Result<ViewState> {
        self.dispatch(Intent::Search(query.into())).await
    }

    pub async fn open_download_form(&self) -> Result<ViewState> {
        self.dispatch(Intent::OpenDownloadForm).await
    }

    pub async fn edit_url(&self, url: impl Into<String>) -> Result<ViewState> {
        self.dispatch(Intent::EditUrl(url.into())).await
    }

    pub async fn select_quality(&self, quality: Quality) -> Result<ViewState> {
        self.dispatch(Intent::SelectQuality(quality)).await
    }

    pub async fn submit_download(&self) -> Result<ViewState> {
        self.dispatch(Intent::SubmitDownload).await
    }

    pub async fn cancel_download(&self) -> Result<ViewState> {
        self.dispatch(Intent::CancelDownload).await
    }

    pub async fn close_download_form(&self) -> Result<ViewState> {
        self.dispatch(Intent::CloseDownloadForm).await
    }

    pub async fn trigger_scan(&self) -> Result<ViewState> {
        self.dispatch(Intent::TriggerScan).await
    }

    pub async fn open_video(&self, video: Video) -> Result<ViewState> {
        self.dispatch(Intent::OpenVideo(video)).await
    }

    pub async fn close_video(&self) -> Result<ViewState> {
        self.dispatch(Intent::CloseVideo).await
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> ViewState {
        self.view.borrow().clone()
    }

    /// Receiver notified on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.view.clone()
    }

    /// Wait until a snapshot satisfies `predicate` and return it.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<ViewState>
    where
        F: FnMut(&ViewState) -> bool,
    {
        let mut rx = self.view.clone();
        let view = rx
            .wait_for(|v| predicate(v))
            .await
            .map_err(|_| anyhow::anyhow!("orchestrator worker has stopped"))?;
        Ok(view.clone())
    }

    /// Stop the worker. Timers are released and running backend downloads
    /// continue, but backend cancels already requested are awaited first.
    pub async fn shutdown(self) -> Result<()> {
        // The worker may already be gone; nothing left to stop then.
        let _ = self.commands.send(Command::Shutdown).await;
        self.worker.await.context("orchestrator worker panicked")?;
        Ok(())
    }
}

/// Owner of all client-side state. Lives inside the worker task.
pub struct Orchestrator {
    gateway: Arc<dyn TaskGateway>,
    events: EventSender,
    settings: PollSettings,
    scan_recursive: bool,

    library: LibrarySync,
    watch: WatchReconciler,
    download: Option<DownloadMachine>,
    /// Backend cancels handed over by closed forms.
    cancellations: Vec<JoinHandle<()>>,
    next_form: u64,
    opened: Option<Video>,
    scanning: bool,
    last_scan: Option<ScanSummary>,
    scan_error: Option<String>,

    revision: u64,
    view: watch::Sender<ViewState>,
}

impl Orchestrator {
    /// Start the worker and perform the initial library load.
    pub fn spawn(gateway: Arc<dyn TaskGateway>, config: &ClientConfig) -> OrchestratorHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(ViewState::default());

        let settings = PollSettings {
            interval: config.poll_interval(),
            completion_delay: config.completion_delay(),
            max_failures: config.max_poll_failures.max(1),
        };
        let criteria = SearchCriteria::new("", config.search_limit);

        let mut orchestrator = Orchestrator {
            library: LibrarySync::new(gateway.clone(), event_tx.clone(), criteria),
            watch: WatchReconciler::new(gateway.clone()),
            gateway,
            events: event_tx,
            settings,
            scan_recursive: config.scan_recursive,
            download: None,
            cancellations: Vec::new(),
            next_form: 0,
            opened: None,
            scanning: false,
            last_scan: None,
            scan_error: None,
            revision: 0,
            view: view_tx,
        };

        let worker = tokio::spawn(async move {
            orchestrator.library.reload();
            orchestrator.publish();
            orchestrator.run(command_rx, event_rx).await;
        });

        OrchestratorHandle {
            commands: command_tx,
            view: view_rx,
            worker,
        }
    }

    /// Worker loop: one intent or one completion at a time.
    async fn run(
        &mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Intent { intent, reply }) => {
                        self.apply(intent);
                        let view = self.publish();
                        let _ = reply.send(view);
                    }
                    Some(Command::Shutdown) | None => break,
                },
                Some(event) = events.recv() => {
                    if self.handle_event(event) {
                        self.publish();
                    }
                }
            }
        }

        if let Some(machine) = self.download.take() {
            self.retire(machine);
        }
        let pending = std::mem::take(&mut self.cancellations);
        if !pending.is_empty() {
            tracing::debug!(count = pending.len(), "waiting for backend cancels");
        }
        for handle in pending {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "backend cancel task failed");
            }
        }
        tracing::debug!("orchestrator worker stopped");
    }

    fn apply(&mut self, intent: Intent) {
        tracing::debug!(intent = intent.name(), "intent");
        match intent {
            Intent::Search(query) => self.library.set_search(query),
            Intent::OpenDownloadForm => {
                if self.download.is_none() {
                    self.next_form += 1;
                    self.download = Some(DownloadMachine::new(
                        self.next_form,
                        self.gateway.clone(),
                        self.events.clone(),
                        self.settings,
                    ));
                }
            }
            Intent::EditUrl(url) => {
                if let Some(machine) = self.download.as_mut() {
                    machine.edit_url(url);
                }
            }
            Intent::SelectQuality(quality) => {
                if let Some(machine) = self.download.as_mut() {
                    machine.select_quality(quality);
                }
            }
            Intent::SubmitDownload => {
                if let Some(machine) = self.download.as_mut() {
                    machine.submit();
                }
            }
            Intent::CancelDownload => {
                if let Some(machine) = self.download.as_mut() {
                    machine.cancel();
                }
            }
            Intent::CloseDownloadForm => self.close_download_form(),
            Intent::TriggerScan => self.start_scan(),
            Intent::OpenVideo(video) => {
                self.watch.on_video_opened(&video, &mut self.library, Utc::now());
                let held = self.library.find(&video.id).cloned().unwrap_or(video);
                self.opened = Some(held);
            }
            Intent::CloseVideo => {
                if self.opened.take().is_some() {
                    self.library.on_player_closed();
                }
            }
        }
    }

    fn close_download_form(&mut self) {
        let Some(machine) = self.download.take() else {
            return;
        };
        if self.retire(machine) == CloseOutcome::CompletedPendingConfirmation {
            self.library.on_download_completed();
        }
    }

    /// Close a form, keeping its unfinished backend cancels.
    fn retire(&mut self, mut machine: DownloadMachine) -> CloseOutcome {
        self.cancellations.retain(|h| !h.is_finished());
        self.cancellations.extend(machine.take_cancellations());
        machine.close()
    }

    fn start_scan(&mut self) {
        if self.scanning {
            tracing::debug!("scan already in progress");
            return;
        }
        self.scanning = true;
        self.scan_error = None;

        let gateway = self.gateway.clone();
        let events = self.events.clone();
        let recursive = self.scan_recursive;
        tokio::spawn(async move {
            let result = gateway.trigger_scan(recursive).await;
            let _ = events.send(Event::ScanFinished { result });
        });
    }

    /// Apply a backend completion. Returns true if the view changed.
    fn handle_event(&mut self, event: Event) -> bool {
        if let Some(form) = event.form() {
            let current = self.download.as_ref().map(|m| m.form());
            if current != Some(form) {
                tracing::debug!(form, ?current, "event for closed download form dropped");
                return false;
            }
        }

        match event {
            Event::MetadataArrived { seq, url, result, .. } => self
                .download
                .as_mut()
                .is_some_and(|m| m.on_metadata(seq, &url, result)),
            Event::TaskCreated { attempt, result, .. } => self
                .download
                .as_mut()
                .is_some_and(|m| m.on_task_created(attempt, result)),
            Event::TaskPolled { task_id, seq, result, .. } => self
                .download
                .as_mut()
                .is_some_and(|m| m.on_task_polled(&task_id, seq, result)),
            Event::ConfirmationElapsed { .. } => {
                let finished = self
                    .download
                    .as_mut()
                    .is_some_and(|m| m.on_confirmation_elapsed());
                if finished {
                    if let Some(machine) = self.download.take() {
                        self.retire(machine);
                    }
                    self.library.on_download_completed();
                }
                finished
            }
            Event::ListingArrived { generation, result } => {
                let changed = self.library.on_listing(generation, result);
                if changed {
                    self.refresh_opened();
                }
                changed
            }
            Event::ScanFinished { result } => {
                self.scanning = false;
                match result {
                    Ok(summary) => {
                        if summary.is_error() {
                            tracing::error!(errors = ?summary.errors, "scan reported an error");
                            self.scan_error = Some(
                                summary
                                    .errors
                                    .first()
                                    .cloned()
                                    .unwrap_or_else(|| SCAN_FAILURE.to_string()),
                            );
                        } else {
                            tracing::info!(
                                found = summary.videos_found,
                                added = summary.videos_added,
                                "scan completed"
                            );
                        }
                        self.last_scan = Some(summary);
                        self.library.on_scan_completed();
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "scan failed");
                        self.scan_error = Some(e.user_detail());
                    }
                }
                true
            }
        }
    }

    /// Keep the opened video in step with the freshest listing.
    fn refresh_opened(&mut self) {
        if let Some(opened) = self.opened.as_mut() {
            if let Some(fresh) = self.library.find(&opened.id) {
                *opened = fresh.clone();
            }
        }
    }

    fn snapshot(&self) -> ViewState {
        ViewState {
            revision: self.revision,
            query: self.library.criteria().query.clone(),
            videos: self.library.videos().to_vec(),
            loading: self.library.is_loading(),
            scanning: self.scanning,
            download: self.download.as_ref().map(|m| m.view()),
            opened_video: self.opened.clone(),
            library_error: self.library.error().map(str::to_string),
            last_scan: self.last_scan.clone(),
            scan_error: self.scan_error.clone(),
        }
    }

    fn publish(&mut self) -> ViewState {
        self.revision += 1;
        let view = self.snapshot();
        self.view.send_replace(view.clone());
        view
    }
}

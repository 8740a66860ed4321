// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Download task state machine.
//!
//! One [`DownloadMachine`] exists per open download form. It turns a URL into a
//! probed preview, a created backend task, a polled progress stream and finally
//! a terminal outcome.
//!
//! ```text
//! Idle ──edit──▶ AwaitingMetadata ──preview──▶ MetadataReady ──submit──▶ Submitting
//!  ▲                   │ probe failed                                      │ created
//!  └───────────────────┘                                                   ▼
//!          Failed ◀──────── error / lost contact ──────────────────── Polling ──completed──▶ Completed
//! ```
//!
//! Backend calls are spawned and report back as [`Event`]s. Every result is
//! checked against the current form state before it is applied:
//!
//! - probes by sequence number and originating URL (last edit wins)
//! - task creation by submit attempt
//! - polls by task id and poll sequence
//!
//! A cancel that lands while a task is still being created cannot reach the
//! backend yet. Each submit shares a [`SubmitSlot`] with its create call, and
//! whichever side finishes second sends the backend cancel. Neither the form
//! nor the orchestrator has to outlive the create call for that to happen.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;

use crate::error::GatewayError;
use crate::events::{Event, EventSender};
use crate::gateway::{validate_video_url, TaskGateway};
use crate::types::{DownloadTask, TaskStatus, VideoMetadataPreview};

use super::poller::{spawn_confirmation, spawn_poller, TimerHandle};
use super::types::{
    DownloadPhase, DownloadView, PollSettings, Quality, CANCELLED_FAILURE, GENERIC_FAILURE,
};

/// Outcome of closing a form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Nothing left to report.
    Discarded,
    /// The download had completed but the confirmation delay had not elapsed yet.
    /// The catalog still changed, so the caller must signal download completion.
    CompletedPendingConfirmation,
}

/// Hand-off between a create call in flight and a cancel of its attempt.
#[derive(Debug, Default)]
struct SubmitSlot {
    cancelled: bool,
    task_id: Option<String>,
}

fn lock(slot: &Mutex<SubmitSlot>) -> MutexGuard<'_, SubmitSlot> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!("submit slot lock poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

struct PendingSubmit {
    slot: Arc<Mutex<SubmitSlot>>,
    create: JoinHandle<()>,
}

async fn cancel_backend_task(gateway: &dyn TaskGateway, task_id: &str) {
    match gateway.cancel_task(task_id).await {
        Ok(()) => tracing::info!(%task_id, "backend task cancelled"),
        Err(e) if e.is_not_found() => tracing::debug!(%task_id, "task already gone on backend"),
        Err(e) => tracing::warn!(%task_id, error = %e, "failed to cancel backend task"),
    }
}

pub struct DownloadMachine {
    form: u64,
    gateway: Arc<dyn TaskGateway>,
    events: EventSender,
    settings: PollSettings,

    url: String,
    quality: Quality,
    phase: DownloadPhase,
    probe_error: Option<String>,

    /// Incremented on every URL edit.
    probe_seq: u64,
    /// Incremented on every submit.
    attempt: u64,
    /// Create call of the current attempt, until its result is applied.
    submit: Option<PendingSubmit>,
    /// Backend cancels still in flight, including create calls that will
    /// cancel their own task.
    cancellations: Vec<JoinHandle<()>>,
    /// Highest poll sequence applied for the current task.
    last_poll_seq: u64,
    poll_failures: u32,

    poller: Option<TimerHandle>,
    confirmation: Option<TimerHandle>,
}

impl DownloadMachine {
    pub fn new(
        form: u64,
        gateway: Arc<dyn TaskGateway>,
        events: EventSender,
        settings: PollSettings,
    ) -> Self {
        Self {
            form,
            gateway,
            events,
            settings,
            url: String::new(),
            quality: Quality::Best,
            phase: DownloadPhase::Idle,
            probe_error: None,
            probe_seq: 0,
            attempt: 0,
            submit: None,
            cancellations: Vec::new(),
            last_poll_seq: 0,
            poll_failures: 0,
            poller: None,
            confirmation: None,
        }
    }

    pub fn form(&self) -> u64 {
        self.form
    }

    pub fn phase(&self) -> &DownloadPhase {
        &self.phase
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn quality(&self) -> &Quality {
        &self.quality
    }

    /// True while the poll timer is held.
    pub fn is_polling(&self) -> bool {
        self.poller.is_some()
    }

    pub fn view(&self) -> DownloadView {
        let quality_options = self
            .phase
            .preview()
            .map(Quality::options_for)
            .unwrap_or_default();
        DownloadView {
            phase: self.phase.clone(),
            url: self.url.clone(),
            quality: self.quality.clone(),
            quality_options,
            can_edit: self.can_edit(),
            can_submit: matches!(self.phase, DownloadPhase::MetadataReady { .. }),
            can_cancel: self.phase.is_busy(),
            probe_error: self.probe_error.clone(),
        }
    }

    fn can_edit(&self) -> bool {
        !self.phase.is_busy() && !matches!(self.phase, DownloadPhase::Completed { .. })
    }

    fn set_phase(&mut self, phase: DownloadPhase) {
        if self.phase.name() != phase.name() {
            tracing::debug!(
                form = self.form,
                from = self.phase.name(),
                to = phase.name(),
                "download phase"
            );
        }
        self.phase = phase;
    }

    // =========================================================================
    // Intents
    // =========================================================================

    /// Replace the URL field. Returns false if editing is currently disabled.
    ///
    /// A valid URL starts a probe; anything else returns to `Idle` without one.
    /// Either way, results of earlier probes become stale.
    pub fn edit_url(&mut self, url: impl Into<String>) -> bool {
        if !self.can_edit() {
            tracing::debug!(form = self.form, phase = self.phase.name(), "URL edit ignored");
            return false;
        }

        self.url = url.into();
        self.probe_seq += 1;
        self.quality = Quality::Best;
        self.probe_error = None;

        if let Err(e) = validate_video_url(&self.url) {
            tracing::trace!(form = self.form, error = %e, "no probe for URL");
            self.set_phase(DownloadPhase::Idle);
            return true;
        }

        self.set_phase(DownloadPhase::AwaitingMetadata { url: self.url.clone() });

        let gateway = self.gateway.clone();
        let events = self.events.clone();
        let form = self.form;
        let seq = self.probe_seq;
        let url = self.url.clone();
        tokio::spawn(async move {
            let result = gateway.probe_metadata(&url).await;
            let _ = events.send(Event::MetadataArrived { form, seq, url, result });
        });
        true
    }

    /// Choose one of the qualities offered by the current preview.
    pub fn select_quality(&mut self, quality: Quality) -> bool {
        let Some(preview) = self.phase.preview() else {
            return false;
        };
        if !Quality::options_for(preview).contains(&quality) {
            tracing::debug!(form = self.form, %quality, "quality not offered by preview");
            return false;
        }
        self.quality = quality;
        true
    }

    /// Start the download. A no-op unless metadata is ready.
    pub fn submit(&mut self) -> bool {
        let DownloadPhase::MetadataReady { url, .. } = &self.phase else {
            tracing::debug!(form = self.form, phase = self.phase.name(), "submit ignored");
            return false;
        };
        let url = url.clone();

        self.attempt += 1;
        self.set_phase(DownloadPhase::Submitting {
            url: url.clone(),
            quality: self.quality.clone(),
        });

        let gateway = self.gateway.clone();
        let events = self.events.clone();
        let form = self.form;
        let attempt = self.attempt;
        let quality = self.quality.wire_value().to_string();
        let slot = Arc::new(Mutex::new(SubmitSlot::default()));
        let shared = slot.clone();
        let create = tokio::spawn(async move {
            let result = gateway.create_download_task(&url, &quality).await;
            if let Ok(task_id) = &result {
                let cancelled = {
                    let mut slot = lock(&shared);
                    if !slot.cancelled {
                        slot.task_id = Some(task_id.clone());
                    }
                    slot.cancelled
                };
                if cancelled {
                    tracing::info!(form, %task_id, "task created after cancel, cancelling it");
                    cancel_backend_task(gateway.as_ref(), task_id).await;
                    return;
                }
            }
            let _ = events.send(Event::TaskCreated { form, attempt, result });
        });
        self.submit = Some(PendingSubmit { slot, create });
        true
    }

    /// Cancel a download being submitted or polled and return to `Idle`.
    ///
    /// The backend task is cancelled best-effort; the outcome of that call
    /// does not affect the machine.
    pub fn cancel(&mut self) -> bool {
        match &self.phase {
            DownloadPhase::Submitting { .. } => {
                if let Some(pending) = self.submit.take() {
                    let created = {
                        let mut slot = lock(&pending.slot);
                        slot.cancelled = true;
                        slot.task_id.clone()
                    };
                    match created {
                        // Creation already reported back; its event will be dropped.
                        Some(task_id) => self.spawn_backend_cancel(task_id),
                        None => self.track_cancellation(pending.create),
                    }
                }
            }
            DownloadPhase::Polling { task } => {
                let task_id = task.task_id.clone();
                self.poller = None;
                self.spawn_backend_cancel(task_id);
            }
            _ => {
                tracing::debug!(form = self.form, phase = self.phase.name(), "cancel ignored");
                return false;
            }
        }
        tracing::info!(form = self.form, "download cancelled by user");
        self.set_phase(DownloadPhase::Idle);
        true
    }

    /// Hand over backend cancels that have not finished yet. Awaiting them
    /// guarantees every cancelled task was cancelled on the backend.
    pub fn take_cancellations(&mut self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut self.cancellations)
    }

    /// Release timers. Running backend downloads are left alone, and so are
    /// pending cancels, see [`take_cancellations`](Self::take_cancellations).
    pub fn close(mut self) -> CloseOutcome {
        self.poller = None;
        let pending_confirmation = self.confirmation.take().is_some();
        if pending_confirmation && matches!(self.phase, DownloadPhase::Completed { .. }) {
            CloseOutcome::CompletedPendingConfirmation
        } else {
            CloseOutcome::Discarded
        }
    }

    fn spawn_backend_cancel(&mut self, task_id: String) {
        let gateway = self.gateway.clone();
        let handle = tokio::spawn(async move {
            cancel_backend_task(gateway.as_ref(), &task_id).await;
        });
        self.track_cancellation(handle);
    }

    fn track_cancellation(&mut self, handle: JoinHandle<()>) {
        self.cancellations.retain(|h| !h.is_finished());
        self.cancellations.push(handle);
    }

    // =========================================================================
    // Completions
    // =========================================================================

    /// Apply a probe result. Returns true if the state changed.
    pub fn on_metadata(
        &mut self,
        seq: u64,
        url: &str,
        result: Result<VideoMetadataPreview, GatewayError>,
    ) -> bool {
        let current = seq == self.probe_seq
            && url == self.url
            && matches!(self.phase, DownloadPhase::AwaitingMetadata { .. });
        if !current {
            tracing::debug!(form = self.form, seq, url, "stale metadata result dropped");
            return false;
        }

        match result {
            Ok(preview) => {
                self.set_phase(DownloadPhase::MetadataReady {
                    url: url.to_string(),
                    preview,
                });
            }
            Err(e) => {
                tracing::warn!(form = self.form, url, error = %e, "metadata probe failed");
                self.probe_error = Some(e.user_detail());
                self.set_phase(DownloadPhase::Idle);
            }
        }
        true
    }

    /// Apply the result of task creation. Returns true if the state changed.
    pub fn on_task_created(&mut self, attempt: u64, result: Result<String, GatewayError>) -> bool {
        if attempt != self.attempt || !matches!(self.phase, DownloadPhase::Submitting { .. }) {
            tracing::debug!(form = self.form, attempt, "stale task creation dropped");
            return false;
        }
        self.submit = None;

        match result {
            Ok(task_id) => {
                tracing::info!(form = self.form, %task_id, "download started, polling");
                self.last_poll_seq = 0;
                self.poll_failures = 0;
                self.poller = Some(spawn_poller(
                    self.gateway.clone(),
                    self.events.clone(),
                    self.form,
                    task_id.clone(),
                    self.settings.interval,
                    self.settings.max_failures,
                ));
                self.set_phase(DownloadPhase::Polling {
                    task: DownloadTask::pending(task_id),
                });
            }
            Err(e) => {
                tracing::error!(form = self.form, error = %e, "failed to start download");
                let error = match e {
                    GatewayError::Backend { detail: Some(detail), .. } => detail,
                    other => format!("Failed to start download: {}", other.user_detail()),
                };
                self.set_phase(DownloadPhase::Failed { error });
            }
        }
        true
    }

    /// Apply one poll result. Returns true if the state changed.
    pub fn on_task_polled(
        &mut self,
        task_id: &str,
        seq: u64,
        result: Result<DownloadTask, GatewayError>,
    ) -> bool {
        let held = match &self.phase {
            DownloadPhase::Polling { task } if task.task_id == task_id => task,
            _ => {
                tracing::debug!(
                    form = self.form,
                    task_id,
                    seq,
                    "poll result for inactive task dropped"
                );
                return false;
            }
        };
        if seq <= self.last_poll_seq {
            tracing::debug!(
                form = self.form,
                task_id,
                seq,
                last = self.last_poll_seq,
                "superseded poll dropped"
            );
            return false;
        }
        self.last_poll_seq = seq;

        let task = match result {
            Ok(task) => task,
            Err(e) if e.is_transient() => {
                self.poll_failures += 1;
                if self.poll_failures < self.settings.max_failures {
                    return false;
                }
                tracing::error!(
                    form = self.form,
                    task_id,
                    failures = self.poll_failures,
                    "lost contact with backend"
                );
                self.poller = None;
                self.set_phase(DownloadPhase::Failed {
                    error: format!(
                        "Lost contact with the backend after {} attempts: {}",
                        self.poll_failures,
                        e.user_detail()
                    ),
                });
                return true;
            }
            Err(e) => {
                tracing::error!(form = self.form, task_id, error = %e, "poll rejected by backend");
                self.poller = None;
                self.set_phase(DownloadPhase::Failed { error: e.user_detail() });
                return true;
            }
        };
        self.poll_failures = 0;

        if task.progress < held.progress {
            tracing::warn!(
                form = self.form,
                task_id,
                previous = held.progress,
                observed = task.progress,
                "backend reported decreasing progress"
            );
        }

        match task.status {
            TaskStatus::Completed => {
                tracing::info!(form = self.form, task_id, "download completed");
                self.poller = None;
                self.confirmation = Some(spawn_confirmation(
                    self.events.clone(),
                    self.form,
                    self.settings.completion_delay,
                ));
                self.set_phase(DownloadPhase::Completed { task });
            }
            TaskStatus::Error | TaskStatus::Cancelled => {
                let fallback = if task.status == TaskStatus::Cancelled {
                    CANCELLED_FAILURE
                } else {
                    GENERIC_FAILURE
                };
                let error = task
                    .error
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| fallback.to_string());
                tracing::error!(form = self.form, task_id, %error, "download failed");
                self.poller = None;
                self.set_phase(DownloadPhase::Failed { error });
            }
            _ => self.set_phase(DownloadPhase::Polling { task }),
        }
        true
    }

    /// The confirmation delay elapsed. Returns true if the form should now
    /// close and the library be told the download finished.
    pub fn on_confirmation_elapsed(&mut self) -> bool {
        if self.confirmation.take().is_none() {
            return false;
        }
        matches!(self.phase, DownloadPhase::Completed { .. })
    }
}

impl std::fmt::Debug for DownloadMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadMachine")
            .field("form", &self.form)
            .field("url", &self.url)
            .field("phase", &self.phase.name())
            .field("polling", &self.poller.is_some())
            .finish()
    }
}

// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Completions posted back to the orchestrator worker.
//!
//! Backend calls run in spawned tasks so they never block intent processing.
//! Each finished call comes back as an [`Event`] carrying the tags needed to
//! decide whether its result is still current (form id, probe sequence, poll
//! sequence, listing generation). Stale results are dropped on arrival.

use tokio::sync::mpsc;

use crate::error::GatewayError;
use crate::types::{DownloadTask, ScanSummary, Video, VideoMetadataPreview};

/// Sender half handed to every component that starts backend calls.
pub type EventSender = mpsc::UnboundedSender<Event>;

#[derive(Debug)]
pub enum Event {
    /// A metadata probe finished.
    MetadataArrived {
        form: u64,
        seq: u64,
        url: String,
        result: Result<VideoMetadataPreview, GatewayError>,
    },
    /// `createDownloadTask` finished for submit attempt `attempt`.
    TaskCreated {
        form: u64,
        attempt: u64,
        result: Result<String, GatewayError>,
    },
    /// One poll of a running task finished.
    TaskPolled {
        form: u64,
        task_id: String,
        seq: u64,
        result: Result<DownloadTask, GatewayError>,
    },
    /// The post-completion confirmation delay elapsed.
    ConfirmationElapsed { form: u64 },
    /// A library listing finished.
    ListingArrived {
        generation: u64,
        result: Result<Vec<Video>, GatewayError>,
    },
    /// A library scan finished.
    ScanFinished {
        result: Result<ScanSummary, GatewayError>,
    },
}

impl Event {
    /// Form instance this event belongs to, if any.
    pub fn form(&self) -> Option<u64> {
        match self {
            Event::MetadataArrived { form, .. }
            | Event::TaskCreated { form, .. }
            | Event::TaskPolled { form, .. }
            | Event::ConfirmationElapsed { form } => Some(*form),
            Event::ListingArrived { .. } | Event::ScanFinished { .. } => None,
        }
    }
}

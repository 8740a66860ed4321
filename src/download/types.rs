// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Download form types: quality choices, machine phases and the form view.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::types::{DownloadTask, VideoMetadataPreview};

/// Message shown when a task fails without an error text.
pub const GENERIC_FAILURE: &str = "Download failed";

/// Message shown when a task is cancelled on the backend side.
pub const CANCELLED_FAILURE: &str = "Download cancelled";

/// Quality requested for a download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Quality {
    /// Let the backend pick the best format.
    #[default]
    Best,
    /// A concrete resolution from the probe, e.g. `720p` in `mp4`.
    Resolution { resolution: String, ext: String },
    /// Audio only.
    AudioOnly,
}

impl Quality {
    /// Value sent as `quality` in `POST /download`.
    pub fn wire_value(&self) -> &str {
        match self {
            Quality::Best => "best",
            Quality::Resolution { resolution, .. } => resolution,
            Quality::AudioOnly => "audio",
        }
    }

    /// Selectable qualities for a preview: best, each probed format, audio only.
    pub fn options_for(preview: &VideoMetadataPreview) -> Vec<Quality> {
        let mut options = vec![Quality::Best];
        options.extend(preview.formats.iter().map(|f| Quality::Resolution {
            resolution: f.resolution.clone(),
            ext: f.ext.clone(),
        }));
        options.push(Quality::AudioOnly);
        options
    }

    /// Resolve a user-typed label (`best`, `audio`, or a resolution such as `720p`)
    /// against the options of a preview.
    pub fn parse_label(label: &str, preview: &VideoMetadataPreview) -> Option<Quality> {
        let label = label.trim();
        match label.to_ascii_lowercase().as_str() {
            "best" => return Some(Quality::Best),
            "audio" | "mp3" => return Some(Quality::AudioOnly),
            _ => {}
        }
        preview
            .formats
            .iter()
            .find(|f| f.resolution.eq_ignore_ascii_case(label))
            .map(|f| Quality::Resolution {
                resolution: f.resolution.clone(),
                ext: f.ext.clone(),
            })
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quality::Best => write!(f, "Best Quality"),
            Quality::Resolution { resolution, ext } => write!(f, "{} ({})", resolution, ext),
            Quality::AudioOnly => write!(f, "Audio Only (MP3)"),
        }
    }
}

/// Lifecycle phase of one download form instance.
///
/// `Completed` and `Failed` are terminal for a task; a new submission starts
/// over from `MetadataReady`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum DownloadPhase {
    Idle,
    AwaitingMetadata { url: String },
    MetadataReady { url: String, preview: VideoMetadataPreview },
    Submitting { url: String, quality: Quality },
    Polling { task: DownloadTask },
    Completed { task: DownloadTask },
    Failed { error: String },
}

impl DownloadPhase {
    pub fn name(&self) -> &'static str {
        match self {
            DownloadPhase::Idle => "idle",
            DownloadPhase::AwaitingMetadata { .. } => "awaiting_metadata",
            DownloadPhase::MetadataReady { .. } => "metadata_ready",
            DownloadPhase::Submitting { .. } => "submitting",
            DownloadPhase::Polling { .. } => "polling",
            DownloadPhase::Completed { .. } => "completed",
            DownloadPhase::Failed { .. } => "failed",
        }
    }

    /// True while a backend task is being started or tracked.
    pub fn is_busy(&self) -> bool {
        matches!(self, DownloadPhase::Submitting { .. } | DownloadPhase::Polling { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadPhase::Completed { .. } | DownloadPhase::Failed { .. })
    }

    /// The task being tracked or just finished.
    pub fn task(&self) -> Option<&DownloadTask> {
        match self {
            DownloadPhase::Polling { task } | DownloadPhase::Completed { task } => Some(task),
            _ => None,
        }
    }

    pub fn preview(&self) -> Option<&VideoMetadataPreview> {
        match self {
            DownloadPhase::MetadataReady { preview, .. } => Some(preview),
            _ => None,
        }
    }
}

/// Snapshot of an open download form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadView {
    pub phase: DownloadPhase,
    /// Current contents of the URL field.
    pub url: String,
    pub quality: Quality,
    /// Empty unless metadata is ready.
    pub quality_options: Vec<Quality>,
    pub can_edit: bool,
    pub can_submit: bool,
    pub can_cancel: bool,
    /// Last probe failure for the current URL, shown as a hint.
    pub probe_error: Option<String>,
}

/// Timing for one download form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Cadence of status polls.
    pub interval: Duration,
    /// Confirmation delay between `completed` and closing the form.
    pub completion_delay: Duration,
    /// Consecutive transport failures tolerated before giving up.
    pub max_failures: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            completion_delay: Duration::from_secs(2),
            max_failures: 30,
        }
    }
}

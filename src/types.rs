// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Wire types shared by the gateway and the orchestrator.
//!
//! These mirror the JSON bodies of the library backend. Timestamps from the
//! backend are usually naive ISO strings; they are read as UTC.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default result bound for library listings.
pub const DEFAULT_SEARCH_LIMIT: u32 = 100;

/// Catalog record owned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub channel_name: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub file_path: String,
    #[serde(default, with = "flexible_timestamp")]
    pub upload_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub view_count: Option<u64>,
    #[serde(default)]
    pub like_count: Option<u64>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub resolution: Option<String>,
    /// Size in bytes
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default, with = "flexible_timestamp")]
    pub added_date: Option<DateTime<Utc>>,
    #[serde(default, with = "flexible_timestamp")]
    pub last_watched: Option<DateTime<Utc>>,
    #[serde(default)]
    pub watched: bool,
    #[serde(default)]
    pub local_views: u64,
}

impl Video {
    /// Title for display, falling back to the id.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }
}

/// Partial update sent with `PATCH /videos/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watched: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_watched: Option<DateTime<Utc>>,
}

impl VideoPatch {
    /// Patch marking a video watched at `at`.
    pub fn watched_at(at: DateTime<Utc>) -> Self {
        Self {
            watched: Some(true),
            last_watched: Some(at),
        }
    }
}

/// Query driving which videos are listed. Replaced wholesale on every search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub query: String,
    pub limit: u32,
    /// Exact channel name
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub watched: Option<bool>,
    /// Number of matches to skip, for paging
    #[serde(default)]
    pub skip: u32,
}

impl SearchCriteria {
    pub fn new(query: impl Into<String>, limit: u32) -> Self {
        Self {
            query: query.into(),
            limit,
            channel: None,
            watched: None,
            skip: 0,
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_watched(mut self, watched: bool) -> Self {
        self.watched = Some(watched);
        self
    }

    /// Query string of `GET /videos`. Unset filters are left out.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("search", self.query.clone()),
            ("limit", self.limit.to_string()),
        ];
        if self.skip > 0 {
            pairs.push(("skip", self.skip.to_string()));
        }
        if let Some(channel) = &self.channel {
            pairs.push(("channel", channel.clone()));
        }
        if let Some(watched) = self.watched {
            pairs.push(("watched", watched.to_string()));
        }
        pairs
    }
}

impl Default for SearchCriteria {
    fn default() -> Self {
        Self::new("", DEFAULT_SEARCH_LIMIT)
    }
}

/// Entry of `GET /channels`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
}

/// Result of `POST /scan`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub status: String,
    #[serde(default)]
    pub videos_found: u64,
    #[serde(default)]
    pub videos_added: u64,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ScanSummary {
    /// The backend reports a missing media path as status `error`.
    pub fn is_error(&self) -> bool {
        self.status == "error"
    }
}

/// One selectable format from a metadata probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatOption {
    pub format_id: String,
    /// Resolution label such as `720p`
    pub resolution: String,
    #[serde(default = "default_ext")]
    pub ext: String,
    #[serde(default)]
    pub filesize: Option<u64>,
}

fn default_ext() -> String {
    "mp4".to_string()
}

/// Probe result for a candidate URL.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VideoMetadataPreview {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub view_count: Option<u64>,
    /// Ordered best-first, as returned by the backend.
    #[serde(default)]
    pub formats: Vec<FormatOption>,
}

/// Backend-side status of a download task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Downloading,
    Processing,
    Completed,
    Error,
    Cancelled,
    /// Any status string this client does not know.
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    /// Returns true once the backend will make no further progress.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }
}

/// Observed state of one backend download task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadTask {
    pub task_id: String,
    pub status: TaskStatus,
    /// Percentage in [0, 100]
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub speed: Option<String>,
    #[serde(default)]
    pub eta: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl DownloadTask {
    /// Locally seeded task right after creation.
    pub fn pending(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Pending,
            progress: 0.0,
            speed: None,
            eta: None,
            filename: None,
            error: None,
        }
    }

    /// Progress clamped to [0, 100] for display.
    pub fn progress_percent(&self) -> f64 {
        if self.progress.is_nan() {
            0.0
        } else {
            self.progress.clamp(0.0, 100.0)
        }
    }
}

/// Parse a backend timestamp, accepting RFC 3339 or a naive ISO string (read as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

mod flexible_timestamp {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_some(&ts.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(s) => super::parse_timestamp(&s)
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {}", s))),
        }
    }
}

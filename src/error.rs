// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error taxonomy for backend calls and consistent error formatting.
//!
//! Every gateway operation fails with a [`GatewayError`]:
//!
//! - [`GatewayError::Transport`] - network failure or timeout. Always transient;
//!   the poll loop retries it on its next tick.
//! - [`GatewayError::Backend`] - the backend answered with a non-success status,
//!   or with a body that does not parse. Terminal for the operation that caused it.
//! - [`GatewayError::Validation`] - rejected client-side, never sent.
//!
//! The formatting helpers render errors for the terminal with possible causes
//! and suggested fixes.

use thiserror::Error;

/// Hint appended to every formatted error.
pub const HELP_HINT: &str = "Check the backend with: tubeshelf health";

/// Failure of a single backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Network failure, connection refused or timeout.
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend explicitly rejected the request.
    #[error("backend rejected request with status {status}{}", detail_suffix(.detail))]
    Backend { status: u16, detail: Option<String> },

    /// Client-side rejection; the request was never sent.
    #[error("invalid input: {0}")]
    Validation(String),
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(d) => format!(": {}", d),
        None => String::new(),
    }
}

impl GatewayError {
    /// Build a backend error from a status code and optional detail.
    pub fn backend(status: u16, detail: Option<String>) -> Self {
        Self::Backend { status, detail }
    }

    /// Transport failures never terminate a task.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// True for a 404 from the backend.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Backend { status: 404, .. })
    }

    /// Short message suitable for showing in the download form.
    ///
    /// Prefers the backend's `detail` when present.
    pub fn user_detail(&self) -> String {
        match self {
            Self::Transport(msg) => format!("Could not reach the backend: {}", msg),
            Self::Backend { detail: Some(detail), .. } => detail.clone(),
            Self::Backend { status, detail: None } => {
                format!("Request failed with status {}", status)
            }
            Self::Validation(msg) => msg.clone(),
        }
    }

    /// Render with causes and fixes for terminal output.
    pub fn render(&self, title: &str) -> String {
        let builder = ErrorBuilder::new(format!("{}: {}", title, self.user_detail()));
        match self {
            Self::Transport(_) => builder
                .cause("Backend not running")
                .cause("Wrong API address in config")
                .cause("Request exceeded the timeout")
                .fix("Verify the address: tubeshelf config show")
                .fix("Point at the backend: tubeshelf config set-url http://HOST:8000/api")
                .build(),
            Self::Backend { status, .. } if *status == 404 => builder
                .cause("The video or task no longer exists on the backend")
                .fix("Refresh the library: tubeshelf videos")
                .build(),
            Self::Backend { status, .. } if *status < 500 => builder
                .cause("The backend refused the request")
                .fix("Check the URL or parameters and try again")
                .build(),
            Self::Backend { .. } => builder
                .cause("The backend hit an internal error")
                .fix("Check the backend logs")
                .fix("Retry in a moment")
                .build(),
            Self::Validation(_) => builder
                .fix("Use a youtube.com or youtu.be link")
                .build(),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Transport(format!("request timed out: {}", err))
        } else if err.is_decode() {
            // Bodies are only decoded after a success status
            let status = err.status().map_or(200, |s| s.as_u16());
            Self::backend(status, Some(format!("unreadable response body: {}", err)))
        } else if let Some(status) = err.status() {
            Self::Backend { status: status.as_u16(), detail: None }
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Formats an error message with title, causes, fixes, and help hint.
///
/// # Example
///
/// ```
/// use tubeshelf::error::format_error;
///
/// let error = format_error(
///     "Failed to reach the library backend",
///     &["Backend not running", "Wrong API address in config"],
///     &["Verify the address: tubeshelf config show"],
/// );
/// assert!(error.contains("Possible causes:"));
/// ```
pub fn format_error(title: &str, causes: &[&str], fixes: &[&str]) -> String {
    let mut output = String::new();

    output.push_str(&format!("[✗] {}\n\n", title));

    if !causes.is_empty() {
        output.push_str("Possible causes:\n");
        for cause in causes {
            output.push_str(&format!("  - {}\n", cause));
        }
        output.push('\n');
    }

    if !fixes.is_empty() {
        output.push_str("Try these fixes:\n");
        for (i, fix) in fixes.iter().enumerate() {
            output.push_str(&format!("  {}. {}\n", i + 1, fix));
        }
        output.push('\n');
    }

    output.push_str(HELP_HINT);

    output
}

/// Builder for constructing formatted error messages.
#[derive(Debug, Clone)]
pub struct ErrorBuilder {
    title: String,
    causes: Vec<String>,
    fixes: Vec<String>,
}

impl ErrorBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            causes: Vec::new(),
            fixes: Vec::new(),
        }
    }

    pub fn cause(mut self, cause: impl Into<String>) -> Self {
        self.causes.push(cause.into());
        self
    }

    pub fn fix(mut self, fix: impl Into<String>) -> Self {
        self.fixes.push(fix.into());
        self
    }

    pub fn build(self) -> String {
        let causes: Vec<&str> = self.causes.iter().map(|s| s.as_str()).collect();
        let fixes: Vec<&str> = self.fixes.iter().map(|s| s.as_str()).collect();
        format_error(&self.title, &causes, &fixes)
    }
}

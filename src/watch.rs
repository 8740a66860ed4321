// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Watch-state reconciliation.
//!
//! Opening an unwatched video marks it watched on the backend exactly once.
//! The check is made against the locally held copy, and every video patched
//! during the session is remembered, so reopening never re-issues the call
//! even if a reload races with the backend persisting it.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;

use crate::gateway::TaskGateway;
use crate::library::LibrarySync;
use crate::types::{Video, VideoPatch};

pub struct WatchReconciler {
    gateway: Arc<dyn TaskGateway>,
    patched: HashSet<String>,
}

impl WatchReconciler {
    pub fn new(gateway: Arc<dyn TaskGateway>) -> Self {
        Self {
            gateway,
            patched: HashSet::new(),
        }
    }

    /// Handle a video being opened. Returns true if a patch was issued.
    ///
    /// The patch is fire-and-forget: failures are logged and never block playback.
    pub fn on_video_opened(
        &mut self,
        video: &Video,
        library: &mut LibrarySync,
        now: DateTime<Utc>,
    ) -> bool {
        let watched = library
            .find(&video.id)
            .map(|held| held.watched)
            .unwrap_or(video.watched);
        if watched || self.patched.contains(&video.id) {
            return false;
        }

        self.patched.insert(video.id.clone());
        library.mark_watched(&video.id, now);

        let gateway = self.gateway.clone();
        let id = video.id.clone();
        tokio::spawn(async move {
            match gateway.patch_video(&id, &VideoPatch::watched_at(now)).await {
                Ok(_) => tracing::debug!(video = %id, "marked watched"),
                Err(e) => tracing::warn!(video = %id, error = %e, "failed to mark video watched"),
            }
        });
        true
    }
}

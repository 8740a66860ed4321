// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Library synchronization.
//!
//! [`LibrarySync`] is the only owner of the cached video list. Searches, scans,
//! finished downloads and closing the player all funnel into [`LibrarySync::reload`],
//! and every reload bumps a generation counter so that a listing for an older
//! query arriving late is discarded instead of overwriting newer results.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::GatewayError;
use crate::events::{Event, EventSender};
use crate::gateway::TaskGateway;
use crate::types::{SearchCriteria, Video};

pub struct LibrarySync {
    gateway: Arc<dyn TaskGateway>,
    events: EventSender,
    criteria: SearchCriteria,
    videos: Vec<Video>,
    loading: bool,
    /// Generation of the most recent reload; only its listing is applied.
    generation: u64,
    error: Option<String>,
    /// Optimistic watched patches, re-applied until a listing confirms them.
    watched_overrides: HashMap<String, DateTime<Utc>>,
}

impl LibrarySync {
    pub fn new(
        gateway: Arc<dyn TaskGateway>,
        events: EventSender,
        criteria: SearchCriteria,
    ) -> Self {
        Self {
            gateway,
            events,
            criteria,
            videos: Vec::new(),
            loading: false,
            generation: 0,
            error: None,
            watched_overrides: HashMap::new(),
        }
    }

    pub fn videos(&self) -> &[Video] {
        &self.videos
    }

    pub fn criteria(&self) -> &SearchCriteria {
        &self.criteria
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Message from the last failed listing, cleared by the next success.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn find(&self, id: &str) -> Option<&Video> {
        self.videos.iter().find(|v| v.id == id)
    }

    /// Replace the search query and reload.
    pub fn set_search(&mut self, query: impl Into<String>) {
        self.criteria = SearchCriteria::new(query, self.criteria.limit);
        tracing::debug!(query = %self.criteria.query, "search changed");
        self.reload();
    }

    /// Fetch the listing for the current criteria.
    pub fn reload(&mut self) {
        self.generation += 1;
        self.loading = true;

        let gateway = self.gateway.clone();
        let events = self.events.clone();
        let criteria = self.criteria.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let result = gateway.list_videos(&criteria).await;
            let _ = events.send(Event::ListingArrived { generation, result });
        });
    }

    pub fn on_scan_completed(&mut self) {
        self.reload();
    }

    pub fn on_download_completed(&mut self) {
        self.reload();
    }

    pub fn on_player_closed(&mut self) {
        self.reload();
    }

    /// Apply a listing. Returns true if the state changed.
    ///
    /// A failure keeps the previous list and records an error.
    pub fn on_listing(
        &mut self,
        generation: u64,
        result: Result<Vec<Video>, GatewayError>,
    ) -> bool {
        if generation != self.generation {
            tracing::debug!(generation, current = self.generation, "stale listing dropped");
            return false;
        }
        self.loading = false;

        match result {
            Ok(mut videos) => {
                self.watched_overrides
                    .retain(|id, _| !videos.iter().any(|v| v.id == *id && v.watched));
                for video in videos.iter_mut() {
                    if let Some(at) = self.watched_overrides.get(&video.id) {
                        video.watched = true;
                        video.last_watched = Some(*at);
                    }
                }
                tracing::debug!(
                    count = videos.len(),
                    query = %self.criteria.query,
                    "library listing applied"
                );
                self.videos = videos;
                self.error = None;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load videos");
                self.error = Some(e.user_detail());
            }
        }
        true
    }

    /// Optimistically mark a cached video watched.
    pub fn mark_watched(&mut self, id: &str, at: DateTime<Utc>) {
        self.watched_overrides.insert(id.to_string(), at);
        if let Some(video) = self.videos.iter_mut().find(|v| v.id == id) {
            video.watched = true;
            video.last_watched = Some(at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::OfflineGateway;
    use tokio::sync::mpsc;

    fn video(id: &str, watched: bool) -> Video {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "title": id,
            "file_path": format!("/media/{}.mp4", id),
            "watched": watched,
        }))
        .unwrap()
    }

    fn library() -> (LibrarySync, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            LibrarySync::new(Arc::new(OfflineGateway), tx, SearchCriteria::default()),
            rx,
        )
    }

    #[tokio::test]
    async fn test_late_listing_for_old_query_dropped() {
        let (mut lib, _rx) = library();
        lib.set_search("cats");
        let cats = lib.generation;
        lib.set_search("dogs");
        let dogs = lib.generation;

        assert!(lib.on_listing(dogs, Ok(vec![video("dog1", false)])));
        assert!(!lib.on_listing(cats, Ok(vec![video("cat1", false)])));

        let ids: Vec<&str> = lib.videos().iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["dog1"]);
        assert!(!lib.is_loading());
        assert_eq!(lib.criteria().query, "dogs");
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_list() {
        let (mut lib, _rx) = library();
        lib.reload();
        lib.on_listing(lib.generation, Ok(vec![video("a", false), video("b", true)]));

        lib.reload();
        assert!(lib.is_loading());
        lib.on_listing(lib.generation, Err(GatewayError::Transport("reset".into())));

        assert_eq!(lib.videos().len(), 2);
        assert!(!lib.is_loading());
        assert!(lib.error().is_some());

        lib.reload();
        lib.on_listing(lib.generation, Ok(vec![video("a", false)]));
        assert!(lib.error().is_none());
    }

    #[tokio::test]
    async fn test_change_events_reload_once_each() {
        let (mut lib, _rx) = library();
        lib.on_scan_completed();
        lib.on_download_completed();
        lib.on_player_closed();
        assert_eq!(lib.generation, 3);
    }

    #[tokio::test]
    async fn test_watched_override_survives_stale_listing() {
        let (mut lib, _rx) = library();
        lib.reload();
        lib.on_listing(lib.generation, Ok(vec![video("a", false)]));

        let at = Utc::now();
        lib.mark_watched("a", at);
        assert!(lib.find("a").unwrap().watched);

        // Backend has not persisted the patch yet
        lib.reload();
        lib.on_listing(lib.generation, Ok(vec![video("a", false)]));
        let a = lib.find("a").unwrap();
        assert!(a.watched);
        assert_eq!(a.last_watched, Some(at));

        // Once confirmed, the override is dropped
        lib.reload();
        lib.on_listing(lib.generation, Ok(vec![video("a", true)]));
        assert!(lib.watched_overrides.is_empty());
    }
}

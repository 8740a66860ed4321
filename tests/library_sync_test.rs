// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Library synchronization, scans and watch-state through the orchestrator.

mod common;

use common::*;
use tubeshelf::types::ScanSummary;
use tubeshelf::GatewayError;

fn ids(videos: &[tubeshelf::Video]) -> Vec<&str> {
    videos.iter().map(|v| v.id.as_str()).collect()
}

// =============================================================================
// Search
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_initial_load_lists_library() {
    let gw = ScriptedGateway::new();
    gw.on_listing("", Ok(vec![video("a", "Alpha", false), video("b", "Beta", true)]));
    let handle = start(&gw).await;

    let view = handle.snapshot();
    assert_eq!(ids(&view.videos), vec!["a", "b"]);
    assert_eq!(view.query, "");
    assert_eq!(gw.calls(), vec![Call::List(String::new())]);
}

#[tokio::test(start_paused = true)]
async fn test_last_query_wins_when_responses_reorder() {
    let gw = ScriptedGateway::new();
    gw.on_listing("cats", Ok(vec![video("cat1", "Cat one", false)]));
    gw.on_listing(
        "dogs",
        Ok(vec![video("dog1", "Dog one", false), video("dog2", "Dog two", false)]),
    );
    let release_cats = gw.gate_listing("cats");
    let handle = start(&gw).await;

    let view = handle.search("cats").await.unwrap();
    assert!(view.loading);
    handle.search("dogs").await.unwrap();

    let view = handle.wait_for(|v| !v.loading).await.unwrap();
    assert_eq!(ids(&view.videos), vec!["dog1", "dog2"]);

    // The cats response arrives last and is dropped
    release_cats.send(()).unwrap();
    settle().await;
    let view = handle.snapshot();
    assert_eq!(view.query, "dogs");
    assert_eq!(ids(&view.videos), vec!["dog1", "dog2"]);
    assert!(!view.loading);
}

#[tokio::test(start_paused = true)]
async fn test_failed_listing_keeps_previous_videos() {
    let gw = ScriptedGateway::new();
    gw.on_listing("", Ok(vec![video("a", "Alpha", false)]));
    gw.on_listing("broken", Err(GatewayError::Transport("connection reset".into())));
    let handle = start(&gw).await;

    handle.search("broken").await.unwrap();
    let view = handle.wait_for(|v| !v.loading).await.unwrap();
    assert_eq!(ids(&view.videos), vec!["a"]);
    assert!(view.library_error.as_deref().unwrap().contains("connection reset"));
    assert!(view.notice().is_some());

    // The next successful listing clears the error
    handle.search("").await.unwrap();
    let view = handle.wait_for(|v| !v.loading).await.unwrap();
    assert!(view.library_error.is_none());
}

// =============================================================================
// Scans
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_scan_completion_reloads_once() {
    let gw = ScriptedGateway::new();
    gw.on_scan(Ok(ScanSummary {
        status: "completed".into(),
        videos_found: 12,
        videos_added: 3,
        errors: Vec::new(),
    }));
    let handle = start(&gw).await;
    let listings_before = gw.listings();

    let view = handle.trigger_scan().await.unwrap();
    assert!(view.scanning);

    let view = handle.wait_for(|v| !v.scanning).await.unwrap();
    assert_eq!(view.last_scan.as_ref().map(|s| s.videos_added), Some(3));
    assert!(view.scan_error.is_none());
    handle.wait_for(|v| !v.loading).await.unwrap();
    settle().await;
    assert_eq!(gw.listings(), listings_before + 1);
    assert!(gw.calls().contains(&Call::Scan(true)));
}

#[tokio::test(start_paused = true)]
async fn test_scan_while_scanning_is_noop() {
    let gw = ScriptedGateway::new();
    let release = gw.gate_scan();
    let handle = start(&gw).await;

    handle.trigger_scan().await.unwrap();
    let view = handle.trigger_scan().await.unwrap();
    assert!(view.scanning);
    settle().await;
    assert_eq!(gw.count(|c| matches!(c, Call::Scan(_))), 1);

    release.send(()).unwrap();
    handle.wait_for(|v| !v.scanning).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_scan_failure_sets_notice_without_reload() {
    let gw = ScriptedGateway::new();
    gw.on_scan(Err(GatewayError::backend(500, Some("Media path not found".into()))));
    let handle = start(&gw).await;
    let listings_before = gw.listings();

    handle.trigger_scan().await.unwrap();
    let view = handle.wait_for(|v| !v.scanning).await.unwrap();
    assert_eq!(view.scan_error.as_deref(), Some("Media path not found"));
    assert_eq!(view.notice(), Some("Media path not found"));
    assert!(!view.loading);
    settle().await;
    assert_eq!(gw.listings(), listings_before);
}

#[tokio::test(start_paused = true)]
async fn test_scan_reporting_error_status_is_surfaced() {
    let gw = ScriptedGateway::new();
    gw.on_scan(Ok(ScanSummary {
        status: "error".into(),
        videos_found: 0,
        videos_added: 0,
        errors: vec!["Media path does not exist".into()],
    }));
    let handle = start(&gw).await;

    handle.trigger_scan().await.unwrap();
    let view = handle.wait_for(|v| !v.scanning).await.unwrap();
    assert_eq!(view.scan_error.as_deref(), Some("Media path does not exist"));
    assert!(view.last_scan.as_ref().unwrap().is_error());
}

#[tokio::test(start_paused = true)]
async fn test_scan_error_status_without_messages_still_fails() {
    let gw = ScriptedGateway::new();
    gw.on_scan(Ok(ScanSummary {
        status: "error".into(),
        videos_found: 0,
        videos_added: 0,
        errors: Vec::new(),
    }));
    let handle = start(&gw).await;

    handle.trigger_scan().await.unwrap();
    let view = handle.wait_for(|v| !v.scanning).await.unwrap();
    assert_eq!(view.scan_error.as_deref(), Some("Scan failed"));
    assert_eq!(view.notice(), Some("Scan failed"));
}

// =============================================================================
// Watch state
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_opening_unwatched_video_patches_once() {
    let gw = ScriptedGateway::new();
    gw.on_listing("", Ok(vec![video("a", "Alpha", false)]));
    let handle = start(&gw).await;
    let a = handle.snapshot().videos[0].clone();

    let view = handle.open_video(a.clone()).await.unwrap();
    let opened = view.opened_video.as_ref().unwrap();
    assert_eq!(opened.id, "a");
    assert!(opened.watched);
    assert!(opened.last_watched.is_some());
    assert!(view.videos[0].watched);

    // Reopening the stale copy still issues nothing
    handle.close_video().await.unwrap();
    handle.wait_for(|v| !v.loading).await.unwrap();
    handle.open_video(a).await.unwrap();
    settle().await;

    assert_eq!(gw.patches(), 1);
    assert!(gw.calls().contains(&Call::Patch {
        id: "a".into(),
        watched: Some(true)
    }));
}

#[tokio::test(start_paused = true)]
async fn test_opening_watched_video_issues_no_patch() {
    let gw = ScriptedGateway::new();
    gw.on_listing("", Ok(vec![video("b", "Beta", true)]));
    let handle = start(&gw).await;
    let b = handle.snapshot().videos[0].clone();

    handle.open_video(b).await.unwrap();
    settle().await;
    assert_eq!(gw.patches(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_patch_failure_is_swallowed() {
    let gw = ScriptedGateway::new();
    gw.on_listing("", Ok(vec![video("a", "Alpha", false)]));
    gw.fail_patches(GatewayError::Transport("timed out".into()));
    let handle = start(&gw).await;
    let a = handle.snapshot().videos[0].clone();

    let view = handle.open_video(a).await.unwrap();
    settle().await;
    assert_eq!(gw.patches(), 1);
    assert!(view.opened_video.is_some());
    assert!(handle.snapshot().library_error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_watched_flag_survives_reload_before_backend_persists() {
    let gw = ScriptedGateway::new();
    // The backend keeps reporting the video unwatched
    gw.on_listing("", Ok(vec![video("a", "Alpha", false)]));
    let handle = start(&gw).await;
    let a = handle.snapshot().videos[0].clone();

    handle.open_video(a).await.unwrap();
    handle.close_video().await.unwrap();
    let view = handle.wait_for(|v| !v.loading).await.unwrap();
    assert!(view.videos[0].watched);
}

#[tokio::test(start_paused = true)]
async fn test_closing_player_reloads_once() {
    let gw = ScriptedGateway::new();
    gw.on_listing("", Ok(vec![video("a", "Alpha", true)]));
    let handle = start(&gw).await;
    let listings_before = gw.listings();

    // Closing with nothing open does nothing
    handle.close_video().await.unwrap();
    settle().await;
    assert_eq!(gw.listings(), listings_before);

    let a = handle.snapshot().videos[0].clone();
    handle.open_video(a).await.unwrap();
    let view = handle.close_video().await.unwrap();
    assert!(view.opened_video.is_none());
    handle.wait_for(|v| !v.loading).await.unwrap();
    settle().await;
    assert_eq!(gw.listings(), listings_before + 1);
}

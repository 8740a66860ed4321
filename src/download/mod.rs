// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Download Task Lifecycle
//!
//! Turns a user-supplied URL into a tracked, polled, terminating backend task.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐
//! │ DownloadMachine │────▶│ Poll loop       │
//! │ (one per form)  │     │ (tokio task)    │
//! └────────┬────────┘     └────────┬────────┘
//!          │                       │
//!          ▼                       ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ TaskGateway     │     │ Event channel   │
//! │ (probe/create)  │     │ (back to owner) │
//! └─────────────────┘     └─────────────────┘
//! ```
//!
//! The machine never blocks on the backend. It spawns each call and applies
//! the result when the owner feeds the matching [`crate::events::Event`] back in.

pub mod machine;
pub mod poller;
pub mod types;

pub use machine::{CloseOutcome, DownloadMachine};
pub use poller::TimerHandle;
pub use types::{DownloadPhase, DownloadView, PollSettings, Quality};

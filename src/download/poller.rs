// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Scheduled work owned by a download form: the status poll loop and the
//! post-completion confirmation delay.
//!
//! Both run as spawned tokio tasks held through a [`TimerHandle`]. Dropping
//! the handle aborts the task, so every exit path of the owning machine
//! (terminal status, cancel, form closed) releases the timer.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::error::GatewayError;
use crate::events::{Event, EventSender};
use crate::gateway::TaskGateway;
use crate::types::DownloadTask;

/// Owned handle to a spawned timer task. Aborts the task on drop.
#[derive(Debug)]
pub struct TimerHandle {
    handle: JoinHandle<()>,
}

impl TimerHandle {
    fn new(handle: JoinHandle<()>) -> Self {
        Self { handle }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Whether a poll result ends polling for its task.
///
/// Terminal task statuses and backend rejections stop immediately. Transport
/// failures stop only once `failures` (including this one) reaches `max_failures`.
pub fn ends_polling(
    result: &Result<DownloadTask, GatewayError>,
    failures: u32,
    max_failures: u32,
) -> bool {
    match result {
        Ok(task) => task.status.is_terminal(),
        Err(e) if e.is_transient() => failures >= max_failures,
        Err(_) => true,
    }
}

/// Start polling `task_id` every `period`, first poll one period from now.
///
/// Polls are issued sequentially, so responses arrive in request order. Each
/// carries a sequence number starting at 1.
pub fn spawn_poller(
    gateway: Arc<dyn TaskGateway>,
    events: EventSender,
    form: u64,
    task_id: String,
    period: Duration,
    max_failures: u32,
) -> TimerHandle {
    let handle = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut seq: u64 = 0;
        let mut failures: u32 = 0;

        loop {
            ticker.tick().await;
            seq += 1;

            let result = gateway.poll_task(&task_id).await;
            match &result {
                Err(e) if e.is_transient() => {
                    failures += 1;
                    tracing::debug!(
                        %task_id,
                        seq,
                        failures,
                        error = %e,
                        "poll failed, retrying next tick"
                    );
                }
                _ => failures = 0,
            }

            let stop = ends_polling(&result, failures, max_failures);
            let event = Event::TaskPolled {
                form,
                task_id: task_id.clone(),
                seq,
                result,
            };
            if events.send(event).is_err() || stop {
                break;
            }
        }
        tracing::debug!(%task_id, polls = seq, "poll loop finished");
    });
    TimerHandle::new(handle)
}

/// Post [`Event::ConfirmationElapsed`] after `delay`.
pub fn spawn_confirmation(events: EventSender, form: u64, delay: Duration) -> TimerHandle {
    let handle = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = events.send(Event::ConfirmationElapsed { form });
    });
    TimerHandle::new(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskStatus;

    fn task(status: TaskStatus) -> Result<DownloadTask, GatewayError> {
        let mut t = DownloadTask::pending("7");
        t.status = status;
        Ok(t)
    }

    #[test]
    fn test_ends_polling_on_terminal_status() {
        assert!(ends_polling(&task(TaskStatus::Completed), 0, 3));
        assert!(ends_polling(&task(TaskStatus::Error), 0, 3));
        assert!(ends_polling(&task(TaskStatus::Cancelled), 0, 3));
        assert!(!ends_polling(&task(TaskStatus::Downloading), 0, 3));
        assert!(!ends_polling(&task(TaskStatus::Unknown), 0, 3));
    }

    #[test]
    fn test_transport_failures_are_bounded() {
        let err: Result<DownloadTask, GatewayError> =
            Err(GatewayError::Transport("timeout".into()));
        assert!(!ends_polling(&err, 1, 3));
        assert!(!ends_polling(&err, 2, 3));
        assert!(ends_polling(&err, 3, 3));
    }

    #[test]
    fn test_backend_rejection_ends_polling() {
        let err: Result<DownloadTask, GatewayError> = Err(GatewayError::backend(404, None));
        assert!(ends_polling(&err, 0, 3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_aborts_confirmation() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = spawn_confirmation(tx, 1, Duration::from_secs(2));
        drop(handle);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_fires_after_delay() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let _handle = spawn_confirmation(tx, 4, Duration::from_secs(2));
        tokio::time::sleep(Duration::from_millis(1900)).await;
        assert!(rx.try_recv().is_err());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(matches!(rx.try_recv(), Ok(Event::ConfirmationElapsed { form: 4 })));
    }
}

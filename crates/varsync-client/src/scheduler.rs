//! Delayed task execution used by the poll loop.
//!
//! Each poll attempt schedules its successor through a [`Scheduler`] instead
//! of looping inline, which keeps every pending attempt individually
//! cancellable through its [`ScheduledTask`] handle.

use std::fmt;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::task::JoinHandle;

/// Runs a task once after a delay.
pub trait Scheduler: Send + Sync {
    /// Schedules `task` to run after `delay` and returns a handle to cancel it.
    fn schedule_after(&self, delay: Duration, task: BoxFuture<'static, ()>) -> ScheduledTask;
}

/// Handle to a task registered with a [`Scheduler`].
pub struct ScheduledTask {
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Wraps the join handle of a spawned task.
    pub fn from_handle(handle: JoinHandle<()>) -> Self {
        Self { handle }
    }

    /// Cancels the task; a no-op if it already finished.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Whether the task ran to completion or was cancelled.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// [`Scheduler`] backed by the ambient tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule_after(&self, delay: Duration, task: BoxFuture<'static, ()>) -> ScheduledTask {
        let handle = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            task.await;
        });
        ScheduledTask::from_handle(handle)
    }
}

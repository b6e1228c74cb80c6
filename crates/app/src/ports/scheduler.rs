//! Scheduler port — deferred and recurring jobs.
//!
//! Every scheduling call returns a [`ScheduledTask`] handle that cancels the
//! job. Cancelling never interrupts a job that already started running.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::NaiveTime;
use hearth_domain::error::HearthError;
use hearth_domain::id::TaskId;
use hearth_domain::time::Timestamp;
use tokio_util::sync::CancellationToken;

/// A unit of scheduled work.
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Handle to a scheduled job.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    id: TaskId,
    token: CancellationToken,
}

impl ScheduledTask {
    #[must_use]
    pub fn new(token: CancellationToken) -> Self {
        Self {
            id: TaskId::new(),
            token,
        }
    }

    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Stop the job from running (again). Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token observed by the task running the job.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// Runs jobs later, at a fixed time, daily, or on a cron schedule.
pub trait Scheduler: Send + Sync {
    /// Run `job` once after `delay`.
    fn run_after(&self, delay: Duration, job: Job) -> ScheduledTask;

    /// Run `job` once at `at`; immediately when `at` is in the past.
    fn run_at(&self, at: Timestamp, job: Job) -> ScheduledTask;

    /// Run a fresh job every day at `time_of_day` local time.
    fn run_daily<F>(&self, time_of_day: NaiveTime, job: F) -> ScheduledTask
    where
        F: Fn() -> Job + Send + Sync + 'static;

    /// Run a fresh job on every occurrence of a cron `expression`.
    ///
    /// # Errors
    ///
    /// Returns a validation error when `expression` cannot be parsed.
    fn run_on_cron<F>(&self, expression: &str, job: F) -> Result<ScheduledTask, HearthError>
    where
        F: Fn() -> Job + Send + Sync + 'static;
}

impl<T: Scheduler> Scheduler for std::sync::Arc<T> {
    fn run_after(&self, delay: Duration, job: Job) -> ScheduledTask {
        (**self).run_after(delay, job)
    }

    fn run_at(&self, at: Timestamp, job: Job) -> ScheduledTask {
        (**self).run_at(at, job)
    }

    fn run_daily<F>(&self, time_of_day: NaiveTime, job: F) -> ScheduledTask
    where
        F: Fn() -> Job + Send + Sync + 'static,
    {
        (**self).run_daily(time_of_day, job)
    }

    fn run_on_cron<F>(&self, expression: &str, job: F) -> Result<ScheduledTask, HearthError>
    where
        F: Fn() -> Job + Send + Sync + 'static,
    {
        (**self).run_on_cron(expression, job)
    }
}

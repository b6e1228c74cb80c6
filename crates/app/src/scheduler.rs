//! Tokio-backed [`Scheduler`].
//!
//! Each scheduled job runs on its own task, racing its sleep against a
//! cancellation token derived from the scheduler's root token. Cancelling
//! the root ([`TokioScheduler::shutdown`]) stops every pending job.

use std::str::FromStr;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, NaiveTime, TimeZone};
use cron::Schedule;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use hearth_domain::error::{HearthError, ValidationError};
use hearth_domain::time::{Timestamp, now};

use crate::ports::{Job, ScheduledTask, Scheduler};

/// Schedules jobs on a Tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
    root: CancellationToken,
}

impl TokioScheduler {
    /// Create a scheduler bound to the current runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        Self::with_handle(Handle::current())
    }

    #[must_use]
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle,
            root: CancellationToken::new(),
        }
    }

    /// Cancel every job scheduled through this scheduler.
    pub fn shutdown(&self) {
        self.root.cancel();
    }

    fn spawn_once(&self, delay: Duration, job: Job) -> ScheduledTask {
        let task = ScheduledTask::new(self.root.child_token());
        let token = task.token();
        let id = task.id();
        self.handle.spawn(async move {
            tokio::select! {
                () = token.cancelled() => tracing::debug!(task = %id, "scheduled job cancelled"),
                () = tokio::time::sleep(delay) => {
                    tracing::debug!(task = %id, "running scheduled job");
                    job.await;
                }
            }
        });
        task
    }

    fn spawn_recurring<F, N>(&self, job: F, mut next_delay: N) -> ScheduledTask
    where
        F: Fn() -> Job + Send + Sync + 'static,
        N: FnMut() -> Option<Duration> + Send + 'static,
    {
        let task = ScheduledTask::new(self.root.child_token());
        let token = task.token();
        let id = task.id();
        self.handle.spawn(async move {
            while let Some(delay) = next_delay() {
                tokio::select! {
                    () = token.cancelled() => break,
                    () = tokio::time::sleep(delay) => {
                        tracing::debug!(task = %id, "running recurring job");
                        job().await;
                    }
                }
            }
            tracing::debug!(task = %id, "recurring job stopped");
        });
        task
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for TokioScheduler {
    fn run_after(&self, delay: Duration, job: Job) -> ScheduledTask {
        self.spawn_once(delay, job)
    }

    fn run_at(&self, at: Timestamp, job: Job) -> ScheduledTask {
        let delay = (at - now()).to_std().unwrap_or(Duration::ZERO);
        self.spawn_once(delay, job)
    }

    fn run_daily<F>(&self, time_of_day: NaiveTime, job: F) -> ScheduledTask
    where
        F: Fn() -> Job + Send + Sync + 'static,
    {
        self.spawn_recurring(job, move || {
            let next = next_daily_occurrence(Local::now().naive_local(), time_of_day);
            Some(delay_until_local(next))
        })
    }

    fn run_on_cron<F>(&self, expression: &str, job: F) -> Result<ScheduledTask, HearthError>
    where
        F: Fn() -> Job + Send + Sync + 'static,
    {
        let schedule = parse_cron(expression)?;
        Ok(self.spawn_recurring(job, move || {
            schedule
                .upcoming(Local)
                .next()
                .map(|next| (next - Local::now()).to_std().unwrap_or(Duration::ZERO))
        }))
    }
}

/// Parse a cron expression. Classic 5-field expressions get a leading
/// seconds field.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidCron`] when the expression is invalid.
pub fn parse_cron(expression: &str) -> Result<Schedule, ValidationError> {
    let normalized = if expression.split_whitespace().count() == 5 {
        format!("0 {expression}")
    } else {
        expression.to_string()
    };
    Schedule::from_str(&normalized).map_err(|err| {
        tracing::debug!(expression, error = %err, "invalid cron expression");
        ValidationError::InvalidCron {
            expression: expression.to_string(),
        }
    })
}

/// Parse `HH:MM` or `HH:MM:SS`.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidTimeOfDay`] for anything else.
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, ValidationError> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| ValidationError::InvalidTimeOfDay {
            value: value.to_string(),
        })
}

/// The first `at` strictly after `now`.
#[must_use]
pub fn next_daily_occurrence(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(at);
    if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    }
}

fn delay_until_local(target: NaiveDateTime) -> Duration {
    // Local times skipped by a DST change resolve an hour later.
    Local
        .from_local_datetime(&target)
        .earliest()
        .or_else(|| {
            Local
                .from_local_datetime(&(target + chrono::Duration::hours(1)))
                .earliest()
        })
        .map_or(Duration::from_secs(3600), |at| {
            (at - Local::now()).to_std().unwrap_or(Duration::ZERO)
        })
}

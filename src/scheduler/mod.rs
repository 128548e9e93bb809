// src/scheduler/mod.rs
//! Decides whether a collection run is due, guards it with the run lock,
//! retries failed attempts, records the outcome and notifies.
//!
//! Idle → Checking → (Skipped | Running) → Recording → Idle

pub mod lock;
pub mod state;

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Timelike, Utc};
use futures::FutureExt;
use metrics::counter;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::error::{LockError, SchedulerRunError, SnapshotWriteError, StateUpdateError};
use crate::notify::{NotificationEvent, NotifierFactory, NotifierMux};
use crate::pipeline::{Pipeline, RunResult};
use crate::store::{load_json, save_json, Slot, Store};

pub use lock::{LockStatus, RunLock};
pub use state::{ChannelConfig, NotificationConfig, QuietHours, RetryPolicy, ScheduleState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Periodic tick; all gating applies.
    Scheduled,
    /// Operator request; only a live lock prevents the run.
    Forced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    Disabled,
    AlreadyRunning,
    QuietHours,
    IntervalNotElapsed { remaining_secs: u64 },
}

impl SkipReason {
    pub fn label(self) -> &'static str {
        match self {
            SkipReason::Disabled => "disabled",
            SkipReason::AlreadyRunning => "already_running",
            SkipReason::QuietHours => "quiet_hours",
            SkipReason::IntervalNotElapsed { .. } => "interval_not_elapsed",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::IntervalNotElapsed { remaining_secs } => {
                write!(f, "interval not elapsed ({remaining_secs}s remaining)")
            }
            other => f.write_str(&other.label().replace('_', " ")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// Result of the last attempt.
    pub result: RunResult,
    pub attempts: u32,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.result.success
    }

    pub fn error(&self) -> Option<SchedulerRunError> {
        (!self.result.success).then(|| SchedulerRunError::Exhausted {
            attempts: self.attempts,
            last_error: self
                .result
                .error
                .clone()
                .unwrap_or_else(|| "unknown error".to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScheduleOutcome {
    Skipped(SkipReason),
    Completed(RunReport),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerStatus {
    pub enabled: bool,
    pub running: bool,
    pub quiet_hours_active: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub should_run: bool,
    pub config: ScheduleState,
}

/// Quiet-hours test at minute granularity. A window with `start > end`
/// wraps midnight; either bound missing means no window.
pub fn is_quiet_hours(window: &QuietHours, now: NaiveTime) -> bool {
    let (Some(start), Some(end)) = (window.start, window.end) else {
        return false;
    };
    let (now, start, end) = (minute_of_day(now), minute_of_day(start), minute_of_day(end));
    if start > end {
        now >= start || now <= end
    } else {
        start <= now && now <= end
    }
}

fn minute_of_day(t: NaiveTime) -> u32 {
    t.hour() * 60 + t.minute()
}

/// Pure gating decision. `None` means run.
pub fn gate(
    state: &ScheduleState,
    lock_live: bool,
    quiet: bool,
    now: DateTime<Utc>,
    trigger: Trigger,
) -> Option<SkipReason> {
    if lock_live {
        return Some(SkipReason::AlreadyRunning);
    }
    if trigger == Trigger::Forced {
        return None;
    }
    if !state.enabled {
        return Some(SkipReason::Disabled);
    }
    if quiet {
        return Some(SkipReason::QuietHours);
    }
    if let Some(last) = state.last_run {
        let since = now.signed_duration_since(last).num_seconds();
        let interval = state.interval_secs();
        if since < interval {
            return Some(SkipReason::IntervalNotElapsed {
                remaining_secs: (interval - since).max(0) as u64,
            });
        }
    }
    None
}

/// Delay before retry number `attempt + 1`.
pub trait Backoff: Send + Sync {
    fn delay(&self, attempt: u32, policy: &RetryPolicy) -> Duration;
}

/// `retry_policy.delay_seconds` between every attempt.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedDelay;

impl Backoff for FixedDelay {
    fn delay(&self, _attempt: u32, policy: &RetryPolicy) -> Duration {
        Duration::from_secs(policy.delay_seconds)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LinearBackoff;

impl Backoff for LinearBackoff {
    fn delay(&self, attempt: u32, policy: &RetryPolicy) -> Duration {
        Duration::from_secs(policy.delay_seconds.saturating_mul(u64::from(attempt)))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoDelay;

impl Backoff for NoDelay {
    fn delay(&self, _attempt: u32, _policy: &RetryPolicy) -> Duration {
        Duration::ZERO
    }
}

pub struct Scheduler {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    pipeline: Arc<dyn Pipeline>,
    notifiers: Arc<dyn NotifierFactory>,
    backoff: Arc<dyn Backoff>,
    /// Held for the whole of a run; the lock file only guards other processes.
    active: tokio::sync::Mutex<()>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        pipeline: Arc<dyn Pipeline>,
        notifiers: Arc<dyn NotifierFactory>,
    ) -> Self {
        Self {
            store,
            clock,
            pipeline,
            notifiers,
            backoff: Arc::new(FixedDelay),
            active: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_backoff(mut self, backoff: Arc<dyn Backoff>) -> Self {
        self.backoff = backoff;
        self
    }

    /// Missing or unparsable state reads as defaults.
    pub async fn load_state(&self) -> ScheduleState {
        load_json(self.store.as_ref(), Slot::Schedule)
            .await
            .unwrap_or_default()
    }

    pub async fn save_state(&self, state: &ScheduleState) -> Result<(), SnapshotWriteError> {
        save_json(self.store.as_ref(), Slot::Schedule, state).await?;
        Ok(())
    }

    fn lock_for(&self, state: &ScheduleState) -> RunLock {
        RunLock::new(self.store.clone(), self.clock.clone(), state.max_execution_time)
    }

    pub async fn status(&self) -> SchedulerStatus {
        let state = self.load_state().await;
        let running = match self.lock_for(&state).inspect().await {
            Ok(s) => s.is_live() || self.active.try_lock().is_err(),
            Err(e) => {
                warn!(target: "scheduler", error = %e, "lock unreadable; reporting as running");
                true
            }
        };
        let quiet = is_quiet_hours(&state.quiet_hours, self.clock.local_time());
        let should_run = gate(&state, running, quiet, self.clock.now(), Trigger::Scheduled).is_none();
        SchedulerStatus {
            enabled: state.enabled,
            running,
            quiet_hours_active: quiet,
            last_run: state.last_run,
            next_run: state.next_run,
            should_run,
            config: state,
        }
    }

    pub async fn should_run(&self) -> bool {
        self.status().await.should_run
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<ScheduleState, SnapshotWriteError> {
        let mut state = self.load_state().await;
        state.enabled = enabled;
        self.save_state(&state).await?;
        info!(target: "scheduler", enabled, "schedule toggled");
        Ok(state)
    }

    pub async fn update_config(
        &self,
        patch: &serde_json::Value,
    ) -> Result<ScheduleState, StateUpdateError> {
        let state = self
            .load_state()
            .await
            .merged(patch)
            .map_err(StateUpdateError::Invalid)?;
        self.save_state(&state).await?;
        info!(target: "scheduler", "configuration updated");
        Ok(state)
    }

    /// One trigger. Skips and completed runs (successful or not) are `Ok`;
    /// `Err` means lock or state storage failed, which is also notified.
    pub async fn run(&self, trigger: Trigger) -> Result<ScheduleOutcome, SchedulerRunError> {
        crate::metrics::describe_metrics();
        let Ok(_active) = self.active.try_lock() else {
            return Ok(self.skip(SkipReason::AlreadyRunning));
        };
        let state = self.load_state().await;
        let notifier = self.notifiers.build(&state.notifications);
        let lock = self.lock_for(&state);

        let lock_status = match lock.inspect().await {
            Ok(s) => s,
            Err(e) => return Err(self.fail(&notifier, SchedulerRunError::Lock(e)).await),
        };
        let quiet = is_quiet_hours(&state.quiet_hours, self.clock.local_time());
        if let Some(reason) = gate(&state, lock_status.is_live(), quiet, self.clock.now(), trigger) {
            return Ok(self.skip(reason));
        }

        match lock.acquire().await {
            Ok(()) => {}
            Err(LockError::Held { .. }) => return Ok(self.skip(SkipReason::AlreadyRunning)),
            Err(LockError::Store(e)) => {
                return Err(self.fail(&notifier, SchedulerRunError::Lock(e)).await)
            }
        }

        info!(target: "scheduler", ?trigger, "starting collection run");
        let report = self.attempt_runs(&state.retry_policy).await;

        if let Err(e) = lock.release().await {
            self.notify_error(&notifier, &SchedulerRunError::Lock(e)).await;
        }

        let recorded = self.record_run().await;
        notifier
            .notify(&NotificationEvent::from_run(&report.result, self.clock.now()))
            .await;
        if let Err(e) = recorded {
            return Err(self.fail(&notifier, SchedulerRunError::State(e)).await);
        }

        let outcome = if report.succeeded() { "success" } else { "failure" };
        counter!("scheduler_runs_total", "outcome" => outcome).increment(1);
        match report.error() {
            None => info!(
                target: "scheduler",
                items = report.result.items_count,
                attempts = report.attempts,
                "collection run completed"
            ),
            Some(e) => error!(target: "scheduler", error = %e, "collection run failed"),
        }
        Ok(ScheduleOutcome::Completed(report))
    }

    async fn attempt_runs(&self, policy: &RetryPolicy) -> RunReport {
        let attempts = policy.attempts.max(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let started = tokio::time::Instant::now();
            let result = match AssertUnwindSafe(self.pipeline.run_once())
                .catch_unwind()
                .await
            {
                Ok(r) => r,
                Err(panic) => {
                    let e = SchedulerRunError::Panicked(panic_message(panic.as_ref()));
                    RunResult::failed(e.to_string(), started.elapsed().as_secs_f64())
                }
            };
            if result.success || attempt >= attempts {
                return RunReport {
                    result,
                    attempts: attempt,
                };
            }
            let delay = self.backoff.delay(attempt, policy);
            warn!(
                target: "scheduler",
                attempt,
                attempts,
                error = result.error.as_deref().unwrap_or("unknown error"),
                retry_in_secs = delay.as_secs(),
                "collection attempt failed"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Reload state (it may have been edited during the run) and stamp
    /// `last_run` / `next_run`.
    async fn record_run(&self) -> Result<(), SnapshotWriteError> {
        let mut state = self.load_state().await;
        let now = self.clock.now();
        state.last_run = Some(now);
        state.next_run =
            ChronoDuration::try_seconds(state.interval_secs()).and_then(|d| now.checked_add_signed(d));
        self.save_state(&state).await
    }

    fn skip(&self, reason: SkipReason) -> ScheduleOutcome {
        info!(target: "scheduler", %reason, "conditions not met; skipping run");
        counter!("scheduler_skips_total", "reason" => reason.label()).increment(1);
        ScheduleOutcome::Skipped(reason)
    }

    async fn notify_error(&self, notifier: &NotifierMux, e: &SchedulerRunError) {
        error!(target: "scheduler", error = %e, "scheduler error");
        notifier
            .notify(&NotificationEvent::scheduler_error(&e.to_string(), self.clock.now()))
            .await;
    }

    async fn fail(&self, notifier: &NotifierMux, e: SchedulerRunError) -> SchedulerRunError {
        self.notify_error(notifier, &e).await;
        e
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

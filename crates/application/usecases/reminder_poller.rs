use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use thiserror::Error;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    application::usecases::dispatch_reminder::ReminderDispatcher,
    domain::{
        entities::reminders::ReminderEntity,
        repositories::reminders::ReminderRepository,
        value_objects::retry_policy::{RetryDecision, RetryPolicy},
    },
};

pub const DEFAULT_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);
pub const DEFAULT_BATCH_SIZE: i64 = 50;
pub const DEFAULT_CLAIM_TTL_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: std::time::Duration,
    pub batch_size: i64,
    /// How long a claim protects a record from other pollers. The claim is
    /// renewed right before each dispatch, so this must exceed the per-attempt
    /// dispatch timeout (not the whole batch).
    pub claim_ttl: Duration,
    pub retry_policy: RetryPolicy,
    pub clear_last_error_on_success: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
            claim_ttl: Duration::seconds(DEFAULT_CLAIM_TTL_SECS),
            retry_policy: RetryPolicy::default(),
            clear_last_error_on_success: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// The previous cycle was still running, so this one did nothing.
    pub skipped: bool,
    pub selected: usize,
    pub delivered: usize,
    pub failed: usize,
    pub dead_lettered: usize,
    pub save_failed: usize,
    /// Reminders another poller took over before this one could send or
    /// record them.
    pub claim_lost: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PollerError {
    #[error("reminder poller is already running")]
    AlreadyStarted,
}

/// Owns the pending -> delivered transition. Each cycle claims a bounded
/// batch of due reminders and dispatches them one at a time.
pub struct ReminderPoller {
    repository: Arc<dyn ReminderRepository + Send + Sync>,
    dispatcher: Arc<ReminderDispatcher>,
    config: PollerConfig,
    worker_id: String,
    in_flight: AtomicBool,
    started: AtomicBool,
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ReminderPoller {
    pub fn new(
        repository: Arc<dyn ReminderRepository + Send + Sync>,
        dispatcher: Arc<ReminderDispatcher>,
        config: PollerConfig,
    ) -> Self {
        Self {
            repository,
            dispatcher,
            config,
            worker_id: format!("poller-{}", Uuid::new_v4()),
            in_flight: AtomicBool::new(false),
            started: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub async fn run_cycle(&self) -> Result<CycleReport> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Runs one poll cycle as of `now`. Store failures while selecting abort
    /// the cycle with an error; anything that goes wrong with a single
    /// reminder is recorded and the batch continues.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!(
                worker_id = %self.worker_id,
                "reminder_poller: previous cycle still running, skipping"
            );
            return Ok(CycleReport {
                skipped: true,
                ..Default::default()
            });
        }
        let _guard = InFlightGuard(&self.in_flight);

        let due = self
            .repository
            .claim_due(
                now,
                self.config.batch_size,
                self.worker_id.clone(),
                self.config.claim_ttl,
            )
            .await?;

        let mut report = CycleReport {
            selected: due.len(),
            ..Default::default()
        };

        if due.is_empty() {
            debug!(worker_id = %self.worker_id, "reminder_poller: no due reminders");
            return Ok(report);
        }

        let clock = CycleClock::start(now);
        for reminder in due {
            self.process_reminder(reminder, &clock, &mut report).await;
        }

        info!(
            worker_id = %self.worker_id,
            selected = report.selected,
            delivered = report.delivered,
            failed = report.failed,
            dead_lettered = report.dead_lettered,
            save_failed = report.save_failed,
            claim_lost = report.claim_lost,
            "reminder_poller: cycle completed"
        );

        Ok(report)
    }

    async fn process_reminder(
        &self,
        mut reminder: ReminderEntity,
        clock: &CycleClock,
        report: &mut CycleReport,
    ) {
        let reminder_id = reminder.id;

        // Earlier sends in this batch may have outlived the lease taken at
        // claim time; re-stamp it so the lease covers this dispatch.
        match self
            .repository
            .renew_claim(reminder_id, self.worker_id.clone(), clock.now())
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                report.claim_lost += 1;
                warn!(
                    %reminder_id,
                    worker_id = %self.worker_id,
                    "reminder_poller: claim taken over by another poller, skipping"
                );
                return;
            }
            Err(err) => {
                report.claim_lost += 1;
                error!(
                    %reminder_id,
                    db_error = ?err,
                    "reminder_poller: failed to renew claim, skipping"
                );
                return;
            }
        }

        let outcome = self
            .dispatcher
            .dispatch(&reminder.recipient, &reminder.payload)
            .await;
        let now = clock.now();

        reminder.attempt_count += 1;
        reminder.claimed_at = None;
        reminder.claimed_by = None;

        match outcome {
            Ok(()) => {
                reminder.delivered = true;
                reminder.delivered_at = Some(now);
                if self.config.clear_last_error_on_success {
                    reminder.last_error = None;
                }
                report.delivered += 1;
                info!(
                    %reminder_id,
                    attempt_count = reminder.attempt_count,
                    "reminder_poller: reminder delivered"
                );
            }
            Err(err) => {
                reminder.last_error = Some(err.to_string());
                let attempts = u32::try_from(reminder.attempt_count).unwrap_or(u32::MAX);

                match self.config.retry_policy.after_failure(attempts, now) {
                    RetryDecision::RetryAt(next_attempt_at) => {
                        reminder.next_attempt_at = next_attempt_at;
                        report.failed += 1;
                        warn!(
                            %reminder_id,
                            attempt_count = reminder.attempt_count,
                            %next_attempt_at,
                            error = %err,
                            "reminder_poller: delivery failed, will retry"
                        );
                    }
                    RetryDecision::DeadLetter => {
                        reminder.dead_lettered_at = Some(now);
                        report.dead_lettered += 1;
                        error!(
                            %reminder_id,
                            attempt_count = reminder.attempt_count,
                            error = %err,
                            "reminder_poller: delivery failed, giving up"
                        );
                    }
                }
            }
        }

        match self
            .repository
            .save_claimed(reminder, self.worker_id.clone())
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                report.claim_lost += 1;
                warn!(
                    %reminder_id,
                    worker_id = %self.worker_id,
                    "reminder_poller: claim lost before the outcome was saved"
                );
            }
            Err(err) => {
                // The claim lapses after `claim_ttl`, so the reminder is picked up
                // again; a delivered-but-unsaved reminder is sent twice.
                report.save_failed += 1;
                error!(
                    %reminder_id,
                    db_error = ?err,
                    "reminder_poller: failed to save delivery state"
                );
            }
        }
    }
}

/// Wall-clock time inside a cycle: the cycle's `now` plus the monotonic time
/// elapsed since the cycle started.
struct CycleClock {
    cycle_now: DateTime<Utc>,
    started: Instant,
}

impl CycleClock {
    fn start(cycle_now: DateTime<Utc>) -> Self {
        Self {
            cycle_now,
            started: Instant::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        Duration::from_std(self.started.elapsed())
            .ok()
            .and_then(|elapsed| self.cycle_now.checked_add_signed(elapsed))
            .unwrap_or(self.cycle_now)
    }
}

/// A running poll loop. Dropping the handle also ends the loop once the
/// current cycle finishes; [`PollerHandle::stop`] additionally waits for it.
pub struct PollerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Spawns the poll loop. A poller can be started once per process.
    pub fn start(poller: Arc<ReminderPoller>) -> Result<Self, PollerError> {
        if poller.started.swap(true, Ordering::AcqRel) {
            return Err(PollerError::AlreadyStarted);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_poll_loop(poller, shutdown_rx));

        Ok(Self { shutdown_tx, task })
    }

    /// Signals the loop and waits for the in-flight cycle, if any, to finish.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(err) = self.task.await {
            error!(error = %err, "reminder_poller: poll loop terminated abnormally");
        }
    }
}

async fn run_poll_loop(poller: Arc<ReminderPoller>, mut shutdown_rx: watch::Receiver<bool>) {
    info!(
        worker_id = %poller.worker_id,
        interval = ?poller.config.interval,
        batch_size = poller.config.batch_size,
        "reminder_poller: starting poll loop"
    );

    let mut ticker = time::interval(poller.config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = poller.run_cycle().await {
                    error!(
                        worker_id = %poller.worker_id,
                        error = %err,
                        "reminder_poller: cycle failed"
                    );
                }
            }
            _ = shutdown_rx.changed() => {
                info!(worker_id = %poller.worker_id, "reminder_poller: shutting down");
                break;
            }
        }
    }
}

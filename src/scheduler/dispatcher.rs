//! Scheduled action dispatcher.
//!
//! Once per tick, for each recurring action, every opted-in subject is
//! checked against the action's local window. A due subject with pending
//! goals gets one reservation attempt; only the winner composes and sends.
//! A failed send after a won reservation is an accepted loss and is not
//! retried on later ticks. Pending deletion requests past their `eta` are
//! executed in the same tick.
//!
//! Subjects are processed concurrently, bounded by a semaphore. One
//! subject's failure never aborts the sweep for the others.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::channels::ResilientChannel;
use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::scheduler::actions::{ScheduledAction, local_time};
use crate::scheduler::content::{ContentSource, NudgeContext};
use crate::scheduler::ledger::{DeliveryOutcome, DeliveryRecord, Reservation, ReservationLedger};
use crate::store::{Store, Subject};

/// Counters for one action over one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActionReport {
    /// Subjects whose local window matched.
    pub eligible: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Lost the reservation to an earlier tick or another process.
    pub duplicate: usize,
    /// Opted in but unreachable (bad address) or nothing pending.
    pub skipped: usize,
}

impl ActionReport {
    fn record(&mut self, outcome: SubjectOutcome) {
        match outcome {
            SubjectOutcome::NotDue => {}
            SubjectOutcome::Unreachable => self.skipped += 1,
            SubjectOutcome::NothingPending => {
                self.eligible += 1;
                self.skipped += 1;
            }
            SubjectOutcome::Duplicate => {
                self.eligible += 1;
                self.duplicate += 1;
            }
            SubjectOutcome::Delivered => {
                self.eligible += 1;
                self.delivered += 1;
            }
            SubjectOutcome::Failed => {
                self.eligible += 1;
                self.failed += 1;
            }
        }
    }
}

/// Summary of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub at: i64,
    pub actions: Vec<(String, ActionReport)>,
    pub deletions_executed: usize,
    pub deletions_failed: usize,
}

impl TickReport {
    /// Counters for one action kind, if it ran this tick.
    #[must_use]
    pub fn action(&self, kind: &str) -> Option<&ActionReport> {
        self.actions.iter().find(|(k, _)| k == kind).map(|(_, r)| r)
    }

    fn is_quiet(&self) -> bool {
        self.deletions_executed == 0
            && self.deletions_failed == 0
            && self.actions.iter().all(|(_, r)| r.eligible == 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubjectOutcome {
    NotDue,
    Unreachable,
    NothingPending,
    Duplicate,
    Delivered,
    Failed,
}

/// Shared state cloned into per-subject tasks.
struct Shared {
    store: Arc<Store>,
    ledger: ReservationLedger,
    channel: ResilientChannel,
    content: Arc<dyn ContentSource>,
}

/// Drives scheduled actions against the store and a channel.
pub struct Dispatcher {
    shared: Arc<Shared>,
    actions: Vec<ScheduledAction>,
    deletion_enabled: bool,
    max_concurrent_subjects: usize,
    tick_interval: Duration,
}

impl Dispatcher {
    pub fn new(
        store: Arc<Store>,
        channel: ResilientChannel,
        content: Arc<dyn ContentSource>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                ledger: ReservationLedger::new(Arc::clone(&store)),
                store,
                channel,
                content,
            }),
            actions: ScheduledAction::from_config(config),
            deletion_enabled: config.deletion.enabled,
            max_concurrent_subjects: config.max_concurrent_subjects.max(1),
            tick_interval: Duration::from_secs(config.tick_interval_secs.max(1)),
        }
    }

    #[must_use]
    pub fn actions(&self) -> &[ScheduledAction] {
        &self.actions
    }

    /// Run one tick as of `now`.
    ///
    /// Errors only when the subject list cannot be read; everything past
    /// that point is caught per subject or per deletion request.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let subjects = self.shared.store.channel_subjects()?;
        let mut report = TickReport {
            at: now.timestamp(),
            ..TickReport::default()
        };

        for action in &self.actions {
            let counters = self.run_action(*action, &subjects, now).await;
            report.actions.push((action.kind.as_str().to_owned(), counters));
        }

        if self.deletion_enabled {
            self.sweep_deletions(now, &mut report);
        }
        Ok(report)
    }

    async fn run_action(
        &self,
        action: ScheduledAction,
        subjects: &[Subject],
        now: DateTime<Utc>,
    ) -> ActionReport {
        let permits = Arc::new(Semaphore::new(self.max_concurrent_subjects));
        let mut set = JoinSet::new();

        for subject in subjects.iter().cloned() {
            let shared = Arc::clone(&self.shared);
            let permits = Arc::clone(&permits);
            set.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return SubjectOutcome::Failed;
                };
                let subject_id = subject.id.clone();
                match process_subject(&shared, action, subject, now).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(
                            action = %action.kind,
                            subject = %subject_id,
                            "subject skipped after error: {e}"
                        );
                        SubjectOutcome::Failed
                    }
                }
            });
        }

        let mut report = ActionReport::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    error!(action = %action.kind, "subject task panicked: {e}");
                    report.record(SubjectOutcome::Failed);
                }
            }
        }
        report
    }

    fn sweep_deletions(&self, now: DateTime<Utc>, report: &mut TickReport) {
        let now_ts = now.timestamp();
        let due = match self.shared.store.due_deletions(now_ts) {
            Ok(due) => due,
            Err(e) => {
                error!("cannot list due deletions: {e}");
                return;
            }
        };

        for request in due {
            match self.shared.store.execute_deletion(&request.id, now_ts) {
                Ok(Some(removed)) => {
                    report.deletions_executed += 1;
                    info!(
                        subject = %request.subject_id,
                        request = %request.id,
                        goals = removed.hierarchy.goals,
                        microtasks = removed.hierarchy.microtasks,
                        "subject data deleted"
                    );
                }
                Ok(None) => debug!(request = %request.id, "deletion claimed elsewhere"),
                Err(e) => {
                    report.deletions_failed += 1;
                    error!(request = %request.id, "deletion failed, will retry next tick: {e}");
                }
            }
        }
    }

    /// Spawn the tick loop. The first tick lands on the next interval
    /// boundary of the wall clock; missed ticks are skipped, not replayed.
    pub fn run(self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let first = tokio::time::Instant::now() + delay_to_boundary(Utc::now(), self.tick_interval);
            let mut interval = tokio::time::interval_at(first, self.tick_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!(
                actions = self.actions.len(),
                interval_secs = self.tick_interval.as_secs(),
                "dispatcher started"
            );

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        info!("dispatcher stopping");
                        return;
                    }
                    _ = interval.tick() => {}
                }

                match self.tick_at(Utc::now()).await {
                    Ok(report) if report.is_quiet() => debug!("tick: nothing due"),
                    Ok(report) => info!(?report, "tick complete"),
                    Err(e) => error!("tick failed: {e}"),
                }
            }
        })
    }
}

/// Time from `now` to the next multiple of `interval` since the epoch.
fn delay_to_boundary(now: DateTime<Utc>, interval: Duration) -> Duration {
    let period_ms = interval.as_millis().max(1);
    let now_ms = u128::try_from(now.timestamp_millis()).unwrap_or_default();
    let into = now_ms % period_ms;
    if into == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(u64::try_from(period_ms - into).unwrap_or(u64::MAX))
}

async fn process_subject(
    shared: &Shared,
    action: ScheduledAction,
    subject: Subject,
    now: DateTime<Utc>,
) -> Result<SubjectOutcome> {
    let Some(address) = subject
        .channel_address
        .clone()
        .filter(|a| shared.channel.is_valid_address(a))
    else {
        debug!(subject = %subject.id, "no valid channel address, skipping");
        return Ok(SubjectOutcome::Unreachable);
    };

    let local = local_time(now, subject.timezone.as_deref());
    if !action.schedule.is_due_at(&local) {
        return Ok(SubjectOutcome::NotDue);
    }

    let goals = shared.store.goal_digests(&subject.id)?;
    if goals.is_empty() {
        debug!(action = %action.kind, subject = %subject.id, "nothing pending");
        return Ok(SubjectOutcome::NothingPending);
    }

    let period = action.schedule.period_key(&local);
    if shared.ledger.reserve(action.kind, &subject.id, &period)? == Reservation::AlreadyClaimed {
        return Ok(SubjectOutcome::Duplicate);
    }

    let ctx = NudgeContext {
        kind: action.kind,
        local_date: local.date_naive(),
        subject,
        goals,
    };
    let mut record = DeliveryRecord {
        action: action.kind.as_str().to_owned(),
        subject_id: ctx.subject.id.clone(),
        period_key: period,
        outcome: DeliveryOutcome::Failed,
        message_id: None,
        attempts: 0,
        error: None,
        at: now.timestamp(),
    };

    let outcome = match shared.content.compose(&ctx).await {
        Err(e) => {
            record.error = Some(format!("content: {e}"));
            SubjectOutcome::Failed
        }
        Ok(text) => match shared.channel.send(&address, &text).await {
            Ok(delivery) => {
                record.outcome = DeliveryOutcome::Delivered;
                record.message_id = delivery.receipt.message_id;
                record.attempts = delivery.attempts;
                SubjectOutcome::Delivered
            }
            Err(failure) => {
                record.attempts = failure.attempts;
                record.error = Some(failure.last_error.to_string());
                SubjectOutcome::Failed
            }
        },
    };

    match outcome {
        SubjectOutcome::Delivered => info!(
            action = %action.kind,
            subject = %record.subject_id,
            period = %record.period_key,
            attempts = record.attempts,
            message_id = record.message_id.as_deref().unwrap_or("-"),
            "nudge delivered"
        ),
        _ => warn!(
            action = %action.kind,
            subject = %record.subject_id,
            period = %record.period_key,
            attempts = record.attempts,
            error = record.error.as_deref().unwrap_or("-"),
            "nudge lost for this period"
        ),
    }
    if let Err(e) = shared.ledger.record_delivery(&record) {
        warn!(subject = %record.subject_id, "cannot log delivery: {e}");
    }
    Ok(outcome)
}

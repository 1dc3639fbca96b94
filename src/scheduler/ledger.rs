//! Reservation ledger and delivery log.
//!
//! Contract: a successful [`ReservationLedger::reserve`] means the caller
//! owns `(action, subject, period)` and nobody else will deliver it. The
//! claim is one `INSERT OR IGNORE` against a primary key, so concurrent
//! ticks in any number of processes get exactly one winner. Claims are
//! never released, even when the delivery that follows fails.

use std::sync::Arc;

use rusqlite::params;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, StrideError};
use crate::scheduler::actions::ActionKind;
use crate::store::{Store, new_id, now_epoch_secs};

/// Outcome of a reservation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// This caller now owns the period.
    Claimed,
    /// Another tick or process got there first.
    AlreadyClaimed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    Failed,
}

impl DeliveryOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }

    fn from_db(s: &str) -> Self {
        if s == "delivered" {
            Self::Delivered
        } else {
            Self::Failed
        }
    }
}

/// One post-reservation delivery attempt, kept for observability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub action: String,
    pub subject_id: String,
    pub period_key: String,
    pub outcome: DeliveryOutcome,
    pub message_id: Option<String>,
    pub attempts: u32,
    pub error: Option<String>,
    pub at: i64,
}

/// Durable at-most-once claims keyed by action, subject and period.
#[derive(Clone)]
pub struct ReservationLedger {
    store: Arc<Store>,
}

impl ReservationLedger {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Atomically claim `(action, subject, period)`.
    pub fn reserve(
        &self,
        action: ActionKind,
        subject_id: &str,
        period_key: &str,
    ) -> Result<Reservation> {
        if subject_id.trim().is_empty() || period_key.trim().is_empty() {
            return Err(StrideError::Scheduler(
                "reservation key must not be empty".to_owned(),
            ));
        }
        let conn = self.store.lock()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO reservations (action, subject_id, period_key, reserved_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![action.as_str(), subject_id, period_key, now_epoch_secs()],
        )?;
        if inserted == 1 {
            Ok(Reservation::Claimed)
        } else {
            debug!(
                action = %action,
                subject = %subject_id,
                period = %period_key,
                "period already reserved"
            );
            Ok(Reservation::AlreadyClaimed)
        }
    }

    pub fn is_reserved(&self, action: ActionKind, subject_id: &str, period_key: &str) -> Result<bool> {
        let conn = self.store.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM reservations \
             WHERE action = ?1 AND subject_id = ?2 AND period_key = ?3",
            params![action.as_str(), subject_id, period_key],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Append a delivery record.
    pub fn record_delivery(&self, record: &DeliveryRecord) -> Result<()> {
        let conn = self.store.lock()?;
        conn.execute(
            "INSERT INTO deliveries (id, action, subject_id, period_key, outcome, message_id, attempts, error, at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                new_id("dlv"),
                record.action,
                record.subject_id,
                record.period_key,
                record.outcome.as_str(),
                record.message_id,
                record.attempts,
                record.error,
                record.at
            ],
        )?;
        Ok(())
    }

    /// Delivery history for one subject, oldest first.
    pub fn deliveries_for(&self, subject_id: &str) -> Result<Vec<DeliveryRecord>> {
        let conn = self.store.lock()?;
        let mut stmt = conn.prepare(
            "SELECT action, subject_id, period_key, outcome, message_id, attempts, error, at \
             FROM deliveries WHERE subject_id = ?1 ORDER BY at, rowid",
        )?;
        let rows = stmt.query_map(params![subject_id], |row| {
            let outcome: String = row.get(3)?;
            Ok(DeliveryRecord {
                action: row.get(0)?,
                subject_id: row.get(1)?,
                period_key: row.get(2)?,
                outcome: DeliveryOutcome::from_db(&outcome),
                message_id: row.get(4)?,
                attempts: row.get(5)?,
                error: row.get(6)?,
                at: row.get(7)?,
            })
        })?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}

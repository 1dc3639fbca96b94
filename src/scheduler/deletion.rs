//! Deferred subject deletion.
//!
//! A request is `pending` until its `eta`, then the sweeper claims it with
//! a conditional `pending -> done` update and removes everything the
//! subject owns in the same transaction. Losing the claim to another
//! sweeper is a silent skip.

use rusqlite::{OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, StrideError};
use crate::hierarchy::repository::{RemovedRows, delete_user_hierarchy_tx};
use crate::store::{Store, new_id, now_epoch_secs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionStatus {
    Pending,
    Cancelled,
    Done,
}

impl DeletionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Cancelled => "cancelled",
            Self::Done => "done",
        }
    }

    fn from_db(s: &str) -> Self {
        match s {
            "cancelled" => Self::Cancelled,
            "done" => Self::Done,
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionRequest {
    pub id: String,
    pub subject_id: String,
    pub requested_at: i64,
    /// Epoch seconds after which the sweeper may execute.
    pub eta: i64,
    pub status: DeletionStatus,
    pub executed_at: Option<i64>,
}

/// What an executed deletion removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeletionReport {
    pub hierarchy: RemovedRows,
    pub reservations: usize,
    pub subject_removed: bool,
}

const REQUEST_COLUMNS: &str = "id, subject_id, requested_at, eta, status, executed_at";

impl Store {
    /// Schedule deletion of everything `subject_id` owns at `eta`. A
    /// subject has at most one pending request; asking again returns it.
    pub fn request_deletion(&self, subject_id: &str, eta: i64) -> Result<DeletionRequest> {
        if subject_id.trim().is_empty() {
            return Err(StrideError::Invalid("subject id must not be empty".to_owned()));
        }
        self.with_write_tx(|tx| {
            let existing = tx
                .query_row(
                    &format!(
                        "SELECT {REQUEST_COLUMNS} FROM deletion_requests \
                         WHERE subject_id = ?1 AND status = 'pending'"
                    ),
                    params![subject_id],
                    row_to_request,
                )
                .optional()?;
            if let Some(existing) = existing {
                return Ok(existing);
            }

            let request = DeletionRequest {
                id: new_id("del"),
                subject_id: subject_id.to_owned(),
                requested_at: now_epoch_secs(),
                eta,
                status: DeletionStatus::Pending,
                executed_at: None,
            };
            tx.execute(
                "INSERT INTO deletion_requests (id, subject_id, requested_at, eta, status) \
                 VALUES (?1, ?2, ?3, ?4, 'pending')",
                params![request.id, request.subject_id, request.requested_at, request.eta],
            )?;
            info!(subject = %subject_id, eta, "deletion scheduled");
            Ok(request)
        })
    }

    /// Cancel the subject's pending request. Returns `false` when there
    /// was nothing pending.
    pub fn cancel_deletion(&self, subject_id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE deletion_requests SET status = 'cancelled' \
             WHERE subject_id = ?1 AND status = 'pending'",
            params![subject_id],
        )?;
        Ok(rows > 0)
    }

    /// Pending requests whose `eta` has passed, oldest first.
    pub fn due_deletions(&self, now: i64) -> Result<Vec<DeletionRequest>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {REQUEST_COLUMNS} FROM deletion_requests \
             WHERE status = 'pending' AND eta <= ?1 ORDER BY eta, rowid"
        ))?;
        let rows = stmt.query_map(params![now], row_to_request)?;
        let mut due = Vec::new();
        for row in rows {
            due.push(row?);
        }
        Ok(due)
    }

    pub fn deletion_request(&self, id: &str) -> Result<Option<DeletionRequest>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                &format!("SELECT {REQUEST_COLUMNS} FROM deletion_requests WHERE id = ?1"),
                params![id],
                row_to_request,
            )
            .optional()?)
    }

    /// Claim and execute one request. `None` means it was no longer
    /// pending (cancelled, already executed, or not yet due).
    pub fn execute_deletion(&self, request_id: &str, now: i64) -> Result<Option<DeletionReport>> {
        self.with_write_tx(|tx| {
            let claimed = tx.execute(
                "UPDATE deletion_requests SET status = 'done', executed_at = ?2 \
                 WHERE id = ?1 AND status = 'pending' AND eta <= ?2",
                params![request_id, now],
            )?;
            if claimed == 0 {
                return Ok(None);
            }

            let subject_id: String = tx.query_row(
                "SELECT subject_id FROM deletion_requests WHERE id = ?1",
                params![request_id],
                |row| row.get(0),
            )?;
            let hierarchy = delete_user_hierarchy_tx(tx, &subject_id)?;
            let reservations = tx.execute(
                "DELETE FROM reservations WHERE subject_id = ?1",
                params![subject_id],
            )?;
            let subject_removed =
                tx.execute("DELETE FROM users WHERE id = ?1", params![subject_id])? > 0;

            Ok(Some(DeletionReport {
                hierarchy,
                reservations,
                subject_removed,
            }))
        })
    }
}

fn row_to_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeletionRequest> {
    let status: String = row.get(4)?;
    Ok(DeletionRequest {
        id: row.get(0)?,
        subject_id: row.get(1)?,
        requested_at: row.get(2)?,
        eta: row.get(3)?,
        status: DeletionStatus::from_db(&status),
        executed_at: row.get(5)?,
    })
}

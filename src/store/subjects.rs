//! Subject (user) records consumed by the dispatcher.

use rusqlite::{OptionalExtension, params};
use serde::{Deserialize, Serialize};

use super::{Store, now_epoch_secs};
use crate::error::{Result, StrideError};

/// A user as seen by the core: where and when to reach them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub display_name: String,
    /// Free-text IANA zone name. Invalid or missing values mean UTC.
    pub timezone: Option<String>,
    /// Channel-specific recipient identifier.
    pub channel_address: Option<String>,
    /// Explicit per-user opt-out flag.
    pub channel_enabled: bool,
}

impl Subject {
    /// Subject with channel delivery enabled and no timezone set.
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            timezone: None,
            channel_address: None,
            channel_enabled: true,
        }
    }
}

impl Store {
    /// Insert or update a subject record.
    pub fn upsert_subject(&self, subject: &Subject) -> Result<()> {
        if subject.id.trim().is_empty() {
            return Err(StrideError::Invalid("subject id must not be empty".to_owned()));
        }
        let now = now_epoch_secs();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO users (id, display_name, timezone, channel_address, channel_enabled, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6) \
             ON CONFLICT(id) DO UPDATE SET \
               display_name = excluded.display_name, \
               timezone = excluded.timezone, \
               channel_address = excluded.channel_address, \
               channel_enabled = excluded.channel_enabled, \
               updated_at = excluded.updated_at",
            params![
                subject.id,
                subject.display_name,
                subject.timezone,
                subject.channel_address,
                subject.channel_enabled,
                now
            ],
        )?;
        Ok(())
    }

    /// Fetch one subject.
    pub fn subject(&self, id: &str) -> Result<Option<Subject>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                "SELECT id, display_name, timezone, channel_address, channel_enabled \
                 FROM users WHERE id = ?1",
                params![id],
                row_to_subject,
            )
            .optional()?)
    }

    /// Flip the opt-out flag. Returns `false` when the subject is unknown.
    pub fn set_channel_enabled(&self, id: &str, enabled: bool) -> Result<bool> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE users SET channel_enabled = ?1, updated_at = ?2 WHERE id = ?3",
            params![enabled, now_epoch_secs(), id],
        )?;
        Ok(rows > 0)
    }

    /// Subjects that have not opted out of channel delivery.
    ///
    /// Address format is not checked here; that is channel-specific.
    pub fn channel_subjects(&self) -> Result<Vec<Subject>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, display_name, timezone, channel_address, channel_enabled \
             FROM users WHERE channel_enabled = 1 ORDER BY id",
        )?;
        let rows = stmt.query_map([], row_to_subject)?;
        let mut subjects = Vec::new();
        for row in rows {
            subjects.push(row?);
        }
        Ok(subjects)
    }
}

fn row_to_subject(row: &rusqlite::Row<'_>) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: row.get(0)?,
        display_name: row.get(1)?,
        timezone: row.get(2)?,
        channel_address: row.get(3)?,
        channel_enabled: row.get(4)?,
    })
}

//! SQLite DDL for the stride store.
//!
//! All `CREATE TABLE` / `CREATE INDEX` statements live here so they are
//! reviewable and testable in isolation.

use rusqlite::Connection;

/// Current schema version stamped into `schema_meta`.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Complete DDL. Uses `IF NOT EXISTS` throughout so `apply_schema` is idempotent.
pub(crate) const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Subjects (users) the dispatcher may message.
CREATE TABLE IF NOT EXISTS users (
    id              TEXT PRIMARY KEY,
    display_name    TEXT NOT NULL DEFAULT '',
    timezone        TEXT,                     -- IANA name; NULL/invalid means UTC
    channel_address TEXT,                     -- e.g. Telegram chat id
    channel_enabled INTEGER NOT NULL DEFAULT 1,
    created_at      INTEGER NOT NULL DEFAULT 0,
    updated_at      INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS goals (
    id          TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL,
    title       TEXT NOT NULL,
    description TEXT,
    due_date    TEXT,                         -- ISO date
    tone        TEXT NOT NULL DEFAULT 'friendly',
    status      TEXT NOT NULL DEFAULT 'not_started',
    created_at  INTEGER NOT NULL DEFAULT 0,
    updated_at  INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_goals_user ON goals(user_id);

-- position is REAL so a node can be subdivided between existing siblings.
CREATE TABLE IF NOT EXISTS subgoals (
    id       TEXT PRIMARY KEY,
    goal_id  TEXT NOT NULL REFERENCES goals(id),
    user_id  TEXT NOT NULL,
    title    TEXT NOT NULL,
    position REAL NOT NULL,
    status   TEXT NOT NULL DEFAULT 'not_started'
);

CREATE INDEX IF NOT EXISTS idx_subgoals_goal ON subgoals(goal_id, position);

CREATE TABLE IF NOT EXISTS tasks (
    id         TEXT PRIMARY KEY,
    subgoal_id TEXT NOT NULL REFERENCES subgoals(id),
    goal_id    TEXT NOT NULL,
    user_id    TEXT NOT NULL,
    title      TEXT NOT NULL,
    position   REAL NOT NULL,
    status     TEXT NOT NULL DEFAULT 'not_started'
);

CREATE INDEX IF NOT EXISTS idx_tasks_subgoal ON tasks(subgoal_id, position);
CREATE INDEX IF NOT EXISTS idx_tasks_goal    ON tasks(goal_id);

CREATE TABLE IF NOT EXISTS microtasks (
    id           TEXT PRIMARY KEY,
    task_id      TEXT NOT NULL REFERENCES tasks(id),
    goal_id      TEXT NOT NULL,
    user_id      TEXT NOT NULL,
    title        TEXT NOT NULL,
    position     REAL NOT NULL,
    status       TEXT NOT NULL DEFAULT 'todo',
    completed_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_microtasks_task ON microtasks(task_id, position);
CREATE INDEX IF NOT EXISTS idx_microtasks_goal ON microtasks(goal_id, status);

-- Reservation ledger: row existence means "already handled".
CREATE TABLE IF NOT EXISTS reservations (
    action      TEXT NOT NULL,
    subject_id  TEXT NOT NULL,
    period_key  TEXT NOT NULL,
    reserved_at INTEGER NOT NULL,
    PRIMARY KEY (action, subject_id, period_key)
);

CREATE TABLE IF NOT EXISTS deletion_requests (
    id           TEXT PRIMARY KEY,
    subject_id   TEXT NOT NULL,
    requested_at INTEGER NOT NULL,
    eta          INTEGER NOT NULL,
    status       TEXT NOT NULL DEFAULT 'pending',  -- pending | cancelled | done
    executed_at  INTEGER
);

CREATE INDEX IF NOT EXISTS idx_deletion_pending ON deletion_requests(status, eta);

-- Delivery outcomes. Observability only; business logic never reads it.
CREATE TABLE IF NOT EXISTS deliveries (
    id         TEXT PRIMARY KEY,
    action     TEXT NOT NULL,
    subject_id TEXT NOT NULL,
    period_key TEXT NOT NULL,
    outcome    TEXT NOT NULL,   -- delivered | failed
    message_id TEXT,
    attempts   INTEGER NOT NULL DEFAULT 0,
    error      TEXT,
    at         INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_deliveries_subject ON deliveries(subject_id, at);
"#;

/// Apply the full schema to an open connection.
///
/// Safe to call multiple times. Seeds the schema version on a fresh database.
pub(crate) fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        rusqlite::params![CURRENT_SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

/// Read the schema version, `None` when missing.
pub(crate) fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<u32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_meta WHERE key = 'schema_version'")?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().ok())
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_schema_creates_tables() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        apply_schema(&conn).expect("apply_schema");

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .expect("prepare")
            .query_map([], |row| row.get(0))
            .expect("query")
            .filter_map(|r| r.ok())
            .collect();

        for table in [
            "users",
            "goals",
            "subgoals",
            "tasks",
            "microtasks",
            "reservations",
            "deletion_requests",
            "deliveries",
            "schema_meta",
        ] {
            assert!(tables.contains(&table.to_owned()), "missing table {table}");
        }
    }

    #[test]
    fn apply_schema_is_idempotent_and_keeps_version() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        apply_schema(&conn).expect("first apply");
        conn.execute(
            "UPDATE schema_meta SET value = '999' WHERE key = 'schema_version'",
            [],
        )
        .expect("bump version");
        apply_schema(&conn).expect("second apply");

        let version = read_schema_version(&conn).expect("read").expect("present");
        assert_eq!(version, 999);
    }

    #[test]
    fn reservation_primary_key_rejects_duplicates() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        apply_schema(&conn).expect("apply_schema");
        let insert = "INSERT OR IGNORE INTO reservations (action, subject_id, period_key, reserved_at) \
                      VALUES ('daily_reminder', 'u1', '2026-01-15', 0)";
        assert_eq!(conn.execute(insert, []).expect("first"), 1);
        assert_eq!(conn.execute(insert, []).expect("second"), 0);
    }
}

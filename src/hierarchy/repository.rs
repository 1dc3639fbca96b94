//! Hierarchy reads and mutations on [`Store`].
//!
//! Every mutation that can change which leaf is incomplete re-runs the
//! normalizer for the owning goal. The mutation commits first; a failed
//! normalization afterwards is logged and reported, never raised, because
//! derived status is advisory and the next mutation re-derives it.

use std::collections::HashMap;

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use serde::Serialize;
use tracing::{info, warn};

use super::materializer::{Breakdown, MaterializeSummary, materialize_tx};
use super::normalizer::normalize_goal_tx;
use super::types::{
    FocusPointer, Goal, GoalDigest, GoalTree, MicroStatus, Microtask, NewGoal, NodeStatus,
    Subgoal, SubgoalNode, Task, TaskNode, Tone,
};
use crate::error::{Result, StrideError};
use crate::store::{Store, new_id, now_epoch_secs};

/// Result of [`Store::create_goal`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedGoal {
    pub goal_id: String,
    pub summary: MaterializeSummary,
}

/// Result of a leaf mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationOutcome {
    pub goal_id: String,
    /// Focus after normalization; `None` when complete or when
    /// normalization failed.
    pub focus: Option<FocusPointer>,
    /// `false` when the mutation committed but normalization did not.
    pub normalized: bool,
}

/// Rows removed by a subtree deletion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RemovedRows {
    pub goals: usize,
    pub subgoals: usize,
    pub tasks: usize,
    pub microtasks: usize,
}

impl Store {
    /// Create a goal and its whole subtree in one transaction, then
    /// establish the initial focus pointer.
    pub fn create_goal(
        &self,
        user_id: &str,
        new_goal: &NewGoal,
        breakdown: Option<&Breakdown>,
    ) -> Result<CreatedGoal> {
        let title = new_goal.title.trim();
        if title.is_empty() {
            return Err(StrideError::Invalid("goal title must not be empty".to_owned()));
        }

        let goal_id = new_id("goal");
        let summary = self.with_write_tx(|tx| {
            let now = now_epoch_secs();
            tx.execute(
                "INSERT INTO goals (id, user_id, title, description, due_date, tone, status, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'not_started', ?7, ?7)",
                params![
                    goal_id,
                    user_id,
                    title,
                    new_goal.description,
                    new_goal.due_date.map(|d| d.format("%Y-%m-%d").to_string()),
                    new_goal.tone.as_str(),
                    now
                ],
            )?;
            materialize_tx(tx, user_id, &goal_id, title, breakdown)
        })?;

        info!(
            user = %user_id,
            goal = %goal_id,
            subgoals = summary.subgoals,
            microtasks = summary.microtasks,
            scaffold = summary.used_scaffold,
            "goal created"
        );
        Ok(CreatedGoal { goal_id, summary })
    }

    /// Set a microtask's status by direct user action, then renormalize.
    pub fn set_microtask_status(
        &self,
        user_id: &str,
        microtask_id: &str,
        status: MicroStatus,
    ) -> Result<MutationOutcome> {
        let goal_id = self.with_write_tx(|tx| {
            let (goal_id, current) = owned_microtask(tx, user_id, microtask_id)?;
            if status == current {
                // Keeps the original completion stamp.
                return Ok(goal_id);
            }
            let completed_at = status.is_done().then(now_epoch_secs);
            tx.execute(
                "UPDATE microtasks SET status = ?1, completed_at = ?2 WHERE id = ?3",
                params![status.as_str(), completed_at, microtask_id],
            )?;
            Ok(goal_id)
        })?;

        Ok(self.renormalize(goal_id))
    }

    /// Replace one microtask with several. The first replacement keeps the
    /// original position; the rest take fractional positions strictly
    /// between it and the next sibling, so no sibling is renumbered.
    pub fn subdivide_microtask(
        &self,
        user_id: &str,
        microtask_id: &str,
        titles: &[String],
    ) -> Result<(Vec<String>, MutationOutcome)> {
        let titles: Vec<&str> = titles
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();
        if titles.is_empty() {
            return Err(StrideError::Invalid(
                "subdivision needs at least one non-empty title".to_owned(),
            ));
        }

        let (goal_id, new_ids) = self.with_write_tx(|tx| {
            let (goal_id, current) = owned_microtask(tx, user_id, microtask_id)?;
            if current == MicroStatus::Done {
                return Err(StrideError::Invalid(format!(
                    "microtask {microtask_id} is already done"
                )));
            }
            let (task_id, position): (String, f64) = tx.query_row(
                "SELECT task_id, position FROM microtasks WHERE id = ?1",
                params![microtask_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let next: Option<f64> = tx.query_row(
                "SELECT MIN(position) FROM microtasks WHERE task_id = ?1 AND position > ?2",
                params![task_id, position],
                |row| row.get(0),
            )?;

            tx.execute("DELETE FROM microtasks WHERE id = ?1", params![microtask_id])?;
            let mut new_ids = Vec::with_capacity(titles.len());
            for (title, pos) in titles
                .iter()
                .zip(subdivision_positions(position, next, titles.len()))
            {
                let id = new_id("micro");
                tx.execute(
                    "INSERT INTO microtasks (id, task_id, goal_id, user_id, title, position, status) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'todo')",
                    params![id, task_id, goal_id, user_id, title, pos],
                )?;
                new_ids.push(id);
            }
            Ok((goal_id, new_ids))
        })?;

        Ok((new_ids, self.renormalize(goal_id)))
    }

    /// Re-run normalization for a goal in its own transaction.
    pub fn normalize(&self, goal_id: &str) -> Result<Option<FocusPointer>> {
        self.with_write_tx(|tx| normalize_goal_tx(tx, goal_id))
    }

    fn renormalize(&self, goal_id: String) -> MutationOutcome {
        match self.normalize(&goal_id) {
            Ok(focus) => MutationOutcome {
                goal_id,
                focus,
                normalized: true,
            },
            Err(e) => {
                warn!(goal = %goal_id, "normalization after mutation failed: {e}");
                MutationOutcome {
                    goal_id,
                    focus: None,
                    normalized: false,
                }
            }
        }
    }

    /// Delete a goal and its subtree, child-first, in one transaction.
    /// Returns `false` when the goal does not exist for this user.
    pub fn delete_goal(&self, user_id: &str, goal_id: &str) -> Result<bool> {
        self.with_write_tx(|tx| {
            let owner: Option<String> = tx
                .query_row(
                    "SELECT user_id FROM goals WHERE id = ?1",
                    params![goal_id],
                    |row| row.get(0),
                )
                .optional()?;
            if owner.as_deref() != Some(user_id) {
                return Ok(false);
            }
            tx.execute("DELETE FROM microtasks WHERE goal_id = ?1", params![goal_id])?;
            tx.execute("DELETE FROM tasks WHERE goal_id = ?1", params![goal_id])?;
            tx.execute("DELETE FROM subgoals WHERE goal_id = ?1", params![goal_id])?;
            tx.execute("DELETE FROM goals WHERE id = ?1", params![goal_id])?;
            Ok(true)
        })
    }

    /// Full subtree for one goal.
    pub fn goal_tree(&self, goal_id: &str) -> Result<GoalTree> {
        let conn = self.lock()?;
        load_goal_tree(&conn, goal_id)
    }

    /// All goals owned by a user, oldest first.
    pub fn goals_for_user(&self, user_id: &str) -> Result<Vec<Goal>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, title, description, due_date, tone, status \
             FROM goals WHERE user_id = ?1 ORDER BY created_at, rowid",
        )?;
        let rows = stmt.query_map(params![user_id], row_to_goal)?;
        let mut goals = Vec::new();
        for row in rows {
            goals.push(row?);
        }
        Ok(goals)
    }

    /// Committed focus pointer for a goal. Safe outside any transaction;
    /// reflects the latest committed normalization.
    pub fn focus_pointer(&self, goal_id: &str) -> Result<Option<FocusPointer>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                "SELECT t.subgoal_id, m.task_id, m.id \
                 FROM microtasks m JOIN tasks t ON t.id = m.task_id \
                 WHERE m.goal_id = ?1 AND m.status = 'in_progress' \
                 ORDER BY m.position LIMIT 1",
                params![goal_id],
                |row| {
                    Ok(FocusPointer {
                        subgoal_id: row.get(0)?,
                        task_id: row.get(1)?,
                        microtask_id: row.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    /// Goals that still have pending microtasks, with progress counts and
    /// the focused microtask's title. Completed goals are excluded, which
    /// is what suppresses scheduled nudges for them.
    pub fn goal_digests(&self, user_id: &str) -> Result<Vec<GoalDigest>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT g.id, g.title, g.tone, g.due_date, \
                    (SELECT m.title FROM microtasks m \
                      WHERE m.goal_id = g.id AND m.status = 'in_progress' LIMIT 1), \
                    (SELECT COUNT(*) FROM microtasks m WHERE m.goal_id = g.id AND m.status = 'done'), \
                    (SELECT COUNT(*) FROM microtasks m WHERE m.goal_id = g.id) \
             FROM goals g \
             WHERE g.user_id = ?1 AND g.status != 'done' \
             ORDER BY g.created_at, g.rowid",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            let tone: String = row.get(2)?;
            let due: Option<String> = row.get(3)?;
            Ok(GoalDigest {
                goal_id: row.get(0)?,
                title: row.get(1)?,
                tone: Tone::from_db(&tone),
                due_date: due.as_deref().and_then(parse_date),
                focus_title: row.get(4)?,
                microtasks_done: row.get(5)?,
                microtasks_total: row.get(6)?,
            })
        })?;

        let mut digests = Vec::new();
        for row in rows {
            let digest = row?;
            if digest.microtasks_done < digest.microtasks_total {
                digests.push(digest);
            }
        }
        Ok(digests)
    }
}

/// Positions for `count` nodes replacing the node at `start`. The first
/// keeps `start`; all stay strictly below `next` (or `start + 1` when the
/// node was last).
#[must_use]
pub fn subdivision_positions(start: f64, next: Option<f64>, count: usize) -> Vec<f64> {
    if count == 0 {
        return Vec::new();
    }
    let upper = next.unwrap_or(start + 1.0);
    let step = (upper - start) / count as f64;
    (0..count).map(|i| start + step * i as f64).collect()
}

/// Remove every hierarchy row a user owns, child-first, inside `tx`.
pub(crate) fn delete_user_hierarchy_tx(
    tx: &Transaction<'_>,
    user_id: &str,
) -> Result<RemovedRows> {
    let microtasks = tx.execute("DELETE FROM microtasks WHERE user_id = ?1", params![user_id])?;
    let tasks = tx.execute("DELETE FROM tasks WHERE user_id = ?1", params![user_id])?;
    let subgoals = tx.execute("DELETE FROM subgoals WHERE user_id = ?1", params![user_id])?;
    let goals = tx.execute("DELETE FROM goals WHERE user_id = ?1", params![user_id])?;
    Ok(RemovedRows {
        goals,
        subgoals,
        tasks,
        microtasks,
    })
}

/// Goal id and current status of a microtask the user owns.
fn owned_microtask(
    conn: &Connection,
    user_id: &str,
    microtask_id: &str,
) -> Result<(String, MicroStatus)> {
    conn.query_row(
        "SELECT goal_id, status FROM microtasks WHERE id = ?1 AND user_id = ?2",
        params![microtask_id, user_id],
        |row| {
            let status: String = row.get(1)?;
            Ok((row.get::<_, String>(0)?, MicroStatus::from_db(&status)))
        },
    )
    .optional()?
    .ok_or_else(|| StrideError::NotFound(format!("microtask {microtask_id}")))
}

/// Load one goal's subtree, children sorted by position.
pub(crate) fn load_goal_tree(conn: &Connection, goal_id: &str) -> Result<GoalTree> {
    let goal = conn
        .query_row(
            "SELECT id, user_id, title, description, due_date, tone, status FROM goals WHERE id = ?1",
            params![goal_id],
            row_to_goal,
        )
        .optional()?
        .ok_or_else(|| StrideError::NotFound(format!("goal {goal_id}")))?;

    let mut subgoals: Vec<SubgoalNode> = Vec::new();
    let mut subgoal_index: HashMap<String, usize> = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT id, goal_id, title, position, status FROM subgoals \
             WHERE goal_id = ?1 ORDER BY position, rowid",
        )?;
        let rows = stmt.query_map(params![goal_id], |row| {
            let status: String = row.get(4)?;
            Ok(Subgoal {
                id: row.get(0)?,
                goal_id: row.get(1)?,
                title: row.get(2)?,
                position: row.get(3)?,
                status: NodeStatus::from_db(&status),
            })
        })?;
        for row in rows {
            let subgoal = row?;
            subgoal_index.insert(subgoal.id.clone(), subgoals.len());
            subgoals.push(SubgoalNode {
                subgoal,
                tasks: Vec::new(),
            });
        }
    }

    let mut task_index: HashMap<String, (usize, usize)> = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT id, subgoal_id, title, position, status FROM tasks \
             WHERE goal_id = ?1 ORDER BY position, rowid",
        )?;
        let rows = stmt.query_map(params![goal_id], |row| {
            let status: String = row.get(4)?;
            Ok(Task {
                id: row.get(0)?,
                subgoal_id: row.get(1)?,
                title: row.get(2)?,
                position: row.get(3)?,
                status: NodeStatus::from_db(&status),
            })
        })?;
        for row in rows {
            let task = row?;
            let Some(&s) = subgoal_index.get(&task.subgoal_id) else {
                warn!(task = %task.id, "task references a missing subgoal; ignoring");
                continue;
            };
            let tasks = &mut subgoals[s].tasks;
            task_index.insert(task.id.clone(), (s, tasks.len()));
            tasks.push(TaskNode {
                task,
                microtasks: Vec::new(),
            });
        }
    }

    {
        let mut stmt = conn.prepare(
            "SELECT id, task_id, title, position, status, completed_at FROM microtasks \
             WHERE goal_id = ?1 ORDER BY position, rowid",
        )?;
        let rows = stmt.query_map(params![goal_id], |row| {
            let status: String = row.get(4)?;
            Ok(Microtask {
                id: row.get(0)?,
                task_id: row.get(1)?,
                title: row.get(2)?,
                position: row.get(3)?,
                status: MicroStatus::from_db(&status),
                completed_at: row.get(5)?,
            })
        })?;
        for row in rows {
            let micro = row?;
            let Some(&(s, t)) = task_index.get(&micro.task_id) else {
                warn!(microtask = %micro.id, "microtask references a missing task; ignoring");
                continue;
            };
            subgoals[s].tasks[t].microtasks.push(micro);
        }
    }

    let mut tree = GoalTree { goal, subgoals };
    tree.sort();
    Ok(tree)
}

fn row_to_goal(row: &rusqlite::Row<'_>) -> rusqlite::Result<Goal> {
    let due: Option<String> = row.get(4)?;
    let tone: String = row.get(5)?;
    let status: String = row.get(6)?;
    Ok(Goal {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        due_date: due.as_deref().and_then(parse_date),
        tone: Tone::from_db(&tone),
        status: NodeStatus::from_db(&status),
    })
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

//! Progress normalizer.
//!
//! Recomputes derived status for one goal's subtree and re-establishes the
//! single-focus invariant: at most one subgoal, one task and one microtask
//! are `in_progress`, nested within each other, and they point at the
//! first (by position) incomplete leaf.
//!
//! The work is split in two:
//! - [`plan`] is pure: it selects the active path top-down and derives
//!   every container status bottom-up from the leaves.
//! - [`normalize_goal_tx`] applies a plan inside the caller's transaction
//!   by bulk-resetting non-done microtasks and re-asserting exactly one
//!   active id per level, so stale `in_progress` flags never survive.

use rusqlite::{Transaction, params};
use tracing::{debug, error};

use super::repository::load_goal_tree;
use super::types::{FocusPointer, GoalTree, MicroStatus, NodeStatus};
use crate::error::Result;
use crate::store::now_epoch_secs;

/// Derived state for one goal.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizationPlan {
    pub focus: Option<FocusPointer>,
    pub goal_status: NodeStatus,
    /// Final status per subgoal id, active one already `InProgress`.
    pub subgoal_statuses: Vec<(String, NodeStatus)>,
    /// Final status per task id, active one already `InProgress`.
    pub task_statuses: Vec<(String, NodeStatus)>,
}

impl NormalizationPlan {
    /// Goal still has work but nothing can be focused. Only reachable when
    /// an empty container blocks completion.
    #[must_use]
    pub fn is_stalled(&self) -> bool {
        self.focus.is_none() && self.goal_status == NodeStatus::InProgress
    }
}

/// Compute the normalized state of `tree`. Children must already be in
/// position order (see [`GoalTree::sort`]).
#[must_use]
pub fn plan(tree: &GoalTree) -> NormalizationPlan {
    let focus = select_focus(tree);

    let mut subgoal_statuses = Vec::with_capacity(tree.subgoals.len());
    let mut task_statuses = Vec::new();

    for subgoal in &tree.subgoals {
        let mut all_tasks_done = !subgoal.tasks.is_empty();
        for task in &subgoal.tasks {
            let done = !task.microtasks.is_empty()
                && task.microtasks.iter().all(|m| m.status.is_done());
            let status = if focus.as_ref().is_some_and(|f| f.task_id == task.task.id) {
                NodeStatus::InProgress
            } else if done {
                NodeStatus::Done
            } else {
                NodeStatus::NotStarted
            };
            all_tasks_done &= done;
            task_statuses.push((task.task.id.clone(), status));
        }

        let status = if focus
            .as_ref()
            .is_some_and(|f| f.subgoal_id == subgoal.subgoal.id)
        {
            NodeStatus::InProgress
        } else if all_tasks_done {
            NodeStatus::Done
        } else {
            NodeStatus::NotStarted
        };
        subgoal_statuses.push((subgoal.subgoal.id.clone(), status));
    }

    let goal_status = if subgoal_statuses.is_empty() {
        NodeStatus::NotStarted
    } else if subgoal_statuses.iter().all(|(_, s)| *s == NodeStatus::Done) {
        NodeStatus::Done
    } else {
        NodeStatus::InProgress
    };

    NormalizationPlan {
        focus,
        goal_status,
        subgoal_statuses,
        task_statuses,
    }
}

/// First subgoal → first task → first microtask that is not done. Empty
/// containers hold no incomplete leaf, so they are skipped naturally.
fn select_focus(tree: &GoalTree) -> Option<FocusPointer> {
    tree.subgoals.iter().find_map(|subgoal| {
        subgoal.tasks.iter().find_map(|task| {
            task.microtasks
                .iter()
                .find(|m| !m.status.is_done())
                .map(|micro| FocusPointer {
                    subgoal_id: subgoal.subgoal.id.clone(),
                    task_id: task.task.id.clone(),
                    microtask_id: micro.id.clone(),
                })
        })
    })
}

/// Normalize an in-memory tree. Pure counterpart of [`normalize_goal_tx`].
pub fn normalize_tree(tree: &mut GoalTree) -> Option<FocusPointer> {
    tree.sort();
    let plan = plan(tree);
    let active_micro = plan.focus.as_ref().map(|f| f.microtask_id.as_str());

    let mut task_iter = plan.task_statuses.iter();
    for (subgoal, (_, subgoal_status)) in tree.subgoals.iter_mut().zip(&plan.subgoal_statuses) {
        subgoal.subgoal.status = *subgoal_status;
        for task in &mut subgoal.tasks {
            if let Some((_, status)) = task_iter.next() {
                task.task.status = *status;
            }
            for micro in &mut task.microtasks {
                if micro.status.is_done() {
                    continue;
                }
                micro.status = if Some(micro.id.as_str()) == active_micro {
                    MicroStatus::InProgress
                } else {
                    MicroStatus::Todo
                };
            }
        }
    }
    tree.goal.status = plan.goal_status;
    plan.focus
}

/// Normalize one goal inside `tx`. Any failure aborts the caller's
/// transaction, so a partial cascade is never committed.
pub(crate) fn normalize_goal_tx(
    tx: &Transaction<'_>,
    goal_id: &str,
) -> Result<Option<FocusPointer>> {
    let tree = load_goal_tree(tx, goal_id)?;
    let plan = plan(&tree);

    if plan.is_stalled() {
        error!(
            goal = %goal_id,
            "normalization found no focusable microtask but goal is still in progress; \
             an empty subgoal or task is blocking completion"
        );
    }

    tx.execute(
        "UPDATE microtasks SET status = 'todo' WHERE goal_id = ?1 AND status != 'done'",
        params![goal_id],
    )?;
    if let Some(focus) = &plan.focus {
        tx.execute(
            "UPDATE microtasks SET status = 'in_progress' WHERE id = ?1",
            params![focus.microtask_id],
        )?;
    }

    {
        let mut update_task = tx.prepare("UPDATE tasks SET status = ?1 WHERE id = ?2")?;
        for (id, status) in &plan.task_statuses {
            update_task.execute(params![status.as_str(), id])?;
        }
        let mut update_subgoal = tx.prepare("UPDATE subgoals SET status = ?1 WHERE id = ?2")?;
        for (id, status) in &plan.subgoal_statuses {
            update_subgoal.execute(params![status.as_str(), id])?;
        }
    }

    tx.execute(
        "UPDATE goals SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![plan.goal_status.as_str(), now_epoch_secs(), goal_id],
    )?;

    debug!(
        goal = %goal_id,
        status = plan.goal_status.as_str(),
        focus = ?plan.focus.as_ref().map(|f| f.microtask_id.as_str()),
        "goal normalized"
    );
    Ok(plan.focus)
}

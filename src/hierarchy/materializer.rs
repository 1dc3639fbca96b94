//! Writes a goal's subtree at creation time.
//!
//! A supplied breakdown is inserted in order with positions `index + 1`.
//! Blank titles and containers left without children are dropped first, so
//! every inserted subgoal and task can eventually complete. When nothing
//! usable remains, a fixed three-step scaffold is inserted instead.

use rusqlite::{Transaction, params};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::normalizer::normalize_goal_tx;
use super::types::FocusPointer;
use crate::error::Result;
use crate::store::new_id;

/// Nested titles proposed for a new goal, typically by an external
/// planner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakdown {
    #[serde(default)]
    pub subgoals: Vec<SubgoalDraft>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubgoalDraft {
    pub title: String,
    #[serde(default)]
    pub tasks: Vec<TaskDraft>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub microtasks: Vec<String>,
}

/// What [`materialize_tx`] wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaterializeSummary {
    pub subgoals: usize,
    pub tasks: usize,
    pub microtasks: usize,
    /// Nodes dropped from the breakdown before insertion.
    pub pruned: usize,
    pub used_scaffold: bool,
    /// Initial focus established by the post-insert normalization.
    pub focus: Option<FocusPointer>,
}

impl Breakdown {
    /// Copy with blank titles and childless containers removed, plus the
    /// number of nodes dropped.
    #[must_use]
    pub fn pruned(&self) -> (Self, usize) {
        let mut dropped = 0;
        let mut subgoals = Vec::new();
        for sg in &self.subgoals {
            let mut tasks = Vec::new();
            for task in &sg.tasks {
                let micros: Vec<String> = task
                    .microtasks
                    .iter()
                    .map(|m| m.trim())
                    .filter(|m| !m.is_empty())
                    .map(str::to_owned)
                    .collect();
                dropped += task.microtasks.len() - micros.len();
                if task.title.trim().is_empty() || micros.is_empty() {
                    dropped += 1 + micros.len();
                    continue;
                }
                tasks.push(TaskDraft {
                    title: task.title.trim().to_owned(),
                    microtasks: micros,
                });
            }
            if sg.title.trim().is_empty() || tasks.is_empty() {
                dropped += 1 + tasks.iter().map(|t| 1 + t.microtasks.len()).sum::<usize>();
                continue;
            }
            subgoals.push(SubgoalDraft {
                title: sg.title.trim().to_owned(),
                tasks,
            });
        }
        (Self { subgoals }, dropped)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subgoals.is_empty()
    }

    /// Deterministic starter subtree for a goal with no usable breakdown.
    #[must_use]
    pub fn scaffold(goal_title: &str) -> Self {
        Self {
            subgoals: vec![SubgoalDraft {
                title: "Get started".to_owned(),
                tasks: vec![TaskDraft {
                    title: format!("First steps toward \"{goal_title}\""),
                    microtasks: vec![
                        "Write down why this goal matters to you".to_owned(),
                        "List what you need before you begin".to_owned(),
                        "Spend ten minutes on the very first step".to_owned(),
                    ],
                }],
            }],
        }
    }
}

/// Insert the subtree for `goal_id` inside the goal-creation transaction,
/// then normalize once to set the initial focus.
pub(crate) fn materialize_tx(
    tx: &Transaction<'_>,
    user_id: &str,
    goal_id: &str,
    goal_title: &str,
    breakdown: Option<&Breakdown>,
) -> Result<MaterializeSummary> {
    let (plan, pruned) = match breakdown {
        Some(b) => b.pruned(),
        None => (Breakdown::default(), 0),
    };
    let used_scaffold = plan.is_empty();
    let plan = if used_scaffold {
        Breakdown::scaffold(goal_title)
    } else {
        plan
    };

    let mut summary = MaterializeSummary {
        pruned,
        used_scaffold,
        ..MaterializeSummary::default()
    };

    let mut insert_subgoal = tx.prepare(
        "INSERT INTO subgoals (id, goal_id, user_id, title, position, status) \
         VALUES (?1, ?2, ?3, ?4, ?5, 'not_started')",
    )?;
    let mut insert_task = tx.prepare(
        "INSERT INTO tasks (id, subgoal_id, goal_id, user_id, title, position, status) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'not_started')",
    )?;
    let mut insert_micro = tx.prepare(
        "INSERT INTO microtasks (id, task_id, goal_id, user_id, title, position, status) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'todo')",
    )?;

    for (si, sg) in plan.subgoals.iter().enumerate() {
        let subgoal_id = new_id("sub");
        insert_subgoal.execute(params![subgoal_id, goal_id, user_id, sg.title, (si + 1) as f64])?;
        summary.subgoals += 1;

        for (ti, task) in sg.tasks.iter().enumerate() {
            let task_id = new_id("task");
            insert_task.execute(params![
                task_id,
                subgoal_id,
                goal_id,
                user_id,
                task.title,
                (ti + 1) as f64
            ])?;
            summary.tasks += 1;

            for (mi, title) in task.microtasks.iter().enumerate() {
                insert_micro.execute(params![
                    new_id("micro"),
                    task_id,
                    goal_id,
                    user_id,
                    title,
                    (mi + 1) as f64
                ])?;
                summary.microtasks += 1;
            }
        }
    }
    drop(insert_subgoal);
    drop(insert_task);
    drop(insert_micro);

    summary.focus = normalize_goal_tx(tx, goal_id)?;
    debug!(
        goal = %goal_id,
        subgoals = summary.subgoals,
        tasks = summary.tasks,
        microtasks = summary.microtasks,
        pruned = summary.pruned,
        "subtree materialized"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::hierarchy::types::{MicroStatus, NewGoal, NodeStatus};
    use crate::store::Store;

    #[test]
    fn missing_breakdown_gets_scaffold_with_focus_on_first_step() {
        let store = Store::open_in_memory().unwrap();
        let created = store.create_goal("u1", &NewGoal::titled("Write a novel"), None).unwrap();
        assert!(created.summary.used_scaffold);
        assert_eq!(
            (created.summary.subgoals, created.summary.tasks, created.summary.microtasks),
            (1, 1, 3)
        );

        let tree = store.goal_tree(&created.goal_id).unwrap();
        let first = &tree.subgoals[0].tasks[0].microtasks[0];
        assert_eq!(first.status, MicroStatus::InProgress);
        assert_eq!(created.summary.focus.unwrap().microtask_id, first.id);
        assert!(tree.subgoals[0].tasks[0].task.title.contains("Write a novel"));
    }

    #[test]
    fn breakdown_is_inserted_in_order() {
        let breakdown: Breakdown = serde_json::from_str(
            r#"{"subgoals":[
                {"title":"Base","tasks":[{"title":"Week 1","microtasks":["Run 3k","Stretch"]}]},
                {"title":"Build","tasks":[{"title":"Week 2","microtasks":["Run 5k"]}]}
            ]}"#,
        )
        .unwrap();
        let store = Store::open_in_memory().unwrap();
        let created = store
            .create_goal("u1", &NewGoal::titled("10k"), Some(&breakdown))
            .unwrap();
        assert!(!created.summary.used_scaffold);

        let tree = store.goal_tree(&created.goal_id).unwrap();
        let titles: Vec<&str> = tree.microtasks().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, vec!["Run 3k", "Stretch", "Run 5k"]);
        let positions: Vec<f64> = tree.subgoals.iter().map(|s| s.subgoal.position).collect();
        assert_eq!(positions, vec![1.0, 2.0]);
        assert_eq!(tree.subgoals[0].subgoal.status, NodeStatus::InProgress);
        assert_eq!(tree.subgoals[1].subgoal.status, NodeStatus::NotStarted);
    }

    #[test]
    fn pruning_drops_blank_titles_and_empty_containers() {
        let breakdown = Breakdown {
            subgoals: vec![
                SubgoalDraft {
                    title: "Empty".to_owned(),
                    tasks: vec![],
                },
                SubgoalDraft {
                    title: "Real".to_owned(),
                    tasks: vec![
                        TaskDraft {
                            title: "Hollow".to_owned(),
                            microtasks: vec!["  ".to_owned()],
                        },
                        TaskDraft {
                            title: " Keep ".to_owned(),
                            microtasks: vec!["a".to_owned(), "".to_owned()],
                        },
                    ],
                },
            ],
        };
        let (pruned, dropped) = breakdown.pruned();
        assert_eq!(pruned.subgoals.len(), 1);
        assert_eq!(pruned.subgoals[0].tasks.len(), 1);
        assert_eq!(pruned.subgoals[0].tasks[0].title, "Keep");
        assert_eq!(pruned.subgoals[0].tasks[0].microtasks, vec!["a".to_owned()]);
        // Empty subgoal, blank micro + hollow task, blank micro.
        assert_eq!(dropped, 4);
    }

    #[test]
    fn fully_blank_breakdown_falls_back_to_scaffold() {
        let breakdown = Breakdown {
            subgoals: vec![SubgoalDraft {
                title: " ".to_owned(),
                tasks: vec![],
            }],
        };
        let store = Store::open_in_memory().unwrap();
        let created = store
            .create_goal("u1", &NewGoal::titled("g"), Some(&breakdown))
            .unwrap();
        assert!(created.summary.used_scaffold);
        assert_eq!(created.summary.pruned, 1);
    }
}

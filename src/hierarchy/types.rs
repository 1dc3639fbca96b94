//! Goal hierarchy data model.
//!
//! Goal → Subgoal → Task → Microtask. Containers use [`NodeStatus`];
//! microtasks, the only directly completable unit, use [`MicroStatus`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Status of a goal, subgoal or task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    NotStarted,
    InProgress,
    Done,
}

impl NodeStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }

    /// Parse a stored value. Unknown strings read as `NotStarted` so a
    /// damaged row is re-derived on the next normalization.
    #[must_use]
    pub fn from_db(s: &str) -> Self {
        match s {
            "in_progress" => Self::InProgress,
            "done" => Self::Done,
            _ => Self::NotStarted,
        }
    }
}

/// Status of a microtask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MicroStatus {
    Todo,
    InProgress,
    Done,
}

impl MicroStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }

    #[must_use]
    pub fn from_db(s: &str) -> Self {
        match s {
            "in_progress" => Self::InProgress,
            "done" => Self::Done,
            _ => Self::Todo,
        }
    }

    #[must_use]
    pub fn is_done(self) -> bool {
        self == Self::Done
    }
}

/// Voice used for outbound nudges about a goal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    #[default]
    Friendly,
    Strict,
    Motivational,
}

impl Tone {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Friendly => "friendly",
            Self::Strict => "strict",
            Self::Motivational => "motivational",
        }
    }

    #[must_use]
    pub fn from_db(s: &str) -> Self {
        match s {
            "strict" => Self::Strict,
            "motivational" => Self::Motivational,
            _ => Self::Friendly,
        }
    }
}

impl std::str::FromStr for Tone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "friendly" => Ok(Self::Friendly),
            "strict" => Ok(Self::Strict),
            "motivational" => Ok(Self::Motivational),
            other => Err(format!("unknown tone `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub tone: Tone,
    pub status: NodeStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subgoal {
    pub id: String,
    pub goal_id: String,
    pub title: String,
    /// 1-based; fractional after subdivision.
    pub position: f64,
    pub status: NodeStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub subgoal_id: String,
    pub title: String,
    pub position: f64,
    pub status: NodeStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Microtask {
    pub id: String,
    pub task_id: String,
    pub title: String,
    pub position: f64,
    pub status: MicroStatus,
    /// Epoch seconds, set when the user marks it done.
    pub completed_at: Option<i64>,
}

/// The single "next up" node triple for a goal. Always nested: the
/// microtask belongs to the task, which belongs to the subgoal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FocusPointer {
    pub subgoal_id: String,
    pub task_id: String,
    pub microtask_id: String,
}

/// One goal with its whole subtree, children sorted by position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalTree {
    pub goal: Goal,
    pub subgoals: Vec<SubgoalNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubgoalNode {
    pub subgoal: Subgoal,
    pub tasks: Vec<TaskNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNode {
    pub task: Task,
    pub microtasks: Vec<Microtask>,
}

impl GoalTree {
    /// All microtasks in position order.
    pub fn microtasks(&self) -> impl Iterator<Item = &Microtask> {
        self.subgoals
            .iter()
            .flat_map(|s| s.tasks.iter())
            .flat_map(|t| t.microtasks.iter())
    }

    /// Sort every level by position. Ties keep insertion order.
    pub fn sort(&mut self) {
        self.subgoals
            .sort_by(|a, b| a.subgoal.position.total_cmp(&b.subgoal.position));
        for subgoal in &mut self.subgoals {
            subgoal
                .tasks
                .sort_by(|a, b| a.task.position.total_cmp(&b.task.position));
            for task in &mut subgoal.tasks {
                task.microtasks
                    .sort_by(|a, b| a.position.total_cmp(&b.position));
            }
        }
    }
}

/// Input for goal creation. Validated at the boundary; the store only
/// rejects an empty title.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewGoal {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub tone: Tone,
}

impl NewGoal {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Pending goal summary handed to the content source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalDigest {
    pub goal_id: String,
    pub title: String,
    pub tone: Tone,
    pub due_date: Option<NaiveDate>,
    /// Title of the focused microtask, if any.
    pub focus_title: Option<String>,
    pub microtasks_done: u32,
    pub microtasks_total: u32,
}

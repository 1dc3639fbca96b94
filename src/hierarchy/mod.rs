//! Goal hierarchy: model, materialization and progress normalization.

pub mod materializer;
pub mod normalizer;
pub mod repository;
pub mod types;

pub use materializer::{Breakdown, MaterializeSummary, SubgoalDraft, TaskDraft};
pub use normalizer::{NormalizationPlan, normalize_tree, plan};
pub use repository::{CreatedGoal, MutationOutcome, RemovedRows, subdivision_positions};
pub use types::{
    FocusPointer, Goal, GoalDigest, GoalTree, MicroStatus, Microtask, NewGoal, NodeStatus,
    Subgoal, SubgoalNode, Task, TaskNode, Tone,
};

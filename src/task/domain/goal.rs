//! Goal aggregation derived from child task statuses.

use super::{TaskId, TaskStatus};
use serde::{Deserialize, Serialize};

/// Progress of a goal, computed from its children.
///
/// The goal record itself is never mutated; this value is recomputed on
/// every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalProgress {
    /// Goal being summarised.
    pub goal_id: TaskId,
    /// Number of completed children.
    pub completed: usize,
    /// Number of children.
    pub total: usize,
    /// Status the goal displays.
    pub effective_status: TaskStatus,
}

impl GoalProgress {
    /// Derives progress from the statuses of the goal's children.
    ///
    /// A goal is `completed` when it has children and all of them are
    /// completed, `in_progress` when any child is in progress or in review,
    /// and `open` otherwise.
    #[must_use]
    pub fn from_children<I>(goal_id: TaskId, statuses: I) -> Self
    where
        I: IntoIterator<Item = TaskStatus>,
    {
        let mut completed = 0_usize;
        let mut total = 0_usize;
        let mut active = false;
        for status in statuses {
            total = total.saturating_add(1);
            match status {
                TaskStatus::Completed => completed = completed.saturating_add(1),
                TaskStatus::InProgress | TaskStatus::Review => active = true,
                TaskStatus::Open | TaskStatus::Blocked => {}
            }
        }
        let effective_status = if total > 0 && completed == total {
            TaskStatus::Completed
        } else if active {
            TaskStatus::InProgress
        } else {
            TaskStatus::Open
        };
        Self {
            goal_id,
            completed,
            total,
            effective_status,
        }
    }

    /// Returns whether every child is completed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.effective_status == TaskStatus::Completed
    }
}

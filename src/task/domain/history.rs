//! Append-only task history.
//!
//! Every committed transition produces one or more [`TaskEvent`] values which
//! the service layer wraps into [`TaskHistoryEntry`] records and persists in
//! the same write as the task itself.

use super::{ColumnId, HookPoint, HookResult, PrincipalId, ReviewDecision, Task, TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status and column pair describing where a task sits on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Board column.
    pub column: ColumnId,
}

/// Why a claim ended without the task moving forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseReason {
    /// The claimant gave the task back.
    Unclaimed,
    /// The claim expiry passed and the task was reclaimed.
    Expired,
    /// The task was unblocked while its dependencies were still pending.
    Reopened,
}

/// A single fact recorded about a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    /// The task was created.
    Created {
        /// Initial placement.
        placement: Placement,
    },
    /// The task changed status or column.
    Moved {
        /// Placement before the move.
        from: Placement,
        /// Placement after the move.
        to: Placement,
    },
    /// A principal claimed the task.
    Claimed {
        /// New claimant.
        claimant: PrincipalId,
        /// Claim expiry.
        expires_at: DateTime<Utc>,
    },
    /// A claim ended.
    Released {
        /// Former claimant.
        claimant: PrincipalId,
        /// Reason the claim ended.
        reason: ReleaseReason,
    },
    /// A hook result was accepted.
    HookReported {
        /// Hook point.
        hook: HookPoint,
        /// Reported result.
        result: HookResult,
    },
    /// Work on the task was reported finished.
    Completed {
        /// Minutes spent, if reported.
        time_spent_minutes: Option<u32>,
    },
    /// A reviewer recorded a decision.
    Reviewed {
        /// Review decision.
        decision: ReviewDecision,
    },
    /// The task was blocked.
    Blocked {
        /// Reason given, if any.
        reason: Option<String>,
    },
    /// The task was unblocked.
    Unblocked,
    /// A dependency edge was added.
    DependencyAdded {
        /// New dependency.
        depends_on: TaskId,
    },
    /// A dependency edge was removed.
    DependencyRemoved {
        /// Removed dependency.
        depends_on: TaskId,
    },
    /// The parent goal was deleted.
    DetachedFromGoal {
        /// Deleted goal.
        goal: TaskId,
    },
}

/// Persisted history record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHistoryEntry {
    /// Task the event belongs to.
    pub task_id: TaskId,
    /// Time the event was committed.
    pub occurred_at: DateTime<Utc>,
    /// Principal responsible, or `None` for engine-initiated events.
    pub actor: Option<PrincipalId>,
    /// Recorded event.
    pub event: TaskEvent,
}

impl TaskHistoryEntry {
    /// Wraps events produced by a transition on `task`.
    ///
    /// Entries are stamped with the task's `updated_at`, which every
    /// transition sets from the clock.
    #[must_use]
    pub fn record(task: &Task, actor: Option<&PrincipalId>, events: Vec<TaskEvent>) -> Vec<Self> {
        events
            .into_iter()
            .map(|event| Self {
                task_id: task.id(),
                occurred_at: task.updated_at(),
                actor: actor.cloned(),
                event,
            })
            .collect()
    }
}

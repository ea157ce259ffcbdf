//! Task aggregate root and related lifecycle types.

mod transitions;

pub use transitions::{ClaimAttempt, CompletionAttempt, ReviewAttempt};

use super::{
    BoardId, CapabilitySet, ColumnId, ParseTaskFieldError, Placement, PrincipalId,
    TaskDomainError, TaskId, TaskIdentifier,
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

macro_rules! task_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $field:literal {
            $($(#[$variant_meta:meta])* $variant:ident => $wire:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$variant_meta])* $variant),+
        }

        impl $name {
            /// Returns the canonical storage representation.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire),+
                }
            }
        }

        impl TryFrom<&str> for $name {
            type Error = ParseTaskFieldError;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                match value.trim().to_ascii_lowercase().as_str() {
                    $($wire => Ok(Self::$variant),)+
                    _ => Err(ParseTaskFieldError::new($field, value)),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

task_enum!(
    /// Kind of work a task represents.
    TaskKind, "task kind" {
        /// Aggregate of child tasks.
        Goal => "goal",
        /// Ordinary unit of work.
        Work => "work",
        /// Defect fix.
        Defect => "defect",
    }
);

task_enum!(
    /// Task lifecycle status; the sole source of truth for column placement.
    TaskStatus, "task status" {
        /// Waiting to be claimed.
        Open => "open",
        /// Claimed and being worked on.
        InProgress => "in_progress",
        /// Paused by an external decision.
        Blocked => "blocked",
        /// Work finished and awaiting human review.
        Review => "review",
        /// Finished.
        Completed => "completed",
    }
);

task_enum!(
    /// Scheduling priority, ordered from lowest to highest.
    #[derive(PartialOrd, Ord, Default)]
    Priority, "priority" {
        /// Lowest priority.
        Low => "low",
        /// Default priority.
        #[default]
        Medium => "medium",
        /// Elevated priority.
        High => "high",
        /// Highest priority.
        Critical => "critical",
    }
);

task_enum!(
    /// Estimated size of the work.
    Complexity, "complexity" {
        /// Small change.
        Low => "low",
        /// Moderate change.
        Medium => "medium",
        /// Large change.
        High => "high",
    }
);

task_enum!(
    /// Review state, meaningful while in review or just after leaving it.
    ReviewStatus, "review status" {
        /// Awaiting a reviewer decision.
        Pending => "pending",
        /// Accepted by a reviewer.
        Approved => "approved",
        /// Sent back to the claimant for more work.
        ChangesRequested => "changes_requested",
        /// Terminally rejected; requires manual handling.
        Rejected => "rejected",
    }
);

task_enum!(
    /// Decision a reviewer records on a task in review.
    ReviewDecision, "review decision" {
        /// Accept the work.
        Approved => "approved",
        /// Return the work to the claimant.
        ChangesRequested => "changes_requested",
        /// Reject the work.
        Rejected => "rejected",
    }
);

impl TaskKind {
    /// Returns the identifier prefix for this kind.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Goal => "G",
            Self::Work => "W",
            Self::Defect => "D",
        }
    }

    /// Resolves a kind from its identifier prefix.
    #[must_use]
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix.trim().to_ascii_uppercase().as_str() {
            "G" => Some(Self::Goal),
            "W" => Some(Self::Work),
            "D" => Some(Self::Defect),
            _ => None,
        }
    }
}

/// Validated inputs for creating a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    /// Owning board.
    pub board_id: BoardId,
    /// Task kind.
    pub kind: TaskKind,
    /// Title; must not be blank.
    pub title: String,
    /// Optional free-form description.
    pub description: Option<String>,
    /// Scheduling priority.
    pub priority: Priority,
    /// Optional complexity estimate.
    pub complexity: Option<Complexity>,
    /// Whether completion routes through human review.
    pub needs_review: bool,
    /// Capabilities a claimant must hold.
    pub required_capabilities: CapabilitySet,
    /// Initial dependencies.
    pub dependencies: BTreeSet<TaskId>,
    /// Optional parent goal.
    pub parent_goal_id: Option<TaskId>,
    /// Initial column.
    pub column: ColumnId,
}

/// Task aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    identifier: TaskIdentifier,
    board_id: BoardId,
    kind: TaskKind,
    title: String,
    description: Option<String>,
    status: TaskStatus,
    column: ColumnId,
    pre_claim_column: Option<ColumnId>,
    priority: Priority,
    complexity: Option<Complexity>,
    needs_review: bool,
    required_capabilities: CapabilitySet,
    dependencies: BTreeSet<TaskId>,
    parent_goal_id: Option<TaskId>,
    claimed_by: Option<PrincipalId>,
    claimed_at: Option<DateTime<Utc>>,
    claim_expires_at: Option<DateTime<Utc>>,
    review_status: Option<ReviewStatus>,
    review_notes: Option<String>,
    reviewed_by: Option<PrincipalId>,
    completed_at: Option<DateTime<Utc>>,
    completed_by: Option<PrincipalId>,
    completion_notes: Option<String>,
    time_spent_minutes: Option<u32>,
    blocked_reason: Option<String>,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted task aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedTaskData {
    /// Persisted task identifier.
    pub id: TaskId,
    /// Persisted human-readable identifier.
    pub identifier: TaskIdentifier,
    /// Persisted board.
    pub board_id: BoardId,
    /// Persisted kind.
    pub kind: TaskKind,
    /// Persisted title.
    pub title: String,
    /// Persisted description.
    pub description: Option<String>,
    /// Persisted status.
    pub status: TaskStatus,
    /// Persisted column.
    pub column: ColumnId,
    /// Column to return to when a claim ends.
    pub pre_claim_column: Option<ColumnId>,
    /// Persisted priority.
    pub priority: Priority,
    /// Persisted complexity.
    pub complexity: Option<Complexity>,
    /// Persisted review flag.
    pub needs_review: bool,
    /// Persisted capability requirements.
    pub required_capabilities: CapabilitySet,
    /// Persisted dependencies.
    pub dependencies: BTreeSet<TaskId>,
    /// Persisted parent goal.
    pub parent_goal_id: Option<TaskId>,
    /// Persisted claimant.
    pub claimed_by: Option<PrincipalId>,
    /// Persisted claim timestamp.
    pub claimed_at: Option<DateTime<Utc>>,
    /// Persisted claim expiry.
    pub claim_expires_at: Option<DateTime<Utc>>,
    /// Persisted review status.
    pub review_status: Option<ReviewStatus>,
    /// Persisted review notes.
    pub review_notes: Option<String>,
    /// Persisted reviewer.
    pub reviewed_by: Option<PrincipalId>,
    /// Persisted completion timestamp.
    pub completed_at: Option<DateTime<Utc>>,
    /// Persisted completing principal.
    pub completed_by: Option<PrincipalId>,
    /// Persisted completion notes.
    pub completion_notes: Option<String>,
    /// Persisted time spent.
    pub time_spent_minutes: Option<u32>,
    /// Persisted block reason.
    pub blocked_reason: Option<String>,
    /// Persisted optimistic concurrency version.
    pub version: u64,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted latest lifecycle timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Creates a new open task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyTitle`] when the title is blank and
    /// [`TaskDomainError::IdentifierKindMismatch`] when the identifier was
    /// allocated for another kind.
    pub fn create(
        new_task: NewTask,
        identifier: TaskIdentifier,
        clock: &impl Clock,
    ) -> Result<Self, TaskDomainError> {
        let title = new_task.title.trim();
        if title.is_empty() {
            return Err(TaskDomainError::EmptyTitle);
        }
        if identifier.kind() != new_task.kind {
            return Err(TaskDomainError::IdentifierKindMismatch {
                identifier,
                kind: new_task.kind,
            });
        }
        let timestamp = clock.utc();

        Ok(Self {
            id: TaskId::new(),
            identifier,
            board_id: new_task.board_id,
            kind: new_task.kind,
            title: title.to_owned(),
            description: new_task.description,
            status: TaskStatus::Open,
            column: new_task.column,
            pre_claim_column: None,
            priority: new_task.priority,
            complexity: new_task.complexity,
            needs_review: new_task.needs_review,
            required_capabilities: new_task.required_capabilities,
            dependencies: new_task.dependencies,
            parent_goal_id: new_task.parent_goal_id,
            claimed_by: None,
            claimed_at: None,
            claim_expires_at: None,
            review_status: None,
            review_notes: None,
            reviewed_by: None,
            completed_at: None,
            completed_by: None,
            completion_notes: None,
            time_spent_minutes: None,
            blocked_reason: None,
            version: 0,
            created_at: timestamp,
            updated_at: timestamp,
        })
    }

    /// Reconstructs a task from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedTaskData) -> Self {
        Self {
            id: data.id,
            identifier: data.identifier,
            board_id: data.board_id,
            kind: data.kind,
            title: data.title,
            description: data.description,
            status: data.status,
            column: data.column,
            pre_claim_column: data.pre_claim_column,
            priority: data.priority,
            complexity: data.complexity,
            needs_review: data.needs_review,
            required_capabilities: data.required_capabilities,
            dependencies: data.dependencies,
            parent_goal_id: data.parent_goal_id,
            claimed_by: data.claimed_by,
            claimed_at: data.claimed_at,
            claim_expires_at: data.claim_expires_at,
            review_status: data.review_status,
            review_notes: data.review_notes,
            reviewed_by: data.reviewed_by,
            completed_at: data.completed_at,
            completed_by: data.completed_by,
            completion_notes: data.completion_notes,
            time_spent_minutes: data.time_spent_minutes,
            blocked_reason: data.blocked_reason,
            version: data.version,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the human-readable identifier.
    #[must_use]
    pub const fn identifier(&self) -> TaskIdentifier {
        self.identifier
    }

    /// Returns the owning board.
    #[must_use]
    pub const fn board_id(&self) -> &BoardId {
        &self.board_id
    }

    /// Returns the task kind.
    #[must_use]
    pub const fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Returns the title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the description, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        self.status
    }

    /// Returns the current column.
    #[must_use]
    pub const fn column(&self) -> &ColumnId {
        &self.column
    }

    /// Returns the column the task returns to when its claim ends.
    #[must_use]
    pub const fn pre_claim_column(&self) -> Option<&ColumnId> {
        self.pre_claim_column.as_ref()
    }

    /// Returns the current status and column together.
    #[must_use]
    pub fn placement(&self) -> Placement {
        Placement {
            status: self.status,
            column: self.column.clone(),
        }
    }

    /// Returns the priority.
    #[must_use]
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    /// Returns the complexity estimate, if any.
    #[must_use]
    pub const fn complexity(&self) -> Option<Complexity> {
        self.complexity
    }

    /// Returns whether completion routes through review.
    #[must_use]
    pub const fn needs_review(&self) -> bool {
        self.needs_review
    }

    /// Returns the capabilities a claimant must hold.
    #[must_use]
    pub const fn required_capabilities(&self) -> &CapabilitySet {
        &self.required_capabilities
    }

    /// Returns the dependency set.
    #[must_use]
    pub const fn dependencies(&self) -> &BTreeSet<TaskId> {
        &self.dependencies
    }

    /// Returns the parent goal, if any.
    #[must_use]
    pub const fn parent_goal_id(&self) -> Option<TaskId> {
        self.parent_goal_id
    }

    /// Returns the claimant, if any.
    #[must_use]
    pub const fn claimed_by(&self) -> Option<&PrincipalId> {
        self.claimed_by.as_ref()
    }

    /// Returns the claim timestamp, if any.
    #[must_use]
    pub const fn claimed_at(&self) -> Option<DateTime<Utc>> {
        self.claimed_at
    }

    /// Returns the claim expiry, if any.
    #[must_use]
    pub const fn claim_expires_at(&self) -> Option<DateTime<Utc>> {
        self.claim_expires_at
    }

    /// Returns the review status, if the task has been reviewed or is
    /// awaiting review.
    #[must_use]
    pub const fn review_status(&self) -> Option<ReviewStatus> {
        self.review_status
    }

    /// Returns reviewer notes, if any.
    #[must_use]
    pub fn review_notes(&self) -> Option<&str> {
        self.review_notes.as_deref()
    }

    /// Returns the last reviewer, if any.
    #[must_use]
    pub const fn reviewed_by(&self) -> Option<&PrincipalId> {
        self.reviewed_by.as_ref()
    }

    /// Returns the completion timestamp, if any.
    #[must_use]
    pub const fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Returns the completing principal, if any.
    #[must_use]
    pub const fn completed_by(&self) -> Option<&PrincipalId> {
        self.completed_by.as_ref()
    }

    /// Returns completion notes, if any.
    #[must_use]
    pub fn completion_notes(&self) -> Option<&str> {
        self.completion_notes.as_deref()
    }

    /// Returns reported minutes spent, if any.
    #[must_use]
    pub const fn time_spent_minutes(&self) -> Option<u32> {
        self.time_spent_minutes
    }

    /// Returns the block reason, if any.
    #[must_use]
    pub fn blocked_reason(&self) -> Option<&str> {
        self.blocked_reason.as_deref()
    }

    /// Returns the optimistic concurrency version of the stored record.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest lifecycle timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns whether the task is in progress with an elapsed claim.
    #[must_use]
    pub fn is_claim_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::InProgress
            && self.claim_expires_at.is_some_and(|expiry| now > expiry)
    }

    /// Returns whether finished work is waiting on a reviewer, including
    /// while the task is blocked.
    #[must_use]
    pub fn is_awaiting_review(&self) -> bool {
        self.completed_at.is_some() && self.review_status == Some(ReviewStatus::Pending)
    }

    /// Advances the stored version after a successful compare-and-set.
    pub(crate) const fn advance_version(&mut self) {
        self.version = self.version.saturating_add(1);
    }
}

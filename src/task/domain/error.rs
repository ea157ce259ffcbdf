//! Error types for task domain validation, parsing, and transition rules.

use super::{HookPoint, PrincipalId, TaskId, TaskIdentifier, TaskKind, TaskStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors returned by task domain rules.
///
/// Every variant carries enough structure for an automated caller to correct
/// itself without issuing further queries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskDomainError {
    /// The task title is empty after trimming.
    #[error("task title must not be empty")]
    EmptyTitle,

    /// A principal identity is empty after trimming.
    #[error("principal identity must not be empty")]
    EmptyPrincipalId,

    /// A board identifier is empty after trimming.
    #[error("board identifier must not be empty")]
    EmptyBoardId,

    /// A column identifier is empty after trimming.
    #[error("column identifier must not be empty")]
    EmptyColumnId,

    /// A capability tag is empty after trimming.
    #[error("capability tags must not be empty")]
    EmptyCapability,

    /// A human-readable identifier could not be parsed.
    #[error("invalid task identifier '{0}', expected <G|W|D>-<number>")]
    InvalidIdentifier(String),

    /// The referenced parent is not a goal.
    #[error("task {0} is not a goal and cannot parent other tasks")]
    ParentNotGoal(TaskId),

    /// Goal progress was requested for a task that is not a goal.
    #[error("task {0} is not a goal")]
    NotAGoal(TaskId),

    /// Goals derive their status from children and cannot join dependency
    /// edges.
    #[error("goal {0} cannot take part in dependency edges")]
    GoalDependency(TaskId),

    /// The identifier prefix does not match the task kind.
    #[error("identifier {identifier} does not match task kind {kind}")]
    IdentifierKindMismatch {
        /// Allocated identifier.
        identifier: TaskIdentifier,
        /// Kind of the task being created.
        kind: TaskKind,
    },

    /// The task is not open or is already held by a claimant.
    #[error("task {task_id} is already claimed (status {status})")]
    AlreadyClaimed {
        /// Task that could not be claimed.
        task_id: TaskId,
        /// Status observed at claim time.
        status: TaskStatus,
        /// Current claimant, if any.
        claimed_by: Option<PrincipalId>,
    },

    /// The principal lacks capabilities the task requires.
    #[error("principal is missing capabilities for task {task_id}: {}", .missing.join(", "))]
    NotEligible {
        /// Task that requires the capabilities.
        task_id: TaskId,
        /// Required capabilities absent from the principal's set.
        missing: Vec<String>,
    },

    /// One or more dependencies have not reached `completed`.
    #[error("task {task_id} has unresolved dependencies: {}", join_ids(.unresolved))]
    DependenciesUnresolved {
        /// Task whose dependencies are unresolved.
        task_id: TaskId,
        /// Dependencies that are not yet completed.
        unresolved: Vec<TaskId>,
    },

    /// A hook result was missing or did not match the wire contract.
    #[error("malformed {hook} hook result: {reason}")]
    MalformedHookResult {
        /// Hook whose result was malformed.
        hook: HookPoint,
        /// Description of the shape violation.
        reason: String,
    },

    /// A blocking hook reported a non-zero exit code.
    #[error("{hook} hook failed with exit code {exit_code}")]
    HookFailed {
        /// Hook that failed.
        hook: HookPoint,
        /// Exit code reported by the caller.
        exit_code: i64,
        /// Output reported by the caller.
        output: String,
    },

    /// The principal may not perform the operation.
    #[error("principal {principal} is not authorized to {action} task {task_id}")]
    NotAuthorized {
        /// Task the operation targeted.
        task_id: TaskId,
        /// Principal that attempted the operation.
        principal: PrincipalId,
        /// Operation that was attempted.
        action: &'static str,
    },

    /// The task status does not permit the operation.
    #[error("cannot {action} task {task_id} while it is {status}")]
    InvalidStatus {
        /// Task the operation targeted.
        task_id: TaskId,
        /// Status at the time of the attempt.
        status: TaskStatus,
        /// Operation that was attempted.
        action: &'static str,
    },

    /// Adding the edge would close a cycle in the dependency graph.
    #[error("dependency {task_id} -> {depends_on} would create a cycle: {}", join_ids(.path))]
    CycleDetected {
        /// Task that would gain the dependency.
        task_id: TaskId,
        /// Proposed dependency.
        depends_on: TaskId,
        /// Existing path from `depends_on` back to `task_id`.
        path: Vec<TaskId>,
    },

    /// The task cannot be removed while others depend on it.
    #[error("task {task_id} has dependents: {}", join_ids(.dependents))]
    HasDependents {
        /// Task that was to be deleted.
        task_id: TaskId,
        /// Tasks that list it as a dependency.
        dependents: Vec<TaskId>,
    },
}

impl TaskDomainError {
    /// Returns the stable taxonomy kind for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyTitle
            | Self::EmptyPrincipalId
            | Self::EmptyBoardId
            | Self::EmptyColumnId
            | Self::EmptyCapability
            | Self::InvalidIdentifier(_)
            | Self::ParentNotGoal(_)
            | Self::NotAGoal(_)
            | Self::GoalDependency(_)
            | Self::IdentifierKindMismatch { .. } => ErrorKind::InvalidInput,
            Self::AlreadyClaimed { .. } => ErrorKind::AlreadyClaimed,
            Self::NotEligible { .. } => ErrorKind::NotEligible,
            Self::DependenciesUnresolved { .. } => ErrorKind::DependenciesUnresolved,
            Self::MalformedHookResult { .. } => ErrorKind::MalformedHookResult,
            Self::HookFailed { .. } => ErrorKind::HookFailed,
            Self::NotAuthorized { .. } => ErrorKind::NotAuthorized,
            Self::InvalidStatus { .. } => ErrorKind::InvalidStatus,
            Self::CycleDetected { .. } => ErrorKind::CycleDetected,
            Self::HasDependents { .. } => ErrorKind::HasDependents,
        }
    }
}

fn join_ids(ids: &[TaskId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Stable, serialisable error taxonomy surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The task is not open or already has a claimant.
    AlreadyClaimed,
    /// The principal lacks required capabilities.
    NotEligible,
    /// Dependencies are not yet completed.
    DependenciesUnresolved,
    /// A hook result did not match the wire contract.
    MalformedHookResult,
    /// A blocking hook reported failure.
    HookFailed,
    /// The principal may not perform the operation.
    NotAuthorized,
    /// The task status does not permit the operation.
    InvalidStatus,
    /// A dependency edge would create a cycle.
    CycleDetected,
    /// The referenced task does not exist.
    NotFound,
    /// The task is still referenced as a dependency.
    HasDependents,
    /// Request values failed validation.
    InvalidInput,
    /// Concurrent writers kept winning the compare-and-set race.
    Contention,
    /// The persistence layer failed.
    Storage,
}

impl ErrorKind {
    /// Returns the canonical wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AlreadyClaimed => "already_claimed",
            Self::NotEligible => "not_eligible",
            Self::DependenciesUnresolved => "dependencies_unresolved",
            Self::MalformedHookResult => "malformed_hook_result",
            Self::HookFailed => "hook_failed",
            Self::NotAuthorized => "not_authorized",
            Self::InvalidStatus => "invalid_status",
            Self::CycleDetected => "cycle_detected",
            Self::NotFound => "not_found",
            Self::HasDependents => "has_dependents",
            Self::InvalidInput => "invalid_input",
            Self::Contention => "contention",
            Self::Storage => "storage",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned while parsing an enum value from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {field} value: {value}")]
pub struct ParseTaskFieldError {
    /// Field whose value failed to parse.
    pub field: &'static str,
    /// Raw persisted value.
    pub value: String,
}

impl ParseTaskFieldError {
    pub(crate) fn new(field: &'static str, value: &str) -> Self {
        Self {
            field,
            value: value.to_owned(),
        }
    }
}

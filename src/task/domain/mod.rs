//! Domain model for task lifecycle and claim coordination.
//!
//! The domain owns the task aggregate and its transition rules, the hook
//! contract, capability matching, dependency graph checks and goal
//! aggregation. Everything here is pure: persistence, retries and logging
//! live in the service and adapter layers.

mod column;
mod error;
mod goal;
pub mod graph;
mod history;
mod hook;
mod ids;
pub mod matcher;
mod principal;
mod task;

pub use column::ColumnLayout;
pub use error::{ErrorKind, ParseTaskFieldError, TaskDomainError};
pub use goal::GoalProgress;
pub use graph::{DependencySnapshot, GraphRevision};
pub use history::{Placement, ReleaseReason, TaskEvent, TaskHistoryEntry};
pub use hook::{
    ENV_AGENT_ID, ENV_HOOK_NAME, ENV_TASK_BOARD_ID, ENV_TASK_ID, ENV_TASK_IDENTIFIER,
    ENV_TASK_KIND, ENV_TASK_PRIORITY, ENV_TASK_TITLE, HookMetadata, HookPoint, HookResult,
    HookSpec,
};
pub use ids::{BoardId, ColumnId, PrincipalId, TaskId, TaskIdentifier};
pub use principal::{CapabilitySet, Principal, PrincipalKind};
pub use task::{
    ClaimAttempt, Complexity, CompletionAttempt, NewTask, PersistedTaskData, Priority,
    ReviewAttempt, ReviewDecision, ReviewStatus, Task, TaskKind, TaskStatus,
};

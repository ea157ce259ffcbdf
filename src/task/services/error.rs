//! Service-level error type shared by the task services.

use crate::task::{
    domain::{ErrorKind, TaskDomainError, TaskId},
    ports::TaskRepositoryError,
};
use thiserror::Error;

/// Service-level errors for task lifecycle operations.
#[derive(Debug, Clone, Error)]
pub enum TaskLifecycleError {
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] TaskDomainError),

    /// Repository operation failed.
    #[error(transparent)]
    Repository(#[from] TaskRepositoryError),

    /// The referenced task does not exist.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// Concurrent writers kept winning the compare-and-set race.
    #[error("gave up on task {task_id} after {attempts} conflicting attempts")]
    Contention {
        /// Task the operation targeted.
        task_id: TaskId,
        /// Number of attempts made.
        attempts: u32,
    },
}

impl TaskLifecycleError {
    /// Returns the stable taxonomy kind for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Domain(err) => err.kind(),
            Self::Repository(TaskRepositoryError::NotFound(_))
            | Self::NotFound(_) => ErrorKind::NotFound,
            Self::Repository(
                TaskRepositoryError::VersionConflict { .. }
                | TaskRepositoryError::GraphConflict { .. },
            )
            | Self::Contention { .. } => ErrorKind::Contention,
            Self::Repository(_) => ErrorKind::Storage,
        }
    }

    /// Returns whether the error is a lost compare-and-set race.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Repository(err) if err.is_conflict())
    }
}

/// Result type for task lifecycle service operations.
pub type TaskLifecycleResult<T> = Result<T, TaskLifecycleError>;

//! Repository port for task persistence, lookup and optimistic commits.

use crate::task::domain::{
    BoardId, DependencySnapshot, GraphRevision, Task, TaskHistoryEntry, TaskId, TaskIdentifier,
    TaskStatus,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for task repository operations.
pub type TaskRepositoryResult<T> = Result<T, TaskRepositoryError>;

/// Filter for listing tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskQuery {
    statuses: Vec<TaskStatus>,
    board_id: Option<BoardId>,
}

impl TaskQuery {
    /// Creates a query matching every task.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            statuses: Vec::new(),
            board_id: None,
        }
    }

    /// Restricts the query to the given statuses.
    #[must_use]
    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = TaskStatus>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    /// Restricts the query to one board.
    #[must_use]
    pub fn with_board(mut self, board_id: BoardId) -> Self {
        self.board_id = Some(board_id);
        self
    }

    /// Returns the status filter; empty matches every status.
    #[must_use]
    pub fn statuses(&self) -> &[TaskStatus] {
        &self.statuses
    }

    /// Returns the board filter, if any.
    #[must_use]
    pub const fn board_id(&self) -> Option<&BoardId> {
        self.board_id.as_ref()
    }

    /// Returns whether `task` satisfies the query.
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&task.status()))
            && self
                .board_id
                .as_ref()
                .is_none_or(|board| board == task.board_id())
    }
}

/// Task persistence contract.
///
/// Writes are compare-and-set: a commit succeeds only when the stored task
/// version equals [`Task::version`] and, when a graph revision is supplied,
/// the store-wide dependency graph revision equals it. Successful writes
/// advance the version (and the revision) and append the history entries in
/// the same atomic step.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Allocates the next store-wide identifier number.
    async fn next_identifier_number(&self) -> TaskRepositoryResult<u64>;

    /// Stores a new task and returns the stored record.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::DuplicateTask`] or
    /// [`TaskRepositoryError::DuplicateIdentifier`] on key collisions and
    /// [`TaskRepositoryError::GraphConflict`] when `graph_revision` is stale.
    async fn store(
        &self,
        task: &Task,
        graph_revision: Option<GraphRevision>,
        history: &[TaskHistoryEntry],
    ) -> TaskRepositoryResult<Task>;

    /// Commits changes to an existing task and returns the stored record.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::NotFound`] when the task does not
    /// exist, [`TaskRepositoryError::VersionConflict`] when another writer
    /// committed first, and [`TaskRepositoryError::GraphConflict`] when
    /// `graph_revision` is stale.
    async fn commit(
        &self,
        task: &Task,
        graph_revision: Option<GraphRevision>,
        history: &[TaskHistoryEntry],
    ) -> TaskRepositoryResult<Task>;

    /// Deletes a task together with its history.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::NotFound`],
    /// [`TaskRepositoryError::VersionConflict`] or
    /// [`TaskRepositoryError::GraphConflict`] as for [`Self::commit`].
    async fn delete(
        &self,
        task_id: TaskId,
        expected_version: u64,
        graph_revision: GraphRevision,
    ) -> TaskRepositoryResult<()>;

    /// Finds a task by internal identifier.
    ///
    /// Returns `None` when the task does not exist.
    async fn find_by_id(&self, id: TaskId) -> TaskRepositoryResult<Option<Task>>;

    /// Finds a task by human-readable identifier.
    ///
    /// Returns `None` when the task does not exist.
    async fn find_by_identifier(
        &self,
        identifier: TaskIdentifier,
    ) -> TaskRepositoryResult<Option<Task>>;

    /// Returns the tasks among `ids` that exist.
    async fn find_many(&self, ids: &[TaskId]) -> TaskRepositoryResult<Vec<Task>>;

    /// Returns the tasks matching `query`.
    async fn list(&self, query: &TaskQuery) -> TaskRepositoryResult<Vec<Task>>;

    /// Returns the tasks that list `task_id` as a dependency.
    async fn find_dependents(&self, task_id: TaskId) -> TaskRepositoryResult<Vec<Task>>;

    /// Returns the tasks whose parent goal is `goal_id`.
    async fn find_children(&self, goal_id: TaskId) -> TaskRepositoryResult<Vec<Task>>;

    /// Returns every dependency edge with the current graph revision.
    async fn dependency_graph(&self) -> TaskRepositoryResult<DependencySnapshot>;

    /// Returns the history of a task in commit order.
    async fn history(&self, task_id: TaskId) -> TaskRepositoryResult<Vec<TaskHistoryEntry>>;
}

/// Errors returned by task repository implementations.
#[derive(Debug, Clone, Error)]
pub enum TaskRepositoryError {
    /// A task with the same identifier already exists.
    #[error("duplicate task identifier: {0}")]
    DuplicateTask(TaskId),

    /// A task with the same human-readable identifier already exists.
    #[error("duplicate human-readable identifier: {0}")]
    DuplicateIdentifier(TaskIdentifier),

    /// The task was not found.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// Another writer committed the task first.
    #[error("task {task_id} changed since version {expected}")]
    VersionConflict {
        /// Task whose write lost the race.
        task_id: TaskId,
        /// Version the writer expected.
        expected: u64,
    },

    /// Another writer changed the dependency graph first.
    #[error("dependency graph changed since revision {expected}")]
    GraphConflict {
        /// Revision the writer expected.
        expected: GraphRevision,
    },

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl TaskRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }

    /// Returns whether the error is a lost compare-and-set race that may
    /// succeed on retry.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::VersionConflict { .. } | Self::GraphConflict { .. }
        )
    }
}

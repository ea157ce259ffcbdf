//! In-memory repository for task lifecycle tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::task::{
    domain::{
        DependencySnapshot, GraphRevision, Task, TaskHistoryEntry, TaskId, TaskIdentifier,
    },
    ports::{TaskQuery, TaskRepository, TaskRepositoryError, TaskRepositoryResult},
};

/// Thread-safe in-memory task repository.
///
/// Compare-and-set checks run under the write lock, so concurrent commits
/// observe the same conflict semantics as the `PostgreSQL` adapter.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskRepository {
    state: Arc<RwLock<InMemoryTaskState>>,
}

#[derive(Debug, Default)]
struct InMemoryTaskState {
    tasks: HashMap<TaskId, Task>,
    identifier_index: HashMap<TaskIdentifier, TaskId>,
    history: HashMap<TaskId, Vec<TaskHistoryEntry>>,
    graph_revision: GraphRevision,
    identifier_sequence: u64,
}

impl InMemoryTaskRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> TaskRepositoryResult<RwLockReadGuard<'_, InMemoryTaskState>> {
        self.state.read().map_err(|err| {
            TaskRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })
    }

    fn write(&self) -> TaskRepositoryResult<RwLockWriteGuard<'_, InMemoryTaskState>> {
        self.state.write().map_err(|err| {
            TaskRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })
    }
}

impl InMemoryTaskState {
    fn check_graph_revision(&self, expected: Option<GraphRevision>) -> TaskRepositoryResult<()> {
        match expected {
            Some(revision) if revision != self.graph_revision => {
                Err(TaskRepositoryError::GraphConflict { expected: revision })
            }
            _ => Ok(()),
        }
    }

    fn advance_graph_revision(&mut self, expected: Option<GraphRevision>) {
        if expected.is_some() {
            self.graph_revision = self.graph_revision.next();
        }
    }

    fn append_history(&mut self, task_id: TaskId, history: &[TaskHistoryEntry]) {
        self.history
            .entry(task_id)
            .or_default()
            .extend_from_slice(history);
    }

    fn sorted<'a>(tasks: impl Iterator<Item = &'a Task>) -> Vec<Task> {
        let mut found: Vec<Task> = tasks.cloned().collect();
        found.sort_by_key(Task::identifier);
        found
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn next_identifier_number(&self) -> TaskRepositoryResult<u64> {
        let mut state = self.write()?;
        state.identifier_sequence = state.identifier_sequence.saturating_add(1);
        Ok(state.identifier_sequence)
    }

    async fn store(
        &self,
        task: &Task,
        graph_revision: Option<GraphRevision>,
        history: &[TaskHistoryEntry],
    ) -> TaskRepositoryResult<Task> {
        let mut state = self.write()?;
        if state.tasks.contains_key(&task.id()) {
            return Err(TaskRepositoryError::DuplicateTask(task.id()));
        }
        if state.identifier_index.contains_key(&task.identifier()) {
            return Err(TaskRepositoryError::DuplicateIdentifier(task.identifier()));
        }
        state.check_graph_revision(graph_revision)?;

        let mut stored = task.clone();
        stored.advance_version();
        state.identifier_index.insert(task.identifier(), task.id());
        state.tasks.insert(task.id(), stored.clone());
        state.advance_graph_revision(graph_revision);
        state.append_history(task.id(), history);
        Ok(stored)
    }

    async fn commit(
        &self,
        task: &Task,
        graph_revision: Option<GraphRevision>,
        history: &[TaskHistoryEntry],
    ) -> TaskRepositoryResult<Task> {
        let mut state = self.write()?;
        let current_version = state
            .tasks
            .get(&task.id())
            .ok_or(TaskRepositoryError::NotFound(task.id()))?
            .version();
        if current_version != task.version() {
            return Err(TaskRepositoryError::VersionConflict {
                task_id: task.id(),
                expected: task.version(),
            });
        }
        state.check_graph_revision(graph_revision)?;

        let mut stored = task.clone();
        stored.advance_version();
        state.tasks.insert(task.id(), stored.clone());
        state.advance_graph_revision(graph_revision);
        state.append_history(task.id(), history);
        Ok(stored)
    }

    async fn delete(
        &self,
        task_id: TaskId,
        expected_version: u64,
        graph_revision: GraphRevision,
    ) -> TaskRepositoryResult<()> {
        let mut state = self.write()?;
        let current = state
            .tasks
            .get(&task_id)
            .ok_or(TaskRepositoryError::NotFound(task_id))?;
        if current.version() != expected_version {
            return Err(TaskRepositoryError::VersionConflict {
                task_id,
                expected: expected_version,
            });
        }
        let identifier = current.identifier();
        state.check_graph_revision(Some(graph_revision))?;

        state.tasks.remove(&task_id);
        state.identifier_index.remove(&identifier);
        state.history.remove(&task_id);
        state.advance_graph_revision(Some(graph_revision));
        Ok(())
    }

    async fn find_by_id(&self, id: TaskId) -> TaskRepositoryResult<Option<Task>> {
        let state = self.read()?;
        Ok(state.tasks.get(&id).cloned())
    }

    async fn find_by_identifier(
        &self,
        identifier: TaskIdentifier,
    ) -> TaskRepositoryResult<Option<Task>> {
        let state = self.read()?;
        let task = state
            .identifier_index
            .get(&identifier)
            .and_then(|task_id| state.tasks.get(task_id))
            .cloned();
        Ok(task)
    }

    async fn find_many(&self, ids: &[TaskId]) -> TaskRepositoryResult<Vec<Task>> {
        let state = self.read()?;
        Ok(InMemoryTaskState::sorted(
            ids.iter().filter_map(|id| state.tasks.get(id)),
        ))
    }

    async fn list(&self, query: &TaskQuery) -> TaskRepositoryResult<Vec<Task>> {
        let state = self.read()?;
        Ok(InMemoryTaskState::sorted(
            state.tasks.values().filter(|task| query.matches(task)),
        ))
    }

    async fn find_dependents(&self, task_id: TaskId) -> TaskRepositoryResult<Vec<Task>> {
        let state = self.read()?;
        Ok(InMemoryTaskState::sorted(
            state
                .tasks
                .values()
                .filter(|task| task.dependencies().contains(&task_id)),
        ))
    }

    async fn find_children(&self, goal_id: TaskId) -> TaskRepositoryResult<Vec<Task>> {
        let state = self.read()?;
        Ok(InMemoryTaskState::sorted(
            state
                .tasks
                .values()
                .filter(|task| task.parent_goal_id() == Some(goal_id)),
        ))
    }

    async fn dependency_graph(&self) -> TaskRepositoryResult<DependencySnapshot> {
        let state = self.read()?;
        Ok(DependencySnapshot::from_tasks(
            state.graph_revision,
            state.tasks.values(),
        ))
    }

    async fn history(&self, task_id: TaskId) -> TaskRepositoryResult<Vec<TaskHistoryEntry>> {
        let state = self.read()?;
        Ok(state.history.get(&task_id).cloned().unwrap_or_default())
    }
}

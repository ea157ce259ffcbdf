//! Dependency edge management and readiness queries.
//!
//! Edge changes commit with a compare-and-set on both the dependent task's
//! version and the store-wide graph revision, so the cycle check always runs
//! against the graph the edge is inserted into.

use super::access::TaskAccess;
use super::error::{TaskLifecycleError, TaskLifecycleResult};
use crate::config::EngineConfig;
use crate::task::{
    domain::{Principal, Task, TaskId, graph},
    ports::TaskRepository,
};
use mockable::Clock;
use std::sync::Arc;
use tracing::info;

/// Dependency graph orchestration service.
pub struct DependencyService<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    access: TaskAccess<R, C>,
}

impl<R, C> Clone for DependencyService<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            access: self.access.clone(),
        }
    }
}

impl<R, C> DependencyService<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    /// Creates a new dependency service.
    #[must_use]
    pub const fn new(repository: Arc<R>, clock: Arc<C>, config: Arc<EngineConfig>) -> Self {
        Self {
            access: TaskAccess::new(repository, clock, config),
        }
    }

    /// Makes `task_id` depend on `depends_on`.
    ///
    /// Adding an edge that already exists succeeds without a write.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::NotFound`] when either task does not
    /// exist, [`TaskDomainError::CycleDetected`] when the edge would close
    /// a cycle, [`TaskDomainError::GoalDependency`] when either end is a
    /// goal, and [`TaskDomainError::InvalidStatus`] when an unresolved
    /// dependency would be added to work already under way, blocked or not.
    ///
    /// [`TaskDomainError::CycleDetected`]: crate::task::domain::TaskDomainError::CycleDetected
    /// [`TaskDomainError::GoalDependency`]: crate::task::domain::TaskDomainError::GoalDependency
    /// [`TaskDomainError::InvalidStatus`]: crate::task::domain::TaskDomainError::InvalidStatus
    pub async fn add_dependency(
        &self,
        task_id: TaskId,
        depends_on: TaskId,
        principal: &Principal,
    ) -> TaskLifecycleResult<Task> {
        let task = self
            .access
            .retry(task_id, || self.try_add(task_id, depends_on, principal))
            .await?;
        info!(
            task_id = %task_id,
            depends_on = %depends_on,
            principal = %principal.identity(),
            "dependency added"
        );
        Ok(task)
    }

    /// Removes the edge from `task_id` to `depends_on`, if present.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::NotFound`] when the task does not
    /// exist.
    pub async fn remove_dependency(
        &self,
        task_id: TaskId,
        depends_on: TaskId,
        principal: &Principal,
    ) -> TaskLifecycleResult<Task> {
        let task = self
            .access
            .retry(task_id, || async move {
                let snapshot = self.access.repository.dependency_graph().await?;
                let mut loaded = self.access.load_current(task_id).await?;
                loaded
                    .task
                    .ensure_accessible(principal, "remove a dependency from")?;
                let events = loaded
                    .task
                    .remove_dependency(depends_on, &*self.access.clock);
                if events.is_empty() && loaded.reclaimed.is_empty() {
                    return Ok(loaded.task);
                }
                let revision = (!events.is_empty()).then_some(snapshot.revision());
                self.access
                    .commit(loaded, events, principal.identity(), revision)
                    .await
            })
            .await?;
        info!(
            task_id = %task_id,
            depends_on = %depends_on,
            principal = %principal.identity(),
            "dependency removed"
        );
        Ok(task)
    }

    /// Returns whether the task is open with every dependency completed.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::NotFound`] when the task does not
    /// exist.
    pub async fn is_ready(&self, task_id: TaskId) -> TaskLifecycleResult<bool> {
        let task = self
            .access
            .find_current(task_id)
            .await?
            .ok_or(TaskLifecycleError::NotFound(task_id))?;
        let statuses = self.access.statuses_of(task.dependencies()).await?;
        Ok(graph::is_ready(&task, &statuses))
    }

    /// Returns the dependents of `task_id` that are ready to claim.
    ///
    /// Readiness is evaluated on demand and never stored.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Repository`] when lookup fails.
    pub async fn recompute_dependents(&self, task_id: TaskId) -> TaskLifecycleResult<Vec<Task>> {
        self.access.ready_dependents(task_id).await
    }

    async fn try_add(
        &self,
        task_id: TaskId,
        depends_on: TaskId,
        principal: &Principal,
    ) -> TaskLifecycleResult<Task> {
        let snapshot = self.access.repository.dependency_graph().await?;
        let mut loaded = self.access.load_current(task_id).await?;
        loaded
            .task
            .ensure_accessible(principal, "add a dependency to")?;
        let dependency = self
            .access
            .repository
            .find_by_id(depends_on)
            .await?
            .ok_or(TaskLifecycleError::NotFound(depends_on))?;
        snapshot.ensure_acyclic(task_id, depends_on)?;

        let events = loaded
            .task
            .add_dependency(&dependency, &*self.access.clock)?;
        if events.is_empty() && loaded.reclaimed.is_empty() {
            return Ok(loaded.task);
        }
        let revision = (!events.is_empty()).then_some(snapshot.revision());
        self.access
            .commit(loaded, events, principal.identity(), revision)
            .await
    }
}

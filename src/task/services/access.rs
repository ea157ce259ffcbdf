//! Shared load, reclaim, retry and commit plumbing for the task services.

use super::error::{TaskLifecycleError, TaskLifecycleResult};
use crate::config::EngineConfig;
use crate::task::{
    domain::{
        GraphRevision, PrincipalId, Task, TaskDomainError, TaskEvent, TaskHistoryEntry, TaskId,
        TaskStatus, graph,
    },
    ports::TaskRepository,
};
use mockable::Clock;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Repository, clock and configuration handles shared by every service.
pub(super) struct TaskAccess<R, C> {
    pub(super) repository: Arc<R>,
    pub(super) clock: Arc<C>,
    pub(super) config: Arc<EngineConfig>,
}

impl<R, C> Clone for TaskAccess<R, C> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            clock: Arc::clone(&self.clock),
            config: Arc::clone(&self.config),
        }
    }
}

/// A task loaded for mutation together with the release of an elapsed
/// claim that must be folded into the next commit.
pub(super) struct LoadedTask {
    pub(super) task: Task,
    pub(super) reclaimed: Vec<TaskEvent>,
}

impl<R, C> TaskAccess<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    pub(super) const fn new(repository: Arc<R>, clock: Arc<C>, config: Arc<EngineConfig>) -> Self {
        Self {
            repository,
            clock,
            config,
        }
    }

    /// Runs `attempt` until it stops losing compare-and-set races.
    ///
    /// Conflicts are retried up to the configured limit, after which
    /// [`TaskLifecycleError::Contention`] is returned.
    pub(super) async fn retry<T, F, Fut>(
        &self,
        task_id: TaskId,
        mut attempt: F,
    ) -> TaskLifecycleResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = TaskLifecycleResult<T>>,
    {
        let retries = self.config.max_conflict_retries();
        let mut attempts = 0_u32;
        loop {
            attempts = attempts.saturating_add(1);
            match attempt().await {
                Err(err) if err.is_conflict() => {
                    if attempts > retries {
                        warn!(task_id = %task_id, attempts, "giving up after repeated conflicts");
                        return Err(TaskLifecycleError::Contention { task_id, attempts });
                    }
                    debug!(task_id = %task_id, attempt = attempts, error = %err, "retrying after conflict");
                }
                other => return other,
            }
        }
    }

    /// Loads a task for mutation, releasing an elapsed claim in memory.
    pub(super) async fn load_current(&self, task_id: TaskId) -> TaskLifecycleResult<LoadedTask> {
        let mut task = self
            .repository
            .find_by_id(task_id)
            .await?
            .ok_or(TaskLifecycleError::NotFound(task_id))?;
        let reclaimed = self.reclaim_loaded(&mut task);
        Ok(LoadedTask { task, reclaimed })
    }

    /// Loads a task for reading, persisting the release of an elapsed claim.
    pub(super) async fn find_current(&self, task_id: TaskId) -> TaskLifecycleResult<Option<Task>> {
        self.retry(task_id, || async move {
            let Some(task) = self.repository.find_by_id(task_id).await? else {
                return Ok(None);
            };
            self.persist_reclaim(task).await.map(Some)
        })
        .await
    }

    /// Persists the release of `task`'s claim if it has elapsed.
    ///
    /// Tasks with a live claim are returned unchanged without a write.
    pub(super) async fn persist_reclaim(&self, mut task: Task) -> TaskLifecycleResult<Task> {
        let reclaimed = self.reclaim_loaded(&mut task);
        if reclaimed.is_empty() {
            return Ok(task);
        }
        let history = TaskHistoryEntry::record(&task, None, reclaimed);
        Ok(self.repository.commit(&task, None, &history).await?)
    }

    /// Releases elapsed claims across `tasks`, re-reading any task another
    /// writer changed in the meantime.
    ///
    /// Tasks deleted concurrently are dropped from the result.
    pub(super) async fn refresh_all(&self, tasks: Vec<Task>) -> TaskLifecycleResult<Vec<Task>> {
        let mut current = Vec::with_capacity(tasks.len());
        for task in tasks {
            let task_id = task.id();
            match self.persist_reclaim(task).await {
                Ok(stored) => current.push(stored),
                Err(err) if err.is_conflict() => {
                    debug!(task_id = %task_id, "re-reading task changed by another writer");
                    current.extend(self.find_current(task_id).await?);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(current)
    }

    fn reclaim_loaded(&self, task: &mut Task) -> Vec<TaskEvent> {
        let claimant = task.claimed_by().cloned();
        let events = task.reclaim_if_expired(self.config.columns(), &*self.clock);
        if let Some(previous) = claimant.filter(|_| !events.is_empty()) {
            warn!(
                task_id = %task.id(),
                identifier = %task.identifier(),
                claimant = %previous,
                "released expired claim"
            );
        }
        events
    }

    /// Returns the current status of each task in `ids` that exists.
    pub(super) async fn statuses_of(
        &self,
        ids: &BTreeSet<TaskId>,
    ) -> TaskLifecycleResult<BTreeMap<TaskId, TaskStatus>> {
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let lookup: Vec<TaskId> = ids.iter().copied().collect();
        let tasks = self.repository.find_many(&lookup).await?;
        Ok(tasks.iter().map(|task| (task.id(), task.status())).collect())
    }

    /// Returns the dependencies of `task` that are not yet completed.
    pub(super) async fn unresolved(&self, task: &Task) -> TaskLifecycleResult<Vec<TaskId>> {
        let statuses = self.statuses_of(task.dependencies()).await?;
        Ok(graph::unresolved_dependencies(task, &statuses))
    }

    /// Commits `task` with the folded claim release and the operation's
    /// events.
    ///
    /// Releases are attributed to the engine; the operation's events to
    /// `actor`.
    pub(super) async fn commit(
        &self,
        loaded: LoadedTask,
        events: Vec<TaskEvent>,
        actor: &PrincipalId,
        graph_revision: Option<GraphRevision>,
    ) -> TaskLifecycleResult<Task> {
        let LoadedTask { task, reclaimed } = loaded;
        let mut history = TaskHistoryEntry::record(&task, None, reclaimed);
        history.extend(TaskHistoryEntry::record(&task, Some(actor), events));
        Ok(self.repository.commit(&task, graph_revision, &history).await?)
    }

    /// Returns the dependents of `task_id` that are now ready to claim.
    pub(super) async fn ready_dependents(&self, task_id: TaskId) -> TaskLifecycleResult<Vec<Task>> {
        let dependents = self.repository.find_dependents(task_id).await?;
        let wanted: BTreeSet<TaskId> = dependents
            .iter()
            .flat_map(|task| task.dependencies().iter().copied())
            .collect();
        let statuses = self.statuses_of(&wanted).await?;
        Ok(dependents
            .into_iter()
            .filter(|task| graph::is_ready(task, &statuses))
            .collect())
    }
}

/// Logs a rejection caused by a caller-reported hook result.
pub(super) fn log_hook_rejection(task_id: TaskId, err: &TaskLifecycleError) {
    match err {
        TaskLifecycleError::Domain(TaskDomainError::HookFailed {
            hook,
            exit_code,
            output,
        }) => {
            warn!(task_id = %task_id, hook = %hook, exit_code, output = %output, "hook failure rejected transition");
        }
        TaskLifecycleError::Domain(TaskDomainError::MalformedHookResult { hook, reason }) => {
            warn!(task_id = %task_id, hook = %hook, reason = %reason, "malformed hook result rejected transition");
        }
        _ => {}
    }
}

//! Retry exhaustion when every commit loses the compare-and-set race.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use foreman::config::EngineConfig;
use foreman::task::{
    adapters::memory::InMemoryTaskRepository,
    domain::{
        BoardId, DependencySnapshot, ErrorKind, GraphRevision, Task, TaskHistoryEntry, TaskId,
        TaskIdentifier, TaskKind,
    },
    ports::{TaskQuery, TaskRepository, TaskRepositoryError, TaskRepositoryResult},
    services::{ClaimCoordinator, ClaimTaskRequest, CreateTaskRequest, TaskLifecycleError, TaskLifecycleService},
};
use mockable::DefaultClock;

use super::helpers::{agent, passing_hook};

/// Repository whose commits always report a concurrent writer.
struct AlwaysConflicting {
    inner: InMemoryTaskRepository,
    commits: AtomicU32,
}

#[async_trait]
impl TaskRepository for AlwaysConflicting {
    async fn next_identifier_number(&self) -> TaskRepositoryResult<u64> {
        self.inner.next_identifier_number().await
    }

    async fn store(
        &self,
        task: &Task,
        graph_revision: Option<GraphRevision>,
        history: &[TaskHistoryEntry],
    ) -> TaskRepositoryResult<Task> {
        self.inner.store(task, graph_revision, history).await
    }

    async fn commit(
        &self,
        task: &Task,
        _graph_revision: Option<GraphRevision>,
        _history: &[TaskHistoryEntry],
    ) -> TaskRepositoryResult<Task> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Err(TaskRepositoryError::VersionConflict {
            task_id: task.id(),
            expected: task.version(),
        })
    }

    async fn delete(
        &self,
        task_id: TaskId,
        expected_version: u64,
        graph_revision: GraphRevision,
    ) -> TaskRepositoryResult<()> {
        self.inner.delete(task_id, expected_version, graph_revision).await
    }

    async fn find_by_id(&self, id: TaskId) -> TaskRepositoryResult<Option<Task>> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_identifier(
        &self,
        identifier: TaskIdentifier,
    ) -> TaskRepositoryResult<Option<Task>> {
        self.inner.find_by_identifier(identifier).await
    }

    async fn find_many(&self, ids: &[TaskId]) -> TaskRepositoryResult<Vec<Task>> {
        self.inner.find_many(ids).await
    }

    async fn list(&self, query: &TaskQuery) -> TaskRepositoryResult<Vec<Task>> {
        self.inner.list(query).await
    }

    async fn find_dependents(&self, task_id: TaskId) -> TaskRepositoryResult<Vec<Task>> {
        self.inner.find_dependents(task_id).await
    }

    async fn find_children(&self, goal_id: TaskId) -> TaskRepositoryResult<Vec<Task>> {
        self.inner.find_children(goal_id).await
    }

    async fn dependency_graph(&self) -> TaskRepositoryResult<DependencySnapshot> {
        self.inner.dependency_graph().await
    }

    async fn history(&self, task_id: TaskId) -> TaskRepositoryResult<Vec<TaskHistoryEntry>> {
        self.inner.history(task_id).await
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn claim_gives_up_after_retry_budget() -> Result<(), eyre::Report> {
    let repository = Arc::new(AlwaysConflicting {
        inner: InMemoryTaskRepository::new(),
        commits: AtomicU32::new(0),
    });
    let clock = Arc::new(DefaultClock);
    let config = Arc::new(EngineConfig::default().with_max_conflict_retries(2));
    let lifecycle = TaskLifecycleService::new(
        Arc::clone(&repository),
        Arc::clone(&clock),
        Arc::clone(&config),
    );
    let claims = ClaimCoordinator::new(Arc::clone(&repository), clock, config);
    let task = lifecycle
        .create_task(CreateTaskRequest::new(BoardId::new("core")?, TaskKind::Work, "Hot"))
        .await?;

    let result = claims
        .claim(ClaimTaskRequest::new(task.id(), agent("agent-1")?).with_before_doing(passing_hook()))
        .await;

    let Err(err) = result else {
        eyre::bail!("claim should give up");
    };
    eyre::ensure!(err.kind() == ErrorKind::Contention);
    eyre::ensure!(matches!(err, TaskLifecycleError::Contention { attempts: 3, .. }));
    eyre::ensure!(repository.commits.load(Ordering::SeqCst) == 3);
    Ok(())
}

//! Claim coordination: next-task selection, claiming and releasing.
//!
//! Every claim is a load-check-commit cycle guarded by a compare-and-set on
//! the task version. When two principals race for the same task the loser
//! re-reads the winner's commit, re-runs the checks and receives
//! [`TaskDomainError::AlreadyClaimed`](crate::task::domain::TaskDomainError::AlreadyClaimed).

use super::access::{TaskAccess, log_hook_rejection};
use super::error::{TaskLifecycleError, TaskLifecycleResult};
use crate::config::EngineConfig;
use crate::task::{
    domain::{
        ClaimAttempt, HookMetadata, HookPoint, Principal, Task, TaskId, TaskStatus, matcher,
    },
    ports::{TaskQuery, TaskRepository},
};
use mockable::Clock;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

/// Hooks published to the claimant once a claim succeeds.
const CLAIM_HOOKS: [HookPoint; 3] = [
    HookPoint::AfterDoing,
    HookPoint::BeforeReview,
    HookPoint::AfterReview,
];

/// Request payload for claiming a task.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimTaskRequest {
    task_id: TaskId,
    principal: Principal,
    before_doing: Option<Value>,
}

impl ClaimTaskRequest {
    /// Creates a claim request without a `before_doing` report.
    #[must_use]
    pub const fn new(task_id: TaskId, principal: Principal) -> Self {
        Self {
            task_id,
            principal,
            before_doing: None,
        }
    }

    /// Attaches the raw `before_doing` hook report.
    #[must_use]
    pub fn with_before_doing(mut self, report: Value) -> Self {
        self.before_doing = Some(report);
        self
    }
}

/// Result of a successful claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimOutcome {
    /// The claimed task as stored.
    pub task: Task,
    /// Metadata for the hooks the claimant runs later in the lifecycle.
    pub hooks: Vec<HookMetadata>,
}

/// Coordinates exclusive claims over tasks.
pub struct ClaimCoordinator<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    access: TaskAccess<R, C>,
}

impl<R, C> Clone for ClaimCoordinator<R, C>
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

impl<R, C> ClaimCoordinator<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    /// Creates a new claim coordinator.
    #[must_use]
    pub const fn new(repository: Arc<R>, clock: Arc<C>, config: Arc<EngineConfig>) -> Self {
        Self {
            access: TaskAccess::new(repository, clock, config),
        }
    }

    /// Returns the best task `principal` could claim right now, if any.
    ///
    /// Elapsed claims encountered while listing are released and persisted
    /// before selection, so their tasks become candidates again.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Repository`] when listing or releasing
    /// fails.
    pub async fn get_next(&self, principal: &Principal) -> TaskLifecycleResult<Option<Task>> {
        let mut query = TaskQuery::all().with_statuses([TaskStatus::Open, TaskStatus::InProgress]);
        if let Some(board) = principal.board_scope() {
            query = query.with_board(board.clone());
        }
        let listed = self.access.repository.list(&query).await?;
        let candidates = self.access.refresh_all(listed).await?;

        let wanted: BTreeSet<TaskId> = candidates
            .iter()
            .filter(|task| task.status() == TaskStatus::Open)
            .flat_map(|task| task.dependencies().iter().copied())
            .collect();
        let statuses = self.access.statuses_of(&wanted).await?;
        Ok(matcher::select_next(&candidates, principal, &statuses).cloned())
    }

    /// Claims a task for the requesting principal.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::NotFound`] when the task does not
    /// exist, [`TaskLifecycleError::Domain`] when a claim check or the
    /// `before_doing` gate rejects the attempt, and
    /// [`TaskLifecycleError::Contention`] when conflicts exhaust the retry
    /// budget.
    pub async fn claim(&self, request: ClaimTaskRequest) -> TaskLifecycleResult<ClaimOutcome> {
        let ClaimTaskRequest {
            task_id,
            principal,
            before_doing,
        } = request;

        let task = self
            .access
            .retry(task_id, || {
                self.try_claim(task_id, &principal, before_doing.as_ref())
            })
            .await
            .inspect_err(|err| log_hook_rejection(task_id, err))?;

        info!(
            task_id = %task.id(),
            identifier = %task.identifier(),
            claimant = %principal.identity(),
            "task claimed"
        );
        let hooks = CLAIM_HOOKS
            .into_iter()
            .map(|hook| hook.metadata(&task, principal.identity()))
            .collect();
        Ok(ClaimOutcome { task, hooks })
    }

    /// Releases the principal's claim, returning the task to `open`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::NotFound`] when the task does not
    /// exist and [`TaskLifecycleError::Domain`] when the task is not in
    /// progress or is claimed by someone else.
    pub async fn unclaim(
        &self,
        task_id: TaskId,
        principal: &Principal,
    ) -> TaskLifecycleResult<Task> {
        let task = self
            .access
            .retry(task_id, || async move {
                let mut loaded = self.access.load_current(task_id).await?;
                let events = loaded.task.unclaim(
                    principal,
                    self.access.config.columns(),
                    &*self.access.clock,
                )?;
                self.access
                    .commit(loaded, events, principal.identity(), None)
                    .await
            })
            .await?;

        info!(
            task_id = %task.id(),
            identifier = %task.identifier(),
            principal = %principal.identity(),
            "task unclaimed"
        );
        Ok(task)
    }

    async fn try_claim(
        &self,
        task_id: TaskId,
        principal: &Principal,
        before_doing: Option<&Value>,
    ) -> TaskLifecycleResult<Task> {
        let mut loaded = self.access.load_current(task_id).await?;
        let unresolved = self.access.unresolved(&loaded.task).await?;
        let attempt = ClaimAttempt {
            principal,
            unresolved: &unresolved,
            before_doing,
            ttl: self.access.config.claim_ttl(),
            layout: self.access.config.columns(),
        };
        let events = loaded.task.claim(attempt, &*self.access.clock)?;
        self.access
            .commit(loaded, events, principal.identity(), None)
            .await
    }
}

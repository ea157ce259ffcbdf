//! Service layer for task creation, completion, review and removal.

use super::access::{TaskAccess, log_hook_rejection};
use super::error::{TaskLifecycleError, TaskLifecycleResult};
use crate::config::EngineConfig;
use crate::task::{
    domain::{
        BoardId, CapabilitySet, ColumnId, Complexity, CompletionAttempt, GoalProgress,
        HookMetadata, HookPoint, HookResult, NewTask, Principal, PrincipalId, Priority,
        ReviewAttempt, ReviewDecision, Task, TaskDomainError, TaskEvent, TaskHistoryEntry, TaskId,
        TaskIdentifier, TaskKind, TaskStatus,
    },
    ports::TaskRepository,
};
use mockable::Clock;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Request payload for creating a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTaskRequest {
    board_id: BoardId,
    kind: TaskKind,
    title: String,
    description: Option<String>,
    priority: Priority,
    complexity: Option<Complexity>,
    needs_review: bool,
    required_capabilities: CapabilitySet,
    dependencies: BTreeSet<TaskId>,
    parent_goal_id: Option<TaskId>,
    column: Option<ColumnId>,
    creator: Option<PrincipalId>,
}

impl CreateTaskRequest {
    /// Creates a request with the required fields.
    #[must_use]
    pub fn new(board_id: BoardId, kind: TaskKind, title: impl Into<String>) -> Self {
        Self {
            board_id,
            kind,
            title: title.into(),
            description: None,
            priority: Priority::default(),
            complexity: None,
            needs_review: false,
            required_capabilities: CapabilitySet::empty(),
            dependencies: BTreeSet::new(),
            parent_goal_id: None,
            column: None,
            creator: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the complexity estimate.
    #[must_use]
    pub const fn with_complexity(mut self, complexity: Complexity) -> Self {
        self.complexity = Some(complexity);
        self
    }

    /// Routes completion through human review.
    #[must_use]
    pub const fn with_review(mut self) -> Self {
        self.needs_review = true;
        self
    }

    /// Sets the capabilities a claimant must hold.
    #[must_use]
    pub fn with_required_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.required_capabilities = capabilities;
        self
    }

    /// Sets the initial dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: impl IntoIterator<Item = TaskId>) -> Self {
        self.dependencies = dependencies.into_iter().collect();
        self
    }

    /// Places the task under a parent goal.
    #[must_use]
    pub const fn with_parent_goal(mut self, goal_id: TaskId) -> Self {
        self.parent_goal_id = Some(goal_id);
        self
    }

    /// Places the task in a specific column instead of Todo.
    #[must_use]
    pub fn with_column(mut self, column: ColumnId) -> Self {
        self.column = Some(column);
        self
    }

    /// Records who created the task.
    #[must_use]
    pub fn with_creator(mut self, creator: PrincipalId) -> Self {
        self.creator = Some(creator);
        self
    }
}

/// Request payload for reporting a task finished.
#[derive(Debug, Clone, PartialEq)]
pub struct CompleteTaskRequest {
    task_id: TaskId,
    principal: Principal,
    after_doing: Option<Value>,
    notes: Option<String>,
    time_spent_minutes: Option<u32>,
    before_review: Option<Value>,
}

impl CompleteTaskRequest {
    /// Creates a completion request without hook reports.
    #[must_use]
    pub const fn new(task_id: TaskId, principal: Principal) -> Self {
        Self {
            task_id,
            principal,
            after_doing: None,
            notes: None,
            time_spent_minutes: None,
            before_review: None,
        }
    }

    /// Attaches the raw `after_doing` hook report.
    #[must_use]
    pub fn with_after_doing(mut self, report: Value) -> Self {
        self.after_doing = Some(report);
        self
    }

    /// Sets completion notes.
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Sets the minutes spent on the work.
    #[must_use]
    pub const fn with_time_spent_minutes(mut self, minutes: u32) -> Self {
        self.time_spent_minutes = Some(minutes);
        self
    }

    /// Attaches the raw `before_review` hook report.
    #[must_use]
    pub fn with_before_review(mut self, report: Value) -> Self {
        self.before_review = Some(report);
        self
    }
}

/// Result of a successful completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteOutcome {
    /// The task as stored.
    pub task: Task,
    /// Metadata for the `before_review` hook.
    pub hooks: Vec<HookMetadata>,
    /// Dependents that became claimable because this task completed.
    pub ready_dependents: Vec<Task>,
}

/// Request payload for recording a review decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewTaskRequest {
    task_id: TaskId,
    reviewer: Principal,
    decision: ReviewDecision,
    notes: Option<String>,
}

impl ReviewTaskRequest {
    /// Creates a review request.
    #[must_use]
    pub const fn new(task_id: TaskId, reviewer: Principal, decision: ReviewDecision) -> Self {
        Self {
            task_id,
            reviewer,
            decision,
            notes: None,
        }
    }

    /// Sets reviewer notes.
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Result of a recorded review decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewOutcome {
    /// The task as stored.
    pub task: Task,
    /// Metadata for the `after_review` hook when the work was approved.
    pub hooks: Vec<HookMetadata>,
    /// Dependents that became claimable because the work was approved.
    pub ready_dependents: Vec<Task>,
}

/// Task lifecycle orchestration service.
pub struct TaskLifecycleService<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    access: TaskAccess<R, C>,
}

impl<R, C> Clone for TaskLifecycleService<R, C>
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

impl<R, C> TaskLifecycleService<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    /// Creates a new task lifecycle service.
    #[must_use]
    pub const fn new(repository: Arc<R>, clock: Arc<C>, config: Arc<EngineConfig>) -> Self {
        Self {
            access: TaskAccess::new(repository, clock, config),
        }
    }

    /// Creates a new open task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::NotFound`] when the parent goal or a
    /// dependency does not exist, [`TaskLifecycleError::Domain`] when input
    /// validation fails, and [`TaskLifecycleError::Repository`] when the
    /// repository rejects persistence.
    pub async fn create_task(&self, request: CreateTaskRequest) -> TaskLifecycleResult<Task> {
        let CreateTaskRequest {
            board_id,
            kind,
            title,
            description,
            priority,
            complexity,
            needs_review,
            required_capabilities,
            dependencies,
            parent_goal_id,
            column,
            creator,
        } = request;

        if let Some(goal_id) = parent_goal_id {
            let parent = self
                .access
                .repository
                .find_by_id(goal_id)
                .await?
                .ok_or(TaskLifecycleError::NotFound(goal_id))?;
            if parent.kind() != TaskKind::Goal {
                return Err(TaskDomainError::ParentNotGoal(goal_id).into());
            }
        }

        let number = self.access.repository.next_identifier_number().await?;
        let identifier = TaskIdentifier::new(kind, number)?;
        let new_task = NewTask {
            board_id,
            kind,
            title,
            description,
            priority,
            complexity,
            needs_review,
            required_capabilities,
            dependencies,
            parent_goal_id,
            column: column.unwrap_or_else(|| self.access.config.columns().todo().clone()),
        };
        let task = Task::create(new_task, identifier, &*self.access.clock)?;
        if task.kind() == TaskKind::Goal && !task.dependencies().is_empty() {
            return Err(TaskDomainError::GoalDependency(task.id()).into());
        }

        let mut events = vec![TaskEvent::Created {
            placement: task.placement(),
        }];
        events.extend(
            task.dependencies()
                .iter()
                .map(|dependency| TaskEvent::DependencyAdded {
                    depends_on: *dependency,
                }),
        );
        let history = TaskHistoryEntry::record(&task, creator.as_ref(), events);
        let stored = self
            .access
            .retry(task.id(), || self.store_new(&task, &history))
            .await?;

        info!(
            task_id = %stored.id(),
            identifier = %stored.identifier(),
            board_id = %stored.board_id(),
            "task created"
        );
        Ok(stored)
    }

    /// Retrieves a task by internal identifier.
    ///
    /// Returns `Ok(None)` when the task does not exist. An elapsed claim is
    /// released and persisted before the task is returned.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Repository`] when persistence lookup
    /// fails.
    pub async fn find_by_id(&self, task_id: TaskId) -> TaskLifecycleResult<Option<Task>> {
        self.access.find_current(task_id).await
    }

    /// Retrieves a task by human-readable identifier.
    ///
    /// Returns `Ok(None)` when no task carries the identifier.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Repository`] when persistence lookup
    /// fails.
    pub async fn find_by_identifier(
        &self,
        identifier: TaskIdentifier,
    ) -> TaskLifecycleResult<Option<Task>> {
        let Some(task) = self.access.repository.find_by_identifier(identifier).await? else {
            return Ok(None);
        };
        self.access.find_current(task.id()).await
    }

    /// Reports the claimed work finished.
    ///
    /// A malformed `before_review` report is logged and discarded; it never
    /// rejects the completion.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::NotFound`] when the task does not
    /// exist and [`TaskLifecycleError::Domain`] when the status, claimant,
    /// incomplete dependencies or the `after_doing` gate reject the
    /// completion.
    pub async fn complete(
        &self,
        request: CompleteTaskRequest,
    ) -> TaskLifecycleResult<CompleteOutcome> {
        let CompleteTaskRequest {
            task_id,
            principal,
            after_doing,
            notes,
            time_spent_minutes,
            before_review: before_review_report,
        } = request;
        let report = CompletionReport {
            after_doing,
            notes,
            time_spent_minutes,
            before_review: before_review_report
                .and_then(|raw| informational_result(task_id, HookPoint::BeforeReview, &raw)),
        };

        let task = self
            .access
            .retry(task_id, || self.try_complete(task_id, &principal, &report))
            .await
            .inspect_err(|err| log_hook_rejection(task_id, err))?;

        info!(
            task_id = %task.id(),
            identifier = %task.identifier(),
            status = %task.status(),
            principal = %principal.identity(),
            "task completed"
        );
        let hooks = vec![HookPoint::BeforeReview.metadata(&task, principal.identity())];
        let ready_dependents = self.dependents_if_completed(&task).await?;
        Ok(CompleteOutcome {
            task,
            hooks,
            ready_dependents,
        })
    }

    /// Records a human reviewer's decision on a task awaiting review.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::NotFound`] when the task does not
    /// exist and [`TaskLifecycleError::Domain`] when the task is not
    /// awaiting review, the reviewer is not human, or changes are requested
    /// while a dependency is incomplete.
    pub async fn mark_reviewed(
        &self,
        request: ReviewTaskRequest,
    ) -> TaskLifecycleResult<ReviewOutcome> {
        let ReviewTaskRequest {
            task_id,
            reviewer,
            decision,
            notes,
        } = request;

        let task = self
            .access
            .retry(task_id, || {
                self.try_review(task_id, &reviewer, decision, notes.as_deref())
            })
            .await?;

        info!(
            task_id = %task.id(),
            identifier = %task.identifier(),
            decision = %decision,
            reviewer = %reviewer.identity(),
            "review recorded"
        );
        let hooks = if task.status() == TaskStatus::Completed {
            let agent = task.completed_by().unwrap_or_else(|| reviewer.identity());
            vec![HookPoint::AfterReview.metadata(&task, agent)]
        } else {
            Vec::new()
        };
        let ready_dependents = self.dependents_if_completed(&task).await?;
        Ok(ReviewOutcome {
            task,
            hooks,
            ready_dependents,
        })
    }

    /// Pauses a task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::NotFound`] when the task does not
    /// exist and [`TaskLifecycleError::Domain`] when the task cannot be
    /// blocked by this principal.
    pub async fn block(
        &self,
        task_id: TaskId,
        principal: &Principal,
        reason: Option<&str>,
    ) -> TaskLifecycleResult<Task> {
        let task = self
            .access
            .retry(task_id, || async move {
                let mut loaded = self.access.load_current(task_id).await?;
                let events = loaded.task.block(
                    principal,
                    reason.map(str::to_owned),
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
            "task blocked"
        );
        Ok(task)
    }

    /// Resumes a blocked task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::NotFound`] when the task does not
    /// exist and [`TaskLifecycleError::Domain`] when the task is not blocked
    /// or cannot be unblocked by this principal.
    pub async fn unblock(&self, task_id: TaskId, principal: &Principal) -> TaskLifecycleResult<Task> {
        let task = self
            .access
            .retry(task_id, || async move {
                let mut loaded = self.access.load_current(task_id).await?;
                let unresolved = self.access.unresolved(&loaded.task).await?;
                let events = loaded.task.unblock(
                    principal,
                    &unresolved,
                    self.access.config.claim_ttl(),
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
            status = %task.status(),
            principal = %principal.identity(),
            "task unblocked"
        );
        Ok(task)
    }

    /// Derives a goal's progress from its children.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::NotFound`] when the goal does not exist
    /// and [`TaskDomainError::NotAGoal`] when the task is not a goal.
    pub async fn goal_progress(&self, goal_id: TaskId) -> TaskLifecycleResult<GoalProgress> {
        let goal = self
            .access
            .repository
            .find_by_id(goal_id)
            .await?
            .ok_or(TaskLifecycleError::NotFound(goal_id))?;
        if goal.kind() != TaskKind::Goal {
            return Err(TaskDomainError::NotAGoal(goal_id).into());
        }
        let listed = self.access.repository.find_children(goal_id).await?;
        let children = self.access.refresh_all(listed).await?;
        Ok(GoalProgress::from_children(
            goal_id,
            children.iter().map(Task::status),
        ))
    }

    /// Returns the history of a task in commit order.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::NotFound`] when the task does not
    /// exist.
    pub async fn history(&self, task_id: TaskId) -> TaskLifecycleResult<Vec<TaskHistoryEntry>> {
        self.access
            .find_current(task_id)
            .await?
            .ok_or(TaskLifecycleError::NotFound(task_id))?;
        Ok(self.access.repository.history(task_id).await?)
    }

    /// Deletes a task nothing depends on.
    ///
    /// Children of a deleted goal lose their parent reference.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::NotFound`] when the task does not
    /// exist and [`TaskDomainError::HasDependents`] while other tasks depend
    /// on it.
    pub async fn delete_task(&self, task_id: TaskId, principal: &Principal) -> TaskLifecycleResult<()> {
        let deleted = self
            .access
            .retry(task_id, || self.try_delete(task_id, principal))
            .await?;
        info!(
            task_id = %task_id,
            identifier = %deleted.identifier(),
            principal = %principal.identity(),
            "task deleted"
        );

        if deleted.kind() != TaskKind::Goal {
            return Ok(());
        }
        for child in self.access.repository.find_children(task_id).await? {
            let child_id = child.id();
            match self
                .access
                .retry(child_id, || self.try_detach(child_id, principal))
                .await
            {
                Ok(_) | Err(TaskLifecycleError::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    async fn store_new(
        &self,
        task: &Task,
        history: &[TaskHistoryEntry],
    ) -> TaskLifecycleResult<Task> {
        if task.dependencies().is_empty() {
            return Ok(self.access.repository.store(task, None, history).await?);
        }
        let snapshot = self.access.repository.dependency_graph().await?;
        let wanted: Vec<TaskId> = task.dependencies().iter().copied().collect();
        let found = self.access.repository.find_many(&wanted).await?;
        if let Some(missing) = wanted
            .iter()
            .find(|id| !found.iter().any(|dependency| dependency.id() == **id))
        {
            return Err(TaskLifecycleError::NotFound(*missing));
        }
        if let Some(goal) = found.iter().find(|dependency| dependency.kind() == TaskKind::Goal) {
            return Err(TaskDomainError::GoalDependency(goal.id()).into());
        }
        Ok(self
            .access
            .repository
            .store(task, Some(snapshot.revision()), history)
            .await?)
    }

    async fn try_complete(
        &self,
        task_id: TaskId,
        principal: &Principal,
        report: &CompletionReport,
    ) -> TaskLifecycleResult<Task> {
        let mut loaded = self.access.load_current(task_id).await?;
        let unresolved = self.access.unresolved(&loaded.task).await?;
        let attempt = CompletionAttempt {
            principal,
            unresolved: &unresolved,
            after_doing: report.after_doing.as_ref(),
            notes: report.notes.clone(),
            time_spent_minutes: report.time_spent_minutes,
            before_review: report.before_review.clone(),
            layout: self.access.config.columns(),
        };
        let events = loaded.task.complete(attempt, &*self.access.clock)?;
        self.access
            .commit(loaded, events, principal.identity(), None)
            .await
    }

    async fn try_review(
        &self,
        task_id: TaskId,
        reviewer: &Principal,
        decision: ReviewDecision,
        notes: Option<&str>,
    ) -> TaskLifecycleResult<Task> {
        let mut loaded = self.access.load_current(task_id).await?;
        let unresolved = self.access.unresolved(&loaded.task).await?;
        let attempt = ReviewAttempt {
            reviewer,
            decision,
            notes: notes.map(str::to_owned),
            unresolved: &unresolved,
            ttl: self.access.config.claim_ttl(),
            layout: self.access.config.columns(),
        };
        let events = loaded.task.review(attempt, &*self.access.clock)?;
        self.access
            .commit(loaded, events, reviewer.identity(), None)
            .await
    }

    async fn try_delete(&self, task_id: TaskId, principal: &Principal) -> TaskLifecycleResult<Task> {
        let snapshot = self.access.repository.dependency_graph().await?;
        let loaded = self.access.load_current(task_id).await?;
        loaded.task.ensure_accessible(principal, "delete")?;
        let dependents = snapshot.dependents_of(task_id);
        if !dependents.is_empty() {
            return Err(TaskDomainError::HasDependents {
                task_id,
                dependents,
            }
            .into());
        }
        self.access
            .repository
            .delete(task_id, loaded.task.version(), snapshot.revision())
            .await?;
        Ok(loaded.task)
    }

    async fn try_detach(&self, task_id: TaskId, principal: &Principal) -> TaskLifecycleResult<Task> {
        let mut loaded = self.access.load_current(task_id).await?;
        let events = loaded.task.detach_from_goal(&*self.access.clock);
        if events.is_empty() && loaded.reclaimed.is_empty() {
            return Ok(loaded.task);
        }
        self.access
            .commit(loaded, events, principal.identity(), None)
            .await
    }

    async fn dependents_if_completed(&self, task: &Task) -> TaskLifecycleResult<Vec<Task>> {
        if task.status() != TaskStatus::Completed {
            return Ok(Vec::new());
        }
        self.access.ready_dependents(task.id()).await
    }
}

/// Completion inputs reused across compare-and-set retries.
struct CompletionReport {
    after_doing: Option<Value>,
    notes: Option<String>,
    time_spent_minutes: Option<u32>,
    before_review: Option<HookResult>,
}

/// Validates a non-blocking hook report, discarding it when malformed.
fn informational_result(task_id: TaskId, hook: HookPoint, raw: &Value) -> Option<HookResult> {
    hook.gate(Some(raw))
        .inspect_err(|err| {
            warn!(task_id = %task_id, hook = %hook, error = %err, "discarding malformed hook result");
        })
        .ok()
}

//! Lifecycle transitions on the task aggregate.
//!
//! Each transition validates its preconditions in a fixed order, mutates the
//! aggregate only once every check has passed, and returns the history events
//! describing the change. A rejected transition leaves the task untouched.

use super::{ReviewDecision, ReviewStatus, Task, TaskKind, TaskStatus};
use crate::task::domain::{
    ColumnId, ColumnLayout, HookPoint, HookResult, Principal, PrincipalKind, ReleaseReason,
    TaskDomainError, TaskEvent, TaskId,
};
use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use serde_json::Value;

/// Inputs to a claim attempt.
#[derive(Debug, Clone, Copy)]
pub struct ClaimAttempt<'a> {
    /// Principal attempting the claim.
    pub principal: &'a Principal,
    /// Dependencies that have not reached `completed`.
    pub unresolved: &'a [TaskId],
    /// Raw `before_doing` hook report.
    pub before_doing: Option<&'a Value>,
    /// Claim lifetime.
    pub ttl: TimeDelta,
    /// Column layout for placement.
    pub layout: &'a ColumnLayout,
}

/// Inputs to a completion attempt.
#[derive(Debug, Clone)]
pub struct CompletionAttempt<'a> {
    /// Principal reporting completion.
    pub principal: &'a Principal,
    /// Dependencies that have not reached `completed`.
    pub unresolved: &'a [TaskId],
    /// Raw `after_doing` hook report.
    pub after_doing: Option<&'a Value>,
    /// Completion notes.
    pub notes: Option<String>,
    /// Minutes spent on the work.
    pub time_spent_minutes: Option<u32>,
    /// Validated `before_review` result to record, if any.
    pub before_review: Option<HookResult>,
    /// Column layout for placement.
    pub layout: &'a ColumnLayout,
}

/// Inputs to a review decision.
#[derive(Debug, Clone)]
pub struct ReviewAttempt<'a> {
    /// Reviewer recording the decision.
    pub reviewer: &'a Principal,
    /// Decision.
    pub decision: ReviewDecision,
    /// Reviewer notes.
    pub notes: Option<String>,
    /// Dependencies that have not reached `completed`.
    pub unresolved: &'a [TaskId],
    /// Claim lifetime granted when changes are requested.
    pub ttl: TimeDelta,
    /// Column layout for placement.
    pub layout: &'a ColumnLayout,
}

fn expiry_after(now: DateTime<Utc>, ttl: TimeDelta) -> DateTime<Utc> {
    now.checked_add_signed(ttl)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl Task {
    /// Rejects principals whose board scope excludes this task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::NotAuthorized`] when the principal is
    /// scoped to another board.
    pub fn ensure_accessible(
        &self,
        principal: &Principal,
        action: &'static str,
    ) -> Result<(), TaskDomainError> {
        if principal.can_access(&self.board_id) {
            return Ok(());
        }
        Err(self.not_authorized(principal, action))
    }

    /// Claims the task for the attempting principal.
    ///
    /// Checks run in order: board scope, goal kind, availability,
    /// capabilities, dependencies, then the `before_doing` hook result.
    ///
    /// # Errors
    ///
    /// Returns the first failing check as a [`TaskDomainError`]; the task is
    /// left unchanged.
    pub fn claim(
        &mut self,
        attempt: ClaimAttempt<'_>,
        clock: &impl Clock,
    ) -> Result<Vec<TaskEvent>, TaskDomainError> {
        self.ensure_accessible(attempt.principal, "claim")?;
        if self.kind == TaskKind::Goal {
            return Err(self.invalid_status("claim"));
        }
        if self.status != TaskStatus::Open || self.claimed_by.is_some() {
            return Err(TaskDomainError::AlreadyClaimed {
                task_id: self.id,
                status: self.status,
                claimed_by: self.claimed_by.clone(),
            });
        }
        let missing = self
            .required_capabilities
            .missing_from(attempt.principal.capabilities());
        if !missing.is_empty() {
            return Err(TaskDomainError::NotEligible {
                task_id: self.id,
                missing,
            });
        }
        if !attempt.unresolved.is_empty() {
            return Err(TaskDomainError::DependenciesUnresolved {
                task_id: self.id,
                unresolved: attempt.unresolved.to_vec(),
            });
        }
        let result = HookPoint::BeforeDoing.gate(attempt.before_doing)?;

        let now = clock.utc();
        let claimant = attempt.principal.identity().clone();
        let expires_at = expiry_after(now, attempt.ttl);
        self.pre_claim_column = Some(self.column.clone());
        let mut events = self.move_to(
            TaskStatus::InProgress,
            attempt.layout.column_for(TaskStatus::InProgress).clone(),
        );
        self.claimed_by = Some(claimant.clone());
        self.claimed_at = Some(now);
        self.claim_expires_at = Some(expires_at);
        self.updated_at = now;
        events.push(TaskEvent::Claimed {
            claimant,
            expires_at,
        });
        events.push(TaskEvent::HookReported {
            hook: HookPoint::BeforeDoing,
            result,
        });
        Ok(events)
    }

    /// Gives the task back to the pool.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStatus`] unless the task is in
    /// progress and [`TaskDomainError::NotAuthorized`] unless the principal
    /// holds the claim.
    pub fn unclaim(
        &mut self,
        principal: &Principal,
        layout: &ColumnLayout,
        clock: &impl Clock,
    ) -> Result<Vec<TaskEvent>, TaskDomainError> {
        self.ensure_accessible(principal, "unclaim")?;
        if self.status != TaskStatus::InProgress {
            return Err(self.invalid_status("unclaim"));
        }
        if !self.is_claimed_by(principal) {
            return Err(self.not_authorized(principal, "unclaim"));
        }
        let events = self.release(ReleaseReason::Unclaimed, layout);
        self.updated_at = clock.utc();
        Ok(events)
    }

    /// Releases an elapsed claim, returning the task to `open`.
    ///
    /// Returns no events when the claim is still live.
    pub fn reclaim_if_expired(
        &mut self,
        layout: &ColumnLayout,
        clock: &impl Clock,
    ) -> Vec<TaskEvent> {
        let now = clock.utc();
        if !self.is_claim_expired(now) {
            return Vec::new();
        }
        let events = self.release(ReleaseReason::Expired, layout);
        self.updated_at = now;
        events
    }

    /// Reports the work finished.
    ///
    /// Tasks that need review move to `review` and keep their claimant;
    /// others move straight to `completed`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStatus`] unless the task is in
    /// progress or blocked with its work unfinished,
    /// [`TaskDomainError::NotAuthorized`] unless the principal holds the
    /// claim, [`TaskDomainError::DependenciesUnresolved`] while a dependency
    /// is incomplete, and the `after_doing` gate error when the hook report
    /// is malformed or failing.
    pub fn complete(
        &mut self,
        attempt: CompletionAttempt<'_>,
        clock: &impl Clock,
    ) -> Result<Vec<TaskEvent>, TaskDomainError> {
        self.ensure_accessible(attempt.principal, "complete")?;
        let resumable = match self.status {
            TaskStatus::InProgress => true,
            TaskStatus::Blocked => !self.is_awaiting_review(),
            _ => false,
        };
        if !resumable {
            return Err(self.invalid_status("complete"));
        }
        if !self.is_claimed_by(attempt.principal) {
            return Err(self.not_authorized(attempt.principal, "complete"));
        }
        if !attempt.unresolved.is_empty() {
            return Err(TaskDomainError::DependenciesUnresolved {
                task_id: self.id,
                unresolved: attempt.unresolved.to_vec(),
            });
        }
        let after_doing = HookPoint::AfterDoing.gate(attempt.after_doing)?;

        let now = clock.utc();
        let mut events = vec![TaskEvent::HookReported {
            hook: HookPoint::AfterDoing,
            result: after_doing,
        }];
        let target = if self.needs_review {
            TaskStatus::Review
        } else {
            TaskStatus::Completed
        };
        events.extend(self.move_to(target, attempt.layout.column_for(target).clone()));
        self.completed_at = Some(now);
        self.completed_by = Some(attempt.principal.identity().clone());
        self.completion_notes = attempt.notes;
        self.time_spent_minutes = attempt.time_spent_minutes;
        self.blocked_reason = None;
        self.claim_expires_at = None;
        if self.needs_review {
            self.review_status = Some(ReviewStatus::Pending);
        } else {
            self.clear_claim();
        }
        self.updated_at = now;
        events.push(TaskEvent::Completed {
            time_spent_minutes: attempt.time_spent_minutes,
        });
        if let Some(result) = attempt.before_review {
            events.push(TaskEvent::HookReported {
                hook: HookPoint::BeforeReview,
                result,
            });
        }
        Ok(events)
    }

    /// Records a reviewer decision on a task awaiting review.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStatus`] unless the task is in
    /// review with a pending decision, [`TaskDomainError::NotAuthorized`]
    /// when the reviewer is not human, and
    /// [`TaskDomainError::DependenciesUnresolved`] when changes are requested
    /// while a dependency is incomplete.
    pub fn review(
        &mut self,
        attempt: ReviewAttempt<'_>,
        clock: &impl Clock,
    ) -> Result<Vec<TaskEvent>, TaskDomainError> {
        self.ensure_accessible(attempt.reviewer, "review")?;
        if self.status != TaskStatus::Review || self.review_status != Some(ReviewStatus::Pending) {
            return Err(self.invalid_status("review"));
        }
        if attempt.reviewer.kind() != PrincipalKind::Human {
            return Err(self.not_authorized(attempt.reviewer, "review"));
        }
        if attempt.decision == ReviewDecision::ChangesRequested && !attempt.unresolved.is_empty() {
            return Err(TaskDomainError::DependenciesUnresolved {
                task_id: self.id,
                unresolved: attempt.unresolved.to_vec(),
            });
        }

        let now = clock.utc();
        let mut events = vec![TaskEvent::Reviewed {
            decision: attempt.decision,
        }];
        self.reviewed_by = Some(attempt.reviewer.identity().clone());
        self.review_notes = attempt.notes;
        match attempt.decision {
            ReviewDecision::Approved => {
                events.extend(self.move_to(
                    TaskStatus::Completed,
                    attempt.layout.column_for(TaskStatus::Completed).clone(),
                ));
                self.review_status = Some(ReviewStatus::Approved);
                self.clear_claim();
            }
            ReviewDecision::ChangesRequested => {
                events.extend(self.move_to(
                    TaskStatus::InProgress,
                    attempt.layout.column_for(TaskStatus::InProgress).clone(),
                ));
                self.review_status = Some(ReviewStatus::ChangesRequested);
                if self.claimed_by.is_none() {
                    self.claimed_by = self.completed_by.clone();
                }
                self.completed_at = None;
                self.completed_by = None;
                self.claim_expires_at = Some(expiry_after(now, attempt.ttl));
            }
            ReviewDecision::Rejected => {
                self.review_status = Some(ReviewStatus::Rejected);
                self.clear_claim();
            }
        }
        self.updated_at = now;
        Ok(events)
    }

    /// Pauses the task.
    ///
    /// The claimant is retained so the same principal can resume after an
    /// unblock, but the claim stops expiring.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStatus`] for goals and for tasks
    /// that are already blocked or completed, and
    /// [`TaskDomainError::NotAuthorized`] when an agent tries to block a
    /// task claimed by someone else.
    pub fn block(
        &mut self,
        principal: &Principal,
        reason: Option<String>,
        layout: &ColumnLayout,
        clock: &impl Clock,
    ) -> Result<Vec<TaskEvent>, TaskDomainError> {
        self.ensure_accessible(principal, "block")?;
        if self.kind == TaskKind::Goal
            || !matches!(
                self.status,
                TaskStatus::Open | TaskStatus::InProgress | TaskStatus::Review
            )
        {
            return Err(self.invalid_status("block"));
        }
        self.ensure_may_override_claim(principal, "block")?;

        if self.pre_claim_column.is_none() {
            self.pre_claim_column = Some(self.column.clone());
        }
        let mut events =
            self.move_to(TaskStatus::Blocked, layout.column_for(TaskStatus::Blocked).clone());
        self.claim_expires_at = None;
        self.blocked_reason.clone_from(&reason);
        self.updated_at = clock.utc();
        events.push(TaskEvent::Blocked { reason });
        Ok(events)
    }

    /// Resumes a blocked task.
    ///
    /// Finished work awaiting a review decision returns to `review`. A
    /// retained claimant whose dependencies are complete resumes work with a
    /// fresh claim; otherwise the task returns to `open` without a claimant.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStatus`] unless the task is blocked
    /// and [`TaskDomainError::NotAuthorized`] when an agent tries to unblock
    /// a task claimed by someone else.
    pub fn unblock(
        &mut self,
        principal: &Principal,
        unresolved: &[TaskId],
        ttl: TimeDelta,
        layout: &ColumnLayout,
        clock: &impl Clock,
    ) -> Result<Vec<TaskEvent>, TaskDomainError> {
        self.ensure_accessible(principal, "unblock")?;
        if self.status != TaskStatus::Blocked {
            return Err(self.invalid_status("unblock"));
        }
        self.ensure_may_override_claim(principal, "unblock")?;

        let now = clock.utc();
        let mut events = vec![TaskEvent::Unblocked];
        self.blocked_reason = None;
        if self.is_awaiting_review() {
            events.extend(self.move_to(
                TaskStatus::Review,
                layout.column_for(TaskStatus::Review).clone(),
            ));
        } else if self.claimed_by.is_some() && unresolved.is_empty() {
            events.extend(self.move_to(
                TaskStatus::InProgress,
                layout.column_for(TaskStatus::InProgress).clone(),
            ));
            self.claim_expires_at = Some(expiry_after(now, ttl));
        } else {
            events.extend(self.release(ReleaseReason::Reopened, layout));
        }
        self.updated_at = now;
        Ok(events)
    }

    /// Adds a dependency on `dependency`.
    ///
    /// Adding an existing edge is a no-op and returns no events. Cycle
    /// detection is the dependency graph's concern and must run first.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::GoalDependency`] when either endpoint is a
    /// goal and [`TaskDomainError::InvalidStatus`] when an unresolved
    /// dependency would be added to work already under way, including
    /// blocked work that keeps its claimant.
    pub fn add_dependency(
        &mut self,
        dependency: &Self,
        clock: &impl Clock,
    ) -> Result<Vec<TaskEvent>, TaskDomainError> {
        if self.kind == TaskKind::Goal {
            return Err(TaskDomainError::GoalDependency(self.id));
        }
        if dependency.kind == TaskKind::Goal {
            return Err(TaskDomainError::GoalDependency(dependency.id));
        }
        if self.dependencies.contains(&dependency.id) {
            return Ok(Vec::new());
        }
        if self.has_work_under_way() && dependency.status != TaskStatus::Completed
        {
            return Err(self.invalid_status("add an unresolved dependency to"));
        }
        self.dependencies.insert(dependency.id);
        self.updated_at = clock.utc();
        Ok(vec![TaskEvent::DependencyAdded {
            depends_on: dependency.id,
        }])
    }

    /// Removes the dependency on `dependency`, if present.
    pub fn remove_dependency(&mut self, dependency: TaskId, clock: &impl Clock) -> Vec<TaskEvent> {
        if !self.dependencies.remove(&dependency) {
            return Vec::new();
        }
        self.updated_at = clock.utc();
        vec![TaskEvent::DependencyRemoved {
            depends_on: dependency,
        }]
    }

    /// Drops the weak reference to a deleted parent goal.
    pub fn detach_from_goal(&mut self, clock: &impl Clock) -> Vec<TaskEvent> {
        let Some(goal) = self.parent_goal_id.take() else {
            return Vec::new();
        };
        self.updated_at = clock.utc();
        vec![TaskEvent::DetachedFromGoal { goal }]
    }

    fn has_work_under_way(&self) -> bool {
        match self.status {
            TaskStatus::InProgress | TaskStatus::Review => true,
            TaskStatus::Blocked => self.claimed_by.is_some() || self.is_awaiting_review(),
            TaskStatus::Open | TaskStatus::Completed => false,
        }
    }

    fn is_claimed_by(&self, principal: &Principal) -> bool {
        self.claimed_by.as_ref() == Some(principal.identity())
    }

    fn ensure_may_override_claim(
        &self,
        principal: &Principal,
        action: &'static str,
    ) -> Result<(), TaskDomainError> {
        let foreign_claim = self
            .claimed_by
            .as_ref()
            .is_some_and(|claimant| claimant != principal.identity());
        if foreign_claim && principal.kind() == PrincipalKind::Agent {
            return Err(self.not_authorized(principal, action));
        }
        Ok(())
    }

    fn release(&mut self, reason: ReleaseReason, layout: &ColumnLayout) -> Vec<TaskEvent> {
        let column = self
            .pre_claim_column
            .take()
            .unwrap_or_else(|| layout.todo().clone());
        let mut events = self.move_to(TaskStatus::Open, column);
        if let Some(claimant) = self.claimed_by.take() {
            events.push(TaskEvent::Released { claimant, reason });
        }
        self.claimed_at = None;
        self.claim_expires_at = None;
        events
    }

    fn clear_claim(&mut self) {
        self.claimed_by = None;
        self.claimed_at = None;
        self.claim_expires_at = None;
        self.pre_claim_column = None;
    }

    fn move_to(&mut self, status: TaskStatus, column: ColumnId) -> Vec<TaskEvent> {
        let from = self.placement();
        self.status = status;
        self.column = column;
        let to = self.placement();
        if from == to {
            return Vec::new();
        }
        vec![TaskEvent::Moved { from, to }]
    }

    fn invalid_status(&self, action: &'static str) -> TaskDomainError {
        TaskDomainError::InvalidStatus {
            task_id: self.id,
            status: self.status,
            action,
        }
    }

    fn not_authorized(&self, principal: &Principal, action: &'static str) -> TaskDomainError {
        TaskDomainError::NotAuthorized {
            task_id: self.id,
            principal: principal.identity().clone(),
            action,
        }
    }
}

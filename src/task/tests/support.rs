//! Builders shared by the task unit tests.

use crate::config::EngineConfig;
use crate::task::{
    adapters::memory::InMemoryTaskRepository,
    domain::{
        BoardId, CapabilitySet, ColumnLayout, NewTask, PersistedTaskData, Principal, PrincipalId,
        Priority, Task, TaskId, TaskIdentifier, TaskKind,
    },
    services::{ClaimCoordinator, DependencyService, TaskLifecycleService},
};
use chrono::{DateTime, Local, TimeDelta, Utc};
use mockable::{Clock, DefaultClock};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

pub(super) fn board(name: &str) -> BoardId {
    BoardId::new(name).expect("valid board id")
}

pub(super) fn capabilities(tags: &[&str]) -> CapabilitySet {
    CapabilitySet::new(tags.iter().copied()).expect("valid capability tags")
}

pub(super) fn agent(name: &str, tags: &[&str]) -> Principal {
    Principal::agent(
        PrincipalId::new(name).expect("valid principal id"),
        capabilities(tags),
    )
}

pub(super) fn human(name: &str) -> Principal {
    Principal::human(
        PrincipalId::new(name).expect("valid principal id"),
        CapabilitySet::empty(),
    )
}

pub(super) fn passing_hook() -> Value {
    json!({"exit_code": 0, "output": "ok", "duration_ms": 25})
}

pub(super) fn failing_hook() -> Value {
    json!({"exit_code": 1, "output": "tests failed", "duration_ms": 900})
}

pub(super) fn new_task(kind: TaskKind, title: &str) -> NewTask {
    NewTask {
        board_id: board("core"),
        kind,
        title: title.to_owned(),
        description: None,
        priority: Priority::Medium,
        complexity: None,
        needs_review: false,
        required_capabilities: CapabilitySet::empty(),
        dependencies: BTreeSet::new(),
        parent_goal_id: None,
        column: ColumnLayout::default().todo().clone(),
    }
}

pub(super) fn create(new: NewTask, number: u64) -> Task {
    let identifier = TaskIdentifier::new(new.kind, number).expect("valid identifier");
    Task::create(new, identifier, &DefaultClock).expect("valid task")
}

pub(super) fn work(number: u64) -> Task {
    create(new_task(TaskKind::Work, "Implement the parser"), number)
}

/// Copies every field of `task` so tests can rebuild it with adjusted state.
pub(super) fn persisted(task: &Task) -> PersistedTaskData {
    PersistedTaskData {
        id: task.id(),
        identifier: task.identifier(),
        board_id: task.board_id().clone(),
        kind: task.kind(),
        title: task.title().to_owned(),
        description: task.description().map(str::to_owned),
        status: task.status(),
        column: task.column().clone(),
        pre_claim_column: task.pre_claim_column().cloned(),
        priority: task.priority(),
        complexity: task.complexity(),
        needs_review: task.needs_review(),
        required_capabilities: task.required_capabilities().clone(),
        dependencies: task.dependencies().clone(),
        parent_goal_id: task.parent_goal_id(),
        claimed_by: task.claimed_by().cloned(),
        claimed_at: task.claimed_at(),
        claim_expires_at: task.claim_expires_at(),
        review_status: task.review_status(),
        review_notes: task.review_notes().map(str::to_owned),
        reviewed_by: task.reviewed_by().cloned(),
        completed_at: task.completed_at(),
        completed_by: task.completed_by().cloned(),
        completion_notes: task.completion_notes().map(str::to_owned),
        time_spent_minutes: task.time_spent_minutes(),
        blocked_reason: task.blocked_reason().map(str::to_owned),
        version: task.version(),
        created_at: task.created_at(),
        updated_at: task.updated_at(),
    }
}

pub(super) fn created_at(task: &Task, at: DateTime<Utc>) -> Task {
    Task::from_persisted(PersistedTaskData {
        created_at: at,
        ..persisted(task)
    })
}

pub(super) fn ids(tasks: &[&Task]) -> Vec<TaskId> {
    tasks.iter().map(|task| task.id()).collect()
}

/// Clock that only moves when a test advances it.
pub(super) struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub(super) fn new() -> Self {
        Self {
            now: Mutex::new(Utc::now()),
        }
    }

    pub(super) fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock().expect("clock lock");
        *now += by;
    }
}

impl Clock for ManualClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock")
    }
}

/// Services sharing one in-memory store and one clock.
pub(super) struct Engine<C: Clock + Send + Sync = DefaultClock> {
    pub(super) repository: Arc<InMemoryTaskRepository>,
    pub(super) claims: ClaimCoordinator<InMemoryTaskRepository, C>,
    pub(super) lifecycle: TaskLifecycleService<InMemoryTaskRepository, C>,
    pub(super) dependencies: DependencyService<InMemoryTaskRepository, C>,
}

impl Engine {
    pub(super) fn new() -> Self {
        Self::with_clock(EngineConfig::default(), Arc::new(DefaultClock))
    }
}

impl<C: Clock + Send + Sync> Engine<C> {
    pub(super) fn with_clock(config: EngineConfig, clock: Arc<C>) -> Self {
        let repository = Arc::new(InMemoryTaskRepository::new());
        let shared = Arc::new(config);
        Self {
            claims: ClaimCoordinator::new(
                Arc::clone(&repository),
                Arc::clone(&clock),
                Arc::clone(&shared),
            ),
            lifecycle: TaskLifecycleService::new(
                Arc::clone(&repository),
                Arc::clone(&clock),
                Arc::clone(&shared),
            ),
            dependencies: DependencyService::new(Arc::clone(&repository), clock, shared),
            repository,
        }
    }
}

//! Shared builders for in-memory integration tests.

use std::collections::BTreeSet;

use foreman::task::domain::{
    BoardId, CapabilitySet, ColumnLayout, NewTask, Principal, PrincipalId, Priority, Task,
    TaskEvent, TaskHistoryEntry, TaskIdentifier, TaskKind,
};
use mockable::DefaultClock;
use serde_json::{Value, json};

/// Builds an unsaved task with the given kind and sequence number.
pub fn task(kind: TaskKind, number: u64, board: &str) -> Result<Task, eyre::Report> {
    let new_task = NewTask {
        board_id: BoardId::new(board)?,
        kind,
        title: format!("Task {number}"),
        description: None,
        priority: Priority::Medium,
        complexity: None,
        needs_review: false,
        required_capabilities: CapabilitySet::empty(),
        dependencies: BTreeSet::new(),
        parent_goal_id: None,
        column: ColumnLayout::default().todo().clone(),
    };
    Ok(Task::create(
        new_task,
        TaskIdentifier::new(kind, number)?,
        &DefaultClock,
    )?)
}

/// History recording the creation of `task`.
pub fn created(task: &Task) -> Vec<TaskHistoryEntry> {
    TaskHistoryEntry::record(
        task,
        None,
        vec![TaskEvent::Created {
            placement: task.placement(),
        }],
    )
}

/// Agent principal without capabilities.
pub fn agent(name: &str) -> Result<Principal, eyre::Report> {
    Ok(Principal::agent(PrincipalId::new(name)?, CapabilitySet::empty()))
}

/// Human principal without capabilities.
pub fn human(name: &str) -> Result<Principal, eyre::Report> {
    Ok(Principal::human(PrincipalId::new(name)?, CapabilitySet::empty()))
}

/// Successful hook report.
pub fn passing_hook() -> Value {
    json!({"exit_code": 0, "output": "ok", "duration_ms": 5})
}

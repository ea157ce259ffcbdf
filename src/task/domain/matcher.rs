//! Capability matching and next-task selection.

use super::{CapabilitySet, Principal, Task, TaskId, TaskKind, TaskStatus, graph};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Returns the capabilities `task` requires that `capabilities` lacks.
///
/// Tasks without requirements are satisfied by any set, including an empty
/// one.
#[must_use]
pub fn missing_capabilities(task: &Task, capabilities: &CapabilitySet) -> Vec<String> {
    task.required_capabilities().missing_from(capabilities)
}

/// Returns whether `capabilities` covers everything `task` requires.
#[must_use]
pub fn is_eligible(task: &Task, capabilities: &CapabilitySet) -> bool {
    missing_capabilities(task, capabilities).is_empty()
}

/// Picks the best claimable task for `principal`.
///
/// Candidates are kept when they are open, unclaimed, not goals, within the
/// principal's board scope, covered by its capabilities, and have every
/// dependency completed according to `statuses`. The survivors are ranked by
/// priority (highest first), then creation time (oldest first), then
/// identifier (lowest first).
#[must_use]
pub fn select_next<'a, I>(
    candidates: I,
    principal: &Principal,
    statuses: &BTreeMap<TaskId, TaskStatus>,
) -> Option<&'a Task>
where
    I: IntoIterator<Item = &'a Task>,
{
    candidates
        .into_iter()
        .filter(|task| is_candidate(task, principal, statuses))
        .min_by(|left, right| rank(left, right))
}

fn is_candidate(
    task: &Task,
    principal: &Principal,
    statuses: &BTreeMap<TaskId, TaskStatus>,
) -> bool {
    task.kind() != TaskKind::Goal
        && task.status() == TaskStatus::Open
        && task.claimed_by().is_none()
        && principal.can_access(task.board_id())
        && is_eligible(task, principal.capabilities())
        && graph::unresolved_dependencies(task, statuses).is_empty()
}

fn rank(left: &Task, right: &Task) -> Ordering {
    right
        .priority()
        .cmp(&left.priority())
        .then_with(|| left.created_at().cmp(&right.created_at()))
        .then_with(|| left.identifier().cmp(&right.identifier()))
}

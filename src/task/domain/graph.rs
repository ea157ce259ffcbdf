//! Dependency graph snapshot, cycle prevention and readiness evaluation.
//!
//! Edges point from a task to the tasks it depends on. The snapshot carries
//! the store-wide revision it was read at so that edge insertion can be
//! committed with a compare-and-set on that revision: two concurrent inserts
//! that would only form a cycle together cannot both commit.

use super::{Task, TaskDomainError, TaskId, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

/// Store-wide revision of the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphRevision(u64);

impl GraphRevision {
    /// Creates a revision from its stored value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the stored value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Returns the revision that follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for GraphRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Point-in-time view of every dependency edge in the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencySnapshot {
    revision: GraphRevision,
    edges: BTreeMap<TaskId, BTreeSet<TaskId>>,
}

impl DependencySnapshot {
    /// Creates a snapshot from an adjacency map.
    #[must_use]
    pub const fn new(revision: GraphRevision, edges: BTreeMap<TaskId, BTreeSet<TaskId>>) -> Self {
        Self { revision, edges }
    }

    /// Builds a snapshot from task records.
    #[must_use]
    pub fn from_tasks<'a, I>(revision: GraphRevision, tasks: I) -> Self
    where
        I: IntoIterator<Item = &'a Task>,
    {
        let edges = tasks
            .into_iter()
            .filter(|task| !task.dependencies().is_empty())
            .map(|task| (task.id(), task.dependencies().clone()))
            .collect();
        Self { revision, edges }
    }

    /// Returns the revision the snapshot was read at.
    #[must_use]
    pub const fn revision(&self) -> GraphRevision {
        self.revision
    }

    /// Returns the direct dependencies of `task`.
    pub fn dependencies_of(&self, task: TaskId) -> impl Iterator<Item = TaskId> + '_ {
        self.edges.get(&task).into_iter().flatten().copied()
    }

    /// Returns every task that directly depends on `task`.
    #[must_use]
    pub fn dependents_of(&self, task: TaskId) -> Vec<TaskId> {
        self.edges
            .iter()
            .filter(|(_, dependencies)| dependencies.contains(&task))
            .map(|(dependent, _)| *dependent)
            .collect()
    }

    /// Finds a dependency path from `from` to `to`, inclusive of both ends.
    #[must_use]
    pub fn path_between(&self, from: TaskId, to: TaskId) -> Option<Vec<TaskId>> {
        let mut predecessors: BTreeMap<TaskId, TaskId> = BTreeMap::new();
        let mut visited = BTreeSet::from([from]);
        let mut queue = VecDeque::from([from]);

        while let Some(current) = queue.pop_front() {
            if current == to {
                return Some(unwind(&predecessors, from, to));
            }
            for next in self.dependencies_of(current) {
                if visited.insert(next) {
                    predecessors.insert(next, current);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    /// Rejects an edge `task -> depends_on` that would close a cycle.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::CycleDetected`] carrying the existing path
    /// from `depends_on` back to `task`. A self-edge reports a one-element
    /// path.
    pub fn ensure_acyclic(&self, task: TaskId, depends_on: TaskId) -> Result<(), TaskDomainError> {
        let Some(path) = self.path_between(depends_on, task) else {
            return Ok(());
        };
        Err(TaskDomainError::CycleDetected {
            task_id: task,
            depends_on,
            path,
        })
    }
}

fn unwind(predecessors: &BTreeMap<TaskId, TaskId>, from: TaskId, to: TaskId) -> Vec<TaskId> {
    let mut path = vec![to];
    let mut cursor = to;
    while cursor != from {
        let Some(previous) = predecessors.get(&cursor) else {
            break;
        };
        path.push(*previous);
        cursor = *previous;
    }
    path.reverse();
    path
}

/// Returns the dependencies of `task` that are not `completed`.
///
/// Dependencies absent from `statuses` count as unresolved.
#[must_use]
pub fn unresolved_dependencies(task: &Task, statuses: &BTreeMap<TaskId, TaskStatus>) -> Vec<TaskId> {
    task.dependencies()
        .iter()
        .filter(|dependency| statuses.get(dependency) != Some(&TaskStatus::Completed))
        .copied()
        .collect()
}

/// Returns whether `task` is open and every dependency is completed.
///
/// Readiness is derived on demand and never persisted.
#[must_use]
pub fn is_ready(task: &Task, statuses: &BTreeMap<TaskId, TaskStatus>) -> bool {
    task.status() == TaskStatus::Open && unresolved_dependencies(task, statuses).is_empty()
}

//! Column placement derived from task status.

use super::{ColumnId, TaskDomainError, TaskStatus};
use serde::{Deserialize, Serialize};

/// Board columns each lifecycle status maps onto.
///
/// Column identifiers belong to board management; the engine only moves
/// tasks between them as a side effect of status changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnLayout {
    todo: ColumnId,
    doing: ColumnId,
    review: ColumnId,
    done: ColumnId,
    blocked: ColumnId,
}

impl ColumnLayout {
    /// Creates a layout from explicit column identifiers.
    #[must_use]
    pub const fn new(
        todo: ColumnId,
        doing: ColumnId,
        review: ColumnId,
        done: ColumnId,
        blocked: ColumnId,
    ) -> Self {
        Self {
            todo,
            doing,
            review,
            done,
            blocked,
        }
    }

    /// Creates a layout from raw column names.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyColumnId`] when any name is blank.
    pub fn from_names(
        todo: &str,
        doing: &str,
        review: &str,
        done: &str,
        blocked: &str,
    ) -> Result<Self, TaskDomainError> {
        Ok(Self::new(
            ColumnId::new(todo)?,
            ColumnId::new(doing)?,
            ColumnId::new(review)?,
            ColumnId::new(done)?,
            ColumnId::new(blocked)?,
        ))
    }

    /// Returns the column a task with `status` belongs in.
    #[must_use]
    pub const fn column_for(&self, status: TaskStatus) -> &ColumnId {
        match status {
            TaskStatus::Open => &self.todo,
            TaskStatus::InProgress => &self.doing,
            TaskStatus::Review => &self.review,
            TaskStatus::Completed => &self.done,
            TaskStatus::Blocked => &self.blocked,
        }
    }

    /// Returns the default column for newly created tasks.
    #[must_use]
    pub const fn todo(&self) -> &ColumnId {
        &self.todo
    }
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self {
            todo: ColumnId(String::from("todo")),
            doing: ColumnId(String::from("doing")),
            review: ColumnId(String::from("review")),
            done: ColumnId(String::from("done")),
            blocked: ColumnId(String::from("blocked")),
        }
    }
}

//! Diesel row models for task persistence.

use super::schema::{task_dependencies, task_history, tasks};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Query result row for task records.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TaskRow {
    /// Internal task identifier.
    pub id: uuid::Uuid,
    /// Identifier sequence number.
    pub identifier_number: i64,
    /// Task kind.
    pub kind: String,
    /// Owning board.
    pub board_id: String,
    /// Title.
    pub title: String,
    /// Description.
    pub description: Option<String>,
    /// Lifecycle status.
    pub status: String,
    /// Current column.
    pub column_id: String,
    /// Column to return to when a claim ends.
    pub pre_claim_column_id: Option<String>,
    /// Priority.
    pub priority: String,
    /// Complexity.
    pub complexity: Option<String>,
    /// Review flag.
    pub needs_review: bool,
    /// Capability tags as a JSON array.
    pub required_capabilities: Value,
    /// Parent goal.
    pub parent_goal_id: Option<uuid::Uuid>,
    /// Claimant.
    pub claimed_by: Option<String>,
    /// Claim timestamp.
    pub claimed_at: Option<DateTime<Utc>>,
    /// Claim expiry.
    pub claim_expires_at: Option<DateTime<Utc>>,
    /// Review status.
    pub review_status: Option<String>,
    /// Reviewer notes.
    pub review_notes: Option<String>,
    /// Reviewer.
    pub reviewed_by: Option<String>,
    /// Completion timestamp.
    pub completed_at: Option<DateTime<Utc>>,
    /// Completing principal.
    pub completed_by: Option<String>,
    /// Completion notes.
    pub completion_notes: Option<String>,
    /// Minutes spent.
    pub time_spent_minutes: Option<i32>,
    /// Block reason.
    pub blocked_reason: Option<String>,
    /// Optimistic concurrency version.
    pub version: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Insert model for task records.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = tasks)]
pub struct NewTaskRow {
    /// Internal task identifier.
    pub id: uuid::Uuid,
    /// Identifier sequence number.
    pub identifier_number: i64,
    /// Task kind.
    pub kind: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Owning board.
    pub board_id: String,
    /// Title.
    pub title: String,
    /// Description.
    pub description: Option<String>,
    /// Lifecycle status.
    pub status: String,
    /// Current column.
    pub column_id: String,
    /// Column to return to when a claim ends.
    pub pre_claim_column_id: Option<String>,
    /// Priority.
    pub priority: String,
    /// Complexity.
    pub complexity: Option<String>,
    /// Review flag.
    pub needs_review: bool,
    /// Capability tags as a JSON array.
    pub required_capabilities: Value,
    /// Parent goal.
    pub parent_goal_id: Option<uuid::Uuid>,
    /// Claimant.
    pub claimed_by: Option<String>,
    /// Claim timestamp.
    pub claimed_at: Option<DateTime<Utc>>,
    /// Claim expiry.
    pub claim_expires_at: Option<DateTime<Utc>>,
    /// Review status.
    pub review_status: Option<String>,
    /// Reviewer notes.
    pub review_notes: Option<String>,
    /// Reviewer.
    pub reviewed_by: Option<String>,
    /// Completion timestamp.
    pub completed_at: Option<DateTime<Utc>>,
    /// Completing principal.
    pub completed_by: Option<String>,
    /// Completion notes.
    pub completion_notes: Option<String>,
    /// Minutes spent.
    pub time_spent_minutes: Option<i32>,
    /// Block reason.
    pub blocked_reason: Option<String>,
    /// Version after the write.
    pub version: i64,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Mutable task columns written on every commit.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = tasks)]
#[diesel(treat_none_as_null = true)]
pub struct TaskChangeset {
    /// Owning board.
    pub board_id: String,
    /// Title.
    pub title: String,
    /// Description.
    pub description: Option<String>,
    /// Lifecycle status.
    pub status: String,
    /// Current column.
    pub column_id: String,
    /// Column to return to when a claim ends.
    pub pre_claim_column_id: Option<String>,
    /// Priority.
    pub priority: String,
    /// Complexity.
    pub complexity: Option<String>,
    /// Review flag.
    pub needs_review: bool,
    /// Capability tags as a JSON array.
    pub required_capabilities: Value,
    /// Parent goal.
    pub parent_goal_id: Option<uuid::Uuid>,
    /// Claimant.
    pub claimed_by: Option<String>,
    /// Claim timestamp.
    pub claimed_at: Option<DateTime<Utc>>,
    /// Claim expiry.
    pub claim_expires_at: Option<DateTime<Utc>>,
    /// Review status.
    pub review_status: Option<String>,
    /// Reviewer notes.
    pub review_notes: Option<String>,
    /// Reviewer.
    pub reviewed_by: Option<String>,
    /// Completion timestamp.
    pub completed_at: Option<DateTime<Utc>>,
    /// Completing principal.
    pub completed_by: Option<String>,
    /// Completion notes.
    pub completion_notes: Option<String>,
    /// Minutes spent.
    pub time_spent_minutes: Option<i32>,
    /// Block reason.
    pub blocked_reason: Option<String>,
    /// Version after the write.
    pub version: i64,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Dependency edge row.
#[derive(Debug, Clone, Copy, Queryable, Selectable, Insertable)]
#[diesel(table_name = task_dependencies)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DependencyRow {
    /// Dependent task.
    pub task_id: uuid::Uuid,
    /// Dependency.
    pub depends_on: uuid::Uuid,
}

/// Query result row for history entries.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = task_history)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct HistoryRow {
    /// Global commit order.
    pub position: i64,
    /// Task the event belongs to.
    pub task_id: uuid::Uuid,
    /// Commit timestamp.
    pub occurred_at: DateTime<Utc>,
    /// Responsible principal.
    pub actor: Option<String>,
    /// Serialised event.
    pub event: Value,
}

/// Insert model for history entries.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = task_history)]
pub struct NewHistoryRow {
    /// Task the event belongs to.
    pub task_id: uuid::Uuid,
    /// Commit timestamp.
    pub occurred_at: DateTime<Utc>,
    /// Responsible principal.
    pub actor: Option<String>,
    /// Serialised event.
    pub event: Value,
}

/// Result of `nextval` on the identifier sequence.
#[derive(Debug, Clone, Copy, QueryableByName)]
pub struct SequenceValue {
    /// Allocated value.
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub value: i64,
}

//! Diesel schema for task lifecycle persistence.

diesel::table! {
    /// Task records.
    tasks (id) {
        /// Internal task identifier.
        id -> Uuid,
        /// Number part of the human-readable identifier.
        identifier_number -> Int8,
        /// Task kind.
        #[max_length = 20]
        kind -> Varchar,
        /// Owning board.
        #[max_length = 255]
        board_id -> Varchar,
        /// Task title.
        title -> Text,
        /// Optional description.
        description -> Nullable<Text>,
        /// Lifecycle status.
        #[max_length = 50]
        status -> Varchar,
        /// Current board column.
        #[max_length = 255]
        column_id -> Varchar,
        /// Column to return to when a claim ends.
        #[max_length = 255]
        pre_claim_column_id -> Nullable<Varchar>,
        /// Scheduling priority.
        #[max_length = 20]
        priority -> Varchar,
        /// Optional complexity estimate.
        #[max_length = 20]
        complexity -> Nullable<Varchar>,
        /// Whether completion routes through review.
        needs_review -> Bool,
        /// Required capability tags as a JSON array.
        required_capabilities -> Jsonb,
        /// Weak reference to the parent goal.
        parent_goal_id -> Nullable<Uuid>,
        /// Current claimant.
        #[max_length = 255]
        claimed_by -> Nullable<Varchar>,
        /// Claim timestamp.
        claimed_at -> Nullable<Timestamptz>,
        /// Claim expiry.
        claim_expires_at -> Nullable<Timestamptz>,
        /// Review status.
        #[max_length = 50]
        review_status -> Nullable<Varchar>,
        /// Reviewer notes.
        review_notes -> Nullable<Text>,
        /// Last reviewer.
        #[max_length = 255]
        reviewed_by -> Nullable<Varchar>,
        /// Completion timestamp.
        completed_at -> Nullable<Timestamptz>,
        /// Completing principal.
        #[max_length = 255]
        completed_by -> Nullable<Varchar>,
        /// Completion notes.
        completion_notes -> Nullable<Text>,
        /// Reported minutes spent.
        time_spent_minutes -> Nullable<Int4>,
        /// Block reason.
        blocked_reason -> Nullable<Text>,
        /// Optimistic concurrency version.
        version -> Int8,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Dependency edges from a task to the tasks it depends on.
    task_dependencies (task_id, depends_on) {
        /// Dependent task.
        task_id -> Uuid,
        /// Dependency.
        depends_on -> Uuid,
    }
}

diesel::table! {
    /// Append-only task history.
    task_history (position) {
        /// Global commit order.
        position -> Int8,
        /// Task the event belongs to.
        task_id -> Uuid,
        /// Commit timestamp.
        occurred_at -> Timestamptz,
        /// Responsible principal.
        #[max_length = 255]
        actor -> Nullable<Varchar>,
        /// Serialised event payload.
        event -> Jsonb,
    }
}

diesel::table! {
    /// Single-row store-wide dependency graph revision.
    dependency_graph_revision (id) {
        /// Fixed row key.
        id -> Int2,
        /// Current revision.
        revision -> Int8,
    }
}

diesel::joinable!(task_history -> tasks (task_id));
diesel::allow_tables_to_appear_in_same_query!(
    tasks,
    task_dependencies,
    task_history,
    dependency_graph_revision,
);

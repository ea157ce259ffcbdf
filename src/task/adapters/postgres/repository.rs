//! `PostgreSQL` repository implementation for task lifecycle storage.

use super::{
    models::{
        DependencyRow, HistoryRow, NewHistoryRow, NewTaskRow, SequenceValue, TaskChangeset,
        TaskRow,
    },
    schema::{dependency_graph_revision, task_dependencies, task_history, tasks},
};
use crate::task::{
    domain::{
        BoardId, CapabilitySet, ColumnId, Complexity, DependencySnapshot, GraphRevision,
        PersistedTaskData, Priority, PrincipalId, ReviewStatus, Task, TaskHistoryEntry, TaskId,
        TaskIdentifier, TaskKind, TaskStatus,
    },
    ports::{TaskQuery, TaskRepository, TaskRepositoryError, TaskRepositoryResult},
};
use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorInformation, DatabaseErrorKind, Error as DieselError};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// `PostgreSQL` connection pool type used by task adapters.
pub type TaskPgPool = Pool<ConnectionManager<PgConnection>>;

const GRAPH_REVISION_ROW: i16 = 1;
const IDENTIFIER_UNIQUE_CONSTRAINT: &str = "tasks_identifier_number_unique";

/// `PostgreSQL`-backed task repository.
#[derive(Debug, Clone)]
pub struct PostgresTaskRepository {
    pool: TaskPgPool,
}

impl PostgresTaskRepository {
    /// Creates a new repository from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: TaskPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> TaskRepositoryResult<T>
    where
        F: FnOnce(&mut PgConnection) -> TaskRepositoryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(TaskRepositoryError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(TaskRepositoryError::persistence)?
    }
}

impl From<DieselError> for TaskRepositoryError {
    fn from(err: DieselError) -> Self {
        Self::persistence(err)
    }
}

/// Owned write payload moved onto the blocking pool.
struct TaskWrite {
    task_id: Uuid,
    expected_version: i64,
    graph_revision: Option<GraphRevision>,
    changes: TaskChangeset,
    edges: Vec<DependencyRow>,
    history: Vec<NewHistoryRow>,
}

impl TaskWrite {
    fn prepare(
        task: &Task,
        graph_revision: Option<GraphRevision>,
        history: &[TaskHistoryEntry],
    ) -> TaskRepositoryResult<(Self, Task)> {
        let mut stored = task.clone();
        stored.advance_version();
        let task_id = task.id().into_inner();
        let write = Self {
            task_id,
            expected_version: to_i64(task.version())?,
            graph_revision,
            changes: to_changeset(&stored)?,
            edges: task
                .dependencies()
                .iter()
                .map(|dependency| DependencyRow {
                    task_id,
                    depends_on: dependency.into_inner(),
                })
                .collect(),
            history: to_history_rows(history)?,
        };
        Ok((write, stored))
    }
}

#[async_trait]
impl TaskRepository for PostgresTaskRepository {
    async fn next_identifier_number(&self) -> TaskRepositoryResult<u64> {
        self.run_blocking(|connection| {
            let allocated = diesel::sql_query("SELECT nextval('task_identifier_seq') AS value")
                .get_result::<SequenceValue>(connection)?;
            u64::try_from(allocated.value).map_err(TaskRepositoryError::persistence)
        })
        .await
    }

    async fn store(
        &self,
        task: &Task,
        graph_revision: Option<GraphRevision>,
        history: &[TaskHistoryEntry],
    ) -> TaskRepositoryResult<Task> {
        let task_id = task.id();
        let identifier = task.identifier();
        let (write, stored) = TaskWrite::prepare(task, graph_revision, history)?;
        let new_row = to_new_row(&stored)?;

        self.run_blocking(move |connection| {
            connection.transaction::<_, TaskRepositoryError, _>(|tx| {
                if let Some(expected) = write.graph_revision {
                    advance_graph_revision(tx, expected)?;
                }
                diesel::insert_into(tasks::table)
                    .values(&new_row)
                    .execute(tx)
                    .map_err(|err| match err {
                        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info)
                            if is_identifier_unique_violation(info.as_ref()) =>
                        {
                            TaskRepositoryError::DuplicateIdentifier(identifier)
                        }
                        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                            TaskRepositoryError::DuplicateTask(task_id)
                        }
                        _ => TaskRepositoryError::persistence(err),
                    })?;
                insert_edges(tx, &write.edges)?;
                insert_history(tx, &write.history)?;
                Ok(())
            })
        })
        .await?;
        Ok(stored)
    }

    async fn commit(
        &self,
        task: &Task,
        graph_revision: Option<GraphRevision>,
        history: &[TaskHistoryEntry],
    ) -> TaskRepositoryResult<Task> {
        let domain_id = task.id();
        let expected = task.version();
        let (write, stored) = TaskWrite::prepare(task, graph_revision, history)?;

        self.run_blocking(move |connection| {
            connection.transaction::<_, TaskRepositoryError, _>(|tx| {
                if let Some(revision) = write.graph_revision {
                    advance_graph_revision(tx, revision)?;
                }
                let updated = diesel::update(
                    tasks::table
                        .filter(tasks::id.eq(write.task_id))
                        .filter(tasks::version.eq(write.expected_version)),
                )
                .set(&write.changes)
                .execute(tx)?;
                if updated == 0 {
                    return Err(missing_or_conflict(tx, domain_id, expected)?);
                }
                if write.graph_revision.is_some() {
                    diesel::delete(
                        task_dependencies::table
                            .filter(task_dependencies::task_id.eq(write.task_id)),
                    )
                    .execute(tx)?;
                    insert_edges(tx, &write.edges)?;
                }
                insert_history(tx, &write.history)?;
                Ok(())
            })
        })
        .await?;
        Ok(stored)
    }

    async fn delete(
        &self,
        task_id: TaskId,
        expected_version: u64,
        graph_revision: GraphRevision,
    ) -> TaskRepositoryResult<()> {
        let expected = to_i64(expected_version)?;
        self.run_blocking(move |connection| {
            connection.transaction::<_, TaskRepositoryError, _>(|tx| {
                advance_graph_revision(tx, graph_revision)?;
                let deleted = diesel::delete(
                    tasks::table
                        .filter(tasks::id.eq(task_id.into_inner()))
                        .filter(tasks::version.eq(expected)),
                )
                .execute(tx)?;
                if deleted == 0 {
                    return Err(missing_or_conflict(tx, task_id, expected_version)?);
                }
                Ok(())
            })
        })
        .await
    }

    async fn find_by_id(&self, id: TaskId) -> TaskRepositoryResult<Option<Task>> {
        self.run_blocking(move |connection| {
            let rows = tasks::table
                .filter(tasks::id.eq(id.into_inner()))
                .select(TaskRow::as_select())
                .load::<TaskRow>(connection)?;
            Ok(load_tasks(connection, rows)?.into_iter().next())
        })
        .await
    }

    async fn find_by_identifier(
        &self,
        identifier: TaskIdentifier,
    ) -> TaskRepositoryResult<Option<Task>> {
        let number = to_i64(identifier.number())?;
        let kind = identifier.kind().as_str();
        self.run_blocking(move |connection| {
            let rows = tasks::table
                .filter(tasks::identifier_number.eq(number))
                .filter(tasks::kind.eq(kind))
                .select(TaskRow::as_select())
                .load::<TaskRow>(connection)?;
            Ok(load_tasks(connection, rows)?.into_iter().next())
        })
        .await
    }

    async fn find_many(&self, ids: &[TaskId]) -> TaskRepositoryResult<Vec<Task>> {
        let lookup: Vec<Uuid> = ids.iter().copied().map(TaskId::into_inner).collect();
        self.run_blocking(move |connection| {
            let rows = tasks::table
                .filter(tasks::id.eq_any(&lookup))
                .order(tasks::identifier_number.asc())
                .select(TaskRow::as_select())
                .load::<TaskRow>(connection)?;
            load_tasks(connection, rows)
        })
        .await
    }

    async fn list(&self, query: &TaskQuery) -> TaskRepositoryResult<Vec<Task>> {
        let statuses: Vec<&'static str> = query
            .statuses()
            .iter()
            .map(|status| status.as_str())
            .collect();
        let board = query.board_id().map(|board| board.as_str().to_owned());
        self.run_blocking(move |connection| {
            let mut select = tasks::table
                .order(tasks::identifier_number.asc())
                .select(TaskRow::as_select())
                .into_boxed();
            if !statuses.is_empty() {
                select = select.filter(tasks::status.eq_any(statuses));
            }
            if let Some(board_id) = board {
                select = select.filter(tasks::board_id.eq(board_id));
            }
            let rows = select.load::<TaskRow>(connection)?;
            load_tasks(connection, rows)
        })
        .await
    }

    async fn find_dependents(&self, task_id: TaskId) -> TaskRepositoryResult<Vec<Task>> {
        self.run_blocking(move |connection| {
            let dependents = task_dependencies::table
                .filter(task_dependencies::depends_on.eq(task_id.into_inner()))
                .select(task_dependencies::task_id);
            let rows = tasks::table
                .filter(tasks::id.eq_any(dependents))
                .order(tasks::identifier_number.asc())
                .select(TaskRow::as_select())
                .load::<TaskRow>(connection)?;
            load_tasks(connection, rows)
        })
        .await
    }

    async fn find_children(&self, goal_id: TaskId) -> TaskRepositoryResult<Vec<Task>> {
        self.run_blocking(move |connection| {
            let rows = tasks::table
                .filter(tasks::parent_goal_id.eq(goal_id.into_inner()))
                .order(tasks::identifier_number.asc())
                .select(TaskRow::as_select())
                .load::<TaskRow>(connection)?;
            load_tasks(connection, rows)
        })
        .await
    }

    async fn dependency_graph(&self) -> TaskRepositoryResult<DependencySnapshot> {
        self.run_blocking(|connection| {
            connection
                .build_transaction()
                .repeatable_read()
                .read_only()
                .run::<_, TaskRepositoryError, _>(|tx| {
                    let revision = dependency_graph_revision::table
                        .filter(dependency_graph_revision::id.eq(GRAPH_REVISION_ROW))
                        .select(dependency_graph_revision::revision)
                        .first::<i64>(tx)?;
                    let rows = task_dependencies::table
                        .select(DependencyRow::as_select())
                        .load::<DependencyRow>(tx)?;
                    let revision_value =
                        u64::try_from(revision).map_err(TaskRepositoryError::persistence)?;
                    Ok(DependencySnapshot::new(
                        GraphRevision::new(revision_value),
                        group_edges(rows),
                    ))
                })
        })
        .await
    }

    async fn history(&self, task_id: TaskId) -> TaskRepositoryResult<Vec<TaskHistoryEntry>> {
        self.run_blocking(move |connection| {
            let rows = task_history::table
                .filter(task_history::task_id.eq(task_id.into_inner()))
                .order(task_history::position.asc())
                .select(HistoryRow::as_select())
                .load::<HistoryRow>(connection)?;
            rows.into_iter().map(row_to_history).collect()
        })
        .await
    }
}

fn advance_graph_revision(
    connection: &mut PgConnection,
    expected: GraphRevision,
) -> TaskRepositoryResult<()> {
    let expected_value = to_i64(expected.value())?;
    let updated = diesel::update(
        dependency_graph_revision::table
            .filter(dependency_graph_revision::id.eq(GRAPH_REVISION_ROW))
            .filter(dependency_graph_revision::revision.eq(expected_value)),
    )
    .set(dependency_graph_revision::revision.eq(dependency_graph_revision::revision + 1_i64))
    .execute(connection)?;
    if updated == 0 {
        return Err(TaskRepositoryError::GraphConflict { expected });
    }
    Ok(())
}

fn missing_or_conflict(
    connection: &mut PgConnection,
    task_id: TaskId,
    expected: u64,
) -> TaskRepositoryResult<TaskRepositoryError> {
    let exists = diesel::select(diesel::dsl::exists(
        tasks::table.filter(tasks::id.eq(task_id.into_inner())),
    ))
    .get_result::<bool>(connection)?;
    Ok(if exists {
        TaskRepositoryError::VersionConflict { task_id, expected }
    } else {
        TaskRepositoryError::NotFound(task_id)
    })
}

fn insert_edges(connection: &mut PgConnection, edges: &[DependencyRow]) -> TaskRepositoryResult<()> {
    if !edges.is_empty() {
        diesel::insert_into(task_dependencies::table)
            .values(edges)
            .execute(connection)?;
    }
    Ok(())
}

fn insert_history(
    connection: &mut PgConnection,
    history: &[NewHistoryRow],
) -> TaskRepositoryResult<()> {
    if !history.is_empty() {
        diesel::insert_into(task_history::table)
            .values(history)
            .execute(connection)?;
    }
    Ok(())
}

fn load_tasks(connection: &mut PgConnection, rows: Vec<TaskRow>) -> TaskRepositoryResult<Vec<Task>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
    let edge_rows = task_dependencies::table
        .filter(task_dependencies::task_id.eq_any(&ids))
        .select(DependencyRow::as_select())
        .load::<DependencyRow>(connection)?;
    let mut edges = group_edges(edge_rows);
    rows.into_iter()
        .map(|row| {
            let dependencies = edges.remove(&TaskId::from_uuid(row.id)).unwrap_or_default();
            row_to_task(row, dependencies)
        })
        .collect()
}

fn group_edges(rows: Vec<DependencyRow>) -> BTreeMap<TaskId, BTreeSet<TaskId>> {
    let mut edges: BTreeMap<TaskId, BTreeSet<TaskId>> = BTreeMap::new();
    for row in rows {
        edges
            .entry(TaskId::from_uuid(row.task_id))
            .or_default()
            .insert(TaskId::from_uuid(row.depends_on));
    }
    edges
}

fn is_identifier_unique_violation(info: &dyn DatabaseErrorInformation) -> bool {
    info.constraint_name()
        .is_some_and(|name| name == IDENTIFIER_UNIQUE_CONSTRAINT)
}

fn to_i64(value: u64) -> TaskRepositoryResult<i64> {
    i64::try_from(value).map_err(TaskRepositoryError::persistence)
}

fn to_changeset(task: &Task) -> TaskRepositoryResult<TaskChangeset> {
    let required_capabilities = serde_json::to_value(task.required_capabilities())
        .map_err(TaskRepositoryError::persistence)?;
    let time_spent_minutes = task
        .time_spent_minutes()
        .map(i32::try_from)
        .transpose()
        .map_err(TaskRepositoryError::persistence)?;

    Ok(TaskChangeset {
        board_id: task.board_id().as_str().to_owned(),
        title: task.title().to_owned(),
        description: task.description().map(ToOwned::to_owned),
        status: task.status().as_str().to_owned(),
        column_id: task.column().as_str().to_owned(),
        pre_claim_column_id: task.pre_claim_column().map(|column| column.as_str().to_owned()),
        priority: task.priority().as_str().to_owned(),
        complexity: task.complexity().map(|value| value.as_str().to_owned()),
        needs_review: task.needs_review(),
        required_capabilities,
        parent_goal_id: task.parent_goal_id().map(TaskId::into_inner),
        claimed_by: task.claimed_by().map(|id| id.as_str().to_owned()),
        claimed_at: task.claimed_at(),
        claim_expires_at: task.claim_expires_at(),
        review_status: task.review_status().map(|value| value.as_str().to_owned()),
        review_notes: task.review_notes().map(ToOwned::to_owned),
        reviewed_by: task.reviewed_by().map(|id| id.as_str().to_owned()),
        completed_at: task.completed_at(),
        completed_by: task.completed_by().map(|id| id.as_str().to_owned()),
        completion_notes: task.completion_notes().map(ToOwned::to_owned),
        time_spent_minutes,
        blocked_reason: task.blocked_reason().map(ToOwned::to_owned),
        version: to_i64(task.version())?,
        updated_at: task.updated_at(),
    })
}

fn to_new_row(task: &Task) -> TaskRepositoryResult<NewTaskRow> {
    let mut stored = task.clone();
    stored.advance_version();
    let changes = to_changeset(&stored)?;
    Ok(NewTaskRow {
        id: task.id().into_inner(),
        identifier_number: to_i64(task.identifier().number())?,
        kind: task.kind().as_str().to_owned(),
        created_at: task.created_at(),
        board_id: changes.board_id,
        title: changes.title,
        description: changes.description,
        status: changes.status,
        column_id: changes.column_id,
        pre_claim_column_id: changes.pre_claim_column_id,
        priority: changes.priority,
        complexity: changes.complexity,
        needs_review: changes.needs_review,
        required_capabilities: changes.required_capabilities,
        parent_goal_id: changes.parent_goal_id,
        claimed_by: changes.claimed_by,
        claimed_at: changes.claimed_at,
        claim_expires_at: changes.claim_expires_at,
        review_status: changes.review_status,
        review_notes: changes.review_notes,
        reviewed_by: changes.reviewed_by,
        completed_at: changes.completed_at,
        completed_by: changes.completed_by,
        completion_notes: changes.completion_notes,
        time_spent_minutes: changes.time_spent_minutes,
        blocked_reason: changes.blocked_reason,
        version: changes.version,
        updated_at: changes.updated_at,
    })
}

fn principal(value: Option<String>) -> TaskRepositoryResult<Option<PrincipalId>> {
    value
        .map(PrincipalId::new)
        .transpose()
        .map_err(TaskRepositoryError::persistence)
}

fn row_to_task(row: TaskRow, dependencies: BTreeSet<TaskId>) -> TaskRepositoryResult<Task> {
    let kind = TaskKind::try_from(row.kind.as_str()).map_err(TaskRepositoryError::persistence)?;
    let number =
        u64::try_from(row.identifier_number).map_err(TaskRepositoryError::persistence)?;
    let identifier =
        TaskIdentifier::new(kind, number).map_err(TaskRepositoryError::persistence)?;
    let required_capabilities = serde_json::from_value::<CapabilitySet>(row.required_capabilities)
        .map_err(TaskRepositoryError::persistence)?;

    let data = PersistedTaskData {
        id: TaskId::from_uuid(row.id),
        identifier,
        board_id: BoardId::new(row.board_id).map_err(TaskRepositoryError::persistence)?,
        kind,
        title: row.title,
        description: row.description,
        status: TaskStatus::try_from(row.status.as_str())
            .map_err(TaskRepositoryError::persistence)?,
        column: ColumnId::new(row.column_id).map_err(TaskRepositoryError::persistence)?,
        pre_claim_column: row
            .pre_claim_column_id
            .map(ColumnId::new)
            .transpose()
            .map_err(TaskRepositoryError::persistence)?,
        priority: Priority::try_from(row.priority.as_str())
            .map_err(TaskRepositoryError::persistence)?,
        complexity: row
            .complexity
            .as_deref()
            .map(Complexity::try_from)
            .transpose()
            .map_err(TaskRepositoryError::persistence)?,
        needs_review: row.needs_review,
        required_capabilities,
        dependencies,
        parent_goal_id: row.parent_goal_id.map(TaskId::from_uuid),
        claimed_by: principal(row.claimed_by)?,
        claimed_at: row.claimed_at,
        claim_expires_at: row.claim_expires_at,
        review_status: row
            .review_status
            .as_deref()
            .map(ReviewStatus::try_from)
            .transpose()
            .map_err(TaskRepositoryError::persistence)?,
        review_notes: row.review_notes,
        reviewed_by: principal(row.reviewed_by)?,
        completed_at: row.completed_at,
        completed_by: principal(row.completed_by)?,
        completion_notes: row.completion_notes,
        time_spent_minutes: row
            .time_spent_minutes
            .map(u32::try_from)
            .transpose()
            .map_err(TaskRepositoryError::persistence)?,
        blocked_reason: row.blocked_reason,
        version: u64::try_from(row.version).map_err(TaskRepositoryError::persistence)?,
        created_at: row.created_at,
        updated_at: row.updated_at,
    };
    Ok(Task::from_persisted(data))
}

fn to_history_rows(history: &[TaskHistoryEntry]) -> TaskRepositoryResult<Vec<NewHistoryRow>> {
    history
        .iter()
        .map(|entry| {
            Ok(NewHistoryRow {
                task_id: entry.task_id.into_inner(),
                occurred_at: entry.occurred_at,
                actor: entry.actor.as_ref().map(|id| id.as_str().to_owned()),
                event: serde_json::to_value(&entry.event)
                    .map_err(TaskRepositoryError::persistence)?,
            })
        })
        .collect()
}

fn row_to_history(row: HistoryRow) -> TaskRepositoryResult<TaskHistoryEntry> {
    Ok(TaskHistoryEntry {
        task_id: TaskId::from_uuid(row.task_id),
        occurred_at: row.occurred_at,
        actor: principal(row.actor)?,
        event: serde_json::from_value(row.event).map_err(TaskRepositoryError::persistence)?,
    })
}

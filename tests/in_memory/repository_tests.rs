//! Compare-and-set and lookup behaviour of the in-memory repository.

use super::helpers::{created, task};
use foreman::task::{
    adapters::memory::InMemoryTaskRepository,
    domain::{TaskKind, TaskStatus},
    ports::{TaskQuery, TaskRepository, TaskRepositoryError},
};
use rstest::{fixture, rstest};

#[fixture]
fn repository() -> InMemoryTaskRepository {
    InMemoryTaskRepository::new()
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn store_assigns_first_version_and_indexes_identifier(
    repository: InMemoryTaskRepository,
) -> Result<(), eyre::Report> {
    let draft = task(TaskKind::Work, 1, "core")?;

    let stored = repository.store(&draft, None, &created(&draft)).await?;

    eyre::ensure!(stored.version() == draft.version() + 1);
    let by_id = repository.find_by_id(draft.id()).await?;
    let by_identifier = repository.find_by_identifier(draft.identifier()).await?;
    eyre::ensure!(by_id.as_ref() == Some(&stored));
    eyre::ensure!(by_identifier.as_ref() == Some(&stored));
    eyre::ensure!(repository.history(draft.id()).await?.len() == 1);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn duplicate_identifier_is_rejected(
    repository: InMemoryTaskRepository,
) -> Result<(), eyre::Report> {
    let first = task(TaskKind::Work, 1, "core")?;
    let clash = task(TaskKind::Work, 1, "core")?;
    repository.store(&first, None, &created(&first)).await?;

    let result = repository.store(&clash, None, &created(&clash)).await;

    eyre::ensure!(matches!(
        result,
        Err(TaskRepositoryError::DuplicateIdentifier(identifier)) if identifier == first.identifier()
    ));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stale_version_loses_the_race(
    repository: InMemoryTaskRepository,
) -> Result<(), eyre::Report> {
    let draft = task(TaskKind::Work, 1, "core")?;
    let stored = repository.store(&draft, None, &created(&draft)).await?;
    repository.commit(&stored, None, &[]).await?;

    let result = repository.commit(&stored, None, &[]).await;

    let Err(err) = result else {
        eyre::bail!("stale commit should fail");
    };
    eyre::ensure!(err.is_conflict());
    eyre::ensure!(matches!(err, TaskRepositoryError::VersionConflict { expected, .. } if expected == stored.version()));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn graph_revision_guards_edge_writes(
    repository: InMemoryTaskRepository,
) -> Result<(), eyre::Report> {
    let first = task(TaskKind::Work, 1, "core")?;
    let second = task(TaskKind::Work, 2, "core")?;
    let stored_first = repository.store(&first, None, &created(&first)).await?;
    let stored_second = repository.store(&second, None, &created(&second)).await?;
    let revision = repository.dependency_graph().await?.revision();

    repository.commit(&stored_first, Some(revision), &[]).await?;
    let result = repository.commit(&stored_second, Some(revision), &[]).await;

    eyre::ensure!(matches!(result, Err(TaskRepositoryError::GraphConflict { .. })));
    eyre::ensure!(repository.dependency_graph().await?.revision() == revision.next());
    repository.commit(&stored_second, None, &[]).await?;
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn delete_removes_task_identifier_and_history(
    repository: InMemoryTaskRepository,
) -> Result<(), eyre::Report> {
    let draft = task(TaskKind::Defect, 3, "core")?;
    let stored = repository.store(&draft, None, &created(&draft)).await?;
    let revision = repository.dependency_graph().await?.revision();

    let stale = repository.delete(draft.id(), draft.version(), revision).await;
    eyre::ensure!(matches!(stale, Err(TaskRepositoryError::VersionConflict { .. })));

    repository.delete(draft.id(), stored.version(), revision).await?;
    eyre::ensure!(repository.find_by_id(draft.id()).await?.is_none());
    eyre::ensure!(repository.find_by_identifier(draft.identifier()).await?.is_none());
    eyre::ensure!(repository.history(draft.id()).await?.is_empty());
    let again = repository.delete(draft.id(), stored.version(), revision.next()).await;
    eyre::ensure!(matches!(again, Err(TaskRepositoryError::NotFound(_))));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn list_filters_by_status_and_board(
    repository: InMemoryTaskRepository,
) -> Result<(), eyre::Report> {
    let core = task(TaskKind::Work, 1, "core")?;
    let ops = task(TaskKind::Work, 2, "ops")?;
    for draft in [&core, &ops] {
        repository.store(draft, None, &created(draft)).await?;
    }
    let board = foreman::task::domain::BoardId::new("ops")?;

    let scoped = repository
        .list(&TaskQuery::all().with_statuses([TaskStatus::Open]).with_board(board))
        .await?;
    let closed = repository
        .list(&TaskQuery::all().with_statuses([TaskStatus::Completed]))
        .await?;
    let everything = repository.list(&TaskQuery::all()).await?;

    eyre::ensure!(scoped.iter().map(|found| found.id()).collect::<Vec<_>>() == vec![ops.id()]);
    eyre::ensure!(closed.is_empty());
    eyre::ensure!(
        everything.iter().map(|found| found.id()).collect::<Vec<_>>() == vec![core.id(), ops.id()],
        "listing is ordered by identifier"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn identifier_numbers_are_monotonic(
    repository: InMemoryTaskRepository,
) -> Result<(), eyre::Report> {
    let first = repository.next_identifier_number().await?;
    let second = repository.next_identifier_number().await?;

    eyre::ensure!((first, second) == (1, 2));
    Ok(())
}

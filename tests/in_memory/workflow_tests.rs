//! End-to-end task lifecycles through the services over the in-memory store.

use std::sync::Arc;

use super::helpers::{agent, human, passing_hook};
use foreman::config::EngineConfig;
use foreman::task::{
    adapters::memory::InMemoryTaskRepository,
    domain::{BoardId, ReviewDecision, TaskEvent, TaskKind, TaskStatus},
    services::{
        ClaimCoordinator, ClaimTaskRequest, CompleteTaskRequest, CreateTaskRequest,
        DependencyService, ReviewTaskRequest, TaskLifecycleService,
    },
};
use mockable::DefaultClock;
use rstest::{fixture, rstest};

struct Services {
    claims: ClaimCoordinator<InMemoryTaskRepository, DefaultClock>,
    lifecycle: TaskLifecycleService<InMemoryTaskRepository, DefaultClock>,
    dependencies: DependencyService<InMemoryTaskRepository, DefaultClock>,
}

#[fixture]
fn services() -> Services {
    let repository = Arc::new(InMemoryTaskRepository::new());
    let clock = Arc::new(DefaultClock);
    let config = Arc::new(EngineConfig::default());
    Services {
        claims: ClaimCoordinator::new(
            Arc::clone(&repository),
            Arc::clone(&clock),
            Arc::clone(&config),
        ),
        lifecycle: TaskLifecycleService::new(
            Arc::clone(&repository),
            Arc::clone(&clock),
            Arc::clone(&config),
        ),
        dependencies: DependencyService::new(repository, clock, config),
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn goal_completes_when_reviewed_chain_finishes(
    services: Services,
) -> Result<(), eyre::Report> {
    let board = BoardId::new("core")?;
    let goal = services
        .lifecycle
        .create_task(CreateTaskRequest::new(board.clone(), TaskKind::Goal, "Ship parser"))
        .await?;
    let lexer = services
        .lifecycle
        .create_task(
            CreateTaskRequest::new(board.clone(), TaskKind::Work, "Lexer")
                .with_parent_goal(goal.id())
                .with_review(),
        )
        .await?;
    let parser = services
        .lifecycle
        .create_task(
            CreateTaskRequest::new(board, TaskKind::Work, "Parser").with_parent_goal(goal.id()),
        )
        .await?;
    let planner = human("planner")?;
    services
        .dependencies
        .add_dependency(parser.id(), lexer.id(), &planner)
        .await?;
    let worker = agent("agent-1")?;

    let Some(first) = services.claims.get_next(&worker).await? else {
        eyre::bail!("lexer should be offered");
    };
    eyre::ensure!(first.id() == lexer.id());
    services
        .claims
        .claim(ClaimTaskRequest::new(lexer.id(), worker.clone()).with_before_doing(passing_hook()))
        .await?;
    services
        .lifecycle
        .complete(CompleteTaskRequest::new(lexer.id(), worker.clone()).with_after_doing(passing_hook()))
        .await?;
    eyre::ensure!(services.claims.get_next(&worker).await?.is_none());

    let approved = services
        .lifecycle
        .mark_reviewed(ReviewTaskRequest::new(lexer.id(), planner, ReviewDecision::Approved))
        .await?;
    eyre::ensure!(approved.ready_dependents.iter().any(|task| task.id() == parser.id()));

    services
        .claims
        .claim(ClaimTaskRequest::new(parser.id(), worker.clone()).with_before_doing(passing_hook()))
        .await?;
    services
        .lifecycle
        .complete(CompleteTaskRequest::new(parser.id(), worker).with_after_doing(passing_hook()))
        .await?;

    let progress = services.lifecycle.goal_progress(goal.id()).await?;
    eyre::ensure!(progress.is_complete());
    eyre::ensure!((progress.completed, progress.total) == (2, 2));
    let stored_goal = services.lifecycle.find_by_id(goal.id()).await?;
    eyre::ensure!(stored_goal.map(|task| task.status()) == Some(TaskStatus::Open));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn history_is_append_only_across_transitions(
    services: Services,
) -> Result<(), eyre::Report> {
    let task = services
        .lifecycle
        .create_task(CreateTaskRequest::new(BoardId::new("core")?, TaskKind::Defect, "Crash"))
        .await?;
    let worker = agent("agent-1")?;
    services
        .claims
        .claim(ClaimTaskRequest::new(task.id(), worker.clone()).with_before_doing(passing_hook()))
        .await?;
    let before = services.lifecycle.history(task.id()).await?;

    services.claims.unclaim(task.id(), &worker).await?;
    let after = services.lifecycle.history(task.id()).await?;

    eyre::ensure!(after.len() > before.len());
    eyre::ensure!(after.get(..before.len()) == Some(before.as_slice()));
    eyre::ensure!(after.iter().any(|entry| matches!(entry.event, TaskEvent::Released { .. })));
    eyre::ensure!(
        after
            .windows(2)
            .all(|pair| matches!(pair, [earlier, later] if earlier.occurred_at <= later.occurred_at)),
        "history must be in commit order"
    );
    Ok(())
}

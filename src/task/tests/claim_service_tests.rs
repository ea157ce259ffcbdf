//! Service tests for next-task selection, claiming and claim expiry.

use super::support::{
    Engine, ManualClock, agent, board, capabilities, failing_hook, human, passing_hook,
};
use crate::config::EngineConfig;
use crate::task::{
    domain::{
        ErrorKind, HookPoint, Priority, ReleaseReason, Task, TaskDomainError, TaskEvent, TaskKind,
        TaskStatus,
    },
    services::{ClaimTaskRequest, CreateTaskRequest, TaskLifecycleError},
};
use chrono::TimeDelta;
use eyre::{Result, bail, ensure};
use mockable::Clock;
use rstest::{fixture, rstest};
use std::sync::Arc;

#[fixture]
fn engine() -> Engine {
    Engine::new()
}

async fn add_work<C: Clock + Send + Sync>(
    engine: &Engine<C>,
    title: &str,
    priority: Priority,
) -> Result<Task> {
    let request = CreateTaskRequest::new(board("core"), TaskKind::Work, title).with_priority(priority);
    Ok(engine.lifecycle.create_task(request).await?)
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn get_next_returns_highest_priority_open_task(engine: Engine) -> Result<()> {
    add_work(&engine, "Low", Priority::Low).await?;
    let high = add_work(&engine, "High", Priority::High).await?;
    add_work(&engine, "Medium", Priority::Medium).await?;

    let next = engine.claims.get_next(&agent("agent-1", &[])).await?;

    ensure!(next.map(|task| task.id()) == Some(high.id()));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn get_next_skips_claimed_and_ineligible_tasks(engine: Engine) -> Result<()> {
    let claimed = add_work(&engine, "Taken", Priority::Critical).await?;
    let gated = CreateTaskRequest::new(board("core"), TaskKind::Work, "Needs go")
        .with_priority(Priority::High)
        .with_required_capabilities(capabilities(&["go"]));
    engine.lifecycle.create_task(gated).await?;
    let plain = add_work(&engine, "Plain", Priority::Low).await?;
    let rival = agent("agent-2", &[]);
    engine
        .claims
        .claim(ClaimTaskRequest::new(claimed.id(), rival).with_before_doing(passing_hook()))
        .await?;

    let next = engine.claims.get_next(&agent("agent-1", &["rust"])).await?;

    ensure!(next.map(|task| task.id()) == Some(plain.id()));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn get_next_respects_board_scope(engine: Engine) -> Result<()> {
    add_work(&engine, "Core work", Priority::Critical).await?;
    let scoped = agent("agent-1", &[]).with_board_scope(board("ops"));

    ensure!(engine.claims.get_next(&scoped).await?.is_none());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn get_next_is_empty_on_empty_store(engine: Engine) -> Result<()> {
    ensure!(engine.claims.get_next(&agent("agent-1", &[])).await?.is_none());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn claim_returns_later_hook_metadata(engine: Engine) -> Result<()> {
    let task = add_work(&engine, "Claim me", Priority::Medium).await?;
    let principal = agent("agent-1", &[]);

    let outcome = engine
        .claims
        .claim(ClaimTaskRequest::new(task.id(), principal.clone()).with_before_doing(passing_hook()))
        .await?;

    ensure!(outcome.task.status() == TaskStatus::InProgress);
    ensure!(outcome.task.claimed_by() == Some(principal.identity()));
    ensure!(outcome.task.version() > task.version());
    let hooks: Vec<HookPoint> = outcome.hooks.iter().map(|hook| hook.hook).collect();
    ensure!(
        hooks == [HookPoint::AfterDoing, HookPoint::BeforeReview, HookPoint::AfterReview],
        "unexpected hooks {hooks:?}"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_claims_have_a_single_winner(engine: Engine) -> Result<()> {
    let task = add_work(&engine, "Contended", Priority::High).await?;
    let claims = Arc::new(engine.claims.clone());

    let mut handles = Vec::new();
    for n in 0..8 {
        let coordinator = Arc::clone(&claims);
        let task_id = task.id();
        handles.push(tokio::spawn(async move {
            let principal = agent(&format!("agent-{n}"), &[]);
            coordinator
                .claim(ClaimTaskRequest::new(task_id, principal).with_before_doing(passing_hook()))
                .await
        }));
    }

    let mut winners = 0_usize;
    for handle in handles {
        match handle.await? {
            Ok(_) => winners += 1,
            Err(TaskLifecycleError::Domain(TaskDomainError::AlreadyClaimed { .. })) => {}
            Err(other) => bail!("unexpected claim error: {other}"),
        }
    }
    ensure!(winners == 1, "expected exactly one winner, got {winners}");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failing_before_doing_persists_nothing(engine: Engine) -> Result<()> {
    let task = add_work(&engine, "Gated", Priority::Medium).await?;

    let result = engine
        .claims
        .claim(ClaimTaskRequest::new(task.id(), agent("agent-1", &[])).with_before_doing(failing_hook()))
        .await;

    let Err(err) = result else {
        bail!("claim should fail");
    };
    ensure!(err.kind() == ErrorKind::HookFailed);
    let stored = engine.lifecycle.find_by_id(task.id()).await?;
    ensure!(stored == Some(task.clone()), "task must be unchanged");
    ensure!(engine.lifecycle.history(task.id()).await?.len() == 1);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn claim_of_missing_task_is_not_found(engine: Engine) -> Result<()> {
    let missing = crate::task::domain::TaskId::new();

    let result = engine
        .claims
        .claim(ClaimTaskRequest::new(missing, agent("agent-1", &[])).with_before_doing(passing_hook()))
        .await;

    ensure!(matches!(result, Err(TaskLifecycleError::NotFound(id)) if id == missing));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unclaim_reopens_task_for_others(engine: Engine) -> Result<()> {
    let task = add_work(&engine, "Hand back", Priority::Medium).await?;
    let first = agent("agent-1", &[]);
    engine
        .claims
        .claim(ClaimTaskRequest::new(task.id(), first.clone()).with_before_doing(passing_hook()))
        .await?;

    let released = engine.claims.unclaim(task.id(), &first).await?;

    ensure!(released.status() == TaskStatus::Open);
    ensure!(released.claimed_by().is_none());
    let second = agent("agent-2", &[]);
    let next = engine.claims.get_next(&second).await?;
    ensure!(next.map(|found| found.id()) == Some(task.id()));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn humans_cannot_unclaim_for_agents(engine: Engine) -> Result<()> {
    let task = add_work(&engine, "Mine", Priority::Medium).await?;
    engine
        .claims
        .claim(ClaimTaskRequest::new(task.id(), agent("agent-1", &[])).with_before_doing(passing_hook()))
        .await?;

    let result = engine.claims.unclaim(task.id(), &human("operator")).await;

    ensure!(matches!(result, Err(ref err) if err.kind() == ErrorKind::NotAuthorized));
    Ok(())
}

fn stepped_engine() -> (Engine<ManualClock>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    (
        Engine::with_clock(EngineConfig::default(), Arc::clone(&clock)),
        clock,
    )
}

fn past_expiry() -> TimeDelta {
    EngineConfig::default().claim_ttl() + TimeDelta::seconds(1)
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn expired_claim_is_released_on_next_read() -> Result<()> {
    let (engine, clock) = stepped_engine();
    let task = add_work(&engine, "Abandoned", Priority::Medium).await?;
    let stale = agent("agent-1", &[]);
    engine
        .claims
        .claim(ClaimTaskRequest::new(task.id(), stale.clone()).with_before_doing(passing_hook()))
        .await?;
    clock.advance(past_expiry());

    let next = engine.claims.get_next(&agent("agent-2", &[])).await?;

    ensure!(next.as_ref().map(Task::id) == Some(task.id()));
    let history = engine.lifecycle.history(task.id()).await?;
    let released = history.iter().find(|entry| {
        entry.event
            == TaskEvent::Released {
                claimant: stale.identity().clone(),
                reason: ReleaseReason::Expired,
            }
    });
    let Some(entry) = released else {
        bail!("expected an expiry release in {history:?}");
    };
    ensure!(entry.actor.is_none(), "releases are attributed to the engine");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn live_claim_survives_until_expiry() -> Result<()> {
    let (engine, clock) = stepped_engine();
    let task = add_work(&engine, "Long running", Priority::Medium).await?;
    let holder = agent("agent-1", &[]);
    engine
        .claims
        .claim(ClaimTaskRequest::new(task.id(), holder.clone()).with_before_doing(passing_hook()))
        .await?;
    clock.advance(EngineConfig::default().claim_ttl());

    ensure!(engine.claims.get_next(&agent("agent-2", &[])).await?.is_none());
    let stored = engine.lifecycle.find_by_id(task.id()).await?;
    ensure!(stored.is_some_and(|found| found.claimed_by() == Some(holder.identity())));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn expired_claim_can_be_claimed_directly() -> Result<()> {
    let (engine, clock) = stepped_engine();
    let task = add_work(&engine, "Abandoned", Priority::Medium).await?;
    engine
        .claims
        .claim(ClaimTaskRequest::new(task.id(), agent("agent-1", &[])).with_before_doing(passing_hook()))
        .await?;
    clock.advance(past_expiry());
    let successor = agent("agent-2", &[]);

    let outcome = engine
        .claims
        .claim(ClaimTaskRequest::new(task.id(), successor.clone()).with_before_doing(passing_hook()))
        .await?;

    ensure!(outcome.task.claimed_by() == Some(successor.identity()));
    let history = engine.lifecycle.history(task.id()).await?;
    let claims = history
        .iter()
        .filter(|entry| matches!(entry.event, TaskEvent::Claimed { .. }))
        .count();
    ensure!(claims == 2);
    ensure!(history.iter().any(|entry| matches!(
        entry.event,
        TaskEvent::Released {
            reason: ReleaseReason::Expired,
            ..
        }
    )));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn claim_history_records_actor_and_hook(engine: Engine) -> Result<()> {
    let task = add_work(&engine, "Traced", Priority::Medium).await?;
    let principal = agent("agent-1", &[]);
    engine
        .claims
        .claim(ClaimTaskRequest::new(task.id(), principal.clone()).with_before_doing(passing_hook()))
        .await?;

    let history = engine.lifecycle.history(task.id()).await?;

    ensure!(matches!(
        history.first().map(|entry| &entry.event),
        Some(TaskEvent::Created { .. })
    ));
    let claimed: Vec<_> = history
        .iter()
        .filter(|entry| entry.actor.as_ref() == Some(principal.identity()))
        .map(|entry| &entry.event)
        .collect();
    ensure!(
        matches!(
            claimed.as_slice(),
            [
                TaskEvent::Moved { .. },
                TaskEvent::Claimed { .. },
                TaskEvent::HookReported {
                    hook: HookPoint::BeforeDoing,
                    ..
                },
            ]
        ),
        "unexpected claim history {claimed:?}"
    );
    Ok(())
}

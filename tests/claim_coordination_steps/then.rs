//! Then steps for claim coordination BDD scenarios.

use super::world::{ClaimWorld, run_async};
use foreman::task::domain::TaskStatus;
use rstest_bdd_macros::then;

#[then(r#"the offered task is "{title}""#)]
fn offered_task_is(world: &ClaimWorld, title: String) -> Result<(), eyre::Report> {
    let offered = world
        .offered
        .as_ref()
        .ok_or_else(|| eyre::eyre!("no task was offered"))?;
    if offered.title() != title {
        return Err(eyre::eyre!("expected {title}, offered {}", offered.title()));
    }
    Ok(())
}

#[then("exactly one claim succeeds")]
fn exactly_one_claim_succeeds(world: &ClaimWorld) -> Result<(), eyre::Report> {
    let winners = world
        .claim_results
        .iter()
        .filter(|result| result.is_ok())
        .count();
    if winners != 1 {
        return Err(eyre::eyre!("expected one winning claim, got {winners}"));
    }
    Ok(())
}

#[then(r#"the other claim fails with "{kind}""#)]
fn other_claim_fails(world: &ClaimWorld, kind: String) -> Result<(), eyre::Report> {
    let failures: Vec<&str> = world
        .claim_results
        .iter()
        .filter_map(|result| result.as_ref().err())
        .map(|err| err.kind().as_str())
        .collect();
    if failures != [kind.as_str()] {
        return Err(eyre::eyre!("expected one {kind} failure, got {failures:?}"));
    }
    Ok(())
}

#[then(r#"the claim fails with "{kind}""#)]
fn claim_fails_with(world: &ClaimWorld, kind: String) -> Result<(), eyre::Report> {
    let result = world
        .claim_results
        .first()
        .ok_or_else(|| eyre::eyre!("missing claim result"))?;
    match result {
        Err(err) if err.kind().as_str() == kind => Ok(()),
        other => Err(eyre::eyre!("expected {kind} failure, got {other:?}")),
    }
}

#[then(r#""{title}" is reported as ready"#)]
fn reported_as_ready(world: &ClaimWorld, title: String) -> Result<(), eyre::Report> {
    let expected = world.task(&title)?.id();
    let completion = world
        .last_completion
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing completion outcome"))?;
    if !completion
        .ready_dependents
        .iter()
        .any(|task| task.id() == expected)
    {
        return Err(eyre::eyre!("{title} was not reported as ready"));
    }
    Ok(())
}

#[then(r#"task "{title}" is "{status}""#)]
fn task_has_status(world: &ClaimWorld, title: String, status: String) -> Result<(), eyre::Report> {
    let expected = TaskStatus::try_from(status.as_str())?;
    let task_id = world.task(&title)?.id();
    let stored = run_async(world.lifecycle.find_by_id(task_id))?
        .ok_or_else(|| eyre::eyre!("task {title} is missing"))?;
    if stored.status() != expected {
        return Err(eyre::eyre!("expected {expected}, found {}", stored.status()));
    }
    Ok(())
}

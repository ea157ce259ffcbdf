//! When steps for claim coordination BDD scenarios.

use super::world::{ClaimWorld, agent, hook_report, run_async};
use foreman::task::services::{ClaimTaskRequest, CompleteTaskRequest};
use eyre::WrapErr;
use rstest_bdd_macros::when;

#[when(r#"agent "{name}" asks for the next task"#)]
fn asks_for_next(world: &mut ClaimWorld, name: String) -> Result<(), eyre::Report> {
    let principal = agent(&name)?;
    world.offered = run_async(world.claims.get_next(&principal)).wrap_err("get next task")?;
    Ok(())
}

#[when(r#"agents "{first}" and "{second}" both claim "{title}""#)]
fn both_claim(
    world: &mut ClaimWorld,
    first: String,
    second: String,
    title: String,
) -> Result<(), eyre::Report> {
    let task_id = world.task(&title)?.id();
    let first_request = ClaimTaskRequest::new(task_id, agent(&first)?).with_before_doing(hook_report(0));
    let second_request =
        ClaimTaskRequest::new(task_id, agent(&second)?).with_before_doing(hook_report(0));
    let (left, right) = run_async(async {
        tokio::join!(
            world.claims.claim(first_request),
            world.claims.claim(second_request)
        )
    });
    world.claim_results = vec![left, right];
    Ok(())
}

#[when(r#"agent "{name}" claims "{title}""#)]
fn claims(world: &mut ClaimWorld, name: String, title: String) -> Result<(), eyre::Report> {
    let request =
        ClaimTaskRequest::new(world.task(&title)?.id(), agent(&name)?).with_before_doing(hook_report(0));
    let result = run_async(world.claims.claim(request));
    world.claim_results = vec![result];
    Ok(())
}

#[when(r#"agent "{name}" claims "{title}" with a failing before_doing hook"#)]
fn claims_with_failing_hook(
    world: &mut ClaimWorld,
    name: String,
    title: String,
) -> Result<(), eyre::Report> {
    let request =
        ClaimTaskRequest::new(world.task(&title)?.id(), agent(&name)?).with_before_doing(hook_report(1));
    let result = run_async(world.claims.claim(request));
    world.claim_results = vec![result];
    Ok(())
}

#[when(r#"agent "{name}" completes "{title}""#)]
fn completes(world: &mut ClaimWorld, name: String, title: String) -> Result<(), eyre::Report> {
    let request =
        CompleteTaskRequest::new(world.task(&title)?.id(), agent(&name)?).with_after_doing(hook_report(0));
    let outcome = run_async(world.lifecycle.complete(request)).wrap_err("complete scenario task")?;
    world.tasks.insert(title, outcome.task.clone());
    world.last_completion = Some(outcome);
    Ok(())
}

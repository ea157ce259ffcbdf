//! Given steps for claim coordination BDD scenarios.

use super::world::{ClaimWorld, agent, hook_report, run_async};
use foreman::task::{
    domain::{BoardId, CapabilitySet, Principal, PrincipalId, Priority, TaskKind},
    services::{ClaimTaskRequest, CreateTaskRequest},
};
use eyre::WrapErr;
use rstest_bdd_macros::given;

#[given("an empty task board")]
fn empty_board(world: &mut ClaimWorld) {
    world.tasks.clear();
}

#[given(r#"a work task "{title}" with priority "{priority}""#)]
fn work_task(world: &mut ClaimWorld, title: String, priority: String) -> Result<(), eyre::Report> {
    let parsed = Priority::try_from(priority.as_str())?;
    let request = CreateTaskRequest::new(BoardId::new("core")?, TaskKind::Work, title.clone())
        .with_priority(parsed);
    let created = run_async(world.lifecycle.create_task(request)).wrap_err("create scenario task")?;
    world.tasks.insert(title, created);
    Ok(())
}

#[given(r#""{dependent}" depends on "{dependency}""#)]
fn depends_on(
    world: &mut ClaimWorld,
    dependent: String,
    dependency: String,
) -> Result<(), eyre::Report> {
    let task_id = world.task(&dependent)?.id();
    let depends_on = world.task(&dependency)?.id();
    let planner = Principal::human(PrincipalId::new("planner")?, CapabilitySet::empty());
    let updated = run_async(world.dependencies.add_dependency(task_id, depends_on, &planner))
        .wrap_err("add scenario dependency")?;
    world.tasks.insert(dependent, updated);
    Ok(())
}

#[given(r#"agent "{name}" has claimed "{title}""#)]
fn has_claimed(world: &mut ClaimWorld, name: String, title: String) -> Result<(), eyre::Report> {
    let request =
        ClaimTaskRequest::new(world.task(&title)?.id(), agent(&name)?).with_before_doing(hook_report(0));
    let outcome = run_async(world.claims.claim(request)).wrap_err("claim scenario task")?;
    world.tasks.insert(title, outcome.task);
    Ok(())
}

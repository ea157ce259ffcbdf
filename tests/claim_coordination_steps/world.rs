//! Shared world state for claim coordination BDD scenarios.

use std::collections::HashMap;
use std::sync::Arc;

use foreman::config::EngineConfig;
use foreman::task::{
    adapters::memory::InMemoryTaskRepository,
    domain::{CapabilitySet, Principal, PrincipalId, Task},
    services::{
        ClaimCoordinator, ClaimOutcome, CompleteOutcome, DependencyService, TaskLifecycleError,
        TaskLifecycleService,
    },
};
use mockable::DefaultClock;
use rstest::fixture;
use serde_json::{Value, json};

/// Claim coordinator used by the BDD world.
pub type TestClaims = ClaimCoordinator<InMemoryTaskRepository, DefaultClock>;
/// Lifecycle service used by the BDD world.
pub type TestLifecycle = TaskLifecycleService<InMemoryTaskRepository, DefaultClock>;
/// Dependency service used by the BDD world.
pub type TestDependencies = DependencyService<InMemoryTaskRepository, DefaultClock>;

/// Scenario world for claim coordination behaviour tests.
pub struct ClaimWorld {
    pub claims: TestClaims,
    pub lifecycle: TestLifecycle,
    pub dependencies: TestDependencies,
    pub tasks: HashMap<String, Task>,
    pub offered: Option<Task>,
    pub claim_results: Vec<Result<ClaimOutcome, TaskLifecycleError>>,
    pub last_completion: Option<CompleteOutcome>,
}

impl ClaimWorld {
    /// Creates a world backed by an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        let repository = Arc::new(InMemoryTaskRepository::new());
        let clock = Arc::new(DefaultClock);
        let config = Arc::new(EngineConfig::default());
        Self {
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
            tasks: HashMap::new(),
            offered: None,
            claim_results: Vec::new(),
            last_completion: None,
        }
    }

    /// Looks up a task created earlier in the scenario by title.
    pub fn task(&self, title: &str) -> Result<&Task, eyre::Report> {
        self.tasks
            .get(title)
            .ok_or_else(|| eyre::eyre!("no task titled {title} in scenario world"))
    }
}

impl Default for ClaimWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> ClaimWorld {
    ClaimWorld::default()
}

/// Builds an agent principal without capabilities.
pub fn agent(name: &str) -> Result<Principal, eyre::Report> {
    Ok(Principal::agent(PrincipalId::new(name)?, CapabilitySet::empty()))
}

/// Hook report with the given exit code.
pub fn hook_report(exit_code: i64) -> Value {
    json!({"exit_code": exit_code, "output": "hook output", "duration_ms": 10})
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}

//! Application services for claim coordination and task lifecycle
//! orchestration.

mod access;
mod claim;
mod dependency;
mod error;
mod lifecycle;

pub use claim::{ClaimCoordinator, ClaimOutcome, ClaimTaskRequest};
pub use dependency::DependencyService;
pub use error::{TaskLifecycleError, TaskLifecycleResult};
pub use lifecycle::{
    CompleteOutcome, CompleteTaskRequest, CreateTaskRequest, ReviewOutcome, ReviewTaskRequest,
    TaskLifecycleService,
};

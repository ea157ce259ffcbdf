//! In-memory repository integration tests.
//!
//! Tests are organised into modules by functionality:
//! - `repository_tests`: compare-and-set writes, lookups and history
//! - `workflow_tests`: end-to-end lifecycles through the services
//! - `contention_tests`: retry exhaustion under persistent conflicts

mod in_memory {
    pub mod helpers;

    mod contention_tests;
    mod repository_tests;
    mod workflow_tests;
}

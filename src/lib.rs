//! Foreman: task lifecycle and claim coordination for AI-agent task boards.
//!
//! Many autonomous agents and humans claim, execute and complete units of
//! work through this crate. It guarantees that at most one claimant holds a
//! task at a time, keeps task dependencies acyclic, and gates transitions on
//! hook results that callers run on their own machines and report back.
//!
//! # Architecture
//!
//! Foreman follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for persistence
//! - **Adapters**: In-memory and `PostgreSQL` implementations of the ports
//! - **Services**: Compare-and-set orchestration over the ports
//!
//! # Modules
//!
//! - [`config`]: Engine tunables loaded from the environment
//! - [`task`]: Task lifecycle, claims, dependencies and hooks

pub mod config;
pub mod task;

//! Task lifecycle and claim coordination.
//!
//! Agents ask for the next eligible task, claim it behind the `before_doing`
//! hook gate, report completion behind the `after_doing` gate, and optionally
//! pass through human review. Dependencies between tasks form an acyclic
//! graph that decides when work becomes claimable. The module follows
//! hexagonal architecture:
//!
//! - Domain types and transition rules in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;

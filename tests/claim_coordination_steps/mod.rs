//! Step definitions for claim coordination scenarios.

pub mod given;
pub mod then;
pub mod when;
pub mod world;

//! Persistence adapters for the task module.
//!
//! - [`memory::InMemoryTaskRepository`]: thread-safe in-memory storage for
//!   tests and embedding
//! - [`postgres::PostgresTaskRepository`]: `PostgreSQL` persistence using
//!   Diesel

pub mod memory;
pub mod postgres;

//! Unit tests for the task domain and services.

mod claim_service_tests;
mod support;

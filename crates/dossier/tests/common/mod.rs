//! Shared fixtures for the integration tests.

pub mod fixtures;
pub mod harness;
pub mod stubs;

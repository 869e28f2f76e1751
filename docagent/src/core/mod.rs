//! Deterministic, pure logic shared by the agent and the orchestrator.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod classifier;
pub mod preservation;
pub mod types;

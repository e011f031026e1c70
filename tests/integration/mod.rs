//! Integration test suite for snowplan.
//!
//! These tests drive the public API end to end: task graph, executor,
//! checkpoints, replay, batch iteration and the built-in role workers.
//!
//! # Test Categories
//!
//! - `pipeline_e2e`: full runs over the six-task snow-removal graph
//! - `replay`: resuming from checkpoints
//! - `batch`: train/test iteration and ledger carry-over
//! - `builtin_workers`: the shipped role workers against the region catalog
//!
//! Stub workers return fixed payloads, so nothing here depends on timing
//! or external services.

mod fixtures;

mod batch;
mod builtin_workers;
mod pipeline_e2e;
mod replay;

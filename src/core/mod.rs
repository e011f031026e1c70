//! Core domain models: task declarations, results and the task graph.

pub mod dag;
pub mod task;

pub use dag::{PipelineFile, TaskGraph};
pub use task::{Payload, Region, RunId, TaskResult, TaskSpec, TaskStatus};

//! Orchestration layer: workers, the pipeline executor and batch iteration.
//!
//! The executor drives one pipeline run over a task graph, calling the
//! registered worker of each task in dependency order. The iteration
//! controller repeats runs for the `train` and `test` modes.

mod executor;
mod iteration;
pub mod roles;
mod worker;

pub use executor::{ExecutorEvent, PipelineExecutor};
pub use iteration::{
    BatchMode, BatchSummary, IterationController, IterationRecord, JsonLinesSink, MemorySink,
    Outcome, ResultSink,
};
pub use worker::{Worker, WorkerInput, WorkerRegistry};

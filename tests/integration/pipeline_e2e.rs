//! End-to-end pipeline runs over the six-task snow-removal graph.

use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use snowplan::context::ContextStore;
use snowplan::core::{Payload, Region, TaskGraph, TaskStatus};
use snowplan::orchestration::{PipelineExecutor, Worker, WorkerInput};
use snowplan::Error;

use crate::fixtures::{ledger_with_salt, StubPipeline, StubWorker};

/// Test: E2E Happy Path
/// Given stub workers with fixed payloads and region "Quebec"
/// When the pipeline runs
/// Then six results are committed in dependency order
#[tokio::test]
async fn test_e2e_six_tasks_in_dependency_order() {
    let pipeline = StubPipeline::new();
    let mut ledger = ledger_with_salt(400.0);

    let snapshot = pipeline
        .executor()
        .run(&Region::new("Quebec"), &pipeline.graph, &mut ledger)
        .await
        .unwrap();

    assert_eq!(
        snapshot.task_ids(),
        vec!["planning", "weather", "traffic", "resources", "routing", "communication"]
    );
    for entry in &snapshot.entries {
        assert!(entry.is_ok());
        assert_eq!(entry.payload["region"], "Quebec");
    }
    assert_eq!(pipeline.counts(), vec![1; 6]);
}

/// Test: DAG joins
/// Given the built-in fan-in edges
/// When the pipeline runs
/// Then routing and communication receive every declared dependency
#[tokio::test]
async fn test_e2e_join_bundles() {
    let pipeline = StubPipeline::new();
    pipeline
        .executor()
        .run(&Region::new("Quebec"), &pipeline.graph, &mut ledger_with_salt(400.0))
        .await
        .unwrap();

    assert_eq!(
        pipeline.calls("notifier").last_bundle(),
        vec!["planning", "resources", "routing"]
    );
    assert_eq!(
        pipeline.calls("route_optimizer").last_bundle(),
        vec!["planning", "traffic", "weather"]
    );
    assert!(pipeline.calls("planner").last_bundle().is_empty());
}

/// Test: Fail fast
/// Given a traffic worker that fails
/// When the pipeline runs
/// Then the failure is committed and no later task runs
#[tokio::test]
async fn test_e2e_failure_halts_run() {
    let pipeline =
        StubPipeline::with_workers(vec![StubWorker::new("traffic_analyst").failing_on(&[0])]);
    let mut store = ContextStore::new();

    let err = pipeline
        .executor()
        .run_in(
            &Region::new("Quebec"),
            &pipeline.graph,
            &mut ledger_with_salt(400.0),
            &mut store,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::TaskExecution { ref task_id, .. } if task_id == "traffic"));
    assert!(err.to_string().contains("traffic_analyst failed on call 0"));
    assert_eq!(store.len(), 3);
    assert!(matches!(
        store.get("traffic").unwrap().status,
        TaskStatus::Failed { .. }
    ));
    assert_eq!(pipeline.counts(), vec![1, 1, 1, 0, 0, 0]);
}

/// Cancels the run while its own task is in flight.
struct Interrupter {
    token: CancellationToken,
}

#[async_trait]
impl Worker for Interrupter {
    fn name(&self) -> &str {
        "traffic_analyst"
    }

    async fn invoke(&self, _input: WorkerInput<'_>) -> anyhow::Result<Payload> {
        self.token.cancel();
        Ok(Payload::new())
    }
}

/// Test: Graceful cancellation
/// Given a cancellation requested during the traffic task
/// When the task finishes
/// Then its result is kept and the run stops before resources
#[tokio::test]
async fn test_e2e_cancellation_between_tasks() {
    let pipeline = StubPipeline::new();
    let token = CancellationToken::new();
    let mut registry = pipeline.registry.clone();
    registry.register(Arc::new(Interrupter {
        token: token.clone(),
    }));
    let executor = PipelineExecutor::new(registry).with_cancel_token(token);
    let mut store = ContextStore::new();

    let err = executor
        .run_in(
            &Region::new("Quebec"),
            &pipeline.graph,
            &mut ledger_with_salt(400.0),
            &mut store,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled(ref next) if next == "resources"));
    assert_eq!(store.snapshot().task_ids(), vec!["planning", "weather", "traffic"]);
    assert!(store.get("traffic").unwrap().is_ok());
    assert_eq!(pipeline.calls("stock_manager").count(), 0);
}

/// Test: Pipeline file
/// Given a TOML pipeline declaring a cycle
/// When it is loaded
/// Then loading fails with a configuration error
#[test]
fn test_pipeline_file_with_cycle_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pipeline.toml");
    std::fs::write(
        &path,
        r#"
[[task]]
id = "planning"
worker = "planner"
depends_on = ["communication"]

[[task]]
id = "communication"
worker = "notifier"
depends_on = ["planning"]
"#,
    )
    .unwrap();

    let err = TaskGraph::load(&path).unwrap_err();
    assert!(err.is_configuration());
    assert!(matches!(err, Error::Cycle { .. }));
}

/// Test: Custom pipeline
/// Given a TOML pipeline reusing the built-in worker names
/// When it runs
/// Then only its tasks are executed, in its order
#[tokio::test]
async fn test_custom_pipeline_file_runs() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pipeline.toml");
    std::fs::write(
        &path,
        r#"
[[task]]
id = "notify"
worker = "notifier"
depends_on = ["plan"]

[[task]]
id = "plan"
worker = "planner"
allow_delegation = true
"#,
    )
    .unwrap();
    let graph = TaskGraph::load(&path).unwrap();
    let pipeline = StubPipeline::new();

    let snapshot = pipeline
        .executor()
        .run(&Region::new("Toronto"), &graph, &mut ledger_with_salt(400.0))
        .await
        .unwrap();

    assert_eq!(snapshot.task_ids(), vec!["plan", "notify"]);
    assert_eq!(pipeline.calls("notifier").last_bundle(), vec!["plan"]);
    assert_eq!(pipeline.calls("weather_monitor").count(), 0);
}

//! Replay integration tests.
//!
//! These tests run a pipeline with checkpoints enabled, then resume it
//! from stored snapshots and check which workers run again.

use tempfile::TempDir;

use snowplan::context::{CheckpointStore, ContextStore};
use snowplan::core::Region;
use snowplan::Error;

use crate::fixtures::{ledger_with_salt, StubPipeline, StubWorker};

/// Test: Replay skips upstream work
/// Given a completed checkpointed run
/// When replaying from routing
/// Then only routing and communication are invoked again
#[tokio::test]
async fn test_replay_from_routing_reuses_upstream_results() {
    let dir = TempDir::new().unwrap();
    let pipeline = StubPipeline::new();
    let executor = pipeline
        .executor()
        .with_checkpoints(CheckpointStore::new(dir.path()));
    let region = Region::new("Quebec");
    let mut ledger = ledger_with_salt(400.0);
    let mut store = ContextStore::new();

    let run_id = executor
        .run_in(&region, &pipeline.graph, &mut ledger, &mut store)
        .await
        .unwrap();
    let checkpoints = CheckpointStore::new(dir.path());
    let original = checkpoints.latest(&run_id).unwrap().snapshot;
    assert_eq!(original, store.snapshot());

    let replayed = executor
        .replay(&region, &pipeline.graph, "routing", &original, &mut ledger)
        .await
        .unwrap();

    assert_eq!(pipeline.counts(), vec![1, 1, 1, 1, 2, 2]);
    for task in ["planning", "weather", "traffic", "resources"] {
        assert_eq!(replayed.get(task), original.get(task), "{task} should be restored as-is");
    }
    assert_ne!(replayed.get("routing"), original.get("routing"));
    assert_eq!(replayed.get("routing").unwrap().payload["call"], 1);

    // The replay is checkpointed as a run of its own.
    assert_ne!(checkpoints.latest_run().unwrap(), run_id);
}

/// Test: Replay after failure
/// Given a run that failed at resources
/// When replaying from resources with the failed run's checkpoint
/// Then the run completes without re-running planning, weather or traffic
#[tokio::test]
async fn test_replay_recovers_failed_run() {
    let dir = TempDir::new().unwrap();
    let pipeline =
        StubPipeline::with_workers(vec![StubWorker::new("stock_manager").failing_on(&[0])]);
    let executor = pipeline
        .executor()
        .with_checkpoints(CheckpointStore::new(dir.path()));
    let region = Region::new("Quebec");
    let mut ledger = ledger_with_salt(400.0);

    let err = executor
        .run(&region, &pipeline.graph, &mut ledger)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TaskExecution { .. }));

    let checkpoints = CheckpointStore::new(dir.path());
    let failed_run = checkpoints.latest_run().unwrap();
    let checkpoint = checkpoints.latest(&failed_run).unwrap();
    assert_eq!(checkpoint.task_id, "resources");
    assert!(!checkpoint.snapshot.get("resources").unwrap().is_ok());

    let gap = executor
        .replay(&region, &pipeline.graph, "routing", &checkpoint.snapshot, &mut ledger)
        .await
        .unwrap_err();
    assert!(matches!(gap, Error::CheckpointGap { ref task_id, .. } if task_id == "resources"));

    let replayed = executor
        .replay(&region, &pipeline.graph, "resources", &checkpoint.snapshot, &mut ledger)
        .await
        .unwrap();
    assert_eq!(replayed.len(), 6);
    assert!(replayed.entries.iter().all(|r| r.is_ok()));
    assert_eq!(pipeline.counts(), vec![1, 1, 1, 2, 1, 1]);
}

/// Test: Replay from an intermediate checkpoint
/// Given the checkpoint written right after weather
/// When replaying from traffic
/// Then the remaining four tasks run
#[tokio::test]
async fn test_replay_from_intermediate_checkpoint() {
    let dir = TempDir::new().unwrap();
    let pipeline = StubPipeline::new();
    let executor = pipeline
        .executor()
        .with_checkpoints(CheckpointStore::new(dir.path()));
    let region = Region::new("Montreal");
    let mut ledger = ledger_with_salt(400.0);

    let mut store = ContextStore::new();
    let run_id = executor
        .run_in(&region, &pipeline.graph, &mut ledger, &mut store)
        .await
        .unwrap();
    let after_weather = CheckpointStore::new(dir.path())
        .load(&run_id, "weather")
        .unwrap();
    assert_eq!(after_weather.snapshot.task_ids(), vec!["planning", "weather"]);

    let replayed = executor
        .replay(&region, &pipeline.graph, "traffic", &after_weather.snapshot, &mut ledger)
        .await
        .unwrap();
    assert_eq!(replayed.len(), 6);
    assert_eq!(pipeline.counts(), vec![1, 1, 2, 2, 2, 2]);
}

/// Test: Replay from the first task
/// Given an empty snapshot
/// When replaying from planning
/// Then it behaves like a fresh run
#[tokio::test]
async fn test_replay_from_first_task_needs_nothing() {
    let pipeline = StubPipeline::new();
    let replayed = pipeline
        .executor()
        .replay(
            &Region::new("Quebec"),
            &pipeline.graph,
            "planning",
            &Default::default(),
            &mut ledger_with_salt(400.0),
        )
        .await
        .unwrap();
    assert_eq!(replayed.len(), 6);
    assert_eq!(pipeline.counts(), vec![1; 6]);
}

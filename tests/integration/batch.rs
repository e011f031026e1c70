//! Batch iteration integration tests.
//!
//! These tests verify that train/test batches record every iteration,
//! survive failing iterations and carry ledger consumption across runs.

use tempfile::TempDir;

use snowplan::core::Region;
use snowplan::inventory::{InventoryLedger, ResourceKind};
use snowplan::orchestration::{
    BatchMode, BatchSummary, IterationController, IterationRecord, JsonLinesSink, MemorySink,
    Outcome,
};

use crate::fixtures::{ledger_with_salt, StubPipeline, StubWorker, DEPOT};

fn flaky_pipeline() -> StubPipeline {
    StubPipeline::with_workers(vec![
        StubWorker::new("stock_manager").consuming(10.0),
        StubWorker::new("route_optimizer")
            .consuming(5.0)
            .failing_on(&[1, 3]),
    ])
}

/// Test: Failed iterations are recorded
/// Given a routing worker that fails on the 2nd and 4th iteration
/// When running five iterations
/// Then five records come back, two of them failures
#[tokio::test]
async fn test_run_many_records_every_iteration() {
    let pipeline = flaky_pipeline();
    let mut controller = IterationController::new(pipeline.executor(), ledger_with_salt(400.0));
    let mut sink = MemorySink::new();

    let records = controller
        .run_many(&Region::new("Quebec"), &pipeline.graph, 5, &mut sink)
        .await
        .unwrap();

    assert_eq!(records.len(), 5);
    assert_eq!(sink.records.len(), 5);
    let indices: Vec<usize> = records.iter().map(|r| r.iteration_index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);

    let failed: Vec<&IterationRecord> = records
        .iter()
        .filter(|r| !r.outcome.is_success())
        .collect();
    assert_eq!(failed.len(), 2);
    assert_eq!(failed[0].iteration_index, 1);
    match &failed[1].outcome {
        Outcome::Failure { reason } => assert!(reason.starts_with("routing:")),
        Outcome::Success => unreachable!(),
    }
    assert_eq!(failed[0].metrics["tasks_committed"], 4.0);
    assert_eq!(records[0].metrics["tasks_committed"], 6.0);

    // Communication never runs in a failed iteration.
    assert_eq!(pipeline.calls("notifier").count(), 3);
}

/// Test: Ledger carries over
/// Given workers that consume salt in every iteration
/// When some iterations fail at routing
/// Then the ledger reflects every deduction made before each failure
#[tokio::test]
async fn test_ledger_totals_reflect_all_iterations() {
    let pipeline = flaky_pipeline();
    let mut controller = IterationController::new(pipeline.executor(), ledger_with_salt(400.0));

    let records = controller
        .run_many(&Region::new("Quebec"), &pipeline.graph, 5, &mut MemorySink::new())
        .await
        .unwrap();

    // 5 x 10 t by stock_manager, 5 x 5 t by route_optimizer
    assert_eq!(controller.ledger().total(ResourceKind::Salt), 325.0);
    for record in &records {
        assert_eq!(record.metrics["salt_consumed"], 15.0);
        assert_eq!(record.metrics["fuel_consumed"], 0.0);
    }

    let ledger = controller.into_ledger();
    assert_eq!(ledger.quantity(ResourceKind::Salt, DEPOT).unwrap(), 325.0);
}

/// Test: Train output
/// Given a file-backed ledger and a JSON lines sink
/// When a batch runs
/// Then each iteration is appended and the ledger file holds the final stock
#[tokio::test]
async fn test_train_batch_persists_records_and_stock() {
    let dir = TempDir::new().unwrap();
    let ledger_path = dir.path().join("inventory.json");
    let output = dir.path().join("train.jsonl");

    let seed = ledger_with_salt(400.0).items().cloned().collect::<Vec<_>>();
    let ledger = InventoryLedger::open_or_seed(&ledger_path, seed).unwrap();

    let pipeline = flaky_pipeline();
    let mut controller = IterationController::new(pipeline.executor(), ledger);
    let region = Region::new("Quebec");
    let mut sink = JsonLinesSink::open(&output).unwrap();
    let records = controller
        .run_many(&region, &pipeline.graph, 5, &mut sink)
        .await
        .unwrap();

    let written = std::fs::read_to_string(&output).unwrap();
    assert_eq!(written.lines().count(), 5);
    let reloaded = InventoryLedger::open(&ledger_path).unwrap();
    assert_eq!(reloaded.total(ResourceKind::Salt), 325.0);

    let summary = BatchSummary::from_records(
        BatchMode::Train,
        &output.display().to_string(),
        &region,
        &records,
    );
    assert_eq!(summary.iterations, 5);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.mean_metrics["salt_consumed"], 15.0);
    assert!((summary.mean_metrics["tasks_committed"] - 5.2).abs() < 1e-9);
}

/// Test: Each iteration starts from an empty context
/// Given the planner counts its invocations
/// When running three iterations
/// Then every iteration runs every task again
#[tokio::test]
async fn test_iterations_do_not_share_context() {
    let pipeline = StubPipeline::new();
    let mut controller = IterationController::new(pipeline.executor(), ledger_with_salt(400.0));
    let records = controller
        .run_many(&Region::new("Quebec"), &pipeline.graph, 3, &mut MemorySink::new())
        .await
        .unwrap();

    assert!(records.iter().all(|r| r.outcome.is_success()));
    assert_eq!(pipeline.counts(), vec![3; 6]);
    let run_ids: Vec<_> = records.iter().map(|r| r.run_id.unwrap()).collect();
    assert_ne!(run_ids[0], run_ids[1]);
}

//! Built-in role workers against the region catalog.
//!
//! These tests run the shipped pipeline with the real planner, weather,
//! traffic, stock, routing and notification workers.

use std::sync::Arc;

use snowplan::core::{Region, TaskGraph};
use snowplan::inventory::{InventoryLedger, ResourceKind};
use snowplan::orchestration::roles::route_plan;
use snowplan::orchestration::{IterationController, MemorySink, PipelineExecutor, WorkerRegistry};
use snowplan::region::RegionCatalog;
use snowplan::report::RunReport;
use snowplan::routing::{Priority, ScoringWeights};
use snowplan::Error;

const CHAREST: &str = "Centre de Services Charest";
const SAINTE_FOY: &str = "Centre de Services Sainte-Foy";

fn executor() -> PipelineExecutor {
    PipelineExecutor::new(WorkerRegistry::snow_removal(
        Arc::new(RegionCatalog::builtin()),
        ScoringWeights::default(),
    ))
}

fn seeded_ledger() -> InventoryLedger {
    let mut ledger = InventoryLedger::new();
    for item in RegionCatalog::builtin().seed_inventory() {
        ledger.upsert(item).unwrap();
    }
    ledger
}

/// Test: Quebec run
/// Given the built-in catalog and seeded depots
/// When the pipeline runs for Quebec
/// Then every zone gets a supplied route and stock is consumed
#[tokio::test]
async fn test_quebec_run_plans_and_consumes() {
    let mut ledger = seeded_ledger();
    let salt_before = ledger.total(ResourceKind::Salt);
    let region = Region::new("Quebec");

    let snapshot = executor()
        .run(&region, &TaskGraph::snow_removal(), &mut ledger)
        .await
        .unwrap();
    assert_eq!(snapshot.len(), 6);

    let plan = route_plan(&snapshot.get("routing").unwrap().payload).unwrap();
    assert_eq!(plan.routes.len(), 4);
    assert!(plan.shortfalls.is_empty());
    assert_eq!(plan.routes[0].priority, Priority::Critical);
    let scores: Vec<f64> = plan.routes.iter().map(|r| r.score).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));

    // 35 + 30 + 36 + 26 t across the four zones
    assert_eq!(salt_before - ledger.total(ResourceKind::Salt), 127.0);

    let communication = &snapshot.get("communication").unwrap().payload;
    assert_eq!(communication["route_count"], 4);
    assert_eq!(communication["region"], "Quebec");

    let report = RunReport::build(None, &region, &snapshot, &ledger);
    assert_eq!(report.routes, plan.routes);
    assert!(!report.weather_alerts.is_empty());
    assert!(!report.notifications.is_empty());
    assert!(report.failed_tasks().is_empty());
}

/// Test: Deterministic ranking
/// Given identical inputs
/// When the pipeline runs twice on fresh ledgers
/// Then the route ranking is identical
#[tokio::test]
async fn test_route_ranking_is_reproducible() {
    let graph = TaskGraph::snow_removal();
    let region = Region::new("New-York");
    let mut rankings = Vec::new();
    for _ in 0..2 {
        let snapshot = executor()
            .run(&region, &graph, &mut seeded_ledger())
            .await
            .unwrap();
        let plan = route_plan(&snapshot.get("routing").unwrap().payload).unwrap();
        rankings.push(plan.routes);
    }
    assert_eq!(rankings[0], rankings[1]);
}

/// Test: Unknown region
/// Given a region missing from the catalog
/// When the pipeline runs
/// Then planning fails and nothing else runs
#[tokio::test]
async fn test_unknown_region_fails_at_planning() {
    let err = executor()
        .run(&Region::new("Winnipeg"), &TaskGraph::snow_removal(), &mut seeded_ledger())
        .await
        .unwrap_err();
    match err {
        Error::TaskExecution { task_id, cause } => {
            assert_eq!(task_id, "planning");
            assert!(cause.contains("Winnipeg"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

/// Test: Depletion across iterations
/// Given Quebec's depots consuming 65 t and 62 t of salt per run
/// When seven iterations run
/// Then the depot is drained, never overdrawn, and alerts are raised
#[tokio::test]
async fn test_stock_depletes_across_iterations() {
    let mut controller = IterationController::new(executor(), seeded_ledger());
    let records = controller
        .run_many(
            &Region::new("Quebec"),
            &TaskGraph::snow_removal(),
            7,
            &mut MemorySink::new(),
        )
        .await
        .unwrap();

    assert!(records.iter().all(|r| r.outcome.is_success()));
    assert!(records.iter().all(|r| r.metrics["routes"] == 4.0));
    for depot in [CHAREST, SAINTE_FOY] {
        assert_eq!(
            controller.ledger().quantity(ResourceKind::Salt, depot).unwrap(),
            0.0
        );
    }
    // Only 10 t left at Charest and 28 t at Sainte-Foy for the last run.
    assert_eq!(records[5].metrics["salt_consumed"], 127.0);
    assert_eq!(records[6].metrics["salt_consumed"], 10.0 + 28.0);
    assert!(records[6].metrics["inventory_alerts"] >= 1.0);
}

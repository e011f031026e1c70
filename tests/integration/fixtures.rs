//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Stub workers that return fixed payloads and record their inputs
//! - A stub registry covering every worker of the snow-removal graph
//! - Seeded inventory ledgers

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use snowplan::core::{Payload, TaskGraph};
use snowplan::inventory::{InventoryItem, InventoryLedger, ResourceKind};
use snowplan::orchestration::{PipelineExecutor, Worker, WorkerInput, WorkerRegistry};

pub const DEPOT: &str = "Centre de Services Charest";

/// Worker names of the built-in graph, in task order.
pub const ROLES: [&str; 6] = [
    "planner",
    "weather_monitor",
    "traffic_analyst",
    "stock_manager",
    "route_optimizer",
    "notifier",
];

/// Per-worker bookkeeping shared between a stub and the test.
#[derive(Default)]
pub struct Calls {
    count: AtomicUsize,
    bundles: Mutex<Vec<Vec<String>>>,
}

impl Calls {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Upstream task ids received by the most recent invocation.
    pub fn last_bundle(&self) -> Vec<String> {
        self.bundles
            .lock()
            .unwrap()
            .last()
            .cloned()
            .unwrap_or_default()
    }
}

/// Returns a fixed payload. Optionally burns salt at `DEPOT` and fails on
/// selected invocations (0-based).
pub struct StubWorker {
    name: String,
    calls: Arc<Calls>,
    salt_per_call: f64,
    fail_on: Vec<usize>,
}

impl StubWorker {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            calls: Arc::new(Calls::default()),
            salt_per_call: 0.0,
            fail_on: Vec::new(),
        }
    }

    pub fn consuming(mut self, salt: f64) -> Self {
        self.salt_per_call = salt;
        self
    }

    pub fn failing_on(mut self, calls: &[usize]) -> Self {
        self.fail_on = calls.to_vec();
        self
    }
}

#[async_trait]
impl Worker for StubWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, input: WorkerInput<'_>) -> anyhow::Result<Payload> {
        let call = self.calls.count.fetch_add(1, Ordering::SeqCst);
        self.calls
            .bundles
            .lock()
            .unwrap()
            .push(input.upstream.keys().cloned().collect());

        if self.salt_per_call > 0.0 {
            input
                .ledger
                .deduct(ResourceKind::Salt, DEPOT, self.salt_per_call)?;
        }
        if self.fail_on.contains(&call) {
            anyhow::bail!("{} failed on call {}", self.name, call);
        }

        let value = json!({
            "worker": self.name,
            "task": input.task_id,
            "region": input.region.as_str(),
            "call": call,
        });
        Ok(value.as_object().cloned().unwrap_or_default())
    }
}

/// Stub registry for the snow-removal graph.
pub struct StubPipeline {
    pub graph: TaskGraph,
    pub registry: WorkerRegistry,
    calls: HashMap<String, Arc<Calls>>,
}

impl StubPipeline {
    pub fn new() -> Self {
        Self::with_workers(ROLES.iter().map(|name| StubWorker::new(name)).collect())
    }

    /// Use the given stubs, filling in plain ones for missing roles.
    pub fn with_workers(mut workers: Vec<StubWorker>) -> Self {
        for role in ROLES {
            if !workers.iter().any(|w| w.name == role) {
                workers.push(StubWorker::new(role));
            }
        }
        let mut registry = WorkerRegistry::new();
        let mut calls = HashMap::new();
        for worker in workers {
            calls.insert(worker.name.clone(), worker.calls.clone());
            registry.register(Arc::new(worker));
        }
        Self {
            graph: TaskGraph::snow_removal(),
            registry,
            calls,
        }
    }

    pub fn calls(&self, worker: &str) -> &Calls {
        &self.calls[worker]
    }

    /// Invocation count per role, in task order.
    pub fn counts(&self) -> Vec<usize> {
        ROLES.iter().map(|r| self.calls(r).count()).collect()
    }

    pub fn executor(&self) -> PipelineExecutor {
        PipelineExecutor::new(self.registry.clone())
    }
}

/// One depot with `salt` tonnes (threshold 100) and plenty of fuel.
pub fn ledger_with_salt(salt: f64) -> InventoryLedger {
    let mut ledger = InventoryLedger::new();
    ledger
        .upsert(InventoryItem::new(ResourceKind::Salt, DEPOT, salt, 100.0))
        .unwrap();
    ledger
        .upsert(InventoryItem::new(ResourceKind::Fuel, DEPOT, 20_000.0, 5_000.0))
        .unwrap();
    ledger
}

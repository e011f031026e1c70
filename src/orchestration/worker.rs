//! Worker contract and registry.
//!
//! A worker executes one task's decision logic. The executor hands it the
//! region, the results of the task's declared dependencies, the delegation
//! flag and the shared inventory ledger, and commits whatever payload comes
//! back. Workers are looked up by name; every name a graph uses is resolved
//! before the first task runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{Payload, Region, TaskGraph, TaskResult};
use crate::error::{Error, Result};
use crate::inventory::InventoryLedger;
use crate::region::RegionCatalog;
use crate::routing::ScoringWeights;

use super::roles::{
    Notifier, Planner, RouteOptimizer, StockManager, TrafficAnalyst, WeatherMonitor,
};

/// Everything a worker receives for one invocation.
pub struct WorkerInput<'a> {
    pub region: &'a Region,
    pub task_id: &'a str,
    /// Results of the task's declared dependencies, keyed by task id.
    pub upstream: &'a BTreeMap<String, TaskResult>,
    /// Advisory permission to consult other workers.
    pub allow_delegation: bool,
    pub ledger: &'a mut InventoryLedger,
}

impl WorkerInput<'_> {
    /// Payload of an upstream task.
    pub fn upstream_payload(&self, task_id: &str) -> anyhow::Result<&Payload> {
        self.upstream
            .get(task_id)
            .map(|r| &r.payload)
            .ok_or_else(|| anyhow::anyhow!("upstream result '{}' not in input bundle", task_id))
    }
}

#[async_trait]
pub trait Worker: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(&self, input: WorkerInput<'_>) -> anyhow::Result<Payload>;
}

/// Worker instances keyed by the name task declarations refer to.
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    workers: HashMap<String, Arc<dyn Worker>>,
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = self.names();
        names.sort_unstable();
        f.debug_struct("WorkerRegistry")
            .field("workers", &names)
            .finish()
    }
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker under its own name, replacing any previous one.
    pub fn register(&mut self, worker: Arc<dyn Worker>) {
        self.workers.insert(worker.name().to_string(), worker);
    }

    pub fn with(mut self, worker: impl Worker + 'static) -> Self {
        self.register(Arc::new(worker));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Worker>> {
        self.workers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.workers.keys().map(String::as_str).collect()
    }

    /// Check that every task of `graph` names a registered worker.
    pub fn resolve(&self, graph: &TaskGraph) -> Result<()> {
        for spec in graph.tasks() {
            if !self.workers.contains_key(&spec.worker) {
                return Err(Error::UnknownWorker {
                    task_id: spec.id.clone(),
                    worker: spec.worker.clone(),
                });
            }
        }
        Ok(())
    }

    /// The six role workers of the snow-removal pipeline.
    pub fn snow_removal(catalog: Arc<RegionCatalog>, weights: ScoringWeights) -> Self {
        Self::new()
            .with(Planner::new(catalog.clone()))
            .with(WeatherMonitor::new(catalog.clone()))
            .with(TrafficAnalyst::new(catalog))
            .with(StockManager)
            .with(RouteOptimizer::new(weights))
            .with(Notifier)
    }
}

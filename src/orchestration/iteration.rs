//! Batch execution for the `train` and `test` modes.
//!
//! The controller owns the inventory ledger and runs the pipeline a given
//! number of times, one iteration after the other. Each iteration starts
//! from an empty context store while the ledger carries over, so stock
//! consumed by one iteration is gone for the next.
//!
//! A task failure inside an iteration is recorded as that iteration's
//! outcome and the batch moves on. Configuration errors, cancellation and
//! I/O failures still end the batch.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::context::{ContextSnapshot, ContextStore};
use crate::core::{Region, RunId, TaskGraph};
use crate::error::{Error, Result};
use crate::inventory::{InventoryLedger, ResourceKind};

use super::executor::PipelineExecutor;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure { reason: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// One sealed pass of the batch loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration_index: usize,
    pub run_id: Option<RunId>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: Outcome,
    pub metrics: BTreeMap<String, f64>,
}

/// An iteration that has started but not been sealed yet.
struct OpenIteration {
    index: usize,
    started_at: DateTime<Utc>,
    clock: Instant,
    salt_before: f64,
    fuel_before: f64,
}

impl OpenIteration {
    fn begin(index: usize, ledger: &InventoryLedger) -> Self {
        Self {
            index,
            started_at: Utc::now(),
            clock: Instant::now(),
            salt_before: ledger.total(ResourceKind::Salt),
            fuel_before: ledger.total(ResourceKind::Fuel),
        }
    }

    fn seal(
        self,
        run_id: Option<RunId>,
        outcome: Outcome,
        snapshot: &ContextSnapshot,
        ledger: &InventoryLedger,
    ) -> IterationRecord {
        let committed = snapshot.entries.iter().filter(|r| r.is_ok()).count();
        let routes: usize = snapshot
            .entries
            .iter()
            .filter_map(|r| r.payload.get("routes")?.as_array().map(Vec::len))
            .sum();

        let metrics = BTreeMap::from([
            ("tasks_committed".to_string(), committed as f64),
            (
                "duration_ms".to_string(),
                self.clock.elapsed().as_secs_f64() * 1000.0,
            ),
            ("routes".to_string(), routes as f64),
            (
                "salt_consumed".to_string(),
                self.salt_before - ledger.total(ResourceKind::Salt),
            ),
            (
                "fuel_consumed".to_string(),
                self.fuel_before - ledger.total(ResourceKind::Fuel),
            ),
            (
                "inventory_alerts".to_string(),
                ledger.check_alerts().len() as f64,
            ),
        ]);

        IterationRecord {
            iteration_index: self.index,
            run_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            outcome,
            metrics,
        }
    }
}

/// Destination for sealed iteration records.
pub trait ResultSink {
    fn record(&mut self, record: &IterationRecord) -> Result<()>;
}

/// Appends one JSON document per line.
pub struct JsonLinesSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonLinesSink {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for JsonLinesSink {
    fn record(&mut self, record: &IterationRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<IterationRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultSink for MemorySink {
    fn record(&mut self, record: &IterationRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    Train,
    Test,
}

impl std::fmt::Display for BatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchMode::Train => write!(f, "train"),
            BatchMode::Test => write!(f, "test"),
        }
    }
}

/// Aggregate of a batch, printed by `train` and `test`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub mode: BatchMode,
    /// Output file for `train`, model name for `test`. Recorded as given.
    pub label: String,
    pub region: Region,
    pub iterations: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub mean_metrics: BTreeMap<String, f64>,
}

impl BatchSummary {
    pub fn from_records(
        mode: BatchMode,
        label: &str,
        region: &Region,
        records: &[IterationRecord],
    ) -> Self {
        let succeeded = records.iter().filter(|r| r.outcome.is_success()).count();

        let mut sums: BTreeMap<String, f64> = BTreeMap::new();
        for record in records {
            for (name, value) in &record.metrics {
                *sums.entry(name.clone()).or_insert(0.0) += value;
            }
        }
        let n = records.len().max(1) as f64;
        let mean_metrics = sums.into_iter().map(|(k, v)| (k, v / n)).collect();

        Self {
            mode,
            label: label.to_string(),
            region: region.clone(),
            iterations: records.len(),
            succeeded,
            failed: records.len() - succeeded,
            mean_metrics,
        }
    }
}

pub struct IterationController {
    executor: PipelineExecutor,
    ledger: InventoryLedger,
}

impl IterationController {
    pub fn new(executor: PipelineExecutor, ledger: InventoryLedger) -> Self {
        Self { executor, ledger }
    }

    pub fn executor(&self) -> &PipelineExecutor {
        &self.executor
    }

    pub fn ledger(&self) -> &InventoryLedger {
        &self.ledger
    }

    pub fn into_ledger(self) -> InventoryLedger {
        self.ledger
    }

    /// Run the pipeline `count` times and seal one record per iteration.
    ///
    /// Every record is handed to `sink` as soon as it is sealed.
    pub async fn run_many(
        &mut self,
        region: &Region,
        graph: &TaskGraph,
        count: usize,
        sink: &mut dyn ResultSink,
    ) -> Result<Vec<IterationRecord>> {
        graph.validate()?;
        info!(%region, count, "Batch started");

        let mut records = Vec::new();
        for index in 0..count {
            let open = OpenIteration::begin(index, &self.ledger);
            let mut store = ContextStore::new();

            let (run_id, outcome) = match self
                .executor
                .run_in(region, graph, &mut self.ledger, &mut store)
                .await
            {
                Ok(run_id) => (Some(run_id), Outcome::Success),
                Err(Error::TaskExecution { task_id, cause }) => {
                    warn!(iteration = index, task = %task_id, %cause, "Iteration failed");
                    (
                        None,
                        Outcome::Failure {
                            reason: format!("{}: {}", task_id, cause),
                        },
                    )
                }
                Err(e) => return Err(e),
            };

            let record = open.seal(run_id, outcome, &store.snapshot(), &self.ledger);
            info!(
                iteration = index,
                success = record.outcome.is_success(),
                "Iteration sealed"
            );
            sink.record(&record)?;
            records.push(record);
        }

        Ok(records)
    }
}

//! Pipeline executor.
//!
//! Walks a [`TaskGraph`] in topological order, one task at a time. Each task
//! gets the results of its declared dependencies, the region and the shared
//! inventory ledger; its result is committed to the [`ContextStore`] and,
//! when a [`CheckpointStore`] is attached, persisted right away.
//!
//! A worker failure is committed as a failed result and halts the run with
//! [`Error::TaskExecution`]. Replay restores every result that precedes the
//! resume point from a snapshot and re-invokes workers only from there on.

use std::collections::BTreeMap;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::context::{CheckpointStore, ContextSnapshot, ContextStore};
use crate::core::{Region, RunId, TaskGraph, TaskResult, TaskSpec};
use crate::error::{Error, Result};
use crate::inventory::InventoryLedger;

use super::worker::{WorkerInput, WorkerRegistry};

/// Lifecycle events emitted while a pipeline runs.
///
/// These let a front end report progress without polling the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorEvent {
    RunStarted { run_id: RunId, resume_at: Option<String> },
    TaskStarted { task_id: String, worker: String },
    TaskCommitted { task_id: String },
    TaskFailed { task_id: String, cause: String },
    RunFinished { run_id: RunId },
}

pub struct PipelineExecutor {
    registry: WorkerRegistry,
    checkpoints: Option<CheckpointStore>,
    cancel: CancellationToken,
    events: Option<mpsc::Sender<ExecutorEvent>>,
}

impl PipelineExecutor {
    pub fn new(registry: WorkerRegistry) -> Self {
        Self {
            registry,
            checkpoints: None,
            cancel: CancellationToken::new(),
            events: None,
        }
    }

    /// Persist a checkpoint after every commit.
    pub fn with_checkpoints(mut self, store: CheckpointStore) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn with_events(mut self, tx: mpsc::Sender<ExecutorEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Share an externally owned cancellation token.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn checkpoints(&self) -> Option<&CheckpointStore> {
        self.checkpoints.as_ref()
    }

    /// Token that stops the run before its next task when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute every task of `graph` and return the final context.
    pub async fn run(
        &self,
        region: &Region,
        graph: &TaskGraph,
        ledger: &mut InventoryLedger,
    ) -> Result<ContextSnapshot> {
        let mut store = ContextStore::new();
        self.run_in(region, graph, ledger, &mut store).await?;
        Ok(store.snapshot())
    }

    /// Like [`run`](Self::run), committing into a caller-owned store so the
    /// partial context survives a failure.
    pub async fn run_in(
        &self,
        region: &Region,
        graph: &TaskGraph,
        ledger: &mut InventoryLedger,
        store: &mut ContextStore,
    ) -> Result<RunId> {
        let order = self.prepare(graph)?;
        let run_id = RunId::new();
        info!(run = %run_id.short(), %region, tasks = order.len(), "Pipeline run started");
        self.emit(ExecutorEvent::RunStarted {
            run_id,
            resume_at: None,
        })
        .await;

        self.execute(&run_id, region, &order, 0, ledger, store).await?;
        Ok(run_id)
    }

    /// Resume at `from_task`, taking every earlier result from `snapshot`.
    ///
    /// Workers of tasks before `from_task` in topological order are never
    /// invoked; their results are restored as they are in the snapshot.
    ///
    /// # Errors
    /// - `NotFound` if `from_task` is not part of the graph
    /// - `CheckpointGap` if the snapshot lacks a successful result for any
    ///   task that precedes `from_task`
    pub async fn replay(
        &self,
        region: &Region,
        graph: &TaskGraph,
        from_task: &str,
        snapshot: &ContextSnapshot,
        ledger: &mut InventoryLedger,
    ) -> Result<ContextSnapshot> {
        let mut store = ContextStore::new();
        self.replay_in(region, graph, from_task, snapshot, ledger, &mut store)
            .await?;
        Ok(store.snapshot())
    }

    pub async fn replay_in(
        &self,
        region: &Region,
        graph: &TaskGraph,
        from_task: &str,
        snapshot: &ContextSnapshot,
        ledger: &mut InventoryLedger,
        store: &mut ContextStore,
    ) -> Result<RunId> {
        let order = self.prepare(graph)?;
        let start = order
            .iter()
            .position(|s| s.id == from_task)
            .ok_or_else(|| Error::NotFound(format!("task {}", from_task)))?;

        let mut restored = Vec::with_capacity(start);
        for spec in &order[..start] {
            match snapshot.get(&spec.id) {
                Some(result) if result.is_ok() => restored.push(result.clone()),
                _ => {
                    return Err(Error::CheckpointGap {
                        task_id: spec.id.clone(),
                        resume_at: from_task.to_string(),
                    })
                }
            }
        }
        store.restore(ContextSnapshot { entries: restored });

        let run_id = RunId::new();
        info!(
            run = %run_id.short(),
            %region,
            resume_at = from_task,
            restored = start,
            "Pipeline replay started"
        );
        self.emit(ExecutorEvent::RunStarted {
            run_id,
            resume_at: Some(from_task.to_string()),
        })
        .await;

        self.execute(&run_id, region, &order, start, ledger, store)
            .await?;
        Ok(run_id)
    }

    /// Validate the graph, resolve its workers and fix the task order.
    fn prepare<'g>(&self, graph: &'g TaskGraph) -> Result<Vec<&'g TaskSpec>> {
        let order = graph.topological_order()?;
        self.registry.resolve(graph)?;
        Ok(order)
    }

    async fn execute(
        &self,
        run_id: &RunId,
        region: &Region,
        order: &[&TaskSpec],
        start: usize,
        ledger: &mut InventoryLedger,
        store: &mut ContextStore,
    ) -> Result<()> {
        for (position, spec) in order.iter().enumerate().skip(start) {
            if self.cancel.is_cancelled() {
                warn!(run = %run_id.short(), task = %spec.id, "Run cancelled");
                return Err(Error::Cancelled(spec.id.clone()));
            }

            let worker = self
                .registry
                .get(&spec.worker)
                .ok_or_else(|| Error::UnknownWorker {
                    task_id: spec.id.clone(),
                    worker: spec.worker.clone(),
                })?;

            let mut upstream = BTreeMap::new();
            for dep in &spec.depends_on {
                let result = store.get(dep).map_err(|_| Error::MissingDependency {
                    task_id: spec.id.clone(),
                    dependency: dep.clone(),
                })?;
                upstream.insert(dep.clone(), result.clone());
            }

            debug!(task = %spec.id, worker = %spec.worker, inputs = upstream.len(), "Task started");
            self.emit(ExecutorEvent::TaskStarted {
                task_id: spec.id.clone(),
                worker: spec.worker.clone(),
            })
            .await;

            let outcome = worker
                .invoke(WorkerInput {
                    region,
                    task_id: &spec.id,
                    upstream: &upstream,
                    allow_delegation: spec.allow_delegation,
                    ledger: &mut *ledger,
                })
                .await;

            match outcome {
                Ok(payload) => {
                    store.commit(TaskResult::ok(&spec.id, payload));
                    self.checkpoint(run_id, position + 1, &spec.id, store)?;
                    info!(task = %spec.id, "Task committed");
                    self.emit(ExecutorEvent::TaskCommitted {
                        task_id: spec.id.clone(),
                    })
                    .await;
                }
                Err(err) => {
                    let cause = format!("{:#}", err);
                    store.commit(TaskResult::failed(&spec.id, &cause));
                    self.checkpoint(run_id, position + 1, &spec.id, store)?;
                    error!(task = %spec.id, %cause, "Task failed");
                    self.emit(ExecutorEvent::TaskFailed {
                        task_id: spec.id.clone(),
                        cause: cause.clone(),
                    })
                    .await;
                    return Err(Error::TaskExecution {
                        task_id: spec.id.clone(),
                        cause,
                    });
                }
            }
        }

        info!(run = %run_id.short(), committed = store.len(), "Pipeline run finished");
        self.emit(ExecutorEvent::RunFinished { run_id: *run_id }).await;
        Ok(())
    }

    fn checkpoint(
        &self,
        run_id: &RunId,
        sequence: usize,
        task_id: &str,
        store: &ContextStore,
    ) -> Result<()> {
        if let Some(checkpoints) = &self.checkpoints {
            checkpoints.save(run_id, sequence, task_id, &store.snapshot())?;
        }
        Ok(())
    }

    async fn emit(&self, event: ExecutorEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }
}

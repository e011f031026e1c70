//! In-memory store of task outputs for one run.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::core::task::TaskResult;
use crate::error::{Error, Result};

/// Every committed result at a point in time, in commit order.
///
/// Snapshots are plain values: cloning one yields a fully independent copy
/// and the serialized form round-trips exactly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub entries: Vec<TaskResult>,
}

impl ContextSnapshot {
    pub fn get(&self, task_id: &str) -> Option<&TaskResult> {
        self.entries.iter().find(|r| r.task_id == task_id)
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.get(task_id).is_some()
    }

    /// Task ids in commit order.
    pub fn task_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|r| r.task_id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Mapping from task id to the result it produced.
///
/// Results are immutable once committed; committing the same task id again
/// replaces the whole entry and moves it to the end of the commit order.
#[derive(Debug, Default)]
pub struct ContextStore {
    results: HashMap<String, TaskResult>,
    order: Vec<String>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit a result, stamping `produced_at` with the commit time.
    pub fn commit(&mut self, mut result: TaskResult) {
        result.produced_at = Utc::now();
        if self.results.contains_key(&result.task_id) {
            self.order.retain(|id| id != &result.task_id);
        }
        self.order.push(result.task_id.clone());
        self.results.insert(result.task_id.clone(), result);
    }

    /// Look up a committed result.
    pub fn get(&self, task_id: &str) -> Result<&TaskResult> {
        self.results
            .get(task_id)
            .ok_or_else(|| Error::NotFound(format!("context entry for task {}", task_id)))
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.results.contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Deep copy of the current state.
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            entries: self
                .order
                .iter()
                .filter_map(|id| self.results.get(id).cloned())
                .collect(),
        }
    }

    /// Replace the in-memory state wholesale.
    pub fn restore(&mut self, snapshot: ContextSnapshot) {
        self.results.clear();
        self.order.clear();
        for entry in snapshot.entries {
            if self.results.contains_key(&entry.task_id) {
                self.order.retain(|id| id != &entry.task_id);
            }
            self.order.push(entry.task_id.clone());
            self.results.insert(entry.task_id.clone(), entry);
        }
    }
}

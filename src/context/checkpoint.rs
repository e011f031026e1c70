//! Durable checkpoints keyed by run id and task id.
//!
//! Layout under the checkpoint root:
//!
//! ```text
//! <root>/latest                         newest run id
//! <root>/<run_id>/<seq>-<task_id>.json  snapshot taken after committing task_id
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::store::ContextSnapshot;
use crate::core::task::RunId;
use crate::error::{Error, Result};

/// A persisted snapshot together with where it was taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: RunId,
    pub task_id: String,
    pub sequence: usize,
    pub saved_at: DateTime<Utc>,
    pub snapshot: ContextSnapshot,
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    root: PathBuf,
}

impl CheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_dir(&self, run_id: &RunId) -> PathBuf {
        self.root.join(run_id.to_string())
    }

    fn latest_path(&self) -> PathBuf {
        self.root.join("latest")
    }

    /// Persist the snapshot taken right after `task_id` was committed.
    pub fn save(
        &self,
        run_id: &RunId,
        sequence: usize,
        task_id: &str,
        snapshot: &ContextSnapshot,
    ) -> Result<PathBuf> {
        let dir = self.run_dir(run_id);
        fs::create_dir_all(&dir)?;

        let checkpoint = Checkpoint {
            run_id: *run_id,
            task_id: task_id.to_string(),
            sequence,
            saved_at: Utc::now(),
            snapshot: snapshot.clone(),
        };
        let path = dir.join(format!("{:03}-{}.json", sequence, task_id));
        fs::write(&path, serde_json::to_string_pretty(&checkpoint)?)?;
        fs::write(self.latest_path(), run_id.to_string())?;
        debug!(run = %run_id.short(), task = task_id, sequence, "Checkpoint saved");
        Ok(path)
    }

    /// The run most recently checkpointed.
    pub fn latest_run(&self) -> Result<RunId> {
        let path = self.latest_path();
        if !path.exists() {
            return Err(Error::NotFound(format!(
                "no checkpointed runs under {}",
                self.root.display()
            )));
        }
        fs::read_to_string(&path)?
            .trim()
            .parse()
            .map_err(|e| Error::Validation(format!("corrupt latest run marker: {}", e)))
    }

    /// The newest checkpoint of a run.
    pub fn latest(&self, run_id: &RunId) -> Result<Checkpoint> {
        let path = self
            .entries(run_id)?
            .pop()
            .ok_or_else(|| Error::NotFound(format!("checkpoints for run {}", run_id)))?;
        read_checkpoint(&path)
    }

    /// The newest checkpoint taken after committing `task_id`.
    pub fn load(&self, run_id: &RunId, task_id: &str) -> Result<Checkpoint> {
        let suffix = format!("-{}.json", task_id);
        let path = self
            .entries(run_id)?
            .into_iter()
            .rev()
            .find(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.ends_with(&suffix))
                    .unwrap_or(false)
            })
            .ok_or_else(|| {
                Error::NotFound(format!("checkpoint for task {} in run {}", task_id, run_id))
            })?;
        read_checkpoint(&path)
    }

    /// Checkpoint files of a run, oldest first.
    fn entries(&self, run_id: &RunId) -> Result<Vec<PathBuf>> {
        let dir = self.run_dir(run_id);
        if !dir.exists() {
            return Err(Error::NotFound(format!("run {}", run_id)));
        }
        let mut paths: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().map(|x| x == "json").unwrap_or(false))
            .collect();
        // Zero-padded sequence prefixes sort lexically.
        paths.sort();
        Ok(paths)
    }
}

fn read_checkpoint(path: &Path) -> Result<Checkpoint> {
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

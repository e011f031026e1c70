//! Task data model for the pipeline.
//!
//! A `TaskSpec` is the static declaration of one pipeline step; a
//! `TaskResult` is what a worker produced for it during a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Free-form structured output of a worker.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Operational scope of a run, threaded through every task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Region(String);

impl Region {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for one pipeline run.
///
/// Uses UUID v4 for generation and provides a short form display
/// for human-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Create a new unique run identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Static declaration of a pipeline task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Unique task identifier within a graph.
    pub id: String,
    /// Name of the worker that executes this task.
    pub worker: String,
    /// Upstream task ids whose outputs this task consumes, in declaration order.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Permission for the worker to consult other workers. Advisory only.
    #[serde(default)]
    pub allow_delegation: bool,
}

impl TaskSpec {
    pub fn new(id: &str, worker: &str) -> Self {
        Self {
            id: id.to_string(),
            worker: worker.to_string(),
            depends_on: Vec::new(),
            allow_delegation: false,
        }
    }

    /// Builder-style dependency declaration.
    pub fn depends_on(mut self, deps: &[&str]) -> Self {
        self.depends_on = deps.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn with_delegation(mut self) -> Self {
        self.allow_delegation = true;
        self
    }
}

/// Outcome of a committed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TaskStatus {
    Ok,
    Failed {
        /// Error message describing the failure.
        error: String,
    },
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Ok => write!(f, "ok"),
            TaskStatus::Failed { error } => write!(f, "failed: {}", error),
        }
    }
}

/// Output of one task within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub produced_at: DateTime<Utc>,
    pub payload: Payload,
    pub status: TaskStatus,
}

impl TaskResult {
    /// A successful result carrying the worker's payload.
    pub fn ok(task_id: &str, payload: Payload) -> Self {
        Self {
            task_id: task_id.to_string(),
            produced_at: Utc::now(),
            payload,
            status: TaskStatus::Ok,
        }
    }

    /// A failed result with an empty payload.
    pub fn failed(task_id: &str, error: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            produced_at: Utc::now(),
            payload: Payload::new(),
            status: TaskStatus::Failed {
                error: error.to_string(),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.status, TaskStatus::Ok)
    }
}

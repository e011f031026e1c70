use thiserror::Error;

use crate::inventory::ResourceKind;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Cycle detected in task graph at task: {task_id}")]
    Cycle { task_id: String },

    #[error("Task {task_id} depends on unknown task {dependency}")]
    UnknownDependency { task_id: String, dependency: String },

    #[error("Duplicate task id: {0}")]
    DuplicateTask(String),

    #[error("No worker registered as {worker} (required by task {task_id})")]
    UnknownWorker { task_id: String, worker: String },

    #[error("Task {task_id} is missing the upstream result of {dependency}")]
    MissingDependency { task_id: String, dependency: String },

    #[error("Checkpoint has no usable result for {task_id}, required to resume at {resume_at}")]
    CheckpointGap { task_id: String, resume_at: String },

    #[error("Task {task_id} failed: {cause}")]
    TaskExecution { task_id: String, cause: String },

    #[error("Insufficient {kind} at {location}: requested {requested}, available {available}")]
    InsufficientStock {
        kind: ResourceKind,
        location: String,
        requested: f64,
        available: f64,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Run cancelled before task {0}")]
    Cancelled(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl Error {
    /// Errors raised while loading or resolving a task graph. Never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_)
                | Error::Cycle { .. }
                | Error::UnknownDependency { .. }
                | Error::DuplicateTask(_)
                | Error::UnknownWorker { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

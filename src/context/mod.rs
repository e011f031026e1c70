//! Run context: task outputs in memory and checkpoints on disk.

pub mod checkpoint;
pub mod store;

pub use checkpoint::{Checkpoint, CheckpointStore};
pub use store::{ContextSnapshot, ContextStore};

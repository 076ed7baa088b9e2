//! Checkpoint persistence: compressed per-role weight blobs plus a JSON
//! training-state descriptor, written atomically and pruned by age.

pub mod codec;
mod manager;
mod metadata;

pub use manager::{blob_file_name, CheckpointKind, CheckpointManager, CheckpointManagerConfig};
pub use metadata::{CheckpointMetrics, TrainingState};

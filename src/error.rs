use std::path::PathBuf;

use crate::agent::Role;

/// Errors that can occur during checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint directory not found: {0}")]
    DirNotFound(PathBuf),

    #[error("checkpoint directory {path} is not writable: {source}")]
    Unwritable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read training state from {path}: {source}")]
    StateRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse training state from {path}: {source}")]
    StateParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to decode {path}: {source}")]
    Codec {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to export {role} weights: {source}")]
    WeightExport { role: Role, source: AgentError },

    #[error("failed to restore {role} weights: {source}")]
    WeightImport { role: Role, source: AgentError },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by a policy while acting, updating or moving weights.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("weight snapshot for {snapshot} does not fit the {expected} network")]
    PolicyLoadMismatch { expected: Role, snapshot: Role },

    #[error("weight shape mismatch for {role}: expected {expected}, got {actual}")]
    ShapeMismatch {
        role: Role,
        expected: String,
        actual: String,
    },

    #[error("action does not match the {role} action head")]
    ActionKind { role: Role },

    #[error("observation has {actual} features, network expects {expected}")]
    ObservationSize { expected: usize, actual: usize },

    #[error("weight record error: {0}")]
    Record(String),
}

/// Errors from the delta cache and its precompute pool.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("baseline simulation is infeasible")]
    InfeasibleBaseline,

    #[error("simulator failed: {0}")]
    Simulator(String),

    #[error("precompute requires a non-empty intervention library")]
    EmptyLibrary,

    #[error("failed to persist cache to {path}: {source}")]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur during training.
#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error("rollout on worker {worker_id} failed: {reason}")]
    WorkerFailure { worker_id: usize, reason: String },

    #[error("environment error: {0}")]
    Environment(String),

    #[error("all rollout workers have exited")]
    WorkersGone,

    #[error("agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("config validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_error_display() {
        let err = CheckpointError::DirNotFound(PathBuf::from("checkpoints"));
        assert_eq!(err.to_string(), "checkpoint directory not found: checkpoints");
    }

    #[test]
    fn test_policy_load_mismatch_display() {
        let err = AgentError::PolicyLoadMismatch {
            expected: Role::Tumor,
            snapshot: Role::SinkDesigner,
        };
        assert_eq!(
            err.to_string(),
            "weight snapshot for sink_designer does not fit the tumor network"
        );
    }

    #[test]
    fn test_worker_failure_display() {
        let err = TrainingError::WorkerFailure {
            worker_id: 3,
            reason: "solver crashed".to_string(),
        };
        assert_eq!(err.to_string(), "rollout on worker 3 failed: solver crashed");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Validation("learning_rate must be > 0".to_string());
        assert_eq!(
            err.to_string(),
            "config validation error: learning_rate must be > 0"
        );
    }
}

use serde::{Deserialize, Serialize};

use crate::agent::RoleMap;
use crate::config::AppConfig;

/// Running statistics at checkpoint time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointMetrics {
    pub mean_return: f32,
    pub mean_length: f32,
    pub total_episodes: usize,
}

/// Descriptor written to `training_state.json` in every checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingState {
    pub global_timesteps: u64,
    pub timestamp: u64,
    /// Compression applied to the weight blobs.
    pub checkpoint_format: String,
    pub entropy_coefs: RoleMap<f32>,
    /// Learner version per role when the checkpoint was written.
    #[serde(default)]
    pub versions: RoleMap<u64>,
    #[serde(default)]
    pub metrics: CheckpointMetrics,
    pub config: AppConfig,
}

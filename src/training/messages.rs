//! Messages exchanged between the coordinator and rollout workers.

use std::sync::Arc;

use crate::agent::{Role, RoleMap, WeightSnapshot};
use crate::error::TrainingError;
use crate::training::trajectory::Trajectory;

/// Work item for one episode: the freshest weights of both roles.
#[derive(Debug, Clone)]
pub struct RolloutRequest {
    pub weights: RoleMap<Arc<WeightSnapshot>>,
    pub seed: u64,
}

/// A finished episode.
#[derive(Debug)]
pub struct RolloutResult {
    pub trajectory: Trajectory,
    pub episode_return: f32,
    pub episode_length: usize,
    pub role: Role,
    pub worker_id: usize,
}

/// What a worker sends back for each request it took.
#[derive(Debug)]
pub struct WorkerReport {
    pub worker_id: usize,
    pub outcome: Result<RolloutResult, TrainingError>,
}

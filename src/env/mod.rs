//! Environment interface for the self-play rollouts.

pub mod surrogate;

pub use surrogate::{EnvConfig, SurrogateRedoxEnv};

use crate::agent::{Action, ActionSpec};
use crate::error::TrainingError;

/// Fixed-length observation vector.
pub type Observation = Vec<f32>;

/// Auxiliary per-step information reported by the environment.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepInfo {
    pub primary_outcome: f32,
    pub growth_rate: f32,
    pub cofactor_ratio: f32,
    pub confidence: f32,
}

/// Result of an environment step.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub observation: Observation,
    pub reward: f32,
    /// The episode reached a terminal state.
    pub terminated: bool,
    /// The episode hit its step limit.
    pub truncated: bool,
    pub info: StepInfo,
}

impl StepResult {
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Core trait for self-play environments.
///
/// One environment instance is owned by one rollout worker and plays from the
/// perspective of that worker's role.
pub trait Environment {
    fn observation_dim(&self) -> usize;

    /// Action head of the role this environment was built for.
    fn action_spec(&self) -> ActionSpec;

    fn reset(&mut self, seed: u64) -> Result<(Observation, StepInfo), TrainingError>;

    fn step(&mut self, action: &Action) -> Result<StepResult, TrainingError>;

    /// Opponent's move for the upcoming step.
    fn set_opponent_action(&mut self, _action: &Action) {}

    /// Drop per-episode state after a rollout.
    fn release(&mut self) {}
}

use crate::agent::{Action, Role};
use crate::env::StepInfo;

/// One environment transition as recorded by the behavior policy.
#[derive(Debug, Clone)]
pub struct Step {
    pub observation: Vec<f32>,
    pub action: Action,
    pub reward: f32,
    /// Behavior policy's value estimate for `observation`.
    pub value: f32,
    /// Behavior policy's log-probability of `action`.
    pub log_prob: f32,
    pub done: bool,
    pub info: StepInfo,
}

/// Ordered rollout produced by one worker for one role.
///
/// Per-step fields live together in [`Step`] so the parallel sequences the
/// learner reads are always index-aligned.
#[derive(Debug, Clone)]
pub struct Trajectory {
    role: Role,
    steps: Vec<Step>,
}

impl Trajectory {
    pub fn new(role: Role, capacity: usize) -> Self {
        Trajectory {
            role,
            steps: Vec::with_capacity(capacity),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn rewards(&self) -> Vec<f32> {
        self.steps.iter().map(|s| s.reward).collect()
    }

    pub fn values(&self) -> Vec<f32> {
        self.steps.iter().map(|s| s.value).collect()
    }

    pub fn dones(&self) -> Vec<bool> {
        self.steps.iter().map(|s| s.done).collect()
    }

    pub fn behavior_log_probs(&self) -> Vec<f32> {
        self.steps.iter().map(|s| s.log_prob).collect()
    }

    /// Observations concatenated row-major, ready to reshape into a batch.
    pub fn observations_flat(&self) -> Vec<f32> {
        self.steps
            .iter()
            .flat_map(|s| s.observation.iter().copied())
            .collect()
    }

    /// Undiscounted sum of rewards.
    pub fn episode_return(&self) -> f32 {
        self.steps.iter().map(|s| s.reward).sum()
    }
}

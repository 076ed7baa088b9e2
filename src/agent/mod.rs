pub mod action;
pub mod distribution;
mod grad_norm;
pub mod impala;
pub mod network;
pub mod policy;
pub mod role;
pub mod schedule;
pub mod weights;

pub use action::{Action, ActionSpec, Compartment, ConstructSlot, MAX_COPY_NUMBER, MIN_COPY_NUMBER};
pub use impala::{AgentConfig, ImpalaAgent, InferBackend, TrainBackend};
pub use network::{NetworkShape, PolicyValueNetwork, PolicyValueNetworkConfig};
pub use policy::RolloutPolicy;
pub use role::{Role, RoleMap};
pub use schedule::{EntropySchedule, EntropyScheduleConfig, TrainingProgress};
pub use weights::WeightSnapshot;

use crate::error::AgentError;

/// Metrics returned from a learner update.
#[derive(Debug, Clone, Default)]
pub struct UpdateMetrics {
    pub total_loss: f32,
    pub policy_loss: f32,
    pub value_loss: f32,
    pub entropy: f32,
    pub entropy_coef: f32,
    /// Mean untruncated importance ratio over the trajectory.
    pub mean_rho: f32,
    /// False when the trajectory was too short to learn from.
    pub applied: bool,
}

/// What a policy produced for one observation.
#[derive(Debug, Clone)]
pub struct PolicyOutput<S> {
    /// Raw policy-head parameters for one observation.
    pub params: Vec<f32>,
    pub value: f32,
    pub state: S,
}

/// Bookkeeping attached to an action by the acting policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActInfo {
    pub value: f32,
    pub log_prob: f32,
}

/// Opaque acting interface of a policy model.
///
/// `Recurrent` is the hidden state threaded between calls; feed-forward
/// models use `()`.
pub trait PolicyModel {
    type Recurrent: Clone + Default;

    fn forward(
        &self,
        observation: &[f32],
        state: Self::Recurrent,
    ) -> Result<PolicyOutput<Self::Recurrent>, AgentError>;

    /// Pick an action; deterministic selection uses the distribution mode.
    fn act(&mut self, observation: &[f32], deterministic: bool) -> Result<(Action, ActInfo), AgentError>;
}

/// Lifecycle hooks the coordinator and checkpoint manager need from a learner.
pub trait TrainableAgent {
    fn role(&self) -> Role;
    /// Serialized network weights.
    fn export_weights(&self) -> Result<Vec<u8>, AgentError>;
    fn import_weights(&mut self, bytes: &[u8]) -> Result<(), AgentError>;
    fn entropy_coef(&self) -> f32;
    fn restore_entropy_coef(&mut self, coef: f32);
}

use burn::backend::{Autodiff, NdArray};
use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::TensorData;
use burn::tensor::activation::{log_softmax, softmax};
use burn::tensor::backend::AutodiffBackend;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::action::{Action, ActionSpec, Compartment};
use super::distribution::{gaussian_entropy, select_action};
use super::grad_norm::clip_global_norm;
use super::network::{NetworkShape, PolicyValueNetwork, PolicyValueNetworkConfig};
use super::role::Role;
use super::schedule::{EntropySchedule, EntropyScheduleConfig, TrainingProgress};
use super::weights::{WeightSnapshot, decode_network, encode_network};
use super::{ActInfo, TrainableAgent, UpdateMetrics};
use crate::config::AppConfig;
use crate::error::AgentError;
use crate::training::Trajectory;
use crate::vtrace::{VTraceInput, VTraceParams, vtrace_targets};

pub type InferBackend = NdArray<f32>;
pub type TrainBackend = Autodiff<InferBackend>;

const LN_2PI: f32 = 1.837_877_1;

/// Architecture and exploration settings shared by both learners.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub hidden_dim: usize,
    /// Standard deviation of the tumor's Gaussian exploration noise.
    pub exploration_std: f32,
    /// Length of the tumor pressure vector.
    pub tumor_action_dim: usize,
    /// Number of slots in a sink-designer construct.
    pub max_slots: usize,
    pub tumor_entropy: EntropyScheduleConfig,
    pub sink_designer_entropy: EntropyScheduleConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            hidden_dim: 128,
            exploration_std: 0.1,
            tumor_action_dim: 10,
            max_slots: 3,
            tumor_entropy: EntropyScheduleConfig::tumor(),
            sink_designer_entropy: EntropyScheduleConfig::sink_designer(),
        }
    }
}

impl AgentConfig {
    pub fn entropy_schedule(&self, role: Role) -> EntropyScheduleConfig {
        match role {
            Role::Tumor => self.tumor_entropy,
            Role::SinkDesigner => self.sink_designer_entropy,
        }
    }
}

/// IMPALA learner for one role.
///
/// Owns the trainable network and optimizer; rollout workers only ever see
/// [`WeightSnapshot`]s produced by [`ImpalaAgent::snapshot`].
pub struct ImpalaAgent<B: AutodiffBackend> {
    role: Role,
    spec: ActionSpec,
    shape: NetworkShape,
    network: PolicyValueNetwork<B>,
    optimizer: OptimizerAdaptor<Adam, PolicyValueNetwork<B>, B>,
    learning_rate: f64,
    max_grad_norm: f32,
    vtrace: VTraceParams,
    value_coef: f32,
    exploration_std: f32,
    entropy: EntropySchedule,
    version: u64,
    device: B::Device,
    rng: StdRng,
}

impl<B: AutodiffBackend> ImpalaAgent<B> {
    pub fn new(role: Role, config: &AppConfig, device: B::Device) -> Self {
        let spec = config.action_spec(role);
        let shape = config.network_shape(role);
        let network = PolicyValueNetworkConfig::from_shape(&shape).init(&device);
        let optimizer = AdamConfig::new().init();
        let training = &config.training;

        ImpalaAgent {
            role,
            spec,
            shape,
            network,
            optimizer,
            learning_rate: training.learning_rate,
            max_grad_norm: training.max_grad_norm,
            vtrace: VTraceParams {
                discount: training.discount,
                rho_bar: training.rho_bar,
                c_bar: training.c_bar,
            },
            value_coef: training.value_coef,
            exploration_std: config.agent.exploration_std,
            entropy: EntropySchedule::new(
                training.entropy_coef,
                config.agent.entropy_schedule(role),
            ),
            version: 0,
            device,
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn action_spec(&self) -> ActionSpec {
        self.spec
    }

    pub fn shape(&self) -> NetworkShape {
        self.shape
    }

    /// Bumped by every applied update and every weight import.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Immutable weight copy for broadcast to rollout workers.
    pub fn snapshot(&self) -> Result<WeightSnapshot, AgentError> {
        Ok(WeightSnapshot {
            role: self.role,
            version: self.version,
            shape: self.shape,
            bytes: std::sync::Arc::new(encode_network(&self.network)?),
        })
    }

    /// Act with the learner's own weights, e.g. for evaluation.
    pub fn act(&mut self, observation: &[f32], deterministic: bool) -> Result<(Action, ActInfo), AgentError> {
        if observation.len() != self.shape.obs_dim {
            return Err(AgentError::ObservationSize {
                expected: self.shape.obs_dim,
                actual: observation.len(),
            });
        }
        let network = self.network.valid();
        let input = Tensor::<B::InnerBackend, 1>::from_data(TensorData::from(observation), &self.device)
            .reshape([1, self.shape.obs_dim]);
        let (head, value) = network.forward(input);
        let head: Vec<f32> = to_host(head)?;
        let value: Vec<f32> = to_host(value)?;
        let (action, log_prob) = select_action(
            &self.spec,
            &head,
            deterministic,
            self.exploration_std,
            &mut self.rng,
        );
        Ok((
            action,
            ActInfo {
                value: value[0],
                log_prob,
            },
        ))
    }

    /// One V-trace update from a single trajectory.
    ///
    /// Trajectories shorter than two steps carry no learnable transition and
    /// are skipped; the entropy coefficient still anneals.
    pub fn update(
        &mut self,
        trajectory: &Trajectory,
        progress: Option<TrainingProgress>,
    ) -> Result<UpdateMetrics, AgentError> {
        let len = trajectory.len();
        if len < 2 {
            let entropy_coef = self.entropy.step(progress);
            return Ok(UpdateMetrics {
                entropy_coef,
                ..Default::default()
            });
        }

        let observations = trajectory.observations_flat();
        if observations.len() != len * self.shape.obs_dim {
            return Err(AgentError::ObservationSize {
                expected: self.shape.obs_dim,
                actual: observations.len() / len,
            });
        }
        let input = Tensor::<B, 1>::from_data(TensorData::new(observations, [len * self.shape.obs_dim]), &self.device)
            .reshape([len, self.shape.obs_dim]);

        let (head, values) = self.network.forward(input);
        let values = values.reshape([len]);
        let (log_probs, entropy) = self.evaluate_actions(head, trajectory)?;

        // Detached copies for the target computation
        let target_log_probs: Vec<f32> = to_host(log_probs.clone())?;
        let predicted: Vec<f32> = to_host(values.clone())?;

        let rewards = trajectory.rewards();
        let behavior_values = trajectory.values();
        let dones = trajectory.dones();
        let behavior_log_probs = trajectory.behavior_log_probs();
        let vtrace = vtrace_targets(
            &VTraceInput {
                rewards: &rewards,
                values: &behavior_values,
                dones: &dones,
                behavior_log_probs: &behavior_log_probs,
                target_log_probs: &target_log_probs,
                bootstrap_value: predicted[len - 1],
            },
            &self.vtrace,
        );

        // The last step only supplies the bootstrap target
        let n = len - 1;
        let advantages = vtrace.advantages(&predicted[..n]);
        let targets = self.constant(vtrace.targets[..n].to_vec());
        let advantages = self.constant(advantages);

        let value_diff = values.slice([0..n]) - targets;
        let value_loss = (value_diff.clone() * value_diff).mean();
        let policy_loss = -(log_probs.slice([0..n]) * advantages).mean();
        let entropy_bonus = entropy.slice([0..n]).mean();

        let entropy_coef = self.entropy.coef();
        let total_loss = policy_loss.clone() + value_loss.clone() * self.value_coef
            - entropy_bonus.clone() * entropy_coef;

        let metrics = UpdateMetrics {
            total_loss: scalar(total_loss.clone())?,
            policy_loss: scalar(policy_loss)?,
            value_loss: scalar(value_loss)?,
            entropy: scalar(entropy_bonus)?,
            entropy_coef,
            mean_rho: vtrace.mean_rho(),
            applied: true,
        };

        let grads = total_loss.backward();
        let mut grads = GradientsParams::from_grads(grads, &self.network);
        let grad_norm = clip_global_norm(&self.network, &mut grads, self.max_grad_norm);
        self.network = self
            .optimizer
            .step(self.learning_rate, self.network.clone(), grads);
        self.version += 1;

        let next_coef = self.entropy.step(progress);
        debug!(
            role = %self.role,
            version = self.version,
            total_loss = metrics.total_loss,
            grad_norm,
            entropy_coef = next_coef,
            "applied update"
        );

        Ok(metrics)
    }

    /// Log-probabilities of the recorded actions and per-step entropies.
    fn evaluate_actions(
        &self,
        head: Tensor<B, 2>,
        trajectory: &Trajectory,
    ) -> Result<(Tensor<B, 1>, Tensor<B, 1>), AgentError> {
        let len = trajectory.len();
        match self.spec {
            ActionSpec::Continuous { dim } => {
                let mut taken = Vec::with_capacity(len * dim);
                for step in trajectory.steps() {
                    match &step.action {
                        Action::Continuous(values) if values.len() == dim => {
                            taken.extend_from_slice(values)
                        }
                        _ => return Err(AgentError::ActionKind { role: self.role }),
                    }
                }
                let taken = Tensor::<B, 1>::from_data(TensorData::new(taken, [len * dim]), &self.device)
                    .reshape([len, dim]);
                let std = self.exploration_std;
                let diff = (taken - head.tanh()) / std;
                let log_probs = (diff.clone() * diff * -0.5 - (std.ln() + 0.5 * LN_2PI))
                    .sum_dim(1)
                    .reshape([len]);
                let entropy = self.constant(vec![gaussian_entropy(dim, std); len]);
                Ok((log_probs, entropy))
            }
            ActionSpec::Construct { slots, n_enzymes } => {
                let width = ActionSpec::slot_width(n_enzymes);
                let mut enzyme_masks = vec![vec![0.0f32; len * n_enzymes]; slots];
                let mut compartment_masks = vec![vec![0.0f32; len * Compartment::COUNT]; slots];
                for (t, step) in trajectory.steps().iter().enumerate() {
                    let records = match &step.action {
                        Action::Construct(records) if records.len() == slots => records,
                        _ => return Err(AgentError::ActionKind { role: self.role }),
                    };
                    for (s, record) in records.iter().enumerate() {
                        if record.enzyme >= n_enzymes {
                            return Err(AgentError::ActionKind { role: self.role });
                        }
                        enzyme_masks[s][t * n_enzymes + record.enzyme] = 1.0;
                        compartment_masks[s][t * Compartment::COUNT + record.compartment.index()] = 1.0;
                    }
                }

                let mut log_probs = self.constant(vec![0.0; len]);
                let mut entropy = self.constant(vec![0.0; len]);
                for (s, (enzyme_mask, compartment_mask)) in enzyme_masks
                    .into_iter()
                    .zip(compartment_masks)
                    .enumerate()
                {
                    let offset = s * width;
                    let enzyme_logits = head.clone().slice([0..len, offset..offset + n_enzymes]);
                    let compartment_start = offset + n_enzymes + 1;
                    let compartment_logits = head
                        .clone()
                        .slice([0..len, compartment_start..compartment_start + Compartment::COUNT]);

                    let (enzyme_lp, enzyme_entropy) =
                        self.categorical_terms(enzyme_logits, enzyme_mask, n_enzymes);
                    let (compartment_lp, compartment_entropy) =
                        self.categorical_terms(compartment_logits, compartment_mask, Compartment::COUNT);

                    log_probs = log_probs + enzyme_lp + compartment_lp;
                    entropy = entropy + enzyme_entropy + compartment_entropy;
                }
                Ok((log_probs, entropy / slots as f32))
            }
        }
    }

    /// Selected log-probability and entropy per row of a categorical head.
    fn categorical_terms(
        &self,
        logits: Tensor<B, 2>,
        mask: Vec<f32>,
        classes: usize,
    ) -> (Tensor<B, 1>, Tensor<B, 1>) {
        let len = logits.dims()[0];
        let log_p = log_softmax(logits.clone(), 1);
        let p = softmax(logits, 1);
        let mask = Tensor::<B, 1>::from_data(TensorData::new(mask, [len * classes]), &self.device)
            .reshape([len, classes]);
        let selected = (log_p.clone() * mask).sum_dim(1).reshape([len]);
        let entropy = -(p * log_p).sum_dim(1).reshape([len]);
        (selected, entropy)
    }

    fn constant(&self, values: Vec<f32>) -> Tensor<B, 1> {
        let len = values.len();
        Tensor::from_data(TensorData::new(values, [len]), &self.device)
    }
}

impl<B: AutodiffBackend> TrainableAgent for ImpalaAgent<B> {
    fn role(&self) -> Role {
        self.role
    }

    fn export_weights(&self) -> Result<Vec<u8>, AgentError> {
        encode_network(&self.network)
    }

    fn import_weights(&mut self, bytes: &[u8]) -> Result<(), AgentError> {
        self.network = decode_network(self.network.clone(), bytes, &self.device)?;
        self.version += 1;
        Ok(())
    }

    fn entropy_coef(&self) -> f32 {
        self.entropy.coef()
    }

    fn restore_entropy_coef(&mut self, coef: f32) {
        self.entropy.restore(coef);
    }
}

fn to_host<Bk: Backend, const D: usize>(tensor: Tensor<Bk, D>) -> Result<Vec<f32>, AgentError> {
    tensor
        .into_data()
        .to_vec()
        .map_err(|e| AgentError::Record(format!("{e:?}")))
}

fn scalar<Bk: Backend>(tensor: Tensor<Bk, 1>) -> Result<f32, AgentError> {
    Ok(to_host(tensor)?.first().copied().unwrap_or(0.0))
}

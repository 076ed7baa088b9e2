use burn::prelude::*;
use burn::tensor::TensorData;
use rand::SeedableRng;
use rand::rngs::StdRng;

use super::action::{Action, ActionSpec};
use super::distribution::select_action;
use super::network::{NetworkShape, PolicyValueNetwork, PolicyValueNetworkConfig};
use super::role::Role;
use super::weights::{WeightSnapshot, decode_network};
use super::{ActInfo, PolicyModel, PolicyOutput};
use crate::error::AgentError;

/// Inference-only copy of a role's policy, owned by a rollout worker.
pub struct RolloutPolicy<B: Backend> {
    role: Role,
    spec: ActionSpec,
    shape: NetworkShape,
    network: PolicyValueNetwork<B>,
    version: Option<u64>,
    exploration_std: f32,
    device: B::Device,
    rng: StdRng,
}

impl<B: Backend> RolloutPolicy<B> {
    pub fn new(
        role: Role,
        spec: ActionSpec,
        shape: NetworkShape,
        exploration_std: f32,
        device: B::Device,
    ) -> Self {
        let network = PolicyValueNetworkConfig::from_shape(&shape).init(&device);
        RolloutPolicy {
            role,
            spec,
            shape,
            network,
            version: None,
            exploration_std,
            device,
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Version of the last snapshot loaded, if any.
    pub fn version(&self) -> Option<u64> {
        self.version
    }

    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Replace the network weights with `snapshot`.
    ///
    /// Snapshots for another role or another layer shape are rejected and the
    /// current weights are kept. Loading the version already held is a no-op.
    pub fn load_snapshot(&mut self, snapshot: &WeightSnapshot) -> Result<(), AgentError> {
        if snapshot.role != self.role {
            return Err(AgentError::PolicyLoadMismatch {
                expected: self.role,
                snapshot: snapshot.role,
            });
        }
        if snapshot.shape != self.shape {
            return Err(AgentError::ShapeMismatch {
                role: self.role,
                expected: self.shape.to_string(),
                actual: snapshot.shape.to_string(),
            });
        }
        if self.version == Some(snapshot.version) {
            return Ok(());
        }
        self.network = decode_network(self.network.clone(), &snapshot.bytes, &self.device)?;
        self.version = Some(snapshot.version);
        Ok(())
    }
}

impl<B: Backend> PolicyModel for RolloutPolicy<B> {
    type Recurrent = ();

    fn forward(&self, observation: &[f32], state: ()) -> Result<PolicyOutput<()>, AgentError> {
        if observation.len() != self.shape.obs_dim {
            return Err(AgentError::ObservationSize {
                expected: self.shape.obs_dim,
                actual: observation.len(),
            });
        }
        let input = Tensor::<B, 1>::from_data(TensorData::from(observation), &self.device)
            .reshape([1, self.shape.obs_dim]);
        let (head, value) = self.network.forward(input);
        let params: Vec<f32> = head
            .into_data()
            .to_vec()
            .map_err(|e| AgentError::Record(format!("{e:?}")))?;
        let value: Vec<f32> = value
            .into_data()
            .to_vec()
            .map_err(|e| AgentError::Record(format!("{e:?}")))?;
        Ok(PolicyOutput {
            params,
            value: value[0],
            state,
        })
    }

    fn act(&mut self, observation: &[f32], deterministic: bool) -> Result<(Action, ActInfo), AgentError> {
        let output = self.forward(observation, ())?;
        let (action, log_prob) = select_action(
            &self.spec,
            &output.params,
            deterministic,
            self.exploration_std,
            &mut self.rng,
        );
        Ok((
            action,
            ActInfo {
                value: output.value,
                log_prob,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::weights::encode_network;
    use burn::backend::NdArray;
    use std::sync::Arc;

    type TestBackend = NdArray<f32>;

    fn shape() -> NetworkShape {
        NetworkShape {
            obs_dim: 4,
            head_size: 2,
            hidden_dim: 8,
        }
    }

    fn policy(role: Role) -> RolloutPolicy<TestBackend> {
        RolloutPolicy::new(
            role,
            ActionSpec::Continuous { dim: 2 },
            shape(),
            0.1,
            Default::default(),
        )
    }

    fn snapshot(role: Role, version: u64, shape: NetworkShape) -> WeightSnapshot {
        let network = PolicyValueNetworkConfig::from_shape(&shape).init::<TestBackend>(&Default::default());
        WeightSnapshot {
            role,
            version,
            shape,
            bytes: Arc::new(encode_network(&network).unwrap()),
        }
    }

    #[test]
    fn test_act_returns_action_matching_spec() {
        let mut policy = policy(Role::Tumor);
        let (action, info) = policy.act(&[0.0, 0.5, -0.5, 1.0], false).unwrap();
        assert!(ActionSpec::Continuous { dim: 2 }.accepts(&action));
        assert!(info.value.is_finite());
        assert!(info.log_prob.is_finite());
    }

    #[test]
    fn test_wrong_observation_size_rejected() {
        let mut policy = policy(Role::Tumor);
        let err = policy.act(&[0.0; 3], false).unwrap_err();
        assert!(matches!(
            err,
            AgentError::ObservationSize {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_load_snapshot_checks_role_and_shape() {
        let mut policy = policy(Role::Tumor);

        let foreign = snapshot(Role::SinkDesigner, 1, shape());
        assert!(matches!(
            policy.load_snapshot(&foreign),
            Err(AgentError::PolicyLoadMismatch { .. })
        ));

        let mut wide = shape();
        wide.hidden_dim = 16;
        let misfit = snapshot(Role::Tumor, 1, wide);
        assert!(matches!(
            policy.load_snapshot(&misfit),
            Err(AgentError::ShapeMismatch { .. })
        ));
        assert_eq!(policy.version(), None);

        policy.load_snapshot(&snapshot(Role::Tumor, 3, shape())).unwrap();
        assert_eq!(policy.version(), Some(3));
    }

    #[test]
    fn test_reseed_makes_sampling_reproducible() {
        let mut policy = policy(Role::Tumor);
        let obs = [0.1, 0.2, 0.3, 0.4];
        policy.reseed(11);
        let (first, _) = policy.act(&obs, false).unwrap();
        policy.reseed(11);
        let (second, _) = policy.act(&obs, false).unwrap();
        assert_eq!(first, second);
    }
}

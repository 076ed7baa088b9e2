use std::fmt;

use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

/// Policy-value network shared by both roles.
///
/// ```text
/// Input:   [batch, obs_dim]
/// FC1:     obs_dim -> hidden, ReLU
/// FC2:     hidden -> hidden, ReLU
/// Policy head: hidden -> head_size  (raw distribution parameters)
/// Value head:  hidden -> 1          (state value estimate)
/// ```
///
/// The policy head is interpreted by the role's action spec: a continuous
/// mean vector for the tumor, per-slot enzyme logits, copy number and
/// compartment logits for the sink designer.
#[derive(Module, Debug)]
pub struct PolicyValueNetwork<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    policy_head: Linear<B>,
    value_head: Linear<B>,
    relu: Relu,
}

#[derive(Config, Debug)]
pub struct PolicyValueNetworkConfig {
    pub obs_dim: usize,
    pub head_size: usize,
    #[config(default = 128)]
    pub hidden_dim: usize,
}

impl PolicyValueNetworkConfig {
    pub fn from_shape(shape: &NetworkShape) -> Self {
        PolicyValueNetworkConfig::new(shape.obs_dim, shape.head_size).with_hidden_dim(shape.hidden_dim)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> PolicyValueNetwork<B> {
        PolicyValueNetwork {
            fc1: LinearConfig::new(self.obs_dim, self.hidden_dim).init(device),
            fc2: LinearConfig::new(self.hidden_dim, self.hidden_dim).init(device),
            policy_head: LinearConfig::new(self.hidden_dim, self.head_size).init(device),
            value_head: LinearConfig::new(self.hidden_dim, 1).init(device),
            relu: Relu::new(),
        }
    }
}

impl<B: Backend> PolicyValueNetwork<B> {
    /// Forward pass: input [batch, obs_dim] -> (head [batch, head_size], value [batch, 1]).
    pub fn forward(&self, input: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let x = self.relu.forward(self.fc1.forward(input));
        let x = self.relu.forward(self.fc2.forward(x));

        let head = self.policy_head.forward(x.clone());
        let value = self.value_head.forward(x);

        (head, value)
    }
}

/// Layer dimensions that a weight snapshot must match to be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkShape {
    pub obs_dim: usize,
    pub head_size: usize,
    pub hidden_dim: usize,
}

impl fmt::Display for NetworkShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "obs={} hidden={} head={}",
            self.obs_dim, self.hidden_dim, self.head_size
        )
    }
}

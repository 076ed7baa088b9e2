//! V-trace off-policy value targets.
//!
//! Targets are computed on the host from detached quantities so the learner
//! can treat them as constants in the loss.

/// Discount and truncation levels for the importance weights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VTraceParams {
    pub discount: f32,
    pub rho_bar: f32,
    pub c_bar: f32,
}

impl Default for VTraceParams {
    fn default() -> Self {
        VTraceParams {
            discount: 0.99,
            rho_bar: 1.0,
            c_bar: 1.0,
        }
    }
}

/// Per-step inputs, all index-aligned and of equal length.
#[derive(Debug, Clone, Copy)]
pub struct VTraceInput<'a> {
    pub rewards: &'a [f32],
    /// Value estimates recorded by the behavior policy.
    pub values: &'a [f32],
    pub dones: &'a [bool],
    pub behavior_log_probs: &'a [f32],
    pub target_log_probs: &'a [f32],
    /// Target for the final step, usually the learner's current value prediction.
    pub bootstrap_value: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VTraceOutput {
    pub targets: Vec<f32>,
    /// Untruncated importance ratios `pi / mu`.
    pub rhos: Vec<f32>,
    pub clipped_rhos: Vec<f32>,
    pub clipped_cs: Vec<f32>,
}

impl VTraceOutput {
    /// Advantages against a value prediction: `target - predicted`.
    pub fn advantages(&self, predicted: &[f32]) -> Vec<f32> {
        self.targets
            .iter()
            .zip(predicted)
            .map(|(t, v)| t - v)
            .collect()
    }

    pub fn mean_rho(&self) -> f32 {
        if self.rhos.is_empty() {
            return 0.0;
        }
        self.rhos.iter().sum::<f32>() / self.rhos.len() as f32
    }
}

/// Compute V-trace targets for one trajectory.
///
/// The last target is the bootstrap value; earlier targets follow the
/// backward recursion
/// `v_t = V_t + delta_t + discount * c_t * (v_{t+1} - V_{t+1}) * (1 - done_{t+1})`
/// with `delta_t = rho_t * (r_t + discount * V_{t+1} * (1 - done_{t+1}) - V_t)`.
pub fn vtrace_targets(input: &VTraceInput<'_>, params: &VTraceParams) -> VTraceOutput {
    let n = input.rewards.len();
    if n == 0 {
        return VTraceOutput {
            targets: Vec::new(),
            rhos: Vec::new(),
            clipped_rhos: Vec::new(),
            clipped_cs: Vec::new(),
        };
    }

    let mut rhos = Vec::with_capacity(n);
    let mut clipped_rhos = Vec::with_capacity(n);
    let mut clipped_cs = Vec::with_capacity(n);
    for (target_lp, behavior_lp) in input.target_log_probs.iter().zip(input.behavior_log_probs) {
        let ratio = (target_lp - behavior_lp).exp();
        rhos.push(ratio);
        clipped_rhos.push(ratio.min(params.rho_bar));
        clipped_cs.push(ratio.min(params.c_bar));
    }

    let mut targets = vec![0.0f32; n];
    targets[n - 1] = input.bootstrap_value;

    for t in (0..n - 1).rev() {
        let not_done = if input.dones[t + 1] { 0.0 } else { 1.0 };
        let delta = clipped_rhos[t]
            * (input.rewards[t] + params.discount * input.values[t + 1] * not_done - input.values[t]);
        targets[t] = input.values[t]
            + delta
            + params.discount * clipped_cs[t] * (targets[t + 1] - input.values[t + 1]) * not_done;
    }

    VTraceOutput {
        targets,
        rhos,
        clipped_rhos,
        clipped_cs,
    }
}

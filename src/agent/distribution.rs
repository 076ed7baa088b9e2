//! Host-side action distributions used while acting.
//!
//! The learner recomputes the same log-probabilities on tensors during the
//! update; these scalar versions only run on rollout workers.

use rand::Rng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use super::action::{Action, ActionSpec, Compartment, ConstructSlot};

const LN_2PI: f32 = 1.837_877_1;

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max_val = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut probs: Vec<f32> = logits.iter().map(|&l| (l - max_val).exp()).collect();
    let sum: f32 = probs.iter().sum();
    for p in &mut probs {
        *p /= sum;
    }
    probs
}

/// Log-softmax computed with the log-sum-exp trick.
pub fn log_softmax(logits: &[f32]) -> Vec<f32> {
    let max_val = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let log_sum = logits.iter().map(|&l| (l - max_val).exp()).sum::<f32>().ln() + max_val;
    logits.iter().map(|&l| l - log_sum).collect()
}

/// Sample an index from a categorical distribution defined by probs.
pub fn sample_categorical(probs: &[f32], rng: &mut StdRng) -> usize {
    let r: f32 = rng.random_range(0.0..1.0);
    let mut cumulative = 0.0;
    for (i, &p) in probs.iter().enumerate() {
        cumulative += p;
        if r < cumulative {
            return i;
        }
    }
    // Rounding left a gap at the top; fall back to the last non-zero entry
    probs.iter().rposition(|&p| p > 0.0).unwrap_or(0)
}

pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    let mut best_val = f32::NEG_INFINITY;
    for (i, &v) in values.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best = i;
        }
    }
    best
}

/// Log density of `x` under independent normals, summed over dimensions.
pub fn gaussian_log_prob(x: &[f32], mean: &[f32], std: f32) -> f32 {
    let log_std = std.ln();
    x.iter()
        .zip(mean)
        .map(|(&xi, &mi)| {
            let z = (xi - mi) / std;
            -0.5 * z * z - log_std - 0.5 * LN_2PI
        })
        .sum()
}

/// Differential entropy of a `dim`-dimensional isotropic normal.
pub fn gaussian_entropy(dim: usize, std: f32) -> f32 {
    dim as f32 * (0.5 + 0.5 * LN_2PI + std.ln())
}

/// Turn one row of policy-head output into an action and its log-probability.
///
/// Deterministic selection uses the distribution mode and reports a
/// log-probability of zero.
pub fn select_action(
    spec: &ActionSpec,
    head: &[f32],
    deterministic: bool,
    exploration_std: f32,
    rng: &mut StdRng,
) -> (Action, f32) {
    match *spec {
        ActionSpec::Continuous { dim } => {
            let mean: Vec<f32> = head[..dim].iter().map(|m| m.tanh()).collect();
            if deterministic {
                return (Action::Continuous(mean), 0.0);
            }
            let values: Vec<f32> = match Normal::new(0.0f32, exploration_std) {
                Ok(noise) => mean.iter().map(|m| m + noise.sample(rng)).collect(),
                Err(_) => mean.clone(),
            };
            let log_prob = gaussian_log_prob(&values, &mean, exploration_std);
            (Action::Continuous(values), log_prob)
        }
        ActionSpec::Construct { slots, n_enzymes } => {
            let width = ActionSpec::slot_width(n_enzymes);
            let mut records = Vec::with_capacity(slots);
            let mut log_prob = 0.0;
            for slot in 0..slots {
                let row = &head[slot * width..(slot + 1) * width];
                let enzyme_logits = &row[..n_enzymes];
                let raw_copies = row[n_enzymes];
                let compartment_logits = &row[n_enzymes + 1..];

                let (enzyme, compartment) = if deterministic {
                    (argmax(enzyme_logits), argmax(compartment_logits))
                } else {
                    let enzyme = sample_categorical(&softmax(enzyme_logits), rng);
                    let compartment = sample_categorical(&softmax(compartment_logits), rng);
                    log_prob += log_softmax(enzyme_logits)[enzyme]
                        + log_softmax(compartment_logits)[compartment];
                    (enzyme, compartment)
                };

                records.push(ConstructSlot {
                    enzyme,
                    copy_number: ConstructSlot::copy_number_from_raw(raw_copies),
                    compartment: Compartment::from_index(compartment).unwrap_or(Compartment::Cytosol),
                });
            }
            (Action::Construct(records), log_prob)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn test_log_softmax_matches_softmax() {
        let logits = [0.5, -1.0, 2.0, 0.0];
        let probs = softmax(&logits);
        let log_probs = log_softmax(&logits);
        for (p, lp) in probs.iter().zip(&log_probs) {
            assert!((p.ln() - lp).abs() < 1e-5);
        }
    }

    #[test]
    fn test_gaussian_log_prob_at_mean() {
        let lp = gaussian_log_prob(&[0.0], &[0.0], 1.0);
        assert!((lp - (-0.5 * LN_2PI)).abs() < 1e-6);
        // Two dimensions sum
        let lp2 = gaussian_log_prob(&[0.3, 0.3], &[0.3, 0.3], 0.1);
        let single = gaussian_log_prob(&[0.3], &[0.3], 0.1);
        assert!((lp2 - 2.0 * single).abs() < 1e-5);
    }

    #[test]
    fn test_gaussian_entropy_unit_normal() {
        // 0.5 * ln(2 * pi * e) for one dimension
        assert!((gaussian_entropy(1, 1.0) - 1.418_938_5).abs() < 1e-5);
    }

    #[test]
    fn test_deterministic_continuous_uses_tanh_mean() {
        let mut rng = StdRng::seed_from_u64(0);
        let spec = ActionSpec::Continuous { dim: 2 };
        let (action, lp) = select_action(&spec, &[0.0, 10.0], true, 0.1, &mut rng);
        assert_eq!(lp, 0.0);
        match action {
            Action::Continuous(v) => {
                assert_eq!(v[0], 0.0);
                assert!((v[1] - 1.0).abs() < 1e-4);
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn test_sampled_continuous_log_prob_consistent() {
        let mut rng = StdRng::seed_from_u64(7);
        let spec = ActionSpec::Continuous { dim: 3 };
        let head = [0.2, -0.4, 0.9];
        let (action, lp) = select_action(&spec, &head, false, 0.1, &mut rng);
        let Action::Continuous(values) = action else {
            panic!("expected continuous action");
        };
        let mean: Vec<f32> = head.iter().map(|h: &f32| h.tanh()).collect();
        assert!((lp - gaussian_log_prob(&values, &mean, 0.1)).abs() < 1e-5);
    }

    #[test]
    fn test_construct_selection_respects_layout() {
        let mut rng = StdRng::seed_from_u64(3);
        let spec = ActionSpec::Construct {
            slots: 2,
            n_enzymes: 3,
        };
        // slot 0 prefers enzyme 2 / peroxisome, slot 1 prefers enzyme 0 / mitochondria
        let head = [
            0.0, 0.0, 9.0, 2.6, 0.0, 0.0, 9.0, //
            9.0, 0.0, 0.0, 20.0, 0.0, 9.0, 0.0,
        ];
        let (action, lp) = select_action(&spec, &head, true, 0.1, &mut rng);
        assert_eq!(lp, 0.0);
        let Action::Construct(slots) = action else {
            panic!("expected construct action");
        };
        assert_eq!(slots[0].enzyme, 2);
        assert_eq!(slots[0].copy_number, 3);
        assert_eq!(slots[0].compartment, Compartment::Peroxisome);
        assert_eq!(slots[1].enzyme, 0);
        assert_eq!(slots[1].copy_number, 8);
        assert_eq!(slots[1].compartment, Compartment::Mitochondria);

        let (sampled, lp) = select_action(&spec, &head, false, 0.1, &mut rng);
        assert!(spec.accepts(&sampled));
        assert!(lp <= 0.0);
    }
}

use std::sync::Arc;

use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder};

use super::network::{NetworkShape, PolicyValueNetwork};
use super::role::Role;
use crate::error::AgentError;

/// Backend-independent byte recorder used for every weight transfer.
///
/// Named MessagePack, the in-memory form of burn's default file recorder.
/// Malformed input surfaces as an error rather than a panic.
pub type WeightRecorder = NamedMpkBytesRecorder<FullPrecisionSettings>;

/// Immutable copy of one role's network weights.
///
/// Snapshots are versioned per role; workers compare versions to skip
/// redundant reloads.
#[derive(Debug, Clone)]
pub struct WeightSnapshot {
    pub role: Role,
    pub version: u64,
    pub shape: NetworkShape,
    pub bytes: Arc<Vec<u8>>,
}

/// Serialize a network's parameters.
pub fn encode_network<B: Backend>(network: &PolicyValueNetwork<B>) -> Result<Vec<u8>, AgentError> {
    let recorder = WeightRecorder::default();
    Recorder::<B>::record(&recorder, network.clone().into_record(), ())
        .map_err(|e| AgentError::Record(e.to_string()))
}

/// Load serialized parameters into `network`, returning the updated module.
pub fn decode_network<B: Backend>(
    network: PolicyValueNetwork<B>,
    bytes: &[u8],
    device: &B::Device,
) -> Result<PolicyValueNetwork<B>, AgentError> {
    let recorder = WeightRecorder::default();
    let record: <PolicyValueNetwork<B> as Module<B>>::Record =
        Recorder::<B>::load(&recorder, bytes.to_vec(), device)
            .map_err(|e| AgentError::Record(e.to_string()))?;
    Ok(network.load_record(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::network::PolicyValueNetworkConfig;
    use burn::backend::{Autodiff, NdArray};

    type Infer = NdArray<f32>;
    type Train = Autodiff<Infer>;

    #[test]
    fn test_trained_weights_load_into_inference_network() {
        let device = Default::default();
        let config = PolicyValueNetworkConfig::new(6, 4).with_hidden_dim(8);
        let learner = config.init::<Train>(&device);
        let bytes = encode_network(&learner).unwrap();

        let worker = config.init::<Infer>(&device);
        let worker = decode_network(worker, &bytes, &device).unwrap();

        let input = [0.1f32, -0.2, 0.3, 0.0, 1.0, -1.0];
        let learner_out: Vec<f32> = learner
            .forward(Tensor::<Train, 1>::from_floats(input, &device).reshape([1, 6]))
            .0
            .into_data()
            .to_vec()
            .unwrap();
        let worker_out: Vec<f32> = worker
            .forward(Tensor::<Infer, 1>::from_floats(input, &device).reshape([1, 6]))
            .0
            .into_data()
            .to_vec()
            .unwrap();
        for (a, b) in learner_out.iter().zip(&worker_out) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        let device = Default::default();
        let network = PolicyValueNetworkConfig::new(6, 4).init::<Infer>(&device);
        let result = decode_network(network, &[1, 2, 3], &device);
        assert!(matches!(result, Err(AgentError::Record(_))));
    }

    #[test]
    fn test_truncated_record_rejected() {
        let device = Default::default();
        let config = PolicyValueNetworkConfig::new(6, 4).with_hidden_dim(8);
        let bytes = encode_network(&config.init::<Infer>(&device)).unwrap();
        let truncated = &bytes[..bytes.len() / 2];
        let result = decode_network(config.init::<Infer>(&device), truncated, &device);
        assert!(matches!(result, Err(AgentError::Record(_))));
    }
}

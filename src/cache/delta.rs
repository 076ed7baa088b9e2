use serde::{Deserialize, Serialize};

use crate::agent::Compartment;

/// Copy number every stored delta is measured at.
pub const BASE_MAGNITUDE: u32 = 1;

/// Effect of a single intervention relative to the baseline, measured at
/// [`BASE_MAGNITUDE`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FluxDelta {
    pub intervention: String,
    pub compartment: Compartment,
    pub magnitude: u32,
    /// Additive change of the primary outcome.
    pub primary_delta: f64,
    /// Fractional change of the growth rate.
    pub growth_delta: f64,
    /// Fractional change of the cofactor ratio.
    pub cofactor_delta: f64,
    /// Largest per-reaction flux changes, sorted by magnitude.
    pub top_flux_deltas: Vec<(String, f64)>,
}

impl FluxDelta {
    /// A delta with no effect, used when the intervention cannot be simulated.
    pub fn zero(intervention: impl Into<String>, compartment: Compartment) -> Self {
        FluxDelta {
            intervention: intervention.into(),
            compartment,
            magnitude: BASE_MAGNITUDE,
            primary_delta: 0.0,
            growth_delta: 0.0,
            cofactor_delta: 0.0,
            top_flux_deltas: Vec::new(),
        }
    }

    pub fn key(&self) -> DeltaKey {
        DeltaKey {
            intervention: self.intervention.clone(),
            compartment: self.compartment,
            magnitude: self.magnitude,
        }
    }

    /// Linear scaling of every delta component.
    pub fn scale(&self, factor: f64) -> FluxDelta {
        FluxDelta {
            intervention: self.intervention.clone(),
            compartment: self.compartment,
            magnitude: (self.magnitude as f64 * factor) as u32,
            primary_delta: self.primary_delta * factor,
            growth_delta: self.growth_delta * factor,
            cofactor_delta: self.cofactor_delta * factor,
            top_flux_deltas: self
                .top_flux_deltas
                .iter()
                .map(|(id, v)| (id.clone(), v * factor))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeltaKey {
    pub intervention: String,
    pub compartment: Compartment,
    pub magnitude: u32,
}

impl DeltaKey {
    pub fn base(intervention: impl Into<String>, compartment: Compartment) -> Self {
        DeltaKey {
            intervention: intervention.into(),
            compartment,
            magnitude: BASE_MAGNITUDE,
        }
    }
}

/// Unordered pair of intervention ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    first: String,
    second: String,
}

impl PairKey {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b {
            PairKey { first: a, second: b }
        } else {
            PairKey { first: b, second: a }
        }
    }

    pub fn ids(&self) -> (&str, &str) {
        (&self.first, &self.second)
    }
}

/// Correction factor for a pair of interventions applied together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairwiseInteraction {
    pub pair: PairKey,
    /// The primary outcome is multiplied by `1 + correction`.
    pub correction: f64,
}

/// Estimated outcome of a multi-intervention construct.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstructPrediction {
    pub primary_outcome: f64,
    pub growth_rate: f64,
    pub cofactor_ratio: f64,
    /// 1.0 when every intervention was cached, lower as more are missing.
    pub confidence: f64,
}

impl ConstructPrediction {
    pub const PRIMARY_RANGE: (f64, f64) = (-10.0, 10.0);
    pub const GROWTH_RANGE: (f64, f64) = (0.0, 1.5);
    pub const COFACTOR_RANGE: (f64, f64) = (0.1, 10.0);

    /// Unperturbed system.
    pub fn baseline() -> Self {
        ConstructPrediction {
            primary_outcome: 0.0,
            growth_rate: 1.0,
            cofactor_ratio: 1.0,
            confidence: 1.0,
        }
    }

    /// Clamp every field into its range; NaN falls back to the baseline value.
    pub fn clamped(self) -> Self {
        let base = Self::baseline();
        ConstructPrediction {
            primary_outcome: clamp_or(self.primary_outcome, Self::PRIMARY_RANGE, base.primary_outcome),
            growth_rate: clamp_or(self.growth_rate, Self::GROWTH_RANGE, base.growth_rate),
            cofactor_ratio: clamp_or(self.cofactor_ratio, Self::COFACTOR_RANGE, base.cofactor_ratio),
            confidence: self.confidence,
        }
    }
}

fn clamp_or(value: f64, (lo, hi): (f64, f64), fallback: f64) -> f64 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(lo, hi)
    }
}

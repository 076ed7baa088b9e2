use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{Environment, Observation, StepInfo, StepResult};
use crate::agent::{Action, ActionSpec, Compartment, ConstructSlot, MAX_COPY_NUMBER, Role};
use crate::cache::DeltaCache;
use crate::config::AppConfig;
use crate::error::TrainingError;

/// Environment dynamics and reward weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    pub obs_dim: usize,
    pub max_steps: usize,
    /// Intervention ids the sink designer picks from, by index.
    pub enzymes: Vec<String>,
    /// Pressure added to the primary level by a saturated tumor action.
    pub tumor_pressure_scale: f32,
    /// Half-width of the random initial pressure.
    pub initial_pressure_noise: f32,
    pub biomass_penalty_weight: f32,
    pub redox_weight: f32,
    /// Episodes terminate once the growth rate drops below this.
    pub viability_threshold: f32,
}

impl Default for EnvConfig {
    fn default() -> Self {
        EnvConfig {
            obs_dim: 16,
            max_steps: 100,
            enzymes: ["1.1.99.39", "1.1.99.2", "1.1.1.37", "1.1.1.42", "1.6.1.2"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            tumor_pressure_scale: 2.0,
            initial_pressure_noise: 0.1,
            biomass_penalty_weight: 1.0,
            redox_weight: 0.1,
            viability_threshold: 0.1,
        }
    }
}

/// Two-player redox game whose outcomes come from the delta cache.
///
/// The tumor pushes the primary metabolite level up through a pressure term;
/// the sink designer's construct is scored by
/// [`DeltaCache::get_construct_prediction`] and pulls it down. The sink
/// designer is also penalized for lost growth and cofactor imbalance.
pub struct SurrogateRedoxEnv {
    role: Role,
    spec: ActionSpec,
    config: EnvConfig,
    max_slots: usize,
    cache: Arc<DeltaCache>,
    rng: StdRng,
    steps: usize,
    pressure: f32,
    construct: Vec<ConstructSlot>,
    opponent_action: Option<Action>,
    last: StepInfo,
    history: Vec<StepInfo>,
}

impl SurrogateRedoxEnv {
    /// Features written before zero padding: eight scalars, then one
    /// construct share per compartment.
    pub const MIN_OBS_DIM: usize = 8 + Compartment::COUNT;

    pub fn new(role: Role, config: &AppConfig, cache: Arc<DeltaCache>) -> Self {
        SurrogateRedoxEnv {
            role,
            spec: config.action_spec(role),
            config: config.env.clone(),
            max_slots: config.agent.max_slots,
            cache,
            rng: StdRng::seed_from_u64(0),
            steps: 0,
            pressure: 0.0,
            construct: Vec::new(),
            opponent_action: None,
            last: StepInfo::default(),
            history: Vec::new(),
        }
    }

    /// Steps recorded in the current episode.
    pub fn history(&self) -> &[StepInfo] {
        &self.history
    }

    fn apply(&mut self, action: &Action) {
        match action {
            Action::Continuous(values) => {
                let mean = if values.is_empty() {
                    0.0
                } else {
                    values.iter().sum::<f32>() / values.len() as f32
                };
                self.pressure = mean.clamp(-1.0, 1.0) * self.config.tumor_pressure_scale;
            }
            Action::Construct(slots) => self.construct = slots.clone(),
        }
    }

    fn predict(&self) -> StepInfo {
        let library = &self.config.enzymes;
        let (ids, compartments, magnitudes) = if library.is_empty() {
            (Vec::new(), Vec::new(), Vec::new())
        } else {
            let ids: Vec<&str> = self
                .construct
                .iter()
                .map(|s| library[s.enzyme % library.len()].as_str())
                .collect();
            let compartments: Vec<Compartment> = self.construct.iter().map(|s| s.compartment).collect();
            let magnitudes: Vec<u32> = self.construct.iter().map(|s| s.copy_number as u32).collect();
            (ids, compartments, magnitudes)
        };
        let prediction = self.cache.get_construct_prediction(&ids, &compartments, &magnitudes);
        StepInfo {
            primary_outcome: self.pressure + prediction.primary_outcome as f32,
            growth_rate: prediction.growth_rate as f32,
            cofactor_ratio: prediction.cofactor_ratio as f32,
            confidence: prediction.confidence as f32,
        }
    }

    fn reward(&self, info: &StepInfo) -> f32 {
        let imbalance = info.cofactor_ratio.ln().abs();
        match self.role {
            Role::SinkDesigner => {
                -info.primary_outcome
                    - self.config.biomass_penalty_weight * (1.0 - info.growth_rate).max(0.0)
                    - self.config.redox_weight * imbalance
            }
            Role::Tumor => info.primary_outcome + self.config.redox_weight * imbalance,
        }
    }

    fn observe(&self, info: &StepInfo) -> Observation {
        let slots = self.max_slots.max(1) as f32;
        let mean_copies = if self.construct.is_empty() {
            0.0
        } else {
            self.construct.iter().map(|s| s.copy_number as f32).sum::<f32>() / self.construct.len() as f32
        };
        let pressure = if self.config.tumor_pressure_scale > 0.0 {
            self.pressure / self.config.tumor_pressure_scale
        } else {
            0.0
        };

        let mut obs = vec![
            info.primary_outcome / 10.0,
            info.growth_rate,
            info.cofactor_ratio.ln(),
            info.confidence,
            pressure,
            self.steps as f32 / self.config.max_steps.max(1) as f32,
            self.construct.len() as f32 / slots,
            mean_copies / MAX_COPY_NUMBER as f32,
        ];
        for compartment in Compartment::ALL {
            let count = self
                .construct
                .iter()
                .filter(|s| s.compartment == compartment)
                .count();
            obs.push(count as f32 / slots);
        }
        obs.resize(self.config.obs_dim, 0.0);
        obs
    }
}

impl Environment for SurrogateRedoxEnv {
    fn observation_dim(&self) -> usize {
        self.config.obs_dim
    }

    fn action_spec(&self) -> ActionSpec {
        self.spec
    }

    fn reset(&mut self, seed: u64) -> Result<(Observation, StepInfo), TrainingError> {
        self.rng = StdRng::seed_from_u64(seed);
        self.steps = 0;
        self.construct.clear();
        self.opponent_action = None;
        self.history.clear();

        let noise = self.config.initial_pressure_noise;
        self.pressure = if noise > 0.0 {
            self.rng.random_range(-noise..noise) * self.config.tumor_pressure_scale
        } else {
            0.0
        };

        self.last = self.predict();
        Ok((self.observe(&self.last), self.last))
    }

    fn step(&mut self, action: &Action) -> Result<StepResult, TrainingError> {
        if !self.spec.accepts(action) {
            return Err(TrainingError::Environment(format!(
                "{} environment received an action outside its action head",
                self.role
            )));
        }
        if let Some(opponent) = self.opponent_action.take() {
            self.apply(&opponent);
        }
        self.apply(action);
        self.steps += 1;

        let info = self.predict();
        let reward = self.reward(&info);
        let terminated = info.growth_rate < self.config.viability_threshold;
        let truncated = self.steps >= self.config.max_steps;
        trace!(role = %self.role, step = self.steps, reward, "surrogate step");

        self.last = info;
        self.history.push(info);
        Ok(StepResult {
            observation: self.observe(&info),
            reward,
            terminated,
            truncated,
            info,
        })
    }

    fn set_opponent_action(&mut self, action: &Action) {
        self.opponent_action = Some(action.clone());
    }

    fn release(&mut self) {
        self.history = Vec::new();
        self.construct.clear();
        self.opponent_action = None;
    }
}

use std::path::Path;

use tracing::warn;

use crate::agent::{ActionSpec, AgentConfig, NetworkShape, Role};
use crate::cache::CacheConfig;
use crate::checkpoint::CheckpointManagerConfig;
use crate::env::{EnvConfig, SurrogateRedoxEnv};
use crate::error::ConfigError;
use crate::training::TrainingConfig;

/// Top-level application configuration, loadable from TOML.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub training: TrainingConfig,
    pub agent: AgentConfig,
    pub env: EnvConfig,
    pub cache: CacheConfig,
    pub checkpoint: CheckpointManagerConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the file
    /// does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            warn!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Action head for `role`.
    pub fn action_spec(&self, role: Role) -> ActionSpec {
        match role {
            Role::Tumor => ActionSpec::Continuous {
                dim: self.agent.tumor_action_dim,
            },
            Role::SinkDesigner => ActionSpec::Construct {
                slots: self.agent.max_slots,
                n_enzymes: self.env.enzymes.len(),
            },
        }
    }

    /// Network dimensions for `role`.
    pub fn network_shape(&self, role: Role) -> NetworkShape {
        NetworkShape {
            obs_dim: self.env.obs_dim,
            head_size: self.action_spec(role).head_size(),
            hidden_dim: self.agent.hidden_dim,
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.training;
        if t.num_actors == 0 {
            return Err(ConfigError::Validation(
                "training.num_actors must be >= 1".into(),
            ));
        }
        if t.trajectory_length < 2 {
            return Err(ConfigError::Validation(
                "training.trajectory_length must be >= 2".into(),
            ));
        }
        if t.learning_rate <= 0.0 {
            return Err(ConfigError::Validation(
                "training.learning_rate must be > 0".into(),
            ));
        }
        if t.total_timesteps == 0 {
            return Err(ConfigError::Validation(
                "training.total_timesteps must be > 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&t.discount) {
            return Err(ConfigError::Validation(
                "training.discount must be in [0, 1]".into(),
            ));
        }
        if t.entropy_coef < 0.0 {
            return Err(ConfigError::Validation(
                "training.entropy_coef must be >= 0".into(),
            ));
        }
        if t.value_coef < 0.0 {
            return Err(ConfigError::Validation(
                "training.value_coef must be >= 0".into(),
            ));
        }
        if t.max_grad_norm <= 0.0 {
            return Err(ConfigError::Validation(
                "training.max_grad_norm must be > 0".into(),
            ));
        }
        if t.rho_bar <= 0.0 || t.c_bar <= 0.0 {
            return Err(ConfigError::Validation(
                "training.rho_bar and training.c_bar must be > 0".into(),
            ));
        }
        if !(t.log_interval_secs >= 0.0 && t.log_interval_secs.is_finite())
            || !(t.save_interval_secs >= 0.0 && t.save_interval_secs.is_finite())
        {
            return Err(ConfigError::Validation(
                "training.log_interval_secs and training.save_interval_secs must be finite and >= 0"
                    .into(),
            ));
        }

        let a = &self.agent;
        if a.hidden_dim == 0 {
            return Err(ConfigError::Validation(
                "agent.hidden_dim must be > 0".into(),
            ));
        }
        if a.exploration_std <= 0.0 {
            return Err(ConfigError::Validation(
                "agent.exploration_std must be > 0".into(),
            ));
        }
        if a.tumor_action_dim == 0 || a.max_slots == 0 {
            return Err(ConfigError::Validation(
                "agent.tumor_action_dim and agent.max_slots must be > 0".into(),
            ));
        }
        for (name, schedule) in [
            ("tumor_entropy", &a.tumor_entropy),
            ("sink_designer_entropy", &a.sink_designer_entropy),
        ] {
            if schedule.decay <= 0.0 || schedule.decay > 1.0 {
                return Err(ConfigError::Validation(format!(
                    "agent.{name}.decay must be in (0, 1]"
                )));
            }
            if schedule.min_coef < 0.0 || schedule.min_coef > t.entropy_coef {
                return Err(ConfigError::Validation(format!(
                    "agent.{name}.min_coef must be in [0, training.entropy_coef]"
                )));
            }
            if !(0.0..=1.0).contains(&schedule.final_fraction) {
                return Err(ConfigError::Validation(format!(
                    "agent.{name}.final_fraction must be in [0, 1]"
                )));
            }
        }

        if self.env.obs_dim < SurrogateRedoxEnv::MIN_OBS_DIM {
            return Err(ConfigError::Validation(format!(
                "env.obs_dim must be >= {}",
                SurrogateRedoxEnv::MIN_OBS_DIM
            )));
        }
        if self.env.max_steps == 0 {
            return Err(ConfigError::Validation(
                "env.max_steps must be > 0".into(),
            ));
        }
        if self.env.enzymes.is_empty() {
            return Err(ConfigError::Validation(
                "env.enzymes must not be empty".into(),
            ));
        }

        if self.cache.top_k == 0 || self.cache.precompute_workers == 0 {
            return Err(ConfigError::Validation(
                "cache.top_k and cache.precompute_workers must be > 0".into(),
            ));
        }
        if self.checkpoint.keep_last_n == 0 {
            return Err(ConfigError::Validation(
                "checkpoint.keep_last_n must be >= 1".into(),
            ));
        }

        Ok(())
    }

    /// Generate a TOML string with all default values (useful for creating
    /// example config files).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&AppConfig::default()).expect("default config serializes")
    }
}

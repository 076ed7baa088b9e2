use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, bounded, unbounded};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::agent::{
    ImpalaAgent, Role, RoleMap, TrainBackend, TrainableAgent, TrainingProgress, WeightSnapshot,
};
use crate::cache::DeltaCache;
use crate::checkpoint::{
    CheckpointKind, CheckpointManager, CheckpointMetrics, TrainingState, codec,
};
use crate::config::AppConfig;
use crate::env::{Environment, SurrogateRedoxEnv};
use crate::error::TrainingError;
use crate::training::messages::{RolloutRequest, RolloutResult, WorkerReport};
use crate::training::metrics::{EpisodeStats, FinalStats, Throughput};
use crate::training::worker::RolloutWorker;

/// Learner and scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub num_actors: usize,
    /// Maximum steps per rollout.
    #[serde(alias = "batch_size")]
    pub trajectory_length: usize,
    pub learning_rate: f64,
    pub total_timesteps: u64,
    pub discount: f32,
    pub entropy_coef: f32,
    pub value_coef: f32,
    pub max_grad_norm: f32,
    pub rho_bar: f32,
    pub c_bar: f32,
    pub checkpoint_dir: PathBuf,
    /// Wall-clock seconds between progress lines; 0 disables them.
    pub log_interval_secs: f64,
    /// Wall-clock seconds between periodic checkpoints; 0 disables them.
    pub save_interval_secs: f64,
    /// Seed for episode seeds; `None` draws one from the OS.
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            num_actors: 4,
            trajectory_length: 80,
            learning_rate: 3e-4,
            total_timesteps: 10_000_000,
            discount: 0.99,
            entropy_coef: 0.01,
            value_coef: 0.5,
            max_grad_norm: 40.0,
            rho_bar: 1.0,
            c_bar: 1.0,
            checkpoint_dir: PathBuf::from("checkpoints"),
            log_interval_secs: 10.0,
            save_interval_secs: 300.0,
            seed: None,
        }
    }
}

/// Shared, read-only state handed to the coordinator and every worker.
#[derive(Clone)]
pub struct TrainingContext {
    pub config: Arc<AppConfig>,
    pub cache: Arc<DeltaCache>,
}

impl TrainingContext {
    pub fn new(config: AppConfig, cache: DeltaCache) -> Self {
        TrainingContext {
            config: Arc::new(config),
            cache: Arc::new(cache),
        }
    }

    /// Open the configured delta cache.
    pub fn from_config(config: AppConfig) -> Self {
        let cache = config.cache.open();
        Self::new(config, cache)
    }
}

type EnvFactory<E> = Box<dyn Fn(Role, &TrainingContext) -> E>;

/// Handles to the running worker threads.
struct WorkerPool {
    requests: Vec<Sender<RolloutRequest>>,
    handles: Vec<JoinHandle<()>>,
}

/// Asynchronous actor/learner loop over both roles.
///
/// Each worker has at most one outstanding request. Results are consumed in
/// completion order and each one updates only the learner of the role that
/// produced it; the freed worker is immediately handed the newest weights.
pub struct TrainingCoordinator<E: Environment> {
    context: TrainingContext,
    agents: RoleMap<ImpalaAgent<TrainBackend>>,
    snapshots: RoleMap<Arc<WeightSnapshot>>,
    checkpoints: CheckpointManager,
    env_factory: EnvFactory<E>,
    global_timesteps: u64,
    stats: EpisodeStats,
    rng: StdRng,
}

impl TrainingCoordinator<SurrogateRedoxEnv> {
    /// Coordinator whose workers play the cache-backed surrogate environment.
    pub fn with_surrogate(context: TrainingContext) -> Result<Self, TrainingError> {
        Self::new(
            context,
            Box::new(|role, ctx: &TrainingContext| {
                SurrogateRedoxEnv::new(role, &ctx.config, Arc::clone(&ctx.cache))
            }),
        )
    }
}

impl<E: Environment + Send + 'static> TrainingCoordinator<E> {
    /// Validate the configuration and prepare learners and the checkpoint
    /// directory. Both failures are fatal.
    pub fn new(context: TrainingContext, env_factory: EnvFactory<E>) -> Result<Self, TrainingError> {
        let config = &context.config;
        config.validate()?;
        let checkpoints = CheckpointManager::new(
            config.training.checkpoint_dir.clone(),
            config.checkpoint.clone(),
        )?;

        let agents = RoleMap::from_fn(|role| ImpalaAgent::<TrainBackend>::new(role, config, Default::default()));
        let snapshots = RoleMap::try_from_fn(|role| agents.get(role).snapshot().map(Arc::new))?;
        let rng = match config.training.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(TrainingCoordinator {
            context,
            agents,
            snapshots,
            checkpoints,
            env_factory,
            global_timesteps: 0,
            stats: EpisodeStats::new(),
            rng,
        })
    }

    pub fn global_timesteps(&self) -> u64 {
        self.global_timesteps
    }

    pub fn agent(&self, role: Role) -> &ImpalaAgent<TrainBackend> {
        self.agents.get(role)
    }

    pub fn checkpoint_manager(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    /// Restore both learners and the global step from a checkpoint directory.
    pub fn load_checkpoint(&mut self, path: &Path) -> Result<(), TrainingError> {
        let RoleMap {
            tumor,
            sink_designer,
        } = &mut self.agents;
        let state = self
            .checkpoints
            .load(path, &mut [tumor as &mut dyn TrainableAgent, sink_designer])?;
        self.global_timesteps = state.global_timesteps;
        for role in Role::ALL {
            self.refresh_snapshot(role)?;
        }
        info!(
            path = %path.display(),
            global_timesteps = self.global_timesteps,
            "resumed from checkpoint"
        );
        Ok(())
    }

    /// Run until the timestep budget is spent, then write the final checkpoint.
    ///
    /// A learner failure stops the loop early; the final checkpoint is still
    /// written before the error is returned.
    pub fn train(&mut self) -> Result<FinalStats, TrainingError> {
        let training = self.context.config.training.clone();
        let log_interval = interval(training.log_interval_secs);
        let save_interval = interval(training.save_interval_secs);

        info!(
            num_actors = training.num_actors,
            total_timesteps = training.total_timesteps,
            start = self.global_timesteps,
            "starting training"
        );

        let (results_tx, results_rx) = unbounded::<WorkerReport>();
        let pool = self.spawn_workers(training.num_actors, &results_tx);
        drop(results_tx);

        if self.global_timesteps < training.total_timesteps {
            for worker_id in 0..pool.requests.len() {
                self.dispatch(&pool, worker_id);
            }
        }

        let mut throughput = Throughput::new();
        let mut last_log = Instant::now();
        let mut last_save = Instant::now();

        let mut failure = None;

        while self.global_timesteps < training.total_timesteps {
            let Ok(report) = results_rx.recv() else {
                failure = Some(TrainingError::WorkersGone);
                break;
            };
            match report.outcome {
                Ok(result) => {
                    throughput.record(result.episode_length);
                    if let Err(e) = self.learn(result, training.total_timesteps) {
                        failure = Some(e);
                        break;
                    }
                }
                Err(e) => {
                    warn!(worker_id = report.worker_id, error = %e, "rollout failed, rescheduling");
                }
            }

            if self.global_timesteps < training.total_timesteps {
                self.dispatch(&pool, report.worker_id);
            }

            if log_interval.is_some_and(|every| last_log.elapsed() >= every) {
                info!(
                    timesteps = self.global_timesteps,
                    episodes = self.stats.total_episodes(),
                    mean_return = self.stats.mean_return(),
                    mean_length = self.stats.mean_length(),
                    steps_per_sec = throughput.steps_per_sec(),
                    "training progress"
                );
                throughput.reset();
                last_log = Instant::now();
            }

            if save_interval.is_some_and(|every| last_save.elapsed() >= every) {
                if let Err(e) = self.save(CheckpointKind::Periodic) {
                    warn!(error = %e, "periodic checkpoint failed");
                }
                last_save = Instant::now();
            }
        }

        // Let in-flight episodes finish; their results are discarded
        let WorkerPool { requests, handles } = pool;
        drop(requests);
        let discarded = results_rx.iter().count();
        for handle in handles {
            if handle.join().is_err() {
                warn!("rollout worker thread panicked");
            }
        }
        debug!(discarded, "workers stopped");

        self.finish(failure)
    }

    /// Write the final checkpoint, then return the run summary or `failure`.
    fn finish(&self, failure: Option<TrainingError>) -> Result<FinalStats, TrainingError> {
        let saved = self.save(CheckpointKind::Final);
        if let Some(e) = failure {
            if let Err(save_err) = saved {
                warn!(error = %save_err, "final checkpoint failed");
            }
            return Err(e);
        }
        saved?;

        let stats = self.stats.summary(self.global_timesteps);
        info!(
            timesteps = stats.global_timesteps,
            episodes = stats.total_episodes,
            mean_return = stats.mean_return,
            min_return = stats.min_return,
            max_return = stats.max_return,
            "training complete"
        );
        Ok(stats)
    }

    fn spawn_workers(&self, count: usize, results: &Sender<WorkerReport>) -> WorkerPool {
        let mut requests = Vec::with_capacity(count);
        let mut handles = Vec::with_capacity(count);
        for worker_id in 0..count {
            let role = Role::for_worker(worker_id);
            let env = (self.env_factory)(role, &self.context);
            let worker = RolloutWorker::new(worker_id, env, &self.context.config);
            let (tx, rx) = bounded(1);
            handles.push(worker.spawn(rx, results.clone()));
            requests.push(tx);
        }
        WorkerPool { requests, handles }
    }

    fn dispatch(&mut self, pool: &WorkerPool, worker_id: usize) {
        let request = RolloutRequest {
            weights: self.snapshots.clone(),
            seed: self.rng.random(),
        };
        if pool.requests[worker_id].send(request).is_err() {
            warn!(worker_id, "rollout worker is gone");
        }
    }

    fn learn(&mut self, result: RolloutResult, total_timesteps: u64) -> Result<(), TrainingError> {
        let progress = TrainingProgress {
            step: self.global_timesteps,
            total: total_timesteps,
        };
        let metrics = self
            .agents
            .get_mut(result.role)
            .update(&result.trajectory, Some(progress))?;
        if metrics.applied {
            self.refresh_snapshot(result.role)?;
        }

        self.global_timesteps += result.episode_length as u64;
        self.stats.record(result.episode_return, result.episode_length);
        debug!(
            worker_id = result.worker_id,
            role = %result.role,
            episode_return = result.episode_return,
            total_loss = metrics.total_loss,
            policy_loss = metrics.policy_loss,
            value_loss = metrics.value_loss,
            entropy = metrics.entropy,
            entropy_coef = metrics.entropy_coef,
            mean_rho = metrics.mean_rho,
            "learner update"
        );
        Ok(())
    }

    fn refresh_snapshot(&mut self, role: Role) -> Result<(), TrainingError> {
        *self.snapshots.get_mut(role) = Arc::new(self.agents.get(role).snapshot()?);
        Ok(())
    }

    fn training_state(&self) -> TrainingState {
        TrainingState {
            global_timesteps: self.global_timesteps,
            timestamp: 0,
            checkpoint_format: codec::FORMAT.to_string(),
            entropy_coefs: self.agents.map(|_, agent| agent.entropy_coef()),
            versions: self.agents.map(|_, agent| agent.version()),
            metrics: CheckpointMetrics {
                mean_return: self.stats.mean_return(),
                mean_length: self.stats.mean_length(),
                total_episodes: self.stats.total_episodes(),
            },
            config: (*self.context.config).clone(),
        }
    }

    fn save(&self, kind: CheckpointKind) -> Result<PathBuf, TrainingError> {
        let state = self.training_state();
        let agents: [&dyn TrainableAgent; 2] = [&self.agents.tumor, &self.agents.sink_designer];
        Ok(self.checkpoints.save(&agents, &state, kind)?)
    }
}

fn interval(secs: f64) -> Option<Duration> {
    (secs > 0.0).then(|| Duration::from_secs_f64(secs))
}

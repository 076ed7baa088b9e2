use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, warn};

use crate::agent::{InferBackend, PolicyModel, Role, RolloutPolicy};
use crate::config::AppConfig;
use crate::env::Environment;
use crate::error::TrainingError;
use crate::training::messages::{RolloutRequest, RolloutResult, WorkerReport};
use crate::training::trajectory::{Step, Trajectory};

/// Mixed into the episode seed for the opponent's sampler.
const OPPONENT_SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Plays episodes for one role against a frozen copy of the other.
///
/// The worker owns its environment and two inference-only policies; the only
/// thing it receives from the coordinator is a [`RolloutRequest`].
pub struct RolloutWorker<E: Environment> {
    id: usize,
    role: Role,
    env: E,
    policy: RolloutPolicy<InferBackend>,
    opponent: RolloutPolicy<InferBackend>,
    max_steps: usize,
}

impl<E: Environment> RolloutWorker<E> {
    pub fn new(id: usize, env: E, config: &AppConfig) -> Self {
        let role = Role::for_worker(id);
        let policy_for = |role: Role| -> RolloutPolicy<InferBackend> {
            RolloutPolicy::new(
                role,
                config.action_spec(role),
                config.network_shape(role),
                config.agent.exploration_std,
                Default::default(),
            )
        };
        RolloutWorker {
            id,
            role,
            env,
            policy: policy_for(role),
            opponent: policy_for(role.opponent()),
            max_steps: config.training.trajectory_length,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Run one episode with the weights in `request`.
    ///
    /// Per-episode environment state is released whether or not the episode
    /// succeeded.
    pub fn run_episode(&mut self, request: &RolloutRequest) -> Result<RolloutResult, TrainingError> {
        let outcome = self.play(request);
        self.env.release();
        outcome
    }

    fn play(&mut self, request: &RolloutRequest) -> Result<RolloutResult, TrainingError> {
        self.policy.load_snapshot(request.weights.get(self.role))?;
        let opponent_role = self.role.opponent();
        if let Err(e) = self.opponent.load_snapshot(request.weights.get(opponent_role)) {
            warn!(
                worker_id = self.id,
                role = %opponent_role,
                error = %e,
                "skipping opponent weight update"
            );
        }
        self.policy.reseed(request.seed);
        self.opponent.reseed(request.seed ^ OPPONENT_SEED_MIX);

        let (mut observation, _) = self.env.reset(request.seed)?;
        let mut trajectory = Trajectory::new(self.role, self.max_steps);
        let mut episode_return = 0.0;

        for _ in 0..self.max_steps {
            let (opponent_action, _) = self.opponent.act(&observation, true)?;
            self.env.set_opponent_action(&opponent_action);

            let (action, act_info) = self.policy.act(&observation, false)?;
            let result = self.env.step(&action)?;
            let done = result.done();
            episode_return += result.reward;

            trajectory.push(Step {
                observation,
                action,
                reward: result.reward,
                value: act_info.value,
                log_prob: act_info.log_prob,
                done,
                info: result.info,
            });
            observation = result.observation;
            if done {
                break;
            }
        }

        let episode_length = trajectory.len();
        debug!(
            worker_id = self.id,
            role = %self.role,
            episode_length,
            episode_return,
            "rollout finished"
        );
        Ok(RolloutResult {
            trajectory,
            episode_return,
            episode_length,
            role: self.role,
            worker_id: self.id,
        })
    }
}

impl<E: Environment + Send + 'static> RolloutWorker<E> {
    /// Serve requests on a dedicated thread until the request channel closes.
    ///
    /// Errors and panics inside an episode are reported as
    /// [`TrainingError::WorkerFailure`]; the thread keeps serving.
    pub fn spawn(
        mut self,
        requests: Receiver<RolloutRequest>,
        results: Sender<WorkerReport>,
    ) -> JoinHandle<()> {
        thread::spawn(move || {
            for request in requests.iter() {
                let worker_id = self.id;
                let outcome = match panic::catch_unwind(AssertUnwindSafe(|| self.run_episode(&request))) {
                    Ok(Ok(result)) => Ok(result),
                    Ok(Err(e)) => Err(TrainingError::WorkerFailure {
                        worker_id,
                        reason: e.to_string(),
                    }),
                    Err(payload) => Err(TrainingError::WorkerFailure {
                        worker_id,
                        reason: panic_message(payload.as_ref()),
                    }),
                };
                if results.send(WorkerReport { worker_id, outcome }).is_err() {
                    break;
                }
            }
            debug!(worker_id = self.id, "rollout worker exiting");
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

//! Actor/learner training: rollout workers, the coordinator that schedules
//! them and learns from their trajectories, and running statistics.

pub mod coordinator;
pub mod messages;
pub mod metrics;
pub mod trajectory;
pub mod worker;

pub use coordinator::{TrainingConfig, TrainingContext, TrainingCoordinator};
pub use messages::{RolloutRequest, RolloutResult, WorkerReport};
pub use metrics::{EpisodeStats, FinalStats, Throughput};
pub use trajectory::{Step, Trajectory};
pub use worker::RolloutWorker;

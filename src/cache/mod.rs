//! Delta cache: single-intervention flux effects composed into construct
//! predictions, plus the worker pool that fills it from a simulator.

pub mod delta;
pub mod precompute;
pub mod store;

pub use delta::{ConstructPrediction, DeltaKey, FluxDelta, PairKey, PairwiseInteraction};
pub use precompute::{FluxSimulator, FluxSolution, PrecomputePool, PrecomputeReport, SolveStatus};
pub use store::{CacheSummary, DeltaCache};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Cache location and precompute settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding the persisted cache; `None` keeps it in memory.
    pub cache_dir: Option<PathBuf>,
    /// Number of largest flux changes kept per delta.
    pub top_k: usize,
    pub precompute_workers: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            cache_dir: Some(PathBuf::from("cache/delta_cache")),
            top_k: 10,
            precompute_workers: 4,
        }
    }
}

impl CacheConfig {
    /// Open the configured cache, or an empty in-memory one.
    pub fn open(&self) -> DeltaCache {
        match &self.cache_dir {
            Some(dir) => DeltaCache::open(dir),
            None => DeltaCache::in_memory(),
        }
    }

    pub fn precompute_pool(&self) -> PrecomputePool {
        PrecomputePool::new(self.precompute_workers, self.top_k)
    }
}

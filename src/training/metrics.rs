use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Rolling window of completed rollouts.
pub struct EpisodeStats {
    returns: VecDeque<f32>,
    lengths: VecDeque<usize>,
    capacity: usize,
    total_episodes: usize, // lifetime count, never capped
}

impl EpisodeStats {
    pub fn with_capacity(capacity: usize) -> Self {
        EpisodeStats {
            returns: VecDeque::with_capacity(capacity),
            lengths: VecDeque::with_capacity(capacity),
            capacity,
            total_episodes: 0,
        }
    }

    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    pub fn record(&mut self, episode_return: f32, length: usize) {
        self.total_episodes += 1;
        self.returns.push_back(episode_return);
        self.lengths.push_back(length);
        if self.returns.len() > self.capacity {
            self.returns.pop_front();
            self.lengths.pop_front();
        }
    }

    pub fn mean_return(&self) -> f32 {
        if self.returns.is_empty() {
            return 0.0;
        }
        self.returns.iter().sum::<f32>() / self.returns.len() as f32
    }

    pub fn min_return(&self) -> f32 {
        self.returns.iter().copied().fold(f32::INFINITY, f32::min)
    }

    pub fn max_return(&self) -> f32 {
        self.returns.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    pub fn mean_length(&self) -> f32 {
        if self.lengths.is_empty() {
            return 0.0;
        }
        self.lengths.iter().sum::<usize>() as f32 / self.lengths.len() as f32
    }

    pub fn window_len(&self) -> usize {
        self.returns.len()
    }

    pub fn total_episodes(&self) -> usize {
        self.total_episodes
    }

    /// Summary of the current window; empty windows report zeros.
    pub fn summary(&self, global_timesteps: u64) -> FinalStats {
        let empty = self.returns.is_empty();
        FinalStats {
            mean_return: self.mean_return(),
            min_return: if empty { 0.0 } else { self.min_return() },
            max_return: if empty { 0.0 } else { self.max_return() },
            mean_length: self.mean_length(),
            episodes_in_window: self.window_len(),
            recent_returns: self.returns.iter().copied().collect(),
            total_episodes: self.total_episodes,
            global_timesteps,
        }
    }
}

impl Default for EpisodeStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics reported when training finishes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalStats {
    pub mean_return: f32,
    pub min_return: f32,
    pub max_return: f32,
    pub mean_length: f32,
    pub episodes_in_window: usize,
    /// Returns in the window, oldest first.
    pub recent_returns: Vec<f32>,
    pub total_episodes: usize,
    pub global_timesteps: u64,
}

/// Environment-step throughput since the last reset.
pub struct Throughput {
    window_start: Instant,
    window_steps: u64,
}

impl Throughput {
    pub fn new() -> Self {
        Throughput {
            window_start: Instant::now(),
            window_steps: 0,
        }
    }

    pub fn record(&mut self, steps: usize) {
        self.window_steps += steps as u64;
    }

    pub fn steps_per_sec(&self) -> f32 {
        let elapsed = self.window_start.elapsed();
        if elapsed == Duration::ZERO {
            return 0.0;
        }
        self.window_steps as f32 / elapsed.as_secs_f32()
    }

    /// Reset the throughput window (call after each log line).
    pub fn reset(&mut self) {
        self.window_start = Instant::now();
        self.window_steps = 0;
    }
}

impl Default for Throughput {
    fn default() -> Self {
        Self::new()
    }
}

use serde::{Deserialize, Serialize};

/// Global progress handed to the learner so annealing can follow wall progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingProgress {
    pub step: u64,
    pub total: u64,
}

impl TrainingProgress {
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            return 1.0;
        }
        (self.step as f64 / self.total as f64).clamp(0.0, 1.0) as f32
    }
}

/// Per-role entropy annealing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntropyScheduleConfig {
    /// Multiplicative decay applied per update when progress is unknown.
    pub decay: f32,
    /// Lower bound the coefficient never drops below.
    pub min_coef: f32,
    /// Fraction of the initial coefficient reached at the end of training.
    pub final_fraction: f32,
}

impl EntropyScheduleConfig {
    pub fn tumor() -> Self {
        EntropyScheduleConfig {
            decay: 0.997,
            min_coef: 0.005,
            final_fraction: 0.1,
        }
    }

    pub fn sink_designer() -> Self {
        EntropyScheduleConfig {
            decay: 0.99,
            min_coef: 0.001,
            final_fraction: 0.1,
        }
    }
}

/// Entropy coefficient that only ever moves down toward its floor.
#[derive(Debug, Clone)]
pub struct EntropySchedule {
    initial: f32,
    current: f32,
    config: EntropyScheduleConfig,
}

impl EntropySchedule {
    pub fn new(initial: f32, config: EntropyScheduleConfig) -> Self {
        EntropySchedule {
            initial,
            current: initial,
            config,
        }
    }

    pub fn coef(&self) -> f32 {
        self.current
    }

    /// Anneal after one update and return the new coefficient.
    ///
    /// With progress the target is a linear ramp from the initial value to
    /// `final_fraction` of it; without, the coefficient decays geometrically.
    pub fn step(&mut self, progress: Option<TrainingProgress>) -> f32 {
        let candidate = match progress {
            Some(p) => self.initial * (1.0 - (1.0 - self.config.final_fraction) * p.fraction()),
            None => self.current * self.config.decay,
        };
        self.current = candidate.max(self.config.min_coef).min(self.current);
        self.current
    }

    /// Restore a coefficient saved in a checkpoint.
    pub fn restore(&mut self, coef: f32) {
        self.current = coef.max(self.config.min_coef);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decay_without_progress_hits_floor() {
        let mut schedule = EntropySchedule::new(0.01, EntropyScheduleConfig::sink_designer());
        let first = schedule.step(None);
        assert!((first - 0.0099).abs() < 1e-7);
        for _ in 0..10_000 {
            schedule.step(None);
        }
        assert_eq!(schedule.coef(), 0.001);
    }

    #[test]
    fn test_linear_anneal_with_progress() {
        let mut schedule = EntropySchedule::new(0.01, EntropyScheduleConfig::tumor());
        let half = schedule.step(Some(TrainingProgress {
            step: 50,
            total: 100,
        }));
        assert!((half - 0.0055).abs() < 1e-6);
        // End of training would give 0.001, clamped to the tumor floor
        let end = schedule.step(Some(TrainingProgress {
            step: 100,
            total: 100,
        }));
        assert_eq!(end, 0.005);
    }

    #[test]
    fn test_coefficient_never_increases() {
        let mut schedule = EntropySchedule::new(0.01, EntropyScheduleConfig::tumor());
        let mut prev = schedule.coef();
        let steps = [10u64, 80, 20, 90, 0, 100, 30];
        for step in steps {
            let coef = schedule.step(Some(TrainingProgress { step, total: 100 }));
            assert!(coef <= prev, "{coef} > {prev} at step {step}");
            assert!(coef >= 0.005);
            prev = coef;
        }
        let coef = schedule.step(None);
        assert!(coef <= prev);
    }

    #[test]
    fn test_restore_respects_floor() {
        let mut schedule = EntropySchedule::new(0.01, EntropyScheduleConfig::sink_designer());
        schedule.restore(0.004);
        assert_eq!(schedule.coef(), 0.004);
        schedule.restore(0.0);
        assert_eq!(schedule.coef(), 0.001);
    }
}

use std::collections::BTreeMap;
use std::thread;

use crossbeam_channel::unbounded;
use tracing::{error, info};

use super::delta::{BASE_MAGNITUDE, FluxDelta};
use super::store::DeltaCache;
use crate::agent::Compartment;
use crate::error::CacheError;

/// Changes smaller than this are treated as numerical noise.
const FLUX_EPSILON: f64 = 1e-6;
/// Guards the fractional deltas against a zero baseline.
const RATIO_EPSILON: f64 = 1e-6;
const PROGRESS_EVERY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Optimal,
    Infeasible,
}

/// One steady-state solution of the flux simulator.
#[derive(Debug, Clone)]
pub struct FluxSolution {
    pub status: SolveStatus,
    pub primary_flux: f64,
    pub growth_rate: f64,
    pub cofactor_ratio: f64,
    /// Per-reaction fluxes keyed by reaction id.
    pub fluxes: BTreeMap<String, f64>,
}

/// External metabolic simulator used to measure single interventions.
pub trait FluxSimulator: Sync {
    fn baseline(&self) -> Result<FluxSolution, CacheError>;

    fn with_intervention(
        &self,
        intervention: &str,
        compartment: Compartment,
        magnitude: u32,
    ) -> Result<FluxSolution, CacheError>;
}

/// Measure one intervention against a precomputed baseline.
///
/// An infeasible intervention yields a zero delta; an infeasible baseline is
/// an error because nothing can be measured against it.
pub fn compute_single_delta(
    simulator: &dyn FluxSimulator,
    baseline: &FluxSolution,
    intervention: &str,
    compartment: Compartment,
    top_k: usize,
) -> Result<FluxDelta, CacheError> {
    if baseline.status != SolveStatus::Optimal {
        return Err(CacheError::InfeasibleBaseline);
    }

    let solution = simulator.with_intervention(intervention, compartment, BASE_MAGNITUDE)?;
    if solution.status != SolveStatus::Optimal {
        return Ok(FluxDelta::zero(intervention, compartment));
    }

    let mut changes: Vec<(String, f64)> = baseline
        .fluxes
        .iter()
        .filter_map(|(id, &before)| {
            let after = *solution.fluxes.get(id)?;
            let change = after - before;
            (change.abs() > FLUX_EPSILON).then(|| (id.clone(), change))
        })
        .collect();
    changes.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
    changes.truncate(top_k);

    Ok(FluxDelta {
        intervention: intervention.to_string(),
        compartment,
        magnitude: BASE_MAGNITUDE,
        primary_delta: solution.primary_flux - baseline.primary_flux,
        growth_delta: (solution.growth_rate - baseline.growth_rate)
            / (baseline.growth_rate + RATIO_EPSILON),
        cofactor_delta: (solution.cofactor_ratio - baseline.cofactor_ratio)
            / (baseline.cofactor_ratio + RATIO_EPSILON),
        top_flux_deltas: changes,
    })
}

/// Outcome of a precompute run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrecomputeReport {
    pub requested: usize,
    pub computed: usize,
    pub failed: usize,
}

/// Fills a [`DeltaCache`] with every missing single-intervention delta.
///
/// Tasks run on a fixed pool of threads; results flow back to the calling
/// thread, which is the only writer to the cache.
pub struct PrecomputePool {
    workers: usize,
    top_k: usize,
}

impl PrecomputePool {
    pub fn new(workers: usize, top_k: usize) -> Self {
        PrecomputePool {
            workers: workers.max(1),
            top_k,
        }
    }

    pub fn run(
        &self,
        cache: &mut DeltaCache,
        simulator: &dyn FluxSimulator,
        library: &[String],
    ) -> Result<PrecomputeReport, CacheError> {
        if library.is_empty() {
            return Err(CacheError::EmptyLibrary);
        }

        let tasks = cache.missing_singles(library);
        let mut report = PrecomputeReport {
            requested: tasks.len(),
            ..Default::default()
        };
        if tasks.is_empty() {
            info!("all single-intervention deltas already cached");
            return Ok(report);
        }
        info!(tasks = tasks.len(), workers = self.workers, "computing missing deltas");

        let baseline = simulator.baseline()?;
        let (task_tx, task_rx) = unbounded::<(String, Compartment)>();
        let (result_tx, result_rx) = unbounded();
        for task in tasks {
            // Receiver is alive until the scope below ends
            let _ = task_tx.send(task);
        }
        drop(task_tx);

        thread::scope(|scope| {
            for _ in 0..self.workers {
                let task_rx = task_rx.clone();
                let result_tx = result_tx.clone();
                let baseline = &baseline;
                let top_k = self.top_k;
                scope.spawn(move || {
                    for (id, compartment) in task_rx.iter() {
                        let outcome = compute_single_delta(simulator, baseline, &id, compartment, top_k);
                        if result_tx.send((id, compartment, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(result_tx);

            for (id, compartment, outcome) in result_rx.iter() {
                match outcome {
                    Ok(delta) => {
                        cache.insert(delta);
                        report.computed += 1;
                        if report.computed % PROGRESS_EVERY == 0 {
                            info!(
                                computed = report.computed,
                                total = report.requested,
                                "precompute progress"
                            );
                        }
                    }
                    Err(e) => {
                        report.failed += 1;
                        error!(intervention = %id, compartment = %compartment, error = %e, "failed to compute delta");
                    }
                }
            }
        });

        cache.save()?;
        info!(
            computed = report.computed,
            failed = report.failed,
            "cached new deltas"
        );
        Ok(report)
    }
}

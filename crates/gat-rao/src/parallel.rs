//! Parallel optimisation of independent perimeters.

use crate::error::RaoResult;
use crate::optimizer::{optimize, OptimizerInput};
use crate::parameters::RaoParameters;
use crate::results::LinearOptimizationResult;
use crate::sensitivity::NetworkSnapshot;
use rayon::prelude::*;
use tracing::info;

/// One perimeter to optimise, with the network snapshot it owns for the
/// duration of the run.
pub struct PerimeterJob<'a> {
    pub input: OptimizerInput<'a>,
    pub snapshot: NetworkSnapshot,
}

/// Result of one job, with its snapshot left on the returned setpoints.
pub struct PerimeterOutcome {
    pub result: RaoResult<LinearOptimizationResult>,
    pub snapshot: NetworkSnapshot,
}

/// Runs every job on the rayon pool. Outcomes come back in job order.
pub fn optimize_perimeters(
    jobs: Vec<PerimeterJob<'_>>,
    params: &RaoParameters,
) -> Vec<PerimeterOutcome> {
    info!("Optimizing {} perimeters in parallel", jobs.len());
    jobs.into_par_iter()
        .map(|job| {
            let PerimeterJob { input, mut snapshot } = job;
            let result = optimize(&input, &mut snapshot, params);
            PerimeterOutcome { result, snapshot }
        })
        .collect()
}

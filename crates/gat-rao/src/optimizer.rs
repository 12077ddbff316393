//! Iterating linear optimiser.
//!
//! ```text
//!   INIT ─► SOLVE ─► ROUND ─► [re-solve] ─► APPLY ─► SENSITIVITY ─► EVALUATE
//!             ▲                                                        │
//!             └──────────── better: re-linearise, continue ◄───────────┘
//! ```
//!
//! The re-solve on rounded taps only runs with approximated integers.
//!
//! The run keeps exactly one best iterate. It stops on an LP failure, an
//! unchanged rounded activation, a sensitivity failure, a candidate that is
//! not strictly cheaper, or the iteration cap. Every exit leaves the network
//! snapshot on the setpoints of the returned activation.

use crate::arena::ScratchArena;
use crate::best_tap_finder::{BestTapFinder, RoundingContext};
use crate::error::{RaoError, RaoResult};
use crate::linear_problem::fillers::LinearizationPoint;
use crate::linear_problem::{LinearModel, LpBackend};
use crate::objective::ObjectiveFunction;
use crate::parameters::{PstModel, RaoParameters};
use crate::results::{
    ComputationStatus, FlowResult, IterationResult, LinearOptimizationResult, LinearProblemStatus,
    RangeActionActivationResult, RangeActionSetpointResult, SensitivityResult,
};
use crate::sensitivity::{
    AuxiliarySource, NetworkSnapshot, SensitivityComputer, SensitivityEngine,
};
use gat_crac::OptimizationPerimeter;
use tracing::{debug, error, info, warn};

/// Everything one optimisation run reads
pub struct OptimizerInput<'a> {
    pub perimeter: &'a OptimizationPerimeter,
    /// Setpoints in force before the perimeter's optimisation
    pub pre_perimeter_setpoints: RangeActionSetpointResult,
    /// Flows and sensitivities of the network at the pre-perimeter setpoints
    pub pre_optim_flow_result: &'a FlowResult,
    pub pre_optim_sensitivity_result: &'a SensitivityResult,
    /// Reference situation for MNEC and loop-flow tolerances, commercial
    /// flows and PTDF zonal sums
    pub initial_flow_result: &'a FlowResult,
    pub engine: &'a dyn SensitivityEngine,
    pub backend: &'a dyn LpBackend,
}

impl OptimizerInput<'_> {
    fn validate(&self) -> RaoResult<()> {
        for ra in self.perimeter.range_actions() {
            if self.pre_perimeter_setpoints.setpoint(ra.id()).is_none() {
                return Err(RaoError::InvalidInput(format!(
                    "no pre-perimeter setpoint for range action {}",
                    ra.id()
                )));
            }
        }
        Ok(())
    }
}

fn linearization_point(result: &IterationResult) -> LinearizationPoint<'_> {
    LinearizationPoint {
        flow_result: &result.flow_result,
        sensitivity_result: &result.sensitivity_result,
        activation: &result.activation,
    }
}

/// Pre-perimeter flows with the auxiliary quantities that stay fixed during
/// the run: PTDF sums from the initial situation and, unless recomputed,
/// commercial flows from the pre-perimeter situation completed by the
/// initial one.
fn pre_perimeter_flows(input: &OptimizerInput<'_>, params: &RaoParameters) -> FlowResult {
    let mut flows = input.pre_optim_flow_result.clone();
    if params.needs_ptdf_sums() {
        flows.carry_ptdf_sums_from(input.initial_flow_result);
    }
    if params.needs_commercial_flows() && !recomputes_commercial_flows(params) {
        flows.fill_commercial_flows_from(input.initial_flow_result);
    }
    flows
}

fn recomputes_commercial_flows(params: &RaoParameters) -> bool {
    params
        .loop_flow
        .as_ref()
        .is_some_and(|lf| lf.update_commercial_flows_with_pst_change)
}

fn sensitivity_computer<'a>(
    input: &OptimizerInput<'a>,
    params: &RaoParameters,
    pre_perimeter_flows: &FlowResult,
) -> SensitivityComputer<'a> {
    let ptdf_sums = if params.needs_ptdf_sums() {
        AuxiliarySource::Fixed(input.initial_flow_result.clone())
    } else {
        AuxiliarySource::Skip
    };
    let commercial_flows = if !params.needs_commercial_flows() {
        AuxiliarySource::Skip
    } else if recomputes_commercial_flows(params) {
        AuxiliarySource::Compute
    } else {
        AuxiliarySource::Fixed(pre_perimeter_flows.clone())
    };
    SensitivityComputer::builder(input.engine, input.perimeter.main_state().clone())
        .with_cnecs(input.perimeter.flow_cnecs())
        .with_range_actions(input.perimeter.range_actions())
        .with_ptdf_sums(ptdf_sums)
        .with_commercial_flows(commercial_flows)
        .build()
}

/// Runs the iterating optimiser on one perimeter.
///
/// `snapshot` is the run's exclusive working copy of the network; it must
/// hold the pre-perimeter setpoints on entry. Solver and sensitivity
/// failures are reported through the result status; only malformed inputs
/// return `Err`.
pub fn optimize(
    input: &OptimizerInput<'_>,
    snapshot: &mut NetworkSnapshot,
    params: &RaoParameters,
) -> RaoResult<LinearOptimizationResult> {
    params.validate()?;
    input.validate()?;
    let perimeter = input.perimeter;

    let pre_perimeter_flows = pre_perimeter_flows(input, params);
    let objective = ObjectiveFunction::build(
        perimeter,
        params,
        input.initial_flow_result,
        &pre_perimeter_flows,
    )?;
    let computer = sensitivity_computer(input, params, &pre_perimeter_flows);
    let finder = BestTapFinder::new(perimeter, &params.tap_rounding, params.objective_unit);
    let mut arena = ScratchArena::new();

    // === INIT ===
    let seed_flows = pre_perimeter_flows.clone();
    let seed_activation = RangeActionActivationResult::new(input.pre_perimeter_setpoints.clone());
    let seed_sensitivity = input.pre_optim_sensitivity_result.clone();
    let seed_objective = objective.evaluate(
        &seed_flows,
        &seed_activation,
        &seed_sensitivity,
        seed_sensitivity.status(),
    );
    let mut best = IterationResult {
        iteration: 0,
        activation: seed_activation,
        flow_result: seed_flows,
        sensitivity_result: seed_sensitivity,
        objective: seed_objective,
        status: LinearProblemStatus::Optimal,
    };
    let mut cost_history = vec![best.cost()];
    info!(
        "Initial situation on {}: cost {:.2} (functional: {:.2}, virtual: {:.2})",
        perimeter.main_state(),
        best.cost(),
        best.functional_cost(),
        best.objective.total_virtual_cost()
    );

    let mut model = LinearModel::build(perimeter, params, input.initial_flow_result);
    model.fill(&linearization_point(&best))?;

    for iteration in 1..=params.max_iterations {
        let point = linearization_point(&best);

        // === SOLVE ===
        debug!("Iteration {}: linear optimization [start]", iteration);
        let solution = model.solve(input.backend);
        debug!("Iteration {}: linear optimization [end]", iteration);

        if !solution.status.has_solution() {
            snapshot.apply_activation(&best.activation, perimeter);
            if iteration == 1 {
                error!(
                    "Linear optimization failed at first iteration with status {}, \
                     initial situation is kept",
                    solution.status
                );
                return Ok(best.into_result(solution.status, cost_history));
            }
            warn!(
                "Linear optimization failed at iteration {} with status {}, \
                 result of iteration {} is kept",
                iteration, solution.status, best.iteration
            );
            return Ok(best.into_result(LinearProblemStatus::Feasible, cost_history));
        }
        if solution.status == LinearProblemStatus::Feasible {
            warn!(
                "Iteration {}: linear optimization was interrupted, \
                 the feasible solution found is kept",
                iteration
            );
        }

        // === ROUND ===
        let continuous = model.activation_from_solution(&solution, &point)?;
        let ctx = RoundingContext {
            snapshot,
            flow_result: &best.flow_result,
            sensitivity_result: &best.sensitivity_result,
        };
        let mut candidate_activation = finder.round(&continuous, &ctx, &mut arena)?;

        if params.range_actions.pst_model == PstModel::ApproximatedIntegers {
            model.update_between_rounding_iteration(&point, &candidate_activation)?;
            let refined = model.solve(input.backend);
            if refined.status.has_solution() {
                // PSTs were pinned on their taps; rounding again only snaps
                // solver noise
                let refined_activation = model.activation_from_solution(&refined, &point)?;
                candidate_activation = finder.round(&refined_activation, &ctx, &mut arena)?;
            } else {
                debug!(
                    "Iteration {}: re-solve on rounded taps ended with status {}, \
                     rounded setpoints kept",
                    iteration, refined.status
                );
            }
        }

        if !candidate_activation.has_changed(&best.activation) {
            info!(
                "Iteration {}: same results as previous iteration, optimal solution found",
                iteration
            );
            return Ok(best.into_result(solution.status, cost_history));
        }

        // === APPLY + SENSITIVITY ===
        snapshot.apply_activation(&candidate_activation, perimeter);
        let (flow_result, sensitivity_result) = computer.compute(snapshot);
        if sensitivity_result.status() == ComputationStatus::Failure {
            warn!(
                "Iteration {}: sensitivity computation failed, result of iteration {} is kept",
                iteration, best.iteration
            );
            snapshot.apply_activation(&best.activation, perimeter);
            let status = LinearProblemStatus::SensitivityComputationFailed;
            return Ok(best.into_result(status, cost_history));
        }

        // === EVALUATE ===
        let objective_result = objective.evaluate(
            &flow_result,
            &candidate_activation,
            &sensitivity_result,
            sensitivity_result.status(),
        );
        let candidate = IterationResult {
            iteration,
            activation: candidate_activation,
            flow_result,
            sensitivity_result,
            objective: objective_result,
            status: solution.status,
        };

        if candidate.cost() < best.cost() {
            info!(
                "Iteration {}: better solution found with a cost of {:.2} (functional: {:.2})",
                iteration,
                candidate.cost(),
                candidate.functional_cost()
            );
            cost_history.push(candidate.cost());
            best = candidate;
            model.update_between_sensitivity_iteration(&linearization_point(&best))?;
        } else {
            info!(
                "Iteration {}: linear optimization found a worse result than previous iteration, \
                 with a cost increasing from {:.2} to {:.2} (functional: from {:.2} to {:.2})",
                iteration,
                best.cost(),
                candidate.cost(),
                best.functional_cost(),
                candidate.functional_cost()
            );
            snapshot.apply_activation(&best.activation, perimeter);
            return Ok(best.into_result(solution.status, cost_history));
        }
    }

    info!(
        "Maximum number of iterations ({}) reached, result of iteration {} is kept",
        params.max_iterations, best.iteration
    );
    Ok(best.into_result(LinearProblemStatus::MaxIterationReached, cost_history))
}

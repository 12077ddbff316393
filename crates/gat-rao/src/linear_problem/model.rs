use super::fillers::{
    ContinuousRangeActionGroupFiller, CoreProblemFiller, DiscretePstFiller, LinearizationPoint,
    LoopFlowFiller, MaxMinMarginFiller, MaxMinRelativeMarginFiller, MnecFiller, ProblemFiller,
};
use super::{LinearProblem, LpBackend, LpSolution, VariableKey};
use crate::error::RaoResult;
use crate::parameters::{PstModel, RaoParameters};
use crate::results::{FlowResult, RangeActionActivationResult};
use gat_crac::{OptimizationPerimeter, RangeAction, State};
use tracing::debug;

/// The linear problem of one perimeter together with the fillers that
/// maintain it.
pub struct LinearModel<'a> {
    perimeter: &'a OptimizationPerimeter,
    problem: LinearProblem,
    fillers: Vec<Box<dyn ProblemFiller + 'a>>,
}

impl<'a> LinearModel<'a> {
    /// Assembles the fillers required by `params`. The problem stays empty
    /// until [`LinearModel::fill`].
    pub fn build(
        perimeter: &'a OptimizationPerimeter,
        params: &'a RaoParameters,
        initial_flows: &'a FlowResult,
    ) -> Self {
        let mut fillers: Vec<Box<dyn ProblemFiller + 'a>> =
            vec![Box::new(CoreProblemFiller::new(perimeter, &params.range_actions))];

        if params.relative_margins {
            fillers.push(Box::new(MaxMinRelativeMarginFiller::new(
                perimeter,
                params.objective_unit,
                params.relative_margin.ptdf_sum_lower_bound,
            )));
        } else {
            fillers.push(Box::new(MaxMinMarginFiller::new(perimeter, params.objective_unit)));
        }
        if let Some(mnec) = &params.mnec {
            fillers.push(Box::new(MnecFiller::new(
                perimeter,
                mnec,
                initial_flows,
                params.objective_unit,
            )));
        }
        if let Some(loop_flow) = &params.loop_flow {
            fillers.push(Box::new(LoopFlowFiller::new(perimeter, loop_flow, initial_flows)));
        }
        fillers.push(Box::new(ContinuousRangeActionGroupFiller::new(perimeter)));
        if params.range_actions.pst_model == PstModel::ApproximatedIntegers {
            fillers.push(Box::new(DiscretePstFiller::new(perimeter)));
        }

        Self {
            perimeter,
            problem: LinearProblem::new(),
            fillers,
        }
    }

    pub fn fill(&mut self, point: &LinearizationPoint<'_>) -> RaoResult<()> {
        for filler in &self.fillers {
            filler.fill(&mut self.problem, point)?;
        }
        debug!(
            "Linear problem filled: {} variables, {} constraints",
            self.problem.num_variables(),
            self.problem.num_constraints()
        );
        Ok(())
    }

    pub fn update_between_sensitivity_iteration(
        &mut self,
        point: &LinearizationPoint<'_>,
    ) -> RaoResult<()> {
        for filler in &self.fillers {
            filler.update_between_sensitivity_iteration(&mut self.problem, point)?;
        }
        Ok(())
    }

    pub fn update_between_rounding_iteration(
        &mut self,
        point: &LinearizationPoint<'_>,
        rounded: &RangeActionActivationResult,
    ) -> RaoResult<()> {
        for filler in &self.fillers {
            filler.update_between_rounding_iteration(&mut self.problem, point, rounded)?;
        }
        Ok(())
    }

    pub fn solve(&self, backend: &dyn LpBackend) -> LpSolution {
        backend.solve(&self.problem)
    }

    /// Setpoints of the solution, as an activation around `point`.
    ///
    /// Solver values are clamped onto the admissible ranges so that small
    /// numerical excursions never leak into the result; grouped members all
    /// take the clamped shared setpoint.
    pub fn activation_from_solution(
        &self,
        solution: &LpSolution,
        point: &LinearizationPoint<'_>,
    ) -> RaoResult<RangeActionActivationResult> {
        let mut activation =
            RangeActionActivationResult::new(point.activation.pre_perimeter().clone());

        for (state, ids) in self.perimeter.range_actions_per_state() {
            for (group, members) in self.perimeter.groups_on(state) {
                let mut lower = f64::NEG_INFINITY;
                let mut upper = f64::INFINITY;
                for ra in &members {
                    let previous = self.previous_setpoint(ra, state, &activation);
                    let (min, max) = ra.admissible_range(previous)?;
                    lower = lower.max(min);
                    upper = upper.min(max);
                }
                let shared = solution.value(&VariableKey::GroupSetpoint {
                    group,
                    state: state.clone(),
                });
                let setpoint = shared.clamp(lower, upper.max(lower));
                for ra in &members {
                    activation.activate(ra.id(), state, setpoint);
                }
            }

            for id in ids {
                let Some(ra) = self.perimeter.range_action(id) else {
                    continue;
                };
                if ra.group_id().is_some() {
                    continue;
                }
                let reference = point.activation.optimized_setpoint(ra.id(), state);
                let delta = solution.value(&VariableKey::SetpointDelta {
                    ra: ra.id().clone(),
                    state: state.clone(),
                });
                let previous = self.previous_setpoint(ra, state, &activation);
                let (min, max) = ra.admissible_range(previous)?;
                activation.activate(ra.id(), state, (reference + delta).clamp(min, max));
            }
        }
        Ok(activation)
    }

    /// Setpoint in force before `state`, read from the activation being
    /// built; states are visited in order so upstream entries are final.
    fn previous_setpoint(
        &self,
        ra: &RangeAction,
        state: &State,
        activation: &RangeActionActivationResult,
    ) -> f64 {
        match self.perimeter.previous_state_of(ra.id(), state) {
            Some(prev) => activation.optimized_setpoint(ra.id(), prev),
            None => activation
                .pre_perimeter()
                .setpoint(ra.id())
                .unwrap_or_else(|| ra.initial_setpoint()),
        }
    }
}

use super::{LinearizationPoint, ProblemFiller};
use crate::error::RaoResult;
use crate::linear_problem::{ConstraintKey, LinearProblem, VariableKey};
use crate::parameters::LoopFlowParameters;
use crate::results::FlowResult;
use gat_crac::{FlowCnec, OptimizationPerimeter, Side};
use tracing::debug;

/// Bounds the loop flow `F - commercial flow` of CNECs carrying a loop-flow
/// threshold, with a priced violation variable.
pub struct LoopFlowFiller<'a> {
    perimeter: &'a OptimizationPerimeter,
    params: &'a LoopFlowParameters,
    initial_flows: &'a FlowResult,
}

impl<'a> LoopFlowFiller<'a> {
    pub fn new(
        perimeter: &'a OptimizationPerimeter,
        params: &'a LoopFlowParameters,
        initial_flows: &'a FlowResult,
    ) -> Self {
        Self {
            perimeter,
            params,
            initial_flows,
        }
    }

    /// Allowed absolute loop flow: the threshold, relaxed up to the initial
    /// loop flow plus the acceptable increase.
    fn loop_flow_bound(&self, cnec: &FlowCnec, side: Side) -> f64 {
        let threshold = cnec.loop_flow_threshold_mw(side).unwrap_or(0.0);
        let initial = self.initial_flows.loop_flow(cnec, side).abs();
        let bound = threshold.max(initial + self.params.acceptable_increase)
            - self.params.constraint_adjustment_coefficient;
        bound.max(0.0)
    }

    /// Commercial flows are read from the linearisation point, which carries
    /// either recomputed or fixed pre-perimeter values.
    fn set_bounds(&self, lp: &mut LinearProblem, point: &LinearizationPoint<'_>) -> RaoResult<()> {
        for cnec in self.perimeter.loop_flow_cnecs() {
            for side in cnec.monitored_sides() {
                let bound = self.loop_flow_bound(cnec, side);
                let commercial = point.flow_result.commercial_flow(cnec.id(), side);
                lp.set_constraint_bounds(
                    &ConstraintKey::LoopFlowUpper {
                        cnec: cnec.id().clone(),
                        side,
                    },
                    f64::NEG_INFINITY,
                    bound + commercial,
                )?;
                lp.set_constraint_bounds(
                    &ConstraintKey::LoopFlowLower {
                        cnec: cnec.id().clone(),
                        side,
                    },
                    -bound + commercial,
                    f64::INFINITY,
                )?;
            }
        }
        Ok(())
    }
}

impl ProblemFiller for LoopFlowFiller<'_> {
    fn fill(&self, lp: &mut LinearProblem, point: &LinearizationPoint<'_>) -> RaoResult<()> {
        for cnec in self.perimeter.loop_flow_cnecs() {
            for side in cnec.monitored_sides() {
                let flow = VariableKey::Flow {
                    cnec: cnec.id().clone(),
                    side,
                };
                let violation = VariableKey::LoopFlowViolation {
                    cnec: cnec.id().clone(),
                    side,
                };
                lp.add_variable(violation.clone(), 0.0, f64::INFINITY)?;
                lp.set_objective_coefficient(&violation, self.params.violation_cost)?;

                let upper = ConstraintKey::LoopFlowUpper {
                    cnec: cnec.id().clone(),
                    side,
                };
                lp.add_constraint(upper.clone(), f64::NEG_INFINITY, f64::INFINITY)?;
                lp.set_coefficient(&upper, &flow, 1.0)?;
                lp.set_coefficient(&upper, &violation, -1.0)?;

                let lower = ConstraintKey::LoopFlowLower {
                    cnec: cnec.id().clone(),
                    side,
                };
                lp.add_constraint(lower.clone(), f64::NEG_INFINITY, f64::INFINITY)?;
                lp.set_coefficient(&lower, &flow, 1.0)?;
                lp.set_coefficient(&lower, &violation, 1.0)?;
            }
        }
        self.set_bounds(lp, point)
    }

    fn update_between_sensitivity_iteration(
        &self,
        lp: &mut LinearProblem,
        point: &LinearizationPoint<'_>,
    ) -> RaoResult<()> {
        if self.params.update_commercial_flows_with_pst_change {
            debug!("Updating loop-flow bounds with recomputed commercial flows");
            self.set_bounds(lp, point)?;
        }
        Ok(())
    }
}

use super::{LinearizationPoint, ProblemFiller};
use crate::error::RaoResult;
use crate::linear_problem::{LinearProblem, VariableKey};
use crate::results::RangeActionActivationResult;
use gat_crac::OptimizationPerimeter;

/// Approximated integers: once taps are rounded, PST deltas are pinned to
/// the rounded angles so that the re-solve only moves the continuous range
/// actions.
pub struct DiscretePstFiller<'a> {
    perimeter: &'a OptimizationPerimeter,
}

impl<'a> DiscretePstFiller<'a> {
    pub fn new(perimeter: &'a OptimizationPerimeter) -> Self {
        Self { perimeter }
    }
}

impl ProblemFiller for DiscretePstFiller<'_> {
    fn fill(&self, _lp: &mut LinearProblem, _point: &LinearizationPoint<'_>) -> RaoResult<()> {
        Ok(())
    }

    fn update_between_sensitivity_iteration(
        &self,
        _lp: &mut LinearProblem,
        _point: &LinearizationPoint<'_>,
    ) -> RaoResult<()> {
        Ok(())
    }

    fn update_between_rounding_iteration(
        &self,
        lp: &mut LinearProblem,
        point: &LinearizationPoint<'_>,
        rounded: &RangeActionActivationResult,
    ) -> RaoResult<()> {
        for (state, ra) in self.perimeter.state_range_actions() {
            if !ra.is_discrete() {
                continue;
            }
            let reference = point.activation.optimized_setpoint(ra.id(), state);
            let delta = rounded.optimized_setpoint(ra.id(), state) - reference;
            lp.set_variable_bounds(
                &VariableKey::SetpointDelta {
                    ra: ra.id().clone(),
                    state: state.clone(),
                },
                delta,
                delta,
            )?;
        }
        Ok(())
    }
}

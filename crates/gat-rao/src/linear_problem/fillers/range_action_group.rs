use super::{LinearizationPoint, ProblemFiller};
use crate::error::RaoResult;
use crate::linear_problem::{ConstraintKey, LinearProblem, VariableKey};
use gat_crac::OptimizationPerimeter;

/// Aligns grouped range actions on one shared setpoint per state:
/// `reference + Δ = G` for every member.
pub struct ContinuousRangeActionGroupFiller<'a> {
    perimeter: &'a OptimizationPerimeter,
}

impl<'a> ContinuousRangeActionGroupFiller<'a> {
    pub fn new(perimeter: &'a OptimizationPerimeter) -> Self {
        Self { perimeter }
    }

    fn set_bounds(&self, lp: &mut LinearProblem, point: &LinearizationPoint<'_>) -> RaoResult<()> {
        for state in self.perimeter.range_action_states() {
            for members in self.perimeter.groups_on(state).values() {
                for ra in members {
                    let reference = point.activation.optimized_setpoint(ra.id(), state);
                    lp.set_constraint_bounds(
                        &ConstraintKey::GroupMembership {
                            ra: ra.id().clone(),
                            state: state.clone(),
                        },
                        -reference,
                        -reference,
                    )?;
                }
            }
        }
        Ok(())
    }
}

impl ProblemFiller for ContinuousRangeActionGroupFiller<'_> {
    fn fill(&self, lp: &mut LinearProblem, point: &LinearizationPoint<'_>) -> RaoResult<()> {
        for state in self.perimeter.range_action_states() {
            for (group, members) in self.perimeter.groups_on(state) {
                let shared = VariableKey::GroupSetpoint {
                    group,
                    state: state.clone(),
                };
                lp.add_variable(shared.clone(), f64::NEG_INFINITY, f64::INFINITY)?;
                for ra in members {
                    let key = ConstraintKey::GroupMembership {
                        ra: ra.id().clone(),
                        state: state.clone(),
                    };
                    lp.add_constraint(key.clone(), 0.0, 0.0)?;
                    lp.set_coefficient(
                        &key,
                        &VariableKey::SetpointDelta {
                            ra: ra.id().clone(),
                            state: state.clone(),
                        },
                        1.0,
                    )?;
                    lp.set_coefficient(&key, &shared, -1.0)?;
                }
            }
        }
        self.set_bounds(lp, point)
    }

    fn update_between_sensitivity_iteration(
        &self,
        lp: &mut LinearProblem,
        point: &LinearizationPoint<'_>,
    ) -> RaoResult<()> {
        self.set_bounds(lp, point)
    }
}

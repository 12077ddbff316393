use super::{LinearizationPoint, ProblemFiller};
use crate::error::RaoResult;
use crate::linear_problem::{ConstraintKey, LinearProblem, VariableKey};
use crate::parameters::MnecParameters;
use crate::results::FlowResult;
use gat_crac::{OptimizationPerimeter, Unit};

/// Soft thresholds on monitored elements.
///
/// An MNEC may not end worse than `max(threshold, initial flow + acceptable
/// decrease)`; any excess is carried by a non-negative violation variable,
/// priced in the objective.
pub struct MnecFiller<'a> {
    perimeter: &'a OptimizationPerimeter,
    params: &'a MnecParameters,
    initial_flows: &'a FlowResult,
    unit: Unit,
}

impl<'a> MnecFiller<'a> {
    pub fn new(
        perimeter: &'a OptimizationPerimeter,
        params: &'a MnecParameters,
        initial_flows: &'a FlowResult,
        unit: Unit,
    ) -> Self {
        Self {
            perimeter,
            params,
            initial_flows,
            unit,
        }
    }
}

impl ProblemFiller for MnecFiller<'_> {
    fn fill(&self, lp: &mut LinearProblem, _point: &LinearizationPoint<'_>) -> RaoResult<()> {
        for mnec in self.perimeter.monitored_cnecs() {
            let sides = mnec.monitored_sides();
            let n_sides = sides.len() as f64;
            for side in sides {
                let initial = self.initial_flows.flow(mnec, side, Unit::Megawatt);
                let flow = VariableKey::Flow {
                    cnec: mnec.id().clone(),
                    side,
                };
                let violation = VariableKey::MnecViolation {
                    cnec: mnec.id().clone(),
                    side,
                };
                lp.add_variable(violation.clone(), 0.0, f64::INFINITY)?;

                if let Some(max) = mnec.upper_bound(side, Unit::Megawatt) {
                    let upper = max.max(initial + self.params.acceptable_margin_decrease)
                        - self.params.constraint_adjustment_coefficient;
                    let key = ConstraintKey::MnecUpper {
                        cnec: mnec.id().clone(),
                        side,
                    };
                    lp.add_constraint(key.clone(), f64::NEG_INFINITY, upper)?;
                    lp.set_coefficient(&key, &flow, 1.0)?;
                    lp.set_coefficient(&key, &violation, -1.0)?;
                }
                if let Some(min) = mnec.lower_bound(side, Unit::Megawatt) {
                    let lower = min.min(initial - self.params.acceptable_margin_decrease)
                        + self.params.constraint_adjustment_coefficient;
                    let key = ConstraintKey::MnecLower {
                        cnec: mnec.id().clone(),
                        side,
                    };
                    lp.add_constraint(key.clone(), lower, f64::INFINITY)?;
                    lp.set_coefficient(&key, &flow, 1.0)?;
                    lp.set_coefficient(&key, &violation, 1.0)?;
                }

                let k = mnec.unit_multiplier(side, Unit::Megawatt, self.unit)?;
                lp.set_objective_coefficient(&violation, k * self.params.violation_cost / n_sides)?;
            }
        }
        Ok(())
    }

    fn update_between_sensitivity_iteration(
        &self,
        _lp: &mut LinearProblem,
        _point: &LinearizationPoint<'_>,
    ) -> RaoResult<()> {
        Ok(())
    }
}

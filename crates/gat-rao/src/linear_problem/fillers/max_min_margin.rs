use super::{LinearizationPoint, ProblemFiller};
use crate::error::RaoResult;
use crate::linear_problem::{ConstraintKey, LinearProblem, VariableKey};
use gat_crac::{OptimizationPerimeter, Unit};

/// Worst margin over the optimised CNECs, maximised by the objective.
///
/// Thresholds are expressed in MW and the margin variable in the objective
/// unit, so each constraint carries `1 / k` on the margin with `k` the
/// MW → unit factor of the CNEC side.
pub struct MaxMinMarginFiller<'a> {
    perimeter: &'a OptimizationPerimeter,
    unit: Unit,
}

impl<'a> MaxMinMarginFiller<'a> {
    pub fn new(perimeter: &'a OptimizationPerimeter, unit: Unit) -> Self {
        Self { perimeter, unit }
    }

    /// Adds MM and its constraints without touching the objective.
    pub(super) fn add_min_margin(&self, lp: &mut LinearProblem) -> RaoResult<()> {
        let has_cnecs = self.perimeter.optimized_cnecs().next().is_some();
        if has_cnecs {
            lp.add_variable(VariableKey::MinMargin, f64::NEG_INFINITY, f64::INFINITY)?;
        } else {
            lp.add_variable(VariableKey::MinMargin, 0.0, 0.0)?;
        }

        for cnec in self.perimeter.optimized_cnecs() {
            for side in cnec.monitored_sides() {
                let k = cnec.unit_multiplier(side, Unit::Megawatt, self.unit)?;
                let flow = VariableKey::Flow {
                    cnec: cnec.id().clone(),
                    side,
                };
                if let Some(max) = cnec.upper_bound(side, Unit::Megawatt) {
                    let key = ConstraintKey::MinMarginUpper {
                        cnec: cnec.id().clone(),
                        side,
                    };
                    lp.add_constraint(key.clone(), f64::NEG_INFINITY, max)?;
                    lp.set_coefficient(&key, &VariableKey::MinMargin, 1.0 / k)?;
                    lp.set_coefficient(&key, &flow, 1.0)?;
                }
                if let Some(min) = cnec.lower_bound(side, Unit::Megawatt) {
                    let key = ConstraintKey::MinMarginLower {
                        cnec: cnec.id().clone(),
                        side,
                    };
                    lp.add_constraint(key.clone(), f64::NEG_INFINITY, -min)?;
                    lp.set_coefficient(&key, &VariableKey::MinMargin, 1.0 / k)?;
                    lp.set_coefficient(&key, &flow, -1.0)?;
                }
            }
        }
        Ok(())
    }
}

impl ProblemFiller for MaxMinMarginFiller<'_> {
    fn fill(&self, lp: &mut LinearProblem, _point: &LinearizationPoint<'_>) -> RaoResult<()> {
        self.add_min_margin(lp)?;
        lp.set_objective_coefficient(&VariableKey::MinMargin, -1.0)
    }

    fn update_between_sensitivity_iteration(
        &self,
        _lp: &mut LinearProblem,
        _point: &LinearizationPoint<'_>,
    ) -> RaoResult<()> {
        Ok(())
    }
}

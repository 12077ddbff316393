use super::{LinearizationPoint, MaxMinMarginFiller, ProblemFiller};
use crate::error::RaoResult;
use crate::linear_problem::{ConstraintKey, LinearProblem, VariableKey};
use gat_crac::{OptimizationPerimeter, Unit};
use tracing::debug;

/// Worst relative margin (margin divided by the PTDF zonal sum).
///
/// Relative margins only apply to positive margins, which an LP cannot
/// express exactly. The model keeps both the absolute and the relative
/// margin variables and lets the objective follow the linearisation point:
/// while the worst absolute margin there is negative, the absolute margin is
/// maximised; once it is positive, the relative one is.
pub struct MaxMinRelativeMarginFiller<'a> {
    perimeter: &'a OptimizationPerimeter,
    unit: Unit,
    ptdf_floor: f64,
    absolute: MaxMinMarginFiller<'a>,
}

impl<'a> MaxMinRelativeMarginFiller<'a> {
    pub fn new(perimeter: &'a OptimizationPerimeter, unit: Unit, ptdf_floor: f64) -> Self {
        Self {
            perimeter,
            unit,
            ptdf_floor,
            absolute: MaxMinMarginFiller::new(perimeter, unit),
        }
    }

    /// Upper bound of the relative margin, keeping the LP bounded when no
    /// constraint is binding.
    fn max_positive_relative_margin(&self) -> f64 {
        let highest = self
            .perimeter
            .optimized_cnecs()
            .map(|c| c.highest_threshold(self.unit))
            .fold(0.0, f64::max);
        highest / self.ptdf_floor
    }

    fn set_relative_coefficients(
        &self,
        lp: &mut LinearProblem,
        point: &LinearizationPoint<'_>,
    ) -> RaoResult<()> {
        for cnec in self.perimeter.optimized_cnecs() {
            for side in cnec.monitored_sides() {
                let k = cnec.unit_multiplier(side, Unit::Megawatt, self.unit)?;
                let ptdf = point
                    .flow_result
                    .ptdf_zonal_sum(cnec.id(), side)
                    .max(self.ptdf_floor);
                for key in [
                    ConstraintKey::MinRelativeMarginUpper {
                        cnec: cnec.id().clone(),
                        side,
                    },
                    ConstraintKey::MinRelativeMarginLower {
                        cnec: cnec.id().clone(),
                        side,
                    },
                ] {
                    if lp.constraint(&key).is_some() {
                        lp.set_coefficient(&key, &VariableKey::MinRelativeMargin, ptdf / k)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn set_objective(
        &self,
        lp: &mut LinearProblem,
        point: &LinearizationPoint<'_>,
    ) -> RaoResult<()> {
        let worst = self
            .perimeter
            .optimized_cnecs()
            .map(|c| point.flow_result.margin(c, self.unit))
            .fold(f64::INFINITY, f64::min);
        if worst < 0.0 {
            debug!("Worst margin {:.2} is negative, maximising the absolute margin", worst);
            lp.set_objective_coefficient(&VariableKey::MinMargin, -1.0)?;
            lp.set_objective_coefficient(&VariableKey::MinRelativeMargin, 0.0)
        } else {
            lp.set_objective_coefficient(&VariableKey::MinMargin, 0.0)?;
            lp.set_objective_coefficient(&VariableKey::MinRelativeMargin, -1.0)
        }
    }
}

impl ProblemFiller for MaxMinRelativeMarginFiller<'_> {
    fn fill(&self, lp: &mut LinearProblem, point: &LinearizationPoint<'_>) -> RaoResult<()> {
        self.absolute.add_min_margin(lp)?;

        let has_cnecs = self.perimeter.optimized_cnecs().next().is_some();
        let upper = if has_cnecs { self.max_positive_relative_margin() } else { 0.0 };
        let lower = if has_cnecs { f64::NEG_INFINITY } else { 0.0 };
        lp.add_variable(VariableKey::MinRelativeMargin, lower, upper)?;

        for cnec in self.perimeter.optimized_cnecs() {
            for side in cnec.monitored_sides() {
                let flow = VariableKey::Flow {
                    cnec: cnec.id().clone(),
                    side,
                };
                if let Some(max) = cnec.upper_bound(side, Unit::Megawatt) {
                    let key = ConstraintKey::MinRelativeMarginUpper {
                        cnec: cnec.id().clone(),
                        side,
                    };
                    lp.add_constraint(key.clone(), f64::NEG_INFINITY, max)?;
                    lp.set_coefficient(&key, &flow, 1.0)?;
                }
                if let Some(min) = cnec.lower_bound(side, Unit::Megawatt) {
                    let key = ConstraintKey::MinRelativeMarginLower {
                        cnec: cnec.id().clone(),
                        side,
                    };
                    lp.add_constraint(key.clone(), f64::NEG_INFINITY, -min)?;
                    lp.set_coefficient(&key, &flow, -1.0)?;
                }
            }
        }

        self.set_relative_coefficients(lp, point)?;
        self.set_objective(lp, point)
    }

    fn update_between_sensitivity_iteration(
        &self,
        lp: &mut LinearProblem,
        point: &LinearizationPoint<'_>,
    ) -> RaoResult<()> {
        self.set_relative_coefficients(lp, point)?;
        self.set_objective(lp, point)
    }
}

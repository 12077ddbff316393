use super::{LinearizationPoint, ProblemFiller};
use crate::error::RaoResult;
use crate::linear_problem::{ConstraintKey, LinearProblem, VariableKey};
use crate::parameters::RangeActionParameters;
use gat_crac::{OptimizationPerimeter, RangeAction, State, Unit};

/// Flow variables, setpoint variations and their absolute values.
pub struct CoreProblemFiller<'a> {
    perimeter: &'a OptimizationPerimeter,
    params: &'a RangeActionParameters,
}

/// Setpoint in force before `state`: the optimised previous state if any.
struct PreviousSetpoint {
    state: Option<State>,
    setpoint: f64,
}

impl<'a> CoreProblemFiller<'a> {
    pub fn new(perimeter: &'a OptimizationPerimeter, params: &'a RangeActionParameters) -> Self {
        Self { perimeter, params }
    }

    fn previous(
        &self,
        ra: &RangeAction,
        state: &State,
        point: &LinearizationPoint<'_>,
    ) -> PreviousSetpoint {
        match self.perimeter.previous_state_of(ra.id(), state) {
            Some(prev) => PreviousSetpoint {
                state: Some(prev.clone()),
                setpoint: point.activation.optimized_setpoint(ra.id(), prev),
            },
            None => PreviousSetpoint {
                state: None,
                setpoint: point
                    .activation
                    .pre_perimeter()
                    .setpoint(ra.id())
                    .unwrap_or_else(|| ra.initial_setpoint()),
            },
        }
    }

    /// Bounds of Δ and of the absolute-variation constraints, around the
    /// current setpoints.
    fn set_range_action_bounds(
        &self,
        lp: &mut LinearProblem,
        point: &LinearizationPoint<'_>,
    ) -> RaoResult<()> {
        for (state, ra) in self.perimeter.state_range_actions() {
            let reference = point.activation.optimized_setpoint(ra.id(), state);
            let previous = self.previous(ra, state, point);
            let (min, max) = ra.admissible_range(previous.setpoint)?;
            lp.set_variable_bounds(
                &VariableKey::SetpointDelta {
                    ra: ra.id().clone(),
                    state: state.clone(),
                },
                min - reference,
                max - reference,
            )?;
            lp.set_constraint_bounds(
                &ConstraintKey::AbsoluteVariationPositive {
                    ra: ra.id().clone(),
                    state: state.clone(),
                },
                reference - previous.setpoint,
                f64::INFINITY,
            )?;
            lp.set_constraint_bounds(
                &ConstraintKey::AbsoluteVariationNegative {
                    ra: ra.id().clone(),
                    state: state.clone(),
                },
                previous.setpoint - reference,
                f64::INFINITY,
            )?;
        }
        Ok(())
    }

    /// Reference flows and sensitivity coefficients of the flow constraints.
    fn set_flow_terms(
        &self,
        lp: &mut LinearProblem,
        point: &LinearizationPoint<'_>,
    ) -> RaoResult<()> {
        for cnec in self.perimeter.flow_cnecs() {
            for side in cnec.monitored_sides() {
                let key = ConstraintKey::Flow {
                    cnec: cnec.id().clone(),
                    side,
                };
                let reference = point.flow_result.flow(cnec, side, Unit::Megawatt);
                lp.set_constraint_bounds(&key, reference, reference)?;
                for ra in self.perimeter.range_actions() {
                    let Some(state) = self.perimeter.latest_state_of(ra.id(), cnec.state()) else {
                        continue;
                    };
                    let mut sensitivity = point
                        .sensitivity_result
                        .sensitivity(cnec, side, ra.id(), Unit::Megawatt);
                    if sensitivity.abs() < self.params.sensitivity_threshold(ra.kind()) {
                        sensitivity = 0.0;
                    }
                    let delta = VariableKey::SetpointDelta {
                        ra: ra.id().clone(),
                        state: state.clone(),
                    };
                    lp.set_coefficient(&key, &delta, -sensitivity)?;
                }
            }
        }
        Ok(())
    }
}

impl ProblemFiller for CoreProblemFiller<'_> {
    fn fill(&self, lp: &mut LinearProblem, point: &LinearizationPoint<'_>) -> RaoResult<()> {
        for (state, ra) in self.perimeter.state_range_actions() {
            let delta = VariableKey::SetpointDelta {
                ra: ra.id().clone(),
                state: state.clone(),
            };
            let abs_var = VariableKey::AbsoluteVariation {
                ra: ra.id().clone(),
                state: state.clone(),
            };
            lp.add_variable(delta.clone(), 0.0, 0.0)?;
            lp.add_variable(abs_var.clone(), 0.0, f64::INFINITY)?;
            lp.set_objective_coefficient(&abs_var, self.params.penalty_cost(ra.kind()))?;
        }

        for (state, ra) in self.perimeter.state_range_actions() {
            let delta = VariableKey::SetpointDelta {
                ra: ra.id().clone(),
                state: state.clone(),
            };
            let abs_var = VariableKey::AbsoluteVariation {
                ra: ra.id().clone(),
                state: state.clone(),
            };
            let previous_delta = self
                .previous(ra, state, point)
                .state
                .map(|prev| VariableKey::SetpointDelta {
                    ra: ra.id().clone(),
                    state: prev,
                });

            // AV ≥ S - S_prev
            let positive = ConstraintKey::AbsoluteVariationPositive {
                ra: ra.id().clone(),
                state: state.clone(),
            };
            lp.add_constraint(positive.clone(), 0.0, f64::INFINITY)?;
            lp.set_coefficient(&positive, &abs_var, 1.0)?;
            lp.set_coefficient(&positive, &delta, -1.0)?;

            // AV ≥ S_prev - S
            let negative = ConstraintKey::AbsoluteVariationNegative {
                ra: ra.id().clone(),
                state: state.clone(),
            };
            lp.add_constraint(negative.clone(), 0.0, f64::INFINITY)?;
            lp.set_coefficient(&negative, &abs_var, 1.0)?;
            lp.set_coefficient(&negative, &delta, 1.0)?;

            if let Some(prev) = previous_delta {
                lp.set_coefficient(&positive, &prev, 1.0)?;
                lp.set_coefficient(&negative, &prev, -1.0)?;
            }
        }

        for cnec in self.perimeter.flow_cnecs() {
            for side in cnec.monitored_sides() {
                let flow = VariableKey::Flow {
                    cnec: cnec.id().clone(),
                    side,
                };
                let key = ConstraintKey::Flow {
                    cnec: cnec.id().clone(),
                    side,
                };
                lp.add_variable(flow.clone(), f64::NEG_INFINITY, f64::INFINITY)?;
                lp.add_constraint(key.clone(), 0.0, 0.0)?;
                lp.set_coefficient(&key, &flow, 1.0)?;
            }
        }

        self.set_range_action_bounds(lp, point)?;
        self.set_flow_terms(lp, point)
    }

    fn update_between_sensitivity_iteration(
        &self,
        lp: &mut LinearProblem,
        point: &LinearizationPoint<'_>,
    ) -> RaoResult<()> {
        self.set_range_action_bounds(lp, point)?;
        self.set_flow_terms(lp, point)
    }
}

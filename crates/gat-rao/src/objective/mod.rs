//! Objective function: one functional cost plus pluggable virtual costs.
//!
//! The functional cost is minus the worst margin over optimised CNECs (lower
//! is better). Virtual costs price soft constraints the LP may violate; any
//! number of them can be registered, each reporting its own costly elements.

mod min_margin;
mod violation;

pub use min_margin::MinMarginEvaluator;
pub use violation::{
    LoopFlowViolationEvaluator, MnecViolationEvaluator, RelativeMarginPenaltyEvaluator,
    SensitivityFailureEvaluator,
};

use crate::error::RaoResult;
use crate::parameters::RaoParameters;
use crate::results::{
    ComputationStatus, FlowResult, ObjectiveFunctionResult, RangeActionActivationResult,
    SensitivityResult,
};
use gat_crac::{CnecId, OptimizationPerimeter};
use tracing::debug;

/// Network situation handed to every evaluator
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub flow_result: &'a FlowResult,
    pub activation: &'a RangeActionActivationResult,
    pub sensitivity_result: &'a SensitivityResult,
    pub status: ComputationStatus,
}

/// One term of the objective.
pub trait CostEvaluator: Send + Sync {
    /// Name under which the cost is reported (e.g. "mnec-cost")
    fn name(&self) -> &str;

    fn compute_cost(&self, ctx: &EvaluationContext<'_>) -> f64;

    /// Elements contributing to the cost, most costly first.
    fn costly_elements(&self, ctx: &EvaluationContext<'_>) -> Vec<CnecId>;
}

pub struct ObjectiveFunction<'a> {
    functional: MinMarginEvaluator<'a>,
    virtual_costs: Vec<Box<dyn CostEvaluator + 'a>>,
}

impl<'a> ObjectiveFunction<'a> {
    /// Registers the evaluators enabled by `params`.
    ///
    /// `initial_flows` is the situation MNEC and loop-flow tolerances are
    /// measured against. `pre_perimeter_flows` is the reference of CNECs
    /// whose operator is not optimised.
    pub fn build(
        perimeter: &'a OptimizationPerimeter,
        params: &'a RaoParameters,
        initial_flows: &'a FlowResult,
        pre_perimeter_flows: &'a FlowResult,
    ) -> RaoResult<Self> {
        let floor = params.relative_margin.ptdf_sum_lower_bound;
        let functional = if params.relative_margins {
            MinMarginEvaluator::relative(perimeter, params.objective_unit, floor)
        } else {
            MinMarginEvaluator::absolute(perimeter, params.objective_unit)
        }
        .with_unoptimized_operators(&params.operators_not_to_optimize, pre_perimeter_flows);

        let mut virtual_costs: Vec<Box<dyn CostEvaluator + 'a>> = Vec::new();
        if let Some(mnec) = &params.mnec {
            virtual_costs.push(Box::new(MnecViolationEvaluator::new(
                perimeter,
                initial_flows,
                params.objective_unit,
                mnec.acceptable_margin_decrease,
                mnec.violation_cost,
            )?));
        }
        if let Some(loop_flow) = &params.loop_flow {
            if loop_flow.violation_cost > 0.0 {
                virtual_costs.push(Box::new(LoopFlowViolationEvaluator::new(
                    perimeter,
                    initial_flows,
                    loop_flow.acceptable_increase,
                    loop_flow.violation_cost,
                )));
            }
        }
        let relative_cost = params.relative_margin.negative_relative_margin_cost;
        if params.relative_margins && relative_cost > 0.0 {
            virtual_costs.push(Box::new(RelativeMarginPenaltyEvaluator::new(
                perimeter,
                params.objective_unit,
                floor,
                relative_cost,
            )));
        }
        if params.sensitivity_failure_overcost > 0.0 {
            virtual_costs.push(Box::new(SensitivityFailureEvaluator::new(
                perimeter,
                params.sensitivity_failure_overcost,
            )));
        }

        Ok(Self {
            functional,
            virtual_costs,
        })
    }

    pub fn virtual_cost_names(&self) -> impl Iterator<Item = &str> {
        self.virtual_costs.iter().map(|e| e.name())
    }

    pub fn evaluate(
        &self,
        flow_result: &FlowResult,
        activation: &RangeActionActivationResult,
        sensitivity_result: &SensitivityResult,
        status: ComputationStatus,
    ) -> ObjectiveFunctionResult {
        let ctx = EvaluationContext {
            flow_result,
            activation,
            sensitivity_result,
            status,
        };
        let mut result = ObjectiveFunctionResult::new(
            self.functional.compute_cost(&ctx),
            self.functional.costly_elements(&ctx),
        );
        for evaluator in &self.virtual_costs {
            let cost = evaluator.compute_cost(&ctx);
            let elements = if cost > 0.0 {
                evaluator.costly_elements(&ctx)
            } else {
                Vec::new()
            };
            result.add_virtual_cost(evaluator.name(), cost, elements);
        }
        debug!(
            "Evaluated cost {:.2} (functional {:.2}, virtual {:.2})",
            result.cost(),
            result.functional_cost(),
            result.total_virtual_cost()
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::MnecParameters;
    use crate::results::RangeActionSetpointResult;
    use gat_crac::{BranchThreshold, FlowCnec, PerimeterKind, Side, State, Unit};

    fn perimeter() -> OptimizationPerimeter {
        let cnec = |id: &str, limit: f64, optimized: bool, monitored: bool| {
            FlowCnec::builder(id, State::preventive())
                .threshold(BranchThreshold::symmetric(Side::Left, Unit::Megawatt, limit))
                .optimized(optimized)
                .monitored(monitored)
                .build()
                .unwrap()
        };
        OptimizationPerimeter::builder(PerimeterKind::Preventive, State::preventive())
            .cnec(cnec("a", 100.0, true, false))
            .cnec(cnec("b", 200.0, true, false))
            .cnec(cnec("m", 300.0, false, true))
            .build()
            .unwrap()
    }

    fn flows(a: f64, b: f64, m: f64) -> FlowResult {
        let mut flows = FlowResult::new();
        flows
            .set_flow(&CnecId::new("a"), Side::Left, a)
            .set_flow(&CnecId::new("b"), Side::Left, b)
            .set_flow(&CnecId::new("m"), Side::Left, m);
        flows
    }

    #[test]
    fn test_functional_and_mnec_costs() {
        let perimeter = perimeter();
        let params = RaoParameters {
            mnec: Some(MnecParameters::default()),
            ..RaoParameters::default()
        };
        let initial = flows(50.0, 50.0, 260.0);
        let objective = ObjectiveFunction::build(&perimeter, &params, &initial, &initial).unwrap();
        assert_eq!(
            objective.virtual_cost_names().collect::<Vec<_>>(),
            vec!["mnec-cost", "sensitivity-failure-cost"]
        );

        let activation = RangeActionActivationResult::new(RangeActionSetpointResult::default());
        let sensi = SensitivityResult::new();
        // margins: a 20, b 190; mnec margin 40 → -30, allowed down to 40 - 50 = -10
        let current = flows(80.0, 10.0, 330.0);
        let result = objective.evaluate(&current, &activation, &sensi, ComputationStatus::Default);

        assert!((result.functional_cost() + 20.0).abs() < 1e-9);
        assert!((result.virtual_cost("mnec-cost") - 200.0).abs() < 1e-9);
        assert_eq!(result.virtual_cost("sensitivity-failure-cost"), 0.0);
        assert_eq!(result.most_limiting_elements(2), &[CnecId::new("a"), CnecId::new("b")]);
        assert_eq!(result.costly_elements("mnec-cost", 5), &[CnecId::new("m")]);
    }

    #[test]
    fn test_sensitivity_failure_overcost() {
        let perimeter = perimeter();
        let params = RaoParameters::default();
        let initial = flows(0.0, 0.0, 0.0);
        let objective = ObjectiveFunction::build(&perimeter, &params, &initial, &initial).unwrap();
        let activation = RangeActionActivationResult::new(RangeActionSetpointResult::default());
        let sensi = SensitivityResult::failed([&State::preventive()]);
        let result = objective.evaluate(&initial, &activation, &sensi, ComputationStatus::Failure);
        assert_eq!(result.virtual_cost("sensitivity-failure-cost"), 10000.0);
    }
}

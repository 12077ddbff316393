use super::{CostEvaluator, EvaluationContext};
use crate::error::RaoResult;
use crate::results::{ComputationStatus, FlowResult};
use gat_crac::{CnecId, FlowCnec, OptimizationPerimeter, Side, State, Unit};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// Sorts `(excess, cnec)` pairs by excess descending then id, keeping only
/// positive excesses.
fn rank_by_excess(mut excesses: Vec<(f64, CnecId)>) -> Vec<CnecId> {
    excesses.retain(|(excess, _)| *excess > 0.0);
    excesses.sort_by(|(ea, a), (eb, b)| eb.total_cmp(ea).then_with(|| a.cmp(b)));
    excesses.into_iter().map(|(_, id)| id).collect()
}

/// Price of MNEC margins falling below their initial margin minus the
/// acceptable decrease.
pub struct MnecViolationEvaluator<'a> {
    perimeter: &'a OptimizationPerimeter,
    initial_flows: &'a FlowResult,
    /// MW to objective unit factor per monitored side
    multipliers: BTreeMap<(CnecId, Side), f64>,
    acceptable_margin_decrease: f64,
    violation_cost: f64,
}

impl<'a> MnecViolationEvaluator<'a> {
    /// Fails when an MNEC flow cannot be expressed in `unit`.
    pub fn new(
        perimeter: &'a OptimizationPerimeter,
        initial_flows: &'a FlowResult,
        unit: Unit,
        acceptable_margin_decrease: f64,
        violation_cost: f64,
    ) -> RaoResult<Self> {
        let mut multipliers = BTreeMap::new();
        for mnec in perimeter.monitored_cnecs() {
            for side in mnec.monitored_sides() {
                let k = mnec.unit_multiplier(side, Unit::Megawatt, unit)?;
                multipliers.insert((mnec.id().clone(), side), k);
            }
        }
        Ok(Self {
            perimeter,
            initial_flows,
            multipliers,
            acceptable_margin_decrease,
            violation_cost,
        })
    }

    /// Worst per-side excess of `mnec`, in the objective unit.
    fn excess(&self, flows: &FlowResult, mnec: &FlowCnec) -> f64 {
        mnec.monitored_sides()
            .into_iter()
            .map(|side| {
                let initial = self.initial_flows.side_margin(mnec, side, Unit::Megawatt);
                let current = flows.side_margin(mnec, side, Unit::Megawatt);
                let allowed = (initial - self.acceptable_margin_decrease).min(0.0);
                let excess_mw = (allowed - current).max(0.0);
                let k = self.multipliers.get(&(mnec.id().clone(), side)).copied();
                excess_mw * k.unwrap_or(1.0)
            })
            .fold(0.0, f64::max)
    }
}

impl CostEvaluator for MnecViolationEvaluator<'_> {
    fn name(&self) -> &str {
        "mnec-cost"
    }

    fn compute_cost(&self, ctx: &EvaluationContext<'_>) -> f64 {
        let total: f64 = self
            .perimeter
            .monitored_cnecs()
            .map(|mnec| self.excess(ctx.flow_result, mnec))
            .sum();
        if total > 0.0 {
            info!("Some MNEC constraints are not respected");
        }
        total * self.violation_cost
    }

    fn costly_elements(&self, ctx: &EvaluationContext<'_>) -> Vec<CnecId> {
        rank_by_excess(
            self.perimeter
                .monitored_cnecs()
                .map(|mnec| (self.excess(ctx.flow_result, mnec), mnec.id().clone()))
                .collect(),
        )
    }
}

/// Price of loop flows above their allowed value, in MW.
pub struct LoopFlowViolationEvaluator<'a> {
    perimeter: &'a OptimizationPerimeter,
    initial_flows: &'a FlowResult,
    acceptable_increase: f64,
    violation_cost: f64,
}

impl<'a> LoopFlowViolationEvaluator<'a> {
    pub fn new(
        perimeter: &'a OptimizationPerimeter,
        initial_flows: &'a FlowResult,
        acceptable_increase: f64,
        violation_cost: f64,
    ) -> Self {
        Self {
            perimeter,
            initial_flows,
            acceptable_increase,
            violation_cost,
        }
    }

    fn upper_bound(&self, cnec: &FlowCnec, side: Side) -> f64 {
        let threshold = cnec.loop_flow_threshold_mw(side).unwrap_or(0.0);
        let initial = self.initial_flows.loop_flow(cnec, side).abs();
        threshold.max(initial + self.acceptable_increase).max(0.0)
    }

    fn excess(&self, flows: &FlowResult, cnec: &FlowCnec) -> f64 {
        cnec.monitored_sides()
            .into_iter()
            .map(|side| {
                (flows.loop_flow(cnec, side).abs() - self.upper_bound(cnec, side)).max(0.0)
            })
            .fold(0.0, f64::max)
    }
}

impl CostEvaluator for LoopFlowViolationEvaluator<'_> {
    fn name(&self) -> &str {
        "loop-flow-cost"
    }

    fn compute_cost(&self, ctx: &EvaluationContext<'_>) -> f64 {
        let total: f64 = self
            .perimeter
            .loop_flow_cnecs()
            .map(|cnec| self.excess(ctx.flow_result, cnec))
            .sum();
        if total > 0.0 {
            info!("Some loopflow constraints are not respected");
        }
        total * self.violation_cost
    }

    fn costly_elements(&self, ctx: &EvaluationContext<'_>) -> Vec<CnecId> {
        rank_by_excess(
            self.perimeter
                .loop_flow_cnecs()
                .map(|cnec| (self.excess(ctx.flow_result, cnec), cnec.id().clone()))
                .collect(),
        )
    }
}

/// Extra price of negative margins when relative margins are optimised:
/// each negative margin is divided by its (floored) PTDF zonal sum, as
/// positive relative margins are.
pub struct RelativeMarginPenaltyEvaluator<'a> {
    perimeter: &'a OptimizationPerimeter,
    unit: Unit,
    ptdf_floor: f64,
    cost: f64,
}

impl<'a> RelativeMarginPenaltyEvaluator<'a> {
    pub fn new(
        perimeter: &'a OptimizationPerimeter,
        unit: Unit,
        ptdf_floor: f64,
        cost: f64,
    ) -> Self {
        Self {
            perimeter,
            unit,
            ptdf_floor,
            cost,
        }
    }

    fn excess(&self, flows: &FlowResult, cnec: &FlowCnec) -> f64 {
        cnec.monitored_sides()
            .into_iter()
            .map(|side| {
                let margin = flows.side_margin(cnec, side, self.unit);
                let ptdf = flows.ptdf_zonal_sum(cnec.id(), side).max(self.ptdf_floor);
                (-margin).max(0.0) / ptdf
            })
            .fold(0.0, f64::max)
    }
}

impl CostEvaluator for RelativeMarginPenaltyEvaluator<'_> {
    fn name(&self) -> &str {
        "relative-margin-cost"
    }

    fn compute_cost(&self, ctx: &EvaluationContext<'_>) -> f64 {
        self.perimeter
            .optimized_cnecs()
            .map(|cnec| self.excess(ctx.flow_result, cnec))
            .sum::<f64>()
            * self.cost
    }

    fn costly_elements(&self, ctx: &EvaluationContext<'_>) -> Vec<CnecId> {
        rank_by_excess(
            self.perimeter
                .optimized_cnecs()
                .map(|cnec| (self.excess(ctx.flow_result, cnec), cnec.id().clone()))
                .collect(),
        )
    }
}

/// Flat overcost when the sensitivity computation failed overall or on a
/// state carrying CNECs.
pub struct SensitivityFailureEvaluator {
    states: BTreeSet<State>,
    overcost: f64,
}

impl SensitivityFailureEvaluator {
    pub fn new(perimeter: &OptimizationPerimeter, overcost: f64) -> Self {
        Self {
            states: perimeter.flow_cnecs().iter().map(|c| c.state().clone()).collect(),
            overcost,
        }
    }
}

impl CostEvaluator for SensitivityFailureEvaluator {
    fn name(&self) -> &str {
        "sensitivity-failure-cost"
    }

    fn compute_cost(&self, ctx: &EvaluationContext<'_>) -> f64 {
        if ctx.status == ComputationStatus::Failure {
            info!("Sensitivity failure: assigning virtual overcost of {}", self.overcost);
            return self.overcost;
        }
        for state in &self.states {
            if ctx.sensitivity_result.state_status(state) == ComputationStatus::Failure {
                info!(
                    "Sensitivity failure for state {}: assigning virtual overcost of {}",
                    state.id(),
                    self.overcost
                );
                return self.overcost;
            }
        }
        0.0
    }

    fn costly_elements(&self, _ctx: &EvaluationContext<'_>) -> Vec<CnecId> {
        Vec::new()
    }
}

use super::{CostEvaluator, EvaluationContext};
use crate::results::FlowResult;
use gat_crac::{CnecId, FlowCnec, OptimizationPerimeter, Side, Unit};
use std::collections::BTreeSet;

/// Relative loss of margin under which a CNEC of an operator that is not
/// optimised still counts as unchanged
const MARGIN_DECREASE_TOLERANCE: f64 = 1e-4;

/// CNECs left out of the worst margin while they keep their pre-perimeter
/// margin
struct UnoptimizedCnecs<'a> {
    operators: &'a BTreeSet<String>,
    pre_perimeter_flows: &'a FlowResult,
}

/// Functional cost: minus the worst (absolute or relative) margin.
pub struct MinMarginEvaluator<'a> {
    perimeter: &'a OptimizationPerimeter,
    unit: Unit,
    /// PTDF floor when margins are relative
    relative: Option<f64>,
    unoptimized: Option<UnoptimizedCnecs<'a>>,
}

impl<'a> MinMarginEvaluator<'a> {
    pub fn absolute(perimeter: &'a OptimizationPerimeter, unit: Unit) -> Self {
        Self {
            perimeter,
            unit,
            relative: None,
            unoptimized: None,
        }
    }

    pub fn relative(perimeter: &'a OptimizationPerimeter, unit: Unit, ptdf_floor: f64) -> Self {
        Self {
            perimeter,
            unit,
            relative: Some(ptdf_floor),
            unoptimized: None,
        }
    }

    /// CNECs operated by one of `operators` get an infinite margin on every
    /// side whose margin has not decreased against `pre_perimeter_flows`.
    pub fn with_unoptimized_operators(
        mut self,
        operators: &'a BTreeSet<String>,
        pre_perimeter_flows: &'a FlowResult,
    ) -> Self {
        if !operators.is_empty() {
            self.unoptimized = Some(UnoptimizedCnecs {
                operators,
                pre_perimeter_flows,
            });
        }
        self
    }

    fn side_margin(&self, flows: &FlowResult, cnec: &FlowCnec, side: Side) -> f64 {
        match self.relative {
            Some(floor) => flows.relative_side_margin(cnec, side, self.unit, floor),
            None => flows.side_margin(cnec, side, self.unit),
        }
    }

    fn margin(&self, ctx: &EvaluationContext<'_>, cnec: &FlowCnec) -> f64 {
        let unoptimized = self.unoptimized.as_ref().filter(|u| {
            cnec.operator()
                .is_some_and(|operator| u.operators.contains(operator))
        });
        cnec.monitored_sides()
            .into_iter()
            .map(|side| {
                let margin = self.side_margin(ctx.flow_result, cnec, side);
                let Some(u) = unoptimized else {
                    return margin;
                };
                let pre = self.side_margin(u.pre_perimeter_flows, cnec, side);
                if margin > pre - MARGIN_DECREASE_TOLERANCE * pre.abs() {
                    f64::MAX
                } else {
                    margin
                }
            })
            .fold(f64::INFINITY, f64::min)
    }

    /// Optimised CNECs by margin ascending, then id.
    fn sorted_margins(&self, ctx: &EvaluationContext<'_>) -> Vec<(f64, &'a FlowCnec)> {
        let mut margins: Vec<(f64, &FlowCnec)> = self
            .perimeter
            .optimized_cnecs()
            .map(|cnec| (self.margin(ctx, cnec), cnec))
            .collect();
        margins.sort_by(|(ma, a), (mb, b)| {
            ma.total_cmp(mb).then_with(|| a.id().cmp(b.id()))
        });
        margins
    }

    fn highest_threshold(&self) -> f64 {
        self.perimeter
            .flow_cnecs()
            .iter()
            .map(|cnec| cnec.highest_threshold(self.unit))
            .fold(0.0, f64::max)
    }
}

impl CostEvaluator for MinMarginEvaluator<'_> {
    fn name(&self) -> &str {
        "min-margin-evaluator"
    }

    fn compute_cost(&self, ctx: &EvaluationContext<'_>) -> f64 {
        match self.sorted_margins(ctx).first() {
            // Without a finite limiting margin, report the best achievable
            // one so that virtual costs stay visible.
            Some((margin, _)) if *margin < f64::MAX / 2.0 => -margin,
            _ => -self.highest_threshold(),
        }
    }

    fn costly_elements(&self, ctx: &EvaluationContext<'_>) -> Vec<CnecId> {
        self.sorted_margins(ctx)
            .into_iter()
            .map(|(_, cnec)| cnec.id().clone())
            .collect()
    }
}

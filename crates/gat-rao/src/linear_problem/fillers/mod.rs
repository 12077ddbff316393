//! Problem fillers: each one owns a slice of the linear model.
//!
//! Fillers add their variables and constraints in [`ProblemFiller::fill`]
//! and later only rewrite bounds and coefficients of what they created.

mod core_problem;
mod discrete_pst;
mod loop_flow;
mod max_min_margin;
mod max_min_relative_margin;
mod mnec;
mod range_action_group;

pub use core_problem::CoreProblemFiller;
pub use discrete_pst::DiscretePstFiller;
pub use loop_flow::LoopFlowFiller;
pub use max_min_margin::MaxMinMarginFiller;
pub use max_min_relative_margin::MaxMinRelativeMarginFiller;
pub use mnec::MnecFiller;
pub use range_action_group::ContinuousRangeActionGroupFiller;

use super::LinearProblem;
use crate::error::RaoResult;
use crate::results::{FlowResult, RangeActionActivationResult, SensitivityResult};

/// Flows, sensitivities and setpoints the model is linearised around
#[derive(Debug, Clone, Copy)]
pub struct LinearizationPoint<'a> {
    pub flow_result: &'a FlowResult,
    pub sensitivity_result: &'a SensitivityResult,
    pub activation: &'a RangeActionActivationResult,
}

pub trait ProblemFiller {
    fn fill(&self, lp: &mut LinearProblem, point: &LinearizationPoint<'_>) -> RaoResult<()>;

    fn update_between_sensitivity_iteration(
        &self,
        lp: &mut LinearProblem,
        point: &LinearizationPoint<'_>,
    ) -> RaoResult<()>;

    /// Called after tap rounding, before the approximated-integers re-solve.
    fn update_between_rounding_iteration(
        &self,
        _lp: &mut LinearProblem,
        _point: &LinearizationPoint<'_>,
        _rounded: &RangeActionActivationResult,
    ) -> RaoResult<()> {
        Ok(())
    }
}

//! Linear model of the range action optimisation.
//!
//! The model is stored by typed key rather than handed to the solver
//! directly, so that iterations re-linearise it in place: fillers rewrite
//! bounds and coefficients of existing variables and constraints, and the
//! solver backend translates the whole model on every solve.
//!
//! # Formulation
//!
//! ```text
//!   minimise   - MM  [- MMR]  + Σ penalty(ra) · |ΔS|  + Σ cost · V
//!
//!   F(c,s)  - Σ sens(c,s,ra) · Δ(ra,st)          = F_ref(c,s)         flow
//!   MM / k(c,s) + F(c,s)                          ≤ F_max(c,s)         margin
//!   MM / k(c,s) - F(c,s)                          ≤ -F_min(c,s)
//!   AV(ra,st) - Δ(ra,st) [+ Δ(ra,prev)]           ≥ S_ref - S_prev     |ΔS|
//!   AV(ra,st) + Δ(ra,st) [- Δ(ra,prev)]           ≥ S_prev - S_ref
//!   Δ(ra,st) - G(g,st)                            = -S_ref(ra,st)      groups
//!   F(c,s) - V(c,s)                               ≤ mnec / loop-flow upper
//!   F(c,s) + V(c,s)                               ≥ mnec / loop-flow lower
//! ```
//!
//! `Δ` is the setpoint variation around the current linearisation point and
//! `k` converts MW into the objective unit.

mod backend;
pub mod fillers;
mod model;

pub use backend::{LpBackend, LpSolution};
pub use model::LinearModel;
#[cfg(feature = "solver-clarabel")]
pub use backend::ClarabelBackend;

use crate::error::{RaoError, RaoResult};
use gat_crac::{CnecId, GroupId, RangeActionId, Side, State};
use std::collections::BTreeMap;
use std::fmt;

/// Identity of a decision variable
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VariableKey {
    /// Setpoint variation around the linearisation point
    SetpointDelta { ra: RangeActionId, state: State },
    /// Absolute variation of the setpoint relative to the previous state
    AbsoluteVariation { ra: RangeActionId, state: State },
    /// Shared setpoint of an aligned group
    GroupSetpoint { group: GroupId, state: State },
    /// Linearised MW flow
    Flow { cnec: CnecId, side: Side },
    MinMargin,
    MinRelativeMargin,
    MnecViolation { cnec: CnecId, side: Side },
    LoopFlowViolation { cnec: CnecId, side: Side },
}

impl fmt::Display for VariableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableKey::SetpointDelta { ra, state } => write!(f, "delta_{ra}_{state}"),
            VariableKey::AbsoluteVariation { ra, state } => write!(f, "absvar_{ra}_{state}"),
            VariableKey::GroupSetpoint { group, state } => write!(f, "group_{group}_{state}"),
            VariableKey::Flow { cnec, side } => write!(f, "flow_{cnec}_{side}"),
            VariableKey::MinMargin => f.write_str("min_margin"),
            VariableKey::MinRelativeMargin => f.write_str("min_relative_margin"),
            VariableKey::MnecViolation { cnec, side } => write!(f, "mnec_violation_{cnec}_{side}"),
            VariableKey::LoopFlowViolation { cnec, side } => {
                write!(f, "loopflow_violation_{cnec}_{side}")
            }
        }
    }
}

/// Identity of a constraint
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConstraintKey {
    Flow { cnec: CnecId, side: Side },
    MinMarginUpper { cnec: CnecId, side: Side },
    MinMarginLower { cnec: CnecId, side: Side },
    MinRelativeMarginUpper { cnec: CnecId, side: Side },
    MinRelativeMarginLower { cnec: CnecId, side: Side },
    AbsoluteVariationPositive { ra: RangeActionId, state: State },
    AbsoluteVariationNegative { ra: RangeActionId, state: State },
    GroupMembership { ra: RangeActionId, state: State },
    MnecUpper { cnec: CnecId, side: Side },
    MnecLower { cnec: CnecId, side: Side },
    LoopFlowUpper { cnec: CnecId, side: Side },
    LoopFlowLower { cnec: CnecId, side: Side },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariableBounds {
    pub lower: f64,
    pub upper: f64,
}

/// `lower ≤ Σ coefficient · variable ≤ upper`
#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    pub lower: f64,
    pub upper: f64,
    pub coefficients: BTreeMap<VariableKey, f64>,
}

/// Keyed linear problem, always minimised
#[derive(Debug, Clone, Default)]
pub struct LinearProblem {
    variables: BTreeMap<VariableKey, VariableBounds>,
    constraints: BTreeMap<ConstraintKey, LinearConstraint>,
    objective: BTreeMap<VariableKey, f64>,
}

impl LinearProblem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_variable(&mut self, key: VariableKey, lower: f64, upper: f64) -> RaoResult<()> {
        if self.variables.contains_key(&key) {
            return Err(RaoError::Model(format!("variable {key} already exists")));
        }
        self.variables.insert(key, VariableBounds { lower, upper });
        Ok(())
    }

    pub fn set_variable_bounds(
        &mut self,
        key: &VariableKey,
        lower: f64,
        upper: f64,
    ) -> RaoResult<()> {
        let bounds = self
            .variables
            .get_mut(key)
            .ok_or_else(|| RaoError::Model(format!("unknown variable {key}")))?;
        *bounds = VariableBounds { lower, upper };
        Ok(())
    }

    pub fn variable(&self, key: &VariableKey) -> Option<&VariableBounds> {
        self.variables.get(key)
    }

    pub fn variables(&self) -> impl Iterator<Item = (&VariableKey, &VariableBounds)> {
        self.variables.iter()
    }

    pub fn add_constraint(&mut self, key: ConstraintKey, lower: f64, upper: f64) -> RaoResult<()> {
        if self.constraints.contains_key(&key) {
            return Err(RaoError::Model(format!("constraint {key:?} already exists")));
        }
        self.constraints.insert(
            key,
            LinearConstraint {
                lower,
                upper,
                coefficients: BTreeMap::new(),
            },
        );
        Ok(())
    }

    pub fn set_constraint_bounds(
        &mut self,
        key: &ConstraintKey,
        lower: f64,
        upper: f64,
    ) -> RaoResult<()> {
        let constraint = self.constraint_mut(key)?;
        constraint.lower = lower;
        constraint.upper = upper;
        Ok(())
    }

    /// Sets (or, with a zero value, removes) the coefficient of `variable`
    /// in `constraint`.
    pub fn set_coefficient(
        &mut self,
        constraint: &ConstraintKey,
        variable: &VariableKey,
        value: f64,
    ) -> RaoResult<()> {
        if !self.variables.contains_key(variable) {
            return Err(RaoError::Model(format!("unknown variable {variable}")));
        }
        let c = self.constraint_mut(constraint)?;
        if value == 0.0 {
            c.coefficients.remove(variable);
        } else {
            c.coefficients.insert(variable.clone(), value);
        }
        Ok(())
    }

    fn constraint_mut(&mut self, key: &ConstraintKey) -> RaoResult<&mut LinearConstraint> {
        self.constraints
            .get_mut(key)
            .ok_or_else(|| RaoError::Model(format!("unknown constraint {key:?}")))
    }

    pub fn constraint(&self, key: &ConstraintKey) -> Option<&LinearConstraint> {
        self.constraints.get(key)
    }

    pub fn constraints(&self) -> impl Iterator<Item = (&ConstraintKey, &LinearConstraint)> {
        self.constraints.iter()
    }

    pub fn set_objective_coefficient(
        &mut self,
        variable: &VariableKey,
        value: f64,
    ) -> RaoResult<()> {
        if !self.variables.contains_key(variable) {
            return Err(RaoError::Model(format!("unknown variable {variable}")));
        }
        if value == 0.0 {
            self.objective.remove(variable);
        } else {
            self.objective.insert(variable.clone(), value);
        }
        Ok(())
    }

    pub fn objective_coefficient(&self, variable: &VariableKey) -> f64 {
        self.objective.get(variable).copied().unwrap_or(0.0)
    }

    pub fn objective(&self) -> impl Iterator<Item = (&VariableKey, f64)> {
        self.objective.iter().map(|(k, v)| (k, *v))
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }
}

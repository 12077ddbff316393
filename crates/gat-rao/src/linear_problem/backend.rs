//! LP solver backends.
//!
//! A backend receives the keyed [`LinearProblem`] and returns variable
//! values with a [`LinearProblemStatus`]. Solver failures are statuses, not
//! errors: the optimiser decides how to fall back.

use super::{LinearProblem, VariableKey};
use crate::results::LinearProblemStatus;
use std::collections::HashMap;

/// Values of a solve; empty unless the status carries a solution
#[derive(Debug, Clone)]
pub struct LpSolution {
    pub status: LinearProblemStatus,
    values: HashMap<VariableKey, f64>,
}

impl LpSolution {
    pub fn new(status: LinearProblemStatus, values: HashMap<VariableKey, f64>) -> Self {
        Self { status, values }
    }

    pub fn failed(status: LinearProblemStatus) -> Self {
        Self::new(status, HashMap::new())
    }

    /// Value of a variable; zero when the solver did not report it.
    pub fn value(&self, key: &VariableKey) -> f64 {
        self.values.get(key).copied().unwrap_or(0.0)
    }

    pub fn with_status(mut self, status: LinearProblemStatus) -> Self {
        self.status = status;
        self
    }
}

/// How to solve a linear problem.
pub trait LpBackend: Send + Sync {
    /// Unique identifier (e.g., "clarabel")
    fn id(&self) -> &str;

    fn solve(&self, problem: &LinearProblem) -> LpSolution;
}

/// Interior-point LP backend through `good_lp`
#[cfg(feature = "solver-clarabel")]
#[derive(Debug, Clone, Copy, Default)]
pub struct ClarabelBackend;

#[cfg(feature = "solver-clarabel")]
impl LpBackend for ClarabelBackend {
    fn id(&self) -> &str {
        "clarabel"
    }

    fn solve(&self, problem: &LinearProblem) -> LpSolution {
        use good_lp::solvers::clarabel::clarabel;
        use good_lp::{
            constraint, variable, variables, Expression, ResolutionError, Solution, SolverModel,
            Variable,
        };
        use std::collections::BTreeMap;
        use tracing::debug;

        // === Variables ===
        let mut vars = variables!();
        let mut handles: BTreeMap<&VariableKey, Variable> = BTreeMap::new();
        // fixed variables go through the zero cone instead of two inequalities
        let mut fixed: Vec<(Variable, f64)> = Vec::new();
        for (key, bounds) in problem.variables() {
            let mut def = variable();
            let is_fixed = bounds.lower.is_finite() && (bounds.upper - bounds.lower).abs() < 1e-12;
            if !is_fixed {
                if bounds.lower.is_finite() {
                    def = def.min(bounds.lower);
                }
                if bounds.upper.is_finite() {
                    def = def.max(bounds.upper);
                }
            }
            let v = vars.add(def);
            if is_fixed {
                fixed.push((v, bounds.lower));
            }
            handles.insert(key, v);
        }

        // === Objective ===
        let mut objective = Expression::from(0.0);
        for (key, coefficient) in problem.objective() {
            if let Some(v) = handles.get(key) {
                objective += coefficient * *v;
            }
        }

        let mut model = vars.minimise(objective).using(clarabel);

        // === Constraints ===
        for (_, c) in problem.constraints() {
            let mut expr = Expression::from(0.0);
            for (key, coefficient) in &c.coefficients {
                if let Some(v) = handles.get(key) {
                    expr += *coefficient * *v;
                }
            }
            if c.lower.is_finite() && c.upper.is_finite() && (c.upper - c.lower).abs() < 1e-12 {
                model = model.with(constraint!(expr == c.lower));
                continue;
            }
            if c.lower.is_finite() {
                model = model.with(constraint!(expr.clone() >= c.lower));
            }
            if c.upper.is_finite() {
                model = model.with(constraint!(expr <= c.upper));
            }
        }

        for (v, value) in fixed {
            model = model.with(constraint!(v == value));
        }

        // === Solve ===
        match model.solve() {
            Ok(solution) => {
                let values = handles
                    .iter()
                    .map(|(key, v)| ((*key).clone(), solution.value(*v)))
                    .collect();
                LpSolution::new(LinearProblemStatus::Optimal, values)
            }
            Err(ResolutionError::Infeasible) => LpSolution::failed(LinearProblemStatus::Infeasible),
            Err(ResolutionError::Unbounded) => LpSolution::failed(LinearProblemStatus::Unbounded),
            Err(e) => {
                debug!("clarabel failed: {e}");
                LpSolution::failed(LinearProblemStatus::Abnormal)
            }
        }
    }
}

#[cfg(all(test, feature = "solver-clarabel"))]
mod tests {
    use super::*;
    use crate::linear_problem::ConstraintKey;
    use gat_crac::{CnecId, Side};

    fn key(name: &str) -> ConstraintKey {
        ConstraintKey::MinMarginUpper {
            cnec: CnecId::new(name),
            side: Side::Left,
        }
    }

    #[test]
    fn test_clarabel_maximises_min_margin() {
        // max MM s.t. MM ≤ 100 - F, MM ≤ F + 50, F free  →  F = 25, MM = 75
        let mut lp = LinearProblem::new();
        let flow = VariableKey::Flow {
            cnec: CnecId::new("c"),
            side: Side::Left,
        };
        lp.add_variable(VariableKey::MinMargin, f64::NEG_INFINITY, f64::INFINITY).unwrap();
        lp.add_variable(flow.clone(), f64::NEG_INFINITY, f64::INFINITY).unwrap();
        lp.add_constraint(key("upper"), f64::NEG_INFINITY, 100.0).unwrap();
        lp.set_coefficient(&key("upper"), &VariableKey::MinMargin, 1.0).unwrap();
        lp.set_coefficient(&key("upper"), &flow, 1.0).unwrap();
        lp.add_constraint(key("lower"), f64::NEG_INFINITY, 50.0).unwrap();
        lp.set_coefficient(&key("lower"), &VariableKey::MinMargin, 1.0).unwrap();
        lp.set_coefficient(&key("lower"), &flow, -1.0).unwrap();
        lp.set_objective_coefficient(&VariableKey::MinMargin, -1.0).unwrap();

        let solution = ClarabelBackend.solve(&lp);
        assert_eq!(solution.status, LinearProblemStatus::Optimal);
        assert!((solution.value(&VariableKey::MinMargin) - 75.0).abs() < 1e-4);
        assert!((solution.value(&flow) - 25.0).abs() < 1e-4);
    }

    #[test]
    fn test_clarabel_reports_infeasible() {
        let mut lp = LinearProblem::new();
        lp.add_variable(VariableKey::MinMargin, 0.0, 1.0).unwrap();
        lp.add_constraint(key("c"), 5.0, f64::INFINITY).unwrap();
        lp.set_coefficient(&key("c"), &VariableKey::MinMargin, 1.0).unwrap();
        lp.set_objective_coefficient(&VariableKey::MinMargin, 1.0).unwrap();

        let solution = ClarabelBackend.solve(&lp);
        assert_eq!(solution.status, LinearProblemStatus::Infeasible);
        assert_eq!(solution.value(&VariableKey::MinMargin), 0.0);
    }
}

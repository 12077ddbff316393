use super::{FlowResult, ObjectiveFunctionResult, RangeActionActivationResult, SensitivityResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of an LP solve, and of the whole optimisation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinearProblemStatus {
    Optimal,
    /// A solution was found but optimality was not proven
    Feasible,
    Infeasible,
    Unbounded,
    /// Solver error or interruption
    Abnormal,
    MaxIterationReached,
    SensitivityComputationFailed,
}

impl LinearProblemStatus {
    /// Whether the solver produced usable setpoints.
    pub fn has_solution(self) -> bool {
        matches!(self, LinearProblemStatus::Optimal | LinearProblemStatus::Feasible)
    }
}

impl fmt::Display for LinearProblemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinearProblemStatus::Optimal => "OPTIMAL",
            LinearProblemStatus::Feasible => "FEASIBLE",
            LinearProblemStatus::Infeasible => "INFEASIBLE",
            LinearProblemStatus::Unbounded => "UNBOUNDED",
            LinearProblemStatus::Abnormal => "ABNORMAL",
            LinearProblemStatus::MaxIterationReached => "MAX_ITERATION_REACHED",
            LinearProblemStatus::SensitivityComputationFailed => "SENSITIVITY_COMPUTATION_FAILED",
        };
        f.write_str(s)
    }
}

/// One evaluated iterate of the optimiser
#[derive(Debug, Clone)]
pub struct IterationResult {
    pub iteration: usize,
    pub activation: RangeActionActivationResult,
    pub flow_result: FlowResult,
    pub sensitivity_result: SensitivityResult,
    pub objective: ObjectiveFunctionResult,
    pub status: LinearProblemStatus,
}

impl IterationResult {
    pub fn cost(&self) -> f64 {
        self.objective.cost()
    }

    pub fn functional_cost(&self) -> f64 {
        self.objective.functional_cost()
    }

    /// Final result of a run that stopped on this iterate.
    pub fn into_result(
        self,
        status: LinearProblemStatus,
        cost_history: Vec<f64>,
    ) -> LinearOptimizationResult {
        LinearOptimizationResult {
            status,
            iterations: self.iteration,
            cost_history,
            best: self,
        }
    }
}

/// Outcome of an optimisation run: the accepted iterate and why the run
/// stopped.
#[derive(Debug, Clone)]
pub struct LinearOptimizationResult {
    status: LinearProblemStatus,
    iterations: usize,
    cost_history: Vec<f64>,
    best: IterationResult,
}

impl LinearOptimizationResult {
    pub fn status(&self) -> LinearProblemStatus {
        self.status
    }

    /// Index of the accepted iteration; 0 when the initial situation was kept.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Costs of the initial situation and of every accepted iteration.
    pub fn cost_history(&self) -> &[f64] {
        &self.cost_history
    }

    pub fn activation(&self) -> &RangeActionActivationResult {
        &self.best.activation
    }

    pub fn flow_result(&self) -> &FlowResult {
        &self.best.flow_result
    }

    pub fn sensitivity_result(&self) -> &SensitivityResult {
        &self.best.sensitivity_result
    }

    pub fn objective(&self) -> &ObjectiveFunctionResult {
        &self.best.objective
    }

    pub fn cost(&self) -> f64 {
        self.best.cost()
    }

    pub fn functional_cost(&self) -> f64 {
        self.best.functional_cost()
    }

    pub fn virtual_cost(&self, name: &str) -> f64 {
        self.best.objective.virtual_cost(name)
    }

    pub fn into_best(self) -> IterationResult {
        self.best
    }
}

//! # gat-rao: Iterating Linear Remedial Action Optimiser
//!
//! Finds setpoints for the range actions of an [`OptimizationPerimeter`]
//! (PSTs, HVDC lines, injections) that maximise the worst security margin
//! of the monitored branches, by repeatedly linearising the network around
//! the current setpoints.
//!
//! ## Iteration
//!
//! Each iteration solves one linear problem built from the latest flows and
//! sensitivities, rounds PST angles onto taps, applies the result to the
//! network snapshot, recomputes flows and keeps the new point only when its
//! cost strictly decreases:
//!
//! | Step | Component |
//! |------|-----------|
//! | Build / update the LP | [`linear_problem::LinearModel`] and its fillers |
//! | Solve | [`LpBackend`] ([`ClarabelBackend`] by default) |
//! | Round taps | [`best_tap_finder::BestTapFinder`] |
//! | Recompute flows | [`SensitivityComputer`] over a [`SensitivityEngine`] |
//! | Evaluate | [`ObjectiveFunction`] (min margin + virtual costs) |
//!
//! ## Objective
//!
//! The functional cost is minus the minimum margin (absolute, or relative
//! to the PTDF zonal sum). Virtual costs penalise MNEC margin decreases,
//! loop-flow excesses, negative relative margins and sensitivity failures.
//!
//! ## Example
//!
//! ```ignore
//! use gat_rao::{optimize, ClarabelBackend, NetworkSnapshot, OptimizerInput, RaoParameters};
//!
//! let params = RaoParameters::load("rao.toml")?;
//! let mut snapshot = NetworkSnapshot::from_perimeter(&perimeter);
//! let input = OptimizerInput {
//!     perimeter: &perimeter,
//!     pre_perimeter_setpoints,
//!     pre_optim_flow_result: &flows,
//!     pre_optim_sensitivity_result: &sensitivities,
//!     initial_flow_result: &flows,
//!     engine: &engine,
//!     backend: &ClarabelBackend,
//! };
//! let result = optimize(&input, &mut snapshot, &params)?;
//! println!("{}: min margin {:.2} MW", result.status(), -result.functional_cost());
//! ```

pub mod arena;
pub mod best_tap_finder;
pub mod error;
pub mod linear_problem;
pub mod objective;
pub mod optimizer;
pub mod parallel;
pub mod parameters;
pub mod results;
pub mod sensitivity;
pub mod test_utils;

pub use error::{RaoError, RaoResult};
pub use gat_crac::OptimizationPerimeter;
pub use linear_problem::{LinearModel, LpBackend, LpSolution};
#[cfg(feature = "solver-clarabel")]
pub use linear_problem::ClarabelBackend;
pub use objective::{CostEvaluator, ObjectiveFunction};
pub use optimizer::{optimize, OptimizerInput};
pub use parallel::{optimize_perimeters, PerimeterJob, PerimeterOutcome};
pub use parameters::{PstModel, RaoParameters};
pub use results::{
    ComputationStatus, FlowResult, IterationResult, LinearOptimizationResult, LinearProblemStatus,
    ObjectiveFunctionResult, RangeActionActivationResult, RangeActionSetpointResult,
    SensitivityResult,
};
pub use sensitivity::{
    AuxiliarySource, NetworkSnapshot, SensitivityComputer, SensitivityEngine, SensitivityRequest,
};

//! Result snapshots produced and consumed by the optimiser.
//!
//! Flow and sensitivity results are produced fresh by every sensitivity run
//! and never mutated afterwards; the optimiser keeps the best one alive and
//! drops the others.

mod flow;
mod iteration;
mod objective;
mod range_action;
mod sensitivity;

pub use flow::FlowResult;
pub use iteration::{IterationResult, LinearOptimizationResult, LinearProblemStatus};
pub use objective::ObjectiveFunctionResult;
pub use range_action::{RangeActionActivationResult, RangeActionSetpointResult, SETPOINT_TOLERANCE};
pub use sensitivity::{SensitivityResult, SensitivityVariable};

use serde::{Deserialize, Serialize};

/// Outcome of a sensitivity computation, per state or overall
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputationStatus {
    #[default]
    Default,
    PartialFailure,
    Failure,
}

impl ComputationStatus {
    /// Aggregates per-state statuses: the run failed if the main state failed
    /// or if every state failed, and partially failed if any state failed.
    pub fn overall(
        main: ComputationStatus,
        states: impl IntoIterator<Item = ComputationStatus>,
    ) -> Self {
        let mut any_failed = main == ComputationStatus::Failure;
        let mut all_failed = true;
        let mut any_state = false;
        for status in states {
            any_state = true;
            if status == ComputationStatus::Failure {
                any_failed = true;
            } else {
                all_failed = false;
            }
        }
        if main == ComputationStatus::Failure || (any_state && all_failed) {
            ComputationStatus::Failure
        } else if any_failed {
            ComputationStatus::PartialFailure
        } else {
            ComputationStatus::Default
        }
    }
}

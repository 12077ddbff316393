//! # gat-crac: Remedial Action Catalogue Model
//!
//! Read-only description of what a remedial action optimiser works on:
//! the operation timeline, the monitored elements and the controllable
//! devices, grouped into an optimisation scope.
//!
//! ## Core Data Structures
//!
//! - [`State`] - (instant, contingency) pair; see [`Instant`], [`Contingency`]
//! - [`FlowCnec`] - monitored branch at a state, with per-side thresholds
//! - [`RangeAction`] - PST, HVDC or injection with a bounded setpoint
//! - [`TapTable`] - tap → angle mapping of a PST
//! - [`OptimizationPerimeter`] - the scope of one optimisation run
//!
//! ## Quick Start
//!
//! ```
//! use gat_crac::*;
//!
//! let cnec = FlowCnec::builder("line-1", State::preventive())
//!     .threshold(BranchThreshold::symmetric(Side::Left, Unit::Megawatt, 500.0))
//!     .build()
//!     .unwrap();
//!
//! let pst = RangeAction::pst("pst-1", TapTable::linear(-16, 16, 0.4).unwrap(), 0).unwrap();
//!
//! let perimeter = OptimizationPerimeter::builder(PerimeterKind::Preventive, State::preventive())
//!     .cnec(cnec)
//!     .range_action(State::preventive(), pst)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(perimeter.optimized_cnecs().count(), 1);
//! ```
//!
//! ## ID System
//!
//! Elements are identified by string newtypes ([`CnecId`], [`RangeActionId`],
//! [`ContingencyId`], [`GroupId`]) so that a CNEC id cannot be passed where a
//! range action id is expected. All collections keyed by id are ordered, which
//! keeps every derived iteration order deterministic.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod cnec;
pub mod error;
pub mod perimeter;
pub mod range_action;
pub mod state;
pub mod units;

pub use cnec::{BranchThreshold, FlowCnec, FlowCnecBuilder, LoopFlowThreshold, Side, SideData};
pub use error::{CracError, CracResult};
pub use perimeter::{OptimizationPerimeter, PerimeterBuilder, PerimeterKind};
pub use range_action::{
    validate_group, Range, RangeAction, RangeActionKind, RangeType, StandardRange, TapRange,
    TapTable,
};
pub use state::{Contingency, Instant, InstantKind, State};
pub use units::{Amperes, Kilovolts, Megawatts, Unit};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[inline]
            pub fn new(value: impl Into<String>) -> Self {
                $name(value.into())
            }

            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                $name(value.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier of a flow CNEC
    CnecId
);
string_id!(
    /// Identifier of a range action
    RangeActionId
);
string_id!(
    /// Identifier of a contingency
    ContingencyId
);
string_id!(
    /// Identifier of a group of aligned range actions
    GroupId
);

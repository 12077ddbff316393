//! Error types for the CRAC model.
//!
//! [`CracError`] covers everything that can be wrong with the read-only
//! description of an optimisation problem: malformed tap tables, setpoints
//! outside a device's physical range, inconsistent groups and perimeters that
//! reference unknown elements. These are configuration-time errors and are
//! raised immediately rather than clipped.
//!
//! # Example
//!
//! ```
//! use gat_crac::{CracError, CracResult, TapTable};
//!
//! fn angle_of_tap(table: &TapTable, tap: i32) -> CracResult<f64> {
//!     table.tap_to_angle(tap)
//! }
//!
//! let table = TapTable::new([(-1, -0.75), (0, 0.0), (1, 0.75)]).unwrap();
//! assert!(matches!(angle_of_tap(&table, 3), Err(CracError::TapOutOfRange { .. })));
//! ```

use thiserror::Error;

/// Error type for CRAC model construction and queries.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CracError {
    /// A tap position outside a PST's tap-to-angle table
    #[error("Tap {tap} is out of range [{min}, {max}]")]
    TapOutOfRange { tap: i32, min: i32, max: i32 },

    /// Tap tables must be non-empty and strictly monotonic in angle
    #[error("Invalid tap table: {0}")]
    InvalidTapTable(String),

    /// Thresholds, voltages or ranges that cannot be interpreted
    #[error("Validation error: {0}")]
    Validation(String),

    /// Grouped range actions whose ranges cannot share one setpoint
    #[error("Range action group {group} is inconsistent: {reason}")]
    InconsistentGroup { group: String, reason: String },

    /// Perimeter referencing elements it does not contain
    #[error("Invalid perimeter: {0}")]
    InvalidPerimeter(String),

    /// Unit conversion that is not defined for the element
    #[error("Cannot convert {from} to {to}: {reason}")]
    UnitConversion {
        from: String,
        to: String,
        reason: String,
    },
}

/// Convenience type alias for Results using CracError.
pub type CracResult<T> = Result<T, CracError>;

impl From<String> for CracError {
    fn from(s: String) -> Self {
        CracError::Validation(s)
    }
}

impl From<&str> for CracError {
    fn from(s: &str) -> Self {
        CracError::Validation(s.to_string())
    }
}

//! Error types for the remedial action optimiser.
//!
//! Solver and sensitivity failures are outcomes, not errors: they are
//! reported through [`LinearProblemStatus`](crate::LinearProblemStatus) and
//! [`ComputationStatus`](crate::ComputationStatus). [`RaoError`] is reserved
//! for inputs the optimiser cannot run on at all.

use gat_crac::CracError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RaoError {
    /// Malformed CRAC data (tap tables, ranges, groups, perimeters)
    #[error(transparent)]
    Crac(#[from] CracError),

    /// Parameters that cannot be parsed or fail validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Parameter file that cannot be read
    #[error("failed to read parameters from {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Optimiser inputs inconsistent with the perimeter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Linear problem identity errors (unknown or duplicated keys)
    #[error("Linear problem error: {0}")]
    Model(String),
}

pub type RaoResult<T> = Result<T, RaoError>;

impl From<toml::de::Error> for RaoError {
    fn from(e: toml::de::Error) -> Self {
        RaoError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for RaoError {
    fn from(e: toml::ser::Error) -> Self {
        RaoError::Config(e.to_string())
    }
}

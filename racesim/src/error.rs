//! Configuration errors raised while a race is being set up.
//!
//! Once a `Race` exists nothing in the tick loop returns an error: per-car anomalies become
//! status transitions and log entries instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid track: {0}")]
    Track(String),

    #[error("invalid strategy '{name}': {reason}")]
    Strategy { name: String, reason: String },

    #[error("invalid starting grid: {0}")]
    Grid(String),

    #[error("invalid simulation parameter: {0}")]
    Parameter(String),
}

pub type SimResult<T> = Result<T, SimError>;

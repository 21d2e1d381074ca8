//! Error types for the excl workspace.

use thiserror::Error;

/// Workspace-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Model specification rejected (bad input parameters).
    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// Observation vector length does not match the model's data length.
    #[error("dimension mismatch: expected {expected} data entries, got {got}")]
    DimensionMismatch {
        /// Expected data length (main bins plus auxiliary entries).
        expected: usize,
        /// Length actually supplied.
        got: usize,
    },

    /// A required fit did not converge.
    #[error("fit did not converge: {0}")]
    FitConvergence(String),

    /// CLs never crosses the target level inside the scan grid.
    ///
    /// Recoverable: retry with a wider or denser grid.
    #[error("CLs does not cross {level} within the scan range [{lo}, {hi}]")]
    LimitOutOfRange {
        /// Target CLs level (alpha).
        level: f64,
        /// Lowest scanned POI value.
        lo: f64,
        /// Highest scanned POI value.
        hi: f64,
    },

    /// Argument validation error
    #[error("validation error: {0}")]
    Validation(String),

    /// Numerical computation error
    #[error("computation error: {0}")]
    Computation(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

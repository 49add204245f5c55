use thiserror::Error;

/// Errors raised by the localization core.
///
/// Every variant is raised at the boundary of the offending call and never
/// replaced by a default or partial result.
#[derive(Debug, Error)]
pub enum LocError {
    /// Bad calibration input or path-loss parameters.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Degenerate anchor geometry.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Distance count does not match the anchor set.
    #[error("Argument error: {0}")]
    Argument(String),

    /// The numerical backend itself failed (not raised on non-convergence).
    #[error("Solver error: {0}")]
    Solver(String),

    /// Malformed configuration or feed document.
    #[error("Malformed JSON: {0}")]
    Config(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LocError>;

//! Error types for sensor construction and configuration.

/// Errors raised before a sensor starts polling.
///
/// Failures inside an update cycle never surface here; they become a
/// [`crate::sensor::CycleOutcome`] instead.
#[derive(thiserror::Error, Debug)]
pub enum SensorError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid precision {0}: expected 3 or 5")]
    InvalidPrecision(usize),

    #[error("Invalid timeout: must be at least one second")]
    InvalidTimeout,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Price error: {0}")]
    Price(#[from] rae_price::PriceError),
}

pub type SensorResult<T> = Result<T, SensorError>;

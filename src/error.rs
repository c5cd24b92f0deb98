//! Crate-level error types.
//!
//! [`KronosError`] unifies every error source (configuration, validation,
//! forecasting, HTTP, JSON) behind a single enum so callers can match on
//! the variant they care about while still using the `?` operator for easy
//! propagation.

use crate::forecast::ForecastError;
use crate::signal::SignalError;
use crate::validation::ValidationError;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, KronosError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum KronosError {
    /// An environment variable was missing, malformed, or inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// Candle input was rejected before reaching the model.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The model facade failed to produce a forecast.
    #[error("forecast error: {0}")]
    Forecast(#[from] ForecastError),

    /// Trading signals could not be derived from a forecast.
    #[error("signal error: {0}")]
    Signal(#[from] SignalError),

    /// An HTTP request to the service failed at the transport level.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with `success: false`.
    #[error("service returned {status}: {message}")]
    Api { status: u16, message: String },

    /// TLS configuration could not be built.
    #[error("tls error: {0}")]
    Tls(String),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Socket or process I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

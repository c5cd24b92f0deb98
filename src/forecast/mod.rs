//! Model facade for autoregressive candle forecasting.
//!
//! [`Forecaster`] is the single entry point the service calls. Two
//! implementations exist:
//! - [`baseline`] - built-in return-bucket sampler, no external weights
//! - [`worker`] - external process hosting the pretrained model
//!
//! A facade holds no state across calls beyond its loaded model, so one
//! instance is shared by every request.

pub mod baseline;
mod model;
pub mod worker;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ModelConfig;
use crate::models::candle::Candle;

pub use baseline::BaselineForecaster;
pub use model::{BackendKind, Device, ModelInfo, ModelLimits, ModelVariant, TOKENIZER_REPOSITORY};
pub use worker::WorkerForecaster;

/// Upper bound on stochastic rollouts per request.
pub const MAX_SAMPLE_COUNT: usize = 16;

/// Reason the facade could not produce a forecast.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ForecastError {
    #[error("history has {have} candles but the model needs at least {need}")]
    InsufficientContext { have: usize, need: usize },

    #[error("prediction length {requested} exceeds the maximum of {max}")]
    HorizonTooLong { requested: usize, max: usize },

    #[error("prediction length must be at least 1")]
    EmptyHorizon,

    #[error("invalid sampling parameters: {0}")]
    InvalidSampling(String),

    #[error("candle interval could not be derived: {0}")]
    BadInterval(String),

    #[error("model backend is not ready")]
    NotReady,

    #[error("model backend failed: {0}")]
    Backend(String),
}

/// Sampling configuration for next-step generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Softmax temperature; lower is more deterministic.
    pub temperature: f64,
    /// Nucleus sampling cutoff in `(0, 1]`.
    pub top_p: f64,
    /// Rollouts averaged into the returned forecast.
    pub sample_count: usize,
    /// Fixes the random stream when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_p: 0.9,
            sample_count: 1,
            seed: None,
        }
    }
}

impl SamplingParams {
    /// Checks every field against its allowed range.
    pub fn validate(&self) -> Result<(), ForecastError> {
        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            return Err(ForecastError::InvalidSampling(format!(
                "temperature must be positive, got {}",
                self.temperature
            )));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(ForecastError::InvalidSampling(format!(
                "top_p must be in (0, 1], got {}",
                self.top_p
            )));
        }
        if self.sample_count == 0 || self.sample_count > MAX_SAMPLE_COUNT {
            return Err(ForecastError::InvalidSampling(format!(
                "sample_count must be between 1 and {MAX_SAMPLE_COUNT}, got {}",
                self.sample_count
            )));
        }
        Ok(())
    }
}

/// One forecasting call.
#[derive(Debug, Clone)]
pub struct ForecastRequest {
    /// Validated history, oldest first.
    pub history: Vec<Candle>,
    /// Number of future candles to produce.
    pub pred_len: usize,
    pub sampling: SamplingParams,
}

/// Autoregressive candle forecaster.
#[async_trait]
pub trait Forecaster: Send + Sync {
    /// Static metadata about the loaded model.
    fn info(&self) -> &ModelInfo;

    /// Whether the backend can currently serve predictions.
    fn is_ready(&self) -> bool {
        true
    }

    /// Produces exactly `request.pred_len` future candles.
    async fn predict(&self, request: ForecastRequest) -> Result<Vec<Candle>, ForecastError>;
}

/// Timestamps of the `pred_len` candles following `history`.
///
/// The step is the gap between the last two history candles.
pub fn future_timestamps(
    history: &[Candle],
    pred_len: usize,
) -> Result<Vec<DateTime<Utc>>, ForecastError> {
    let [.., previous, last] = history else {
        return Err(ForecastError::BadInterval(
            "at least two candles are required".to_string(),
        ));
    };
    let step = last.timestamp - previous.timestamp;
    if step <= Duration::zero() {
        return Err(ForecastError::BadInterval(format!(
            "timestamps {} and {} are not increasing",
            previous.timestamp, last.timestamp
        )));
    }

    let mut timestamps = Vec::with_capacity(pred_len);
    let mut next = last.timestamp;
    for _ in 0..pred_len {
        next = next
            .checked_add_signed(step)
            .ok_or_else(|| ForecastError::BadInterval("timestamp overflow".to_string()))?;
        timestamps.push(next);
    }
    Ok(timestamps)
}

/// Builds the forecaster selected by the configuration.
///
/// # Errors
///
/// Returns [`KronosError::Config`](crate::KronosError::Config) if the
/// worker command is missing, or an I/O or forecast error if the worker
/// fails to start.
pub async fn build_forecaster(config: &ModelConfig) -> crate::Result<Arc<dyn Forecaster>> {
    let info = config.model_info();
    info!(
        model = %info.variant,
        device = %info.device,
        backend = %info.backend,
        max_context = info.limits.max_context,
        "Initializing forecaster"
    );

    match config.backend {
        BackendKind::Baseline => Ok(Arc::new(BaselineForecaster::new(info))),
        BackendKind::Worker => {
            let command = config.worker_cmd.as_deref().ok_or_else(|| {
                crate::KronosError::Config(
                    "KRONOS_WORKER_CMD is required for the worker backend".to_string(),
                )
            })?;
            let worker = WorkerForecaster::spawn(info, command).await?;
            Ok(Arc::new(worker))
        }
    }
}

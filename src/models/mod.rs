//! Wire models shared by the HTTP service and the client.
//!
//! Contains candle types plus the request and response bodies of every
//! endpoint (`/health`, `/info`, `/models`, `/predict`,
//! `/predict/signals`).

pub mod candle;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::forecast::{ModelInfo, SamplingParams};
use crate::signal::TradingSignals;
use candle::{Candle, RawCandle};

/// Forecast horizon used when a request omits `pred_hours`.
pub const DEFAULT_PRED_HOURS: u32 = 24;

fn default_pred_hours() -> u32 {
    DEFAULT_PRED_HOURS
}

/// Body of `POST /predict` and `POST /predict/signals`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    /// Historical candles, oldest first.
    #[serde(alias = "ohlcv_data")]
    pub kline_data: Vec<RawCandle>,
    /// Hours to forecast; converted to steps with the service's
    /// steps-per-hour setting.
    #[serde(default = "default_pred_hours")]
    pub pred_hours: u32,
    /// Forecast length in steps. Overrides `pred_hours` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pred_len: Option<usize>,
    /// Number of most recent candles handed to the model. Defaults to the
    /// service minimum.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookback: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl PredictRequest {
    /// Builds a request from validated candles with default parameters.
    pub fn new(candles: &[Candle]) -> Self {
        Self {
            kline_data: candles.iter().map(RawCandle::from).collect(),
            pred_hours: DEFAULT_PRED_HOURS,
            pred_len: None,
            lookback: None,
            temperature: None,
            top_p: None,
            sample_count: None,
            seed: None,
        }
    }

    /// Resolves the optional sampling fields against the defaults.
    pub fn sampling(&self) -> SamplingParams {
        let defaults = SamplingParams::default();
        SamplingParams {
            temperature: self.temperature.unwrap_or(defaults.temperature),
            top_p: self.top_p.unwrap_or(defaults.top_p),
            sample_count: self.sample_count.unwrap_or(defaults.sample_count),
            seed: self.seed,
        }
    }
}

/// Successful response of `POST /predict`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub success: bool,
    pub predictions: Vec<Candle>,
    pub prediction_count: usize,
    pub pred_hours: u32,
    pub lookback: usize,
    pub parameters: SamplingParams,
    pub timestamp: DateTime<Utc>,
}

/// Successful response of `POST /predict/signals`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalsResponse {
    pub success: bool,
    pub signals: TradingSignals,
    pub predictions: Vec<Candle>,
    pub prediction_count: usize,
    pub pred_hours: u32,
    pub timestamp: DateTime<Utc>,
}

/// Response of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `"healthy"` or `"unhealthy"`.
    pub status: String,
    pub predictor_loaded: bool,
    pub model: String,
    pub timestamp: DateTime<Utc>,
}

/// Response of `GET /info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoResponse {
    pub success: bool,
    pub model: ModelInfo,
    pub min_lookback: usize,
    pub steps_per_hour: usize,
    pub signal_horizons: Vec<String>,
    pub version: String,
}

/// One entry of the `GET /models` listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub name: String,
    pub params: String,
    pub max_context: usize,
    pub description: String,
}

/// Response of `GET /models`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub success: bool,
    pub models: Vec<ModelDescriptor>,
}

/// Body of every failed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use tracing::{debug, info};

use super::AppState;
use super::error::ApiError;
use crate::forecast::{ForecastError, ForecastRequest, ModelVariant, SamplingParams};
use crate::models::candle::Candle;
use crate::models::{
    HealthResponse, InfoResponse, ModelsResponse, PredictRequest, PredictResponse,
    SignalsResponse,
};
use crate::signal::derive_signals;
use crate::validation::{ValidationError, validate_window};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/info", get(model_info))
        .route("/models", get(list_models))
        .route("/predict", post(predict))
        .route("/predict/signals", post(predict_signals))
}

/// GET /health
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let loaded = state.forecaster.is_ready();
    Json(HealthResponse {
        status: if loaded { "healthy" } else { "unhealthy" }.to_string(),
        predictor_loaded: loaded,
        model: state.forecaster.info().variant.id().to_string(),
        timestamp: Utc::now(),
    })
}

/// GET /info
async fn model_info(State(state): State<Arc<AppState>>) -> Json<InfoResponse> {
    Json(InfoResponse {
        success: true,
        model: state.forecaster.info().clone(),
        min_lookback: state.prediction.min_lookback,
        steps_per_hour: state.prediction.steps_per_hour,
        signal_horizons: state.prediction.signal.horizon_labels(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /models
async fn list_models() -> Json<ModelsResponse> {
    Json(ModelsResponse {
        success: true,
        models: ModelVariant::all().iter().map(|v| v.descriptor()).collect(),
    })
}

/// POST /predict
async fn predict(
    State(state): State<Arc<AppState>>,
    body: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let Json(request) = body?;
    let forecast = run_forecast(&state, &request).await?;

    Ok(Json(PredictResponse {
        success: true,
        prediction_count: forecast.candles.len(),
        predictions: forecast.candles,
        pred_hours: request.pred_hours,
        lookback: forecast.lookback,
        parameters: forecast.sampling,
        timestamp: Utc::now(),
    }))
}

/// POST /predict/signals
async fn predict_signals(
    State(state): State<Arc<AppState>>,
    body: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<SignalsResponse>, ApiError> {
    let Json(request) = body?;
    let forecast = run_forecast(&state, &request).await?;
    let signals = derive_signals(
        forecast.current_price,
        &forecast.candles,
        &state.prediction.signal,
    )?;

    info!(
        overall = %signals.overall_signal,
        confidence = signals.confidence,
        weighted_change_pct = signals.weighted_change_pct,
        "Signals derived"
    );

    Ok(Json(SignalsResponse {
        success: true,
        signals,
        prediction_count: forecast.candles.len(),
        predictions: forecast.candles,
        pred_hours: request.pred_hours,
        timestamp: Utc::now(),
    }))
}

/// Outcome of the shared validate-then-forecast path.
struct Forecast {
    candles: Vec<Candle>,
    current_price: f64,
    lookback: usize,
    sampling: SamplingParams,
}

async fn run_forecast(state: &AppState, request: &PredictRequest) -> Result<Forecast, ApiError> {
    if !state.forecaster.is_ready() {
        return Err(ForecastError::NotReady.into());
    }

    let lookback = request.lookback.unwrap_or(state.prediction.min_lookback);
    let history = validate_window(&request.kline_data, lookback, state.prediction.min_lookback)?;
    let pred_len = forecast_steps(
        request.pred_len,
        request.pred_hours,
        state.prediction.steps_per_hour,
    )?;
    let sampling = request.sampling();
    // validate_window never returns an empty window for lookback >= 1
    let current_price = history.last().map(|c| c.close).unwrap_or_default();

    debug!(
        received = request.kline_data.len(),
        lookback,
        pred_len,
        temperature = sampling.temperature,
        top_p = sampling.top_p,
        sample_count = sampling.sample_count,
        "Forecast requested"
    );

    let candles = state
        .forecaster
        .predict(ForecastRequest {
            history,
            pred_len,
            sampling,
        })
        .await?;

    info!(
        lookback,
        pred_len,
        prediction_count = candles.len(),
        "Forecast complete"
    );

    Ok(Forecast {
        candles,
        current_price,
        lookback,
        sampling,
    })
}

/// Steps to forecast: an explicit `pred_len`, else `pred_hours` converted.
fn forecast_steps(
    pred_len: Option<usize>,
    pred_hours: u32,
    steps_per_hour: usize,
) -> Result<usize, ValidationError> {
    match pred_len {
        Some(0) => Err(ValidationError::InvalidParameter {
            name: "pred_len",
            reason: "must be at least 1".to_string(),
        }),
        Some(steps) => Ok(steps),
        None => horizon_steps(pred_hours, steps_per_hour),
    }
}

fn horizon_steps(pred_hours: u32, steps_per_hour: usize) -> Result<usize, ValidationError> {
    if pred_hours == 0 {
        return Err(ValidationError::InvalidParameter {
            name: "pred_hours",
            reason: "must be at least 1".to_string(),
        });
    }
    (pred_hours as usize)
        .checked_mul(steps_per_hour)
        .ok_or_else(|| ValidationError::InvalidParameter {
            name: "pred_hours",
            reason: format!("{pred_hours} hours overflows the step count"),
        })
}

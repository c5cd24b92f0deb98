//! HTTP service exposing the forecaster.
//!
//! Routes:
//! - `GET /health` - readiness of the model backend
//! - `GET /info` - loaded model and request limits
//! - `GET /models` - registered model variants
//! - `POST /predict` - candle forecast
//! - `POST /predict/signals` - forecast plus BUY/SELL/HOLD signals

mod error;
mod routes;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::PredictionConfig;
use crate::forecast::Forecaster;

pub use error::ApiError;

/// Shared application state, passed to all route handlers via `axum::extract::State`.
pub struct AppState {
    pub forecaster: Arc<dyn Forecaster>,
    pub prediction: PredictionConfig,
}

impl AppState {
    pub fn new(forecaster: Arc<dyn Forecaster>, prediction: PredictionConfig) -> Arc<Self> {
        Arc::new(Self {
            forecaster,
            prediction,
        })
    }
}

/// Assembles the full application router.
pub fn router(state: Arc<AppState>) -> Router {
    routes::routes()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

//! Shared test utilities and constants.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;
use tower::ServiceExt;

use kronos_serve::config::{ModelConfig, PredictionConfig};
use kronos_serve::forecast::{
    BaselineForecaster, ForecastError, ForecastRequest, Forecaster, ModelInfo, ModelVariant,
    future_timestamps,
};
use kronos_serve::models::candle::Candle;
use kronos_serve::sample::random_walk;
use kronos_serve::service::{AppState, router};

/// Seed of every synthetic series in the tests.
pub const SEED: u64 = 42;

pub fn series_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// `count` consecutive 5-minute candles starting at [`series_start`].
pub fn candles(count: usize) -> Vec<Candle> {
    random_walk(count, series_start(), Duration::minutes(5), 100.0, SEED)
}

pub fn model_info() -> ModelInfo {
    ModelConfig::for_variant(ModelVariant::Small).model_info()
}

/// What a [`MockForecaster`] does when called.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Prices rise by 0.01% per step from the last close.
    Rising,
    Fail,
    NotReady,
}

/// Forecaster double that counts its calls.
pub struct MockForecaster {
    info: ModelInfo,
    behavior: MockBehavior,
    calls: AtomicUsize,
}

impl MockForecaster {
    pub fn new(behavior: MockBehavior) -> Arc<Self> {
        Arc::new(Self {
            info: model_info(),
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Forecaster for MockForecaster {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn is_ready(&self) -> bool {
        self.behavior != MockBehavior::NotReady
    }

    async fn predict(&self, request: ForecastRequest) -> Result<Vec<Candle>, ForecastError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            MockBehavior::Fail => Err(ForecastError::Backend("mock failure".to_string())),
            MockBehavior::NotReady => Err(ForecastError::NotReady),
            MockBehavior::Rising => {
                let last = request.history.last().copied().ok_or(ForecastError::EmptyHorizon)?;
                let timestamps = future_timestamps(&request.history, request.pred_len)?;
                Ok(timestamps
                    .into_iter()
                    .enumerate()
                    .map(|(i, timestamp)| {
                        let close = last.close * (1.0 + 0.0001 * (i + 1) as f64);
                        Candle {
                            timestamp,
                            open: close,
                            high: close,
                            low: close,
                            close,
                            volume: last.volume,
                        }
                    })
                    .collect())
            }
        }
    }
}

/// Router backed by the built-in baseline forecaster.
pub fn baseline_router() -> Router {
    let forecaster = Arc::new(BaselineForecaster::new(model_info()));
    router(AppState::new(forecaster, PredictionConfig::default()))
}

/// Router backed by `forecaster`.
pub fn mock_router(forecaster: Arc<MockForecaster>) -> Router {
    router(AppState::new(forecaster, PredictionConfig::default()))
}

pub async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn post_json(app: Router, uri: &str, body: impl Into<String>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.into()))
        .unwrap();
    send(app, request).await
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

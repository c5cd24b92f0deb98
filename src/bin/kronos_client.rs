//! Demo client: sends a synthetic candle series to a running service.
//!
//! `KRONOS_URL` selects the service (default `http://localhost:5000`);
//! `KRONOS_CA_CERT` optionally names a PEM bundle to trust for HTTPS.

use chrono::{Duration, TimeZone, Utc};
use kronos_serve::client::KronosClient;
use kronos_serve::models::PredictRequest;
use kronos_serve::sample::random_walk;
use kronos_serve::tls::load_tls_config;
use kronos_serve::{KronosError, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_URL: &str = "http://localhost:5000";
const SAMPLE_CANDLES: usize = 500;
const SAMPLE_SEED: u64 = 42;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let url = env_var("KRONOS_URL").unwrap_or_else(|| DEFAULT_URL.to_string());
    let client = match env_var("KRONOS_CA_CERT") {
        Some(path) => KronosClient::with_tls(&url, load_tls_config(path)?)?,
        None => KronosClient::new(&url)?,
    };

    let health = client.health().await?;
    info!(
        status = %health.status,
        model = %health.model,
        predictor_loaded = health.predictor_loaded,
        "Health"
    );
    if !health.predictor_loaded {
        return Err(KronosError::Api {
            status: 503,
            message: format!("service at {url} has no model loaded"),
        });
    }

    let start = Utc
        .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| KronosError::Config("invalid sample start time".to_string()))?;
    let candles = random_walk(SAMPLE_CANDLES, start, Duration::minutes(5), 100.0, SAMPLE_SEED);
    let mut request = PredictRequest::new(&candles);
    request.seed = Some(SAMPLE_SEED);

    let forecast = client.predict(&request).await?;
    if let (Some(first), Some(last)) = (forecast.predictions.first(), forecast.predictions.last()) {
        info!(
            prediction_count = forecast.prediction_count,
            first = %first.timestamp,
            last = %last.timestamp,
            final_close = last.close,
            "Forecast received"
        );
    }

    let response = client.predict_with_signals(&request).await?;
    let signals = &response.signals;
    for horizon in &signals.horizons {
        info!(
            horizon = %horizon.horizon,
            price = horizon.price,
            change_pct = horizon.change_pct,
            signal = %horizon.signal,
            confidence = horizon.confidence,
            "Horizon signal"
        );
    }
    info!(
        current_price = signals.current_price,
        overall = %signals.overall_signal,
        confidence = signals.confidence,
        "Overall signal"
    );

    Ok(())
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

//! Deserialization tests for the service's wire models.

use chrono::{TimeZone, Utc};

use kronos_serve::models::{
    ErrorResponse, HealthResponse, PredictRequest, PredictResponse, SignalsResponse,
};
use kronos_serve::signal::Direction;
use kronos_serve::validation::validate_window;

const PREDICT_REQUEST_JSON: &str = include_str!("fixtures/predict_request.json");
const PREDICT_RESPONSE_JSON: &str = include_str!("fixtures/predict_response.json");
const SIGNALS_RESPONSE_JSON: &str = include_str!("fixtures/signals_response.json");
const HEALTH_RESPONSE_JSON: &str = include_str!("fixtures/health_response.json");
const ERROR_RESPONSE_JSON: &str = include_str!("fixtures/error_response.json");

#[test]
fn test_predict_request_accepts_legacy_names() {
    let request: PredictRequest =
        serde_json::from_str(PREDICT_REQUEST_JSON).expect("Failed to deserialize request");

    assert_eq!(request.kline_data.len(), 3);
    assert_eq!(request.kline_data[1].timestamp.as_deref(), Some("2024-01-01T00:05:00"));
    assert_eq!(request.kline_data[2].volume, Some(941.0));
    assert_eq!(request.pred_hours, 6);
    assert_eq!(request.lookback, None);
    assert_eq!(request.seed, None);

    let sampling = request.sampling();
    assert_eq!(sampling.temperature, 0.8);
    assert_eq!(sampling.top_p, 0.95);
    assert_eq!(sampling.sample_count, 4);

    let candles = validate_window(&request.kline_data, 3, 1).expect("fixture should validate");
    assert_eq!(
        candles[0].timestamp,
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    );
}

#[test]
fn test_predict_request_defaults() {
    let request: PredictRequest = serde_json::from_str(r#"{"kline_data": []}"#).unwrap();
    assert_eq!(request.pred_hours, 24);
    assert_eq!(request.sampling().sample_count, 1);
}

#[test]
fn test_predict_request_serializes_without_unset_fields() {
    let request: PredictRequest = serde_json::from_str(r#"{"kline_data": []}"#).unwrap();
    let json = serde_json::to_value(&request).unwrap();
    assert!(json.get("seed").is_none());
    assert!(json.get("lookback").is_none());
    assert_eq!(json["pred_hours"], 24);
}

#[test]
fn test_predict_response_deserializes() {
    let response: PredictResponse =
        serde_json::from_str(PREDICT_RESPONSE_JSON).expect("Failed to deserialize response");

    assert!(response.success);
    assert_eq!(response.prediction_count, 2);
    assert_eq!(response.predictions.len(), 2);
    assert_eq!(
        response.predictions[1].timestamp,
        Utc.with_ymd_and_hms(2024, 1, 2, 9, 25, 0).unwrap()
    );
    assert_eq!(response.predictions[1].volume, 433.5);
    assert_eq!(response.parameters.seed, None);
    assert_eq!(response.lookback, 400);
}

#[test]
fn test_signals_response_deserializes() {
    let response: SignalsResponse =
        serde_json::from_str(SIGNALS_RESPONSE_JSON).expect("Failed to deserialize signals");

    let signals = &response.signals;
    assert_eq!(signals.current_price, 100.0);
    assert_eq!(signals.overall_signal, Direction::Sell);
    let directions: Vec<Direction> = signals.horizons.iter().map(|h| h.signal).collect();
    assert_eq!(
        directions,
        vec![Direction::Buy, Direction::Sell, Direction::Hold]
    );
    assert_eq!(signals.horizons[2].index, 287);
    assert_eq!(response.prediction_count, 288);
}

#[test]
fn test_health_response_deserializes() {
    let response: HealthResponse =
        serde_json::from_str(HEALTH_RESPONSE_JSON).expect("Failed to deserialize health");
    assert_eq!(response.status, "healthy");
    assert!(response.predictor_loaded);
    assert_eq!(response.model, "kronos-small");
}

#[test]
fn test_error_response_deserializes() {
    let response: ErrorResponse =
        serde_json::from_str(ERROR_RESPONSE_JSON).expect("Failed to deserialize error");
    assert!(!response.success);
    assert!(response.error.starts_with("insufficient history"));
}

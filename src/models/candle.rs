//! OHLCV candle models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A validated OHLCV candlestick bar.
///
/// Serialized timestamps are RFC 3339 in UTC (`2024-01-01T00:05:00Z`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Open time of the bar.
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Returns `true` if high and low bracket both open and close.
    pub fn is_consistent(&self) -> bool {
        self.high >= self.open.max(self.close) && self.low <= self.open.min(self.close)
    }
}

/// A candle as received on the wire, before validation.
///
/// Every field is optional so that a missing column can be reported with
/// the index of the offending candle instead of a generic parse error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCandle {
    #[serde(default, alias = "timestamps", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

impl From<&Candle> for RawCandle {
    fn from(candle: &Candle) -> Self {
        Self {
            timestamp: Some(candle.timestamp.to_rfc3339()),
            open: Some(candle.open),
            high: Some(candle.high),
            low: Some(candle.low),
            close: Some(candle.close),
            volume: Some(candle.volume),
        }
    }
}

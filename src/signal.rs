//! Trading signal derivation from forecast candles.
//!
//! For each configured horizon the predicted close is compared with the
//! last real close. The percentage change picks a direction and its
//! magnitude a confidence. Horizons are then folded into one overall
//! signal by an hours-weighted mean of their changes, discounted by how
//! many horizons agree with the result.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::candle::Candle;

/// Directional recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => f.write_str("BUY"),
            Direction::Sell => f.write_str("SELL"),
            Direction::Hold => f.write_str("HOLD"),
        }
    }
}

/// Parameters of signal derivation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalConfig {
    /// Horizons, in hours, evaluated on every forecast.
    pub horizons: Vec<u32>,
    /// Forecast steps per hour (12 for 5-minute candles).
    pub steps_per_hour: usize,
    /// Changes within `±hold_band_pct` percent map to HOLD.
    pub hold_band_pct: f64,
    /// Absolute change, in percent, that maps to full confidence.
    pub confidence_scale_pct: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            horizons: vec![1, 6, 24],
            steps_per_hour: 12,
            hold_band_pct: 0.0,
            confidence_scale_pct: 5.0,
        }
    }
}

impl SignalConfig {
    /// Index into the forecast for a horizon, clamped to the last candle.
    pub fn horizon_index(&self, hours: u32, forecast_len: usize) -> usize {
        let steps = (hours as usize).saturating_mul(self.steps_per_hour).max(1);
        steps.min(forecast_len).saturating_sub(1)
    }

    /// Labels such as `"1h"` for every configured horizon.
    pub fn horizon_labels(&self) -> Vec<String> {
        self.horizons.iter().map(|h| format!("{h}h")).collect()
    }

    /// Maps a percentage change onto a direction.
    pub fn classify(&self, change_pct: f64) -> Direction {
        if change_pct > self.hold_band_pct {
            Direction::Buy
        } else if change_pct < -self.hold_band_pct {
            Direction::Sell
        } else {
            Direction::Hold
        }
    }

    /// Confidence in `[0, 1]` for a percentage change.
    pub fn confidence(&self, change_pct: f64) -> f64 {
        if !change_pct.is_finite() || self.confidence_scale_pct <= 0.0 {
            return 0.0;
        }
        (change_pct.abs() / self.confidence_scale_pct).min(1.0)
    }
}

/// Signal at one forecast horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonSignal {
    /// Label such as `"6h"`.
    pub horizon: String,
    pub hours: u32,
    /// Zero-based forecast index the horizon was read from.
    pub index: usize,
    pub price: f64,
    pub change_pct: f64,
    pub signal: Direction,
    pub confidence: f64,
}

/// Per-horizon signals plus their aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingSignals {
    pub current_price: f64,
    pub horizons: Vec<HorizonSignal>,
    /// Hours-weighted mean of the per-horizon changes.
    pub weighted_change_pct: f64,
    pub overall_signal: Direction,
    pub confidence: f64,
}

/// Reason signals could not be derived.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SignalError {
    #[error("forecast is empty")]
    EmptyForecast,

    #[error("current price must be positive and finite, got {0}")]
    InvalidPrice(f64),

    #[error("forecast close at index {index} is not a positive finite price: {price}")]
    InvalidForecast { index: usize, price: f64 },
}

/// Derives per-horizon and overall signals from a forecast.
///
/// # Errors
///
/// Returns [`SignalError`] for an empty forecast, a non-positive current
/// price, or a horizon whose predicted close is not a positive finite price.
pub fn derive_signals(
    current_price: f64,
    forecast: &[Candle],
    config: &SignalConfig,
) -> Result<TradingSignals, SignalError> {
    if forecast.is_empty() {
        return Err(SignalError::EmptyForecast);
    }
    if !current_price.is_finite() || current_price <= 0.0 {
        return Err(SignalError::InvalidPrice(current_price));
    }

    let horizons = config
        .horizons
        .iter()
        .map(|&hours| {
            let index = config.horizon_index(hours, forecast.len());
            let price = forecast[index].close;
            if !price.is_finite() || price <= 0.0 {
                return Err(SignalError::InvalidForecast { index, price });
            }
            let change_pct = (price - current_price) / current_price * 100.0;
            Ok(HorizonSignal {
                horizon: format!("{hours}h"),
                hours,
                index,
                price,
                change_pct,
                signal: config.classify(change_pct),
                confidence: config.confidence(change_pct),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let total_weight: f64 = horizons.iter().map(|h| f64::from(h.hours.max(1))).sum();
    let weighted_change_pct = if total_weight > 0.0 {
        horizons
            .iter()
            .map(|h| h.change_pct * f64::from(h.hours.max(1)))
            .sum::<f64>()
            / total_weight
    } else {
        0.0
    };

    let overall_signal = config.classify(weighted_change_pct);
    let agreement = if horizons.is_empty() {
        0.0
    } else {
        horizons
            .iter()
            .filter(|h| h.signal == overall_signal)
            .count() as f64
            / horizons.len() as f64
    };

    Ok(TradingSignals {
        current_price,
        horizons,
        weighted_change_pct,
        overall_signal,
        confidence: config.confidence(weighted_change_pct) * agreement,
    })
}

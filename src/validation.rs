//! Input validation for historical candle windows.
//!
//! Turns wire-level [`RawCandle`]s into validated [`Candle`]s and rejects
//! anything the model facade should never see: short histories, missing
//! columns, bad numbers, and unparseable or unordered timestamps.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::models::candle::{Candle, RawCandle};

/// Naive timestamp layouts accepted in addition to RFC 3339.
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Reason a candle window was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyInput,
    InsufficientHistory {
        have: usize,
        need: usize,
    },
    LookbackBelowMinimum {
        lookback: usize,
        min: usize,
    },
    MissingField {
        index: usize,
        field: &'static str,
    },
    InvalidValue {
        index: usize,
        field: &'static str,
        value: f64,
    },
    BadTimestamp {
        index: usize,
        value: String,
    },
    UnorderedTimestamps {
        index: usize,
    },
    InvalidParameter {
        name: &'static str,
        reason: String,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyInput => write!(f, "kline_data must be a non-empty array"),
            Self::InsufficientHistory { have, need } => {
                write!(
                    f,
                    "insufficient history: need at least {need} candles, got {have}"
                )
            }
            Self::LookbackBelowMinimum { lookback, min } => {
                write!(f, "lookback {lookback} is below the minimum of {min}")
            }
            Self::MissingField { index, field } => {
                write!(f, "candle {index}: missing required field `{field}`")
            }
            Self::InvalidValue {
                index,
                field,
                value,
            } => {
                write!(f, "candle {index}: invalid `{field}` value {value}")
            }
            Self::BadTimestamp { index, value } => {
                write!(f, "candle {index}: unparseable timestamp '{value}'")
            }
            Self::UnorderedTimestamps { index } => {
                write!(
                    f,
                    "candle {index}: timestamp is not after the previous candle"
                )
            }
            Self::InvalidParameter { name, reason } => write!(f, "invalid {name}: {reason}"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Parses an ISO-8601 timestamp.
///
/// Accepts RFC 3339 with an offset, or a naive date-time which is read as
/// UTC. A bare date means midnight UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|parsed| parsed.and_utc())
}

/// Validates a single candle at position `index`.
pub fn validate_candle(index: usize, raw: &RawCandle) -> Result<Candle, ValidationError> {
    let timestamp_text = raw.timestamp.as_deref().ok_or(ValidationError::MissingField {
        index,
        field: "timestamp",
    })?;
    let open = price(index, "open", raw.open)?;
    let high = price(index, "high", raw.high)?;
    let low = price(index, "low", raw.low)?;
    let close = price(index, "close", raw.close)?;
    let volume = raw.volume.ok_or(ValidationError::MissingField {
        index,
        field: "volume",
    })?;
    if !volume.is_finite() || volume < 0.0 {
        return Err(ValidationError::InvalidValue {
            index,
            field: "volume",
            value: volume,
        });
    }

    let timestamp =
        parse_timestamp(timestamp_text).ok_or_else(|| ValidationError::BadTimestamp {
            index,
            value: timestamp_text.to_string(),
        })?;

    Ok(Candle {
        timestamp,
        open,
        high,
        low,
        close,
        volume,
    })
}

fn price(index: usize, field: &'static str, value: Option<f64>) -> Result<f64, ValidationError> {
    let value = value.ok_or(ValidationError::MissingField { index, field })?;
    if !value.is_finite() || value <= 0.0 {
        return Err(ValidationError::InvalidValue {
            index,
            field,
            value,
        });
    }
    Ok(value)
}

/// Validates every candle and returns the most recent `lookback` of them.
///
/// # Errors
///
/// Returns the first rule violation found, checking lengths before any
/// per-candle rule.
pub fn validate_window(
    raw: &[RawCandle],
    lookback: usize,
    min_lookback: usize,
) -> Result<Vec<Candle>, ValidationError> {
    if raw.is_empty() {
        return Err(ValidationError::EmptyInput);
    }
    if lookback < min_lookback {
        return Err(ValidationError::LookbackBelowMinimum {
            lookback,
            min: min_lookback,
        });
    }
    if raw.len() < lookback {
        return Err(ValidationError::InsufficientHistory {
            have: raw.len(),
            need: lookback,
        });
    }

    let mut candles: Vec<Candle> = Vec::with_capacity(raw.len());
    for (index, entry) in raw.iter().enumerate() {
        let candle = validate_candle(index, entry)?;
        if let Some(previous) = candles.last()
            && candle.timestamp <= previous.timestamp
        {
            return Err(ValidationError::UnorderedTimestamps { index });
        }
        candles.push(candle);
    }

    let start = candles.len() - lookback;
    Ok(candles.split_off(start))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn raw(step: usize) -> RawCandle {
        let timestamp = start() + chrono::Duration::minutes(5 * step as i64);
        RawCandle {
            timestamp: Some(timestamp.format("%Y-%m-%dT%H:%M:%S").to_string()),
            open: Some(100.0),
            high: Some(101.0),
            low: Some(99.0),
            close: Some(100.5),
            volume: Some(12.0),
        }
    }

    fn window(count: usize) -> Vec<RawCandle> {
        (0..count).map(raw).collect()
    }

    #[test]
    fn parses_supported_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 10, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-01T10:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01T18:30:00+08:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01T10:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01 10:30:00.000"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01T10:30"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-01-01"),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn accepts_exact_minimum() {
        let candles = validate_window(&window(400), 400, 400).unwrap();
        assert_eq!(candles.len(), 400);
    }

    #[test]
    fn returns_most_recent_lookback() {
        let candles = validate_window(&window(450), 400, 400).unwrap();
        assert_eq!(candles.len(), 400);
        assert_eq!(
            candles[0].timestamp,
            start() + chrono::Duration::minutes(5 * 50)
        );
    }

    #[test]
    fn rejects_short_history() {
        assert_eq!(
            validate_window(&window(399), 400, 400),
            Err(ValidationError::InsufficientHistory {
                have: 399,
                need: 400
            })
        );
    }

    #[test]
    fn rejects_lookback_below_minimum() {
        assert_eq!(
            validate_window(&window(500), 100, 400),
            Err(ValidationError::LookbackBelowMinimum {
                lookback: 100,
                min: 400
            })
        );
    }

    #[test]
    fn rejects_empty_input() {
        assert_eq!(validate_window(&[], 400, 400), Err(ValidationError::EmptyInput));
    }

    #[test]
    fn reports_missing_field_with_index() {
        let mut candles = window(10);
        candles[7].close = None;
        let err = validate_window(&candles, 10, 1).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingField {
                index: 7,
                field: "close"
            }
        );
        assert_eq!(err.to_string(), "candle 7: missing required field `close`");
    }

    #[test]
    fn rejects_bad_numbers() {
        let mut candles = window(3);
        candles[1].volume = Some(-1.0);
        assert!(matches!(
            validate_window(&candles, 3, 1),
            Err(ValidationError::InvalidValue {
                index: 1,
                field: "volume",
                ..
            })
        ));

        let mut candles = window(3);
        candles[2].open = Some(0.0);
        assert!(matches!(
            validate_window(&candles, 3, 1),
            Err(ValidationError::InvalidValue {
                index: 2,
                field: "open",
                ..
            })
        ));
    }

    #[test]
    fn rejects_bad_timestamp() {
        let mut candles = window(3);
        candles[0].timestamp = Some("01/02/2024".to_string());
        assert_eq!(
            validate_window(&candles, 3, 1),
            Err(ValidationError::BadTimestamp {
                index: 0,
                value: "01/02/2024".to_string()
            })
        );
    }

    #[test]
    fn rejects_unordered_and_duplicate_timestamps() {
        let mut candles = window(4);
        candles.swap(1, 2);
        assert_eq!(
            validate_window(&candles, 4, 1),
            Err(ValidationError::UnorderedTimestamps { index: 2 })
        );

        let mut candles = window(3);
        candles[2].timestamp = candles[1].timestamp.clone();
        assert_eq!(
            validate_window(&candles, 3, 1),
            Err(ValidationError::UnorderedTimestamps { index: 2 })
        );
    }

    #[test]
    fn inconsistent_high_low_is_accepted() {
        let mut candles = window(3);
        candles[1].high = Some(50.0);
        assert!(validate_window(&candles, 3, 1).is_ok());
    }
}

//! Synthetic candle series for demos and tests.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::candle::Candle;

/// Largest per-candle close-to-close move, in percent.
const MAX_STEP_PCT: f64 = 0.8;
/// Largest wick beyond the candle body, in percent.
const MAX_WICK_PCT: f64 = 0.3;

/// Generates `count` consecutive candles as a seeded random walk.
///
/// Each open equals the previous close, wicks enclose the body, and
/// volume is drawn from `100..1000`. The same seed always yields the same
/// series.
pub fn random_walk(
    count: usize,
    start: DateTime<Utc>,
    interval: Duration,
    start_price: f64,
    seed: u64,
) -> Vec<Candle> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut candles = Vec::with_capacity(count);
    let mut price = start_price;
    let mut timestamp = start;

    for _ in 0..count {
        let open = price;
        let close = open * (1.0 + rng.gen_range(-MAX_STEP_PCT..=MAX_STEP_PCT) / 100.0);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..=MAX_WICK_PCT) / 100.0);
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..=MAX_WICK_PCT) / 100.0);
        let volume = f64::from(rng.gen_range(100u32..1000));

        candles.push(Candle {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        });
        price = close;
        timestamp += interval;
    }
    candles
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn series(seed: u64) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        random_walk(500, start, Duration::minutes(5), 100.0, seed)
    }

    #[test]
    fn produces_consistent_continuous_candles() {
        let candles = series(42);
        assert_eq!(candles.len(), 500);
        assert!(candles.iter().all(Candle::is_consistent));
        for pair in candles.windows(2) {
            assert_eq!(pair[1].open, pair[0].close);
            assert_eq!(pair[1].timestamp - pair[0].timestamp, Duration::minutes(5));
        }
    }

    #[test]
    fn seed_fixes_the_series() {
        assert_eq!(series(7), series(7));
        assert_ne!(series(7), series(8));
    }
}

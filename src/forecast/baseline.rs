//! Built-in return-bucket sampler.
//!
//! Tokenizes the context's close-to-close log returns into a fixed
//! vocabulary of equal-width buckets and generates future candles one
//! step at a time. Each step conditions on the previous bucket through a
//! smoothed bigram table, applies temperature and nucleus filtering, and
//! draws the next bucket. Rollouts are averaged field-wise.
//!
//! This is a self-contained stand-in for the pretrained model: it needs no
//! weights and, when seeded, is fully reproducible.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::{ForecastError, ForecastRequest, Forecaster, ModelInfo, SamplingParams};
use crate::models::candle::Candle;

/// Default vocabulary size for return buckets.
pub const DEFAULT_NUM_BUCKETS: usize = 64;

/// Largest lower-wick ratio applied to synthetic candles.
const MAX_WICK_RATIO: f64 = 0.5;

/// Facade implementation backed by [`ReturnVocabulary`] sampling.
pub struct BaselineForecaster {
    info: ModelInfo,
    num_buckets: usize,
}

impl BaselineForecaster {
    pub fn new(info: ModelInfo) -> Self {
        Self {
            info,
            num_buckets: DEFAULT_NUM_BUCKETS,
        }
    }

    /// Overrides the vocabulary size (minimum 1).
    #[must_use]
    pub fn with_buckets(mut self, num_buckets: usize) -> Self {
        self.num_buckets = num_buckets.max(1);
        self
    }
}

#[async_trait]
impl Forecaster for BaselineForecaster {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    async fn predict(&self, request: ForecastRequest) -> Result<Vec<Candle>, ForecastError> {
        self.info.limits.check(&request)?;

        let context = self.info.limits.context(&request.history).to_vec();
        let timestamps = super::future_timestamps(&context, request.pred_len)?;
        let sampling = request.sampling;
        let num_buckets = self.num_buckets;

        debug!(
            context = context.len(),
            pred_len = request.pred_len,
            sample_count = sampling.sample_count,
            "Sampling baseline forecast"
        );

        tokio::task::spawn_blocking(move || {
            sample_forecast(&context, &timestamps, &sampling, num_buckets)
        })
        .await
        .map_err(|e| ForecastError::Backend(format!("sampler task failed: {e}")))
    }
}

/// Runs `sample_count` rollouts over `context` and averages them.
///
/// `context` must hold at least two candles.
pub fn sample_forecast(
    context: &[Candle],
    timestamps: &[DateTime<Utc>],
    sampling: &SamplingParams,
    num_buckets: usize,
) -> Vec<Candle> {
    let profile = ContextProfile::from_candles(context, num_buckets);
    let mut rng = match sampling.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut totals = vec![Ohlcv::default(); timestamps.len()];
    for _ in 0..sampling.sample_count {
        let path = profile.rollout(&mut rng, timestamps.len(), sampling);
        for (total, step) in totals.iter_mut().zip(path) {
            total.add(&step);
        }
    }

    let n = sampling.sample_count.max(1) as f64;
    timestamps
        .iter()
        .zip(totals)
        .map(|(timestamp, total)| Candle {
            timestamp: *timestamp,
            open: total.open / n,
            high: total.high / n,
            low: total.low / n,
            close: total.close / n,
            volume: total.volume / n,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
struct Ohlcv {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl Ohlcv {
    fn add(&mut self, other: &Ohlcv) {
        self.open += other.open;
        self.high += other.high;
        self.low += other.low;
        self.close += other.close;
        self.volume += other.volume;
    }
}

/// Equal-width quantization of log returns with smoothed bucket statistics.
#[derive(Debug, Clone)]
pub struct ReturnVocabulary {
    min: f64,
    width: f64,
    /// Occurrences of each bucket.
    unigrams: Vec<f64>,
    /// `bigrams[prev][next]` transition occurrences.
    bigrams: Vec<Vec<f64>>,
}

impl ReturnVocabulary {
    /// Builds the vocabulary from a return series.
    ///
    /// A flat series (every return equal) collapses to a single bucket.
    pub fn fit(returns: &[f64], num_buckets: usize) -> Self {
        let min = returns.iter().copied().fold(f64::INFINITY, f64::min);
        let max = returns.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let (min, span) = if min.is_finite() && max.is_finite() {
            (min, max - min)
        } else {
            (0.0, 0.0)
        };
        let size = if span > f64::EPSILON { num_buckets.max(1) } else { 1 };
        let width = if span > f64::EPSILON { span / size as f64 } else { 0.0 };

        let mut vocabulary = Self {
            min,
            width,
            unigrams: vec![0.0; size],
            bigrams: vec![vec![0.0; size]; size],
        };

        let tokens: Vec<usize> = returns.iter().map(|r| vocabulary.token(*r)).collect();
        for token in &tokens {
            vocabulary.unigrams[*token] += 1.0;
        }
        for pair in tokens.windows(2) {
            vocabulary.bigrams[pair[0]][pair[1]] += 1.0;
        }
        vocabulary
    }

    pub fn len(&self) -> usize {
        self.unigrams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unigrams.is_empty()
    }

    /// Bucket index of a return.
    pub fn token(&self, value: f64) -> usize {
        if self.width <= 0.0 {
            return 0;
        }
        let index = ((value - self.min) / self.width).floor();
        (index.max(0.0) as usize).min(self.len() - 1)
    }

    /// Return represented by a bucket (its midpoint).
    pub fn center(&self, token: usize) -> f64 {
        if self.width <= 0.0 {
            self.min
        } else {
            self.min + (token as f64 + 0.5) * self.width
        }
    }

    /// Next-bucket probabilities given the previous bucket.
    ///
    /// Bigram counts are backed off onto unigram counts plus one so that
    /// every bucket keeps non-zero mass.
    pub fn next_distribution(&self, previous: usize) -> Vec<f64> {
        let row = &self.bigrams[previous.min(self.len() - 1)];
        let weights: Vec<f64> = row
            .iter()
            .zip(&self.unigrams)
            .map(|(bigram, unigram)| bigram + unigram + 1.0)
            .collect();
        let total: f64 = weights.iter().sum();
        weights.into_iter().map(|w| w / total).collect()
    }
}

/// Applies temperature then keeps the smallest probability-sorted prefix
/// whose mass reaches `top_p`.
///
/// Returns `(token, probability)` pairs renormalized to sum to one, most
/// likely first. At least one token always survives.
pub fn nucleus(probabilities: &[f64], temperature: f64, top_p: f64) -> Vec<(usize, f64)> {
    let logits: Vec<f64> = probabilities
        .iter()
        .map(|p| p.max(f64::MIN_POSITIVE).ln() / temperature)
        .collect();
    let max_logit = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let mut weighted: Vec<(usize, f64)> = logits
        .iter()
        .enumerate()
        .map(|(token, logit)| (token, (logit - max_logit).exp()))
        .collect();
    let total: f64 = weighted.iter().map(|(_, w)| w).sum();
    for entry in &mut weighted {
        entry.1 /= total;
    }
    weighted.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut mass = 0.0;
    let mut keep = 0;
    for (_, probability) in &weighted {
        keep += 1;
        mass += probability;
        if mass >= top_p {
            break;
        }
    }
    weighted.truncate(keep.max(1));

    let kept: f64 = weighted.iter().map(|(_, w)| w).sum();
    for entry in &mut weighted {
        entry.1 /= kept;
    }
    weighted
}

/// Draws a token from a nucleus returned by [`nucleus`].
fn draw(nucleus: &[(usize, f64)], rng: &mut StdRng) -> usize {
    let target: f64 = rng.r#gen();
    let mut cumulative = 0.0;
    for (token, probability) in nucleus {
        cumulative += probability;
        if target < cumulative {
            return *token;
        }
    }
    nucleus.last().map_or(0, |(token, _)| *token)
}

/// Statistics of the context window that drive rollouts.
struct ContextProfile {
    vocabulary: ReturnVocabulary,
    last_token: usize,
    last_close: f64,
    upper_wick: f64,
    lower_wick: f64,
    volumes: Vec<f64>,
}

impl ContextProfile {
    fn from_candles(context: &[Candle], num_buckets: usize) -> Self {
        let returns: Vec<f64> = context
            .windows(2)
            .map(|pair| (pair[1].close / pair[0].close).ln())
            .collect();
        let vocabulary = ReturnVocabulary::fit(&returns, num_buckets);
        let last_token = returns.last().map_or(0, |r| vocabulary.token(*r));

        let count = context.len().max(1) as f64;
        let upper_wick = context
            .iter()
            .map(|c| {
                let body_top = c.open.max(c.close);
                ((c.high - body_top) / body_top).max(0.0)
            })
            .sum::<f64>()
            / count;
        let lower_wick = context
            .iter()
            .map(|c| {
                let body_bottom = c.open.min(c.close);
                ((body_bottom - c.low) / body_bottom).max(0.0)
            })
            .sum::<f64>()
            / count;

        Self {
            vocabulary,
            last_token,
            last_close: context.last().map_or(0.0, |c| c.close),
            upper_wick,
            lower_wick: lower_wick.min(MAX_WICK_RATIO),
            volumes: context.iter().map(|c| c.volume).collect(),
        }
    }

    /// Generates one sampled path of `steps` candles.
    fn rollout(&self, rng: &mut StdRng, steps: usize, sampling: &SamplingParams) -> Vec<Ohlcv> {
        let nuclei: Vec<Vec<(usize, f64)>> = (0..self.vocabulary.len())
            .map(|previous| {
                nucleus(
                    &self.vocabulary.next_distribution(previous),
                    sampling.temperature,
                    sampling.top_p,
                )
            })
            .collect();

        let mut path = Vec::with_capacity(steps);
        let mut previous = self.last_token;
        let mut close = self.last_close;
        for _ in 0..steps {
            let token = draw(&nuclei[previous], rng);
            let open = close;
            close = open * self.vocabulary.center(token).exp();
            let volume = if self.volumes.is_empty() {
                0.0
            } else {
                self.volumes[rng.gen_range(0..self.volumes.len())]
            };
            path.push(Ohlcv {
                open,
                high: open.max(close) * (1.0 + self.upper_wick),
                low: open.min(close) * (1.0 - self.lower_wick),
                close,
                volume,
            });
            previous = token;
        }
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::{BackendKind, Device, ModelLimits, ModelVariant};
    use chrono::{Duration, TimeZone};

    fn series(count: usize) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..count)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.3).sin() * 2.0 + i as f64 * 0.01;
                let open = close - 0.2;
                Candle {
                    timestamp: start + Duration::minutes(5 * i as i64),
                    open,
                    high: close + 0.5,
                    low: open - 0.5,
                    close,
                    volume: 100.0 + i as f64,
                }
            })
            .collect()
    }

    fn forecaster() -> BaselineForecaster {
        BaselineForecaster::new(ModelInfo::new(
            ModelVariant::Small,
            Device::Cpu,
            BackendKind::Baseline,
            ModelLimits {
                min_context: 32,
                max_context: 512,
                max_pred_len: 1440,
            },
        ))
    }

    fn request(history: Vec<Candle>, pred_len: usize, seed: Option<u64>) -> ForecastRequest {
        ForecastRequest {
            history,
            pred_len,
            sampling: SamplingParams {
                seed,
                ..Default::default()
            },
        }
    }

    #[test]
    fn produces_requested_length_with_continuing_timestamps() {
        let history = series(400);
        let last = history.last().unwrap().timestamp;
        let forecast = tokio_test::block_on(forecaster().predict(request(history, 288, Some(7))))
            .unwrap();
        assert_eq!(forecast.len(), 288);
        assert_eq!(forecast[0].timestamp, last + Duration::minutes(5));
        assert_eq!(forecast[287].timestamp, last + Duration::minutes(5 * 288));
    }

    #[test]
    fn seeded_forecasts_are_reproducible() {
        let a = tokio_test::block_on(forecaster().predict(request(series(100), 24, Some(42))))
            .unwrap();
        let b = tokio_test::block_on(forecaster().predict(request(series(100), 24, Some(42))))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn forecast_candles_are_consistent() {
        let mut req = request(series(200), 48, Some(3));
        req.sampling.sample_count = 4;
        let forecast = tokio_test::block_on(forecaster().predict(req)).unwrap();
        for candle in &forecast {
            assert!(candle.is_consistent(), "{candle:?}");
            assert!(candle.low > 0.0);
            assert!(candle.volume >= 0.0);
        }
    }

    #[test]
    fn first_candle_opens_at_last_close() {
        let history = series(64);
        let last_close = history.last().unwrap().close;
        let forecast =
            tokio_test::block_on(forecaster().predict(request(history, 1, Some(1)))).unwrap();
        assert!((forecast[0].open - last_close).abs() < 1e-9);
    }

    #[test]
    fn rejects_short_history() {
        let result = tokio_test::block_on(forecaster().predict(request(series(10), 5, None)));
        assert_eq!(
            result,
            Err(ForecastError::InsufficientContext { have: 10, need: 32 })
        );
    }

    #[test]
    fn rejects_horizon_above_maximum() {
        let result = tokio_test::block_on(forecaster().predict(request(series(64), 1441, None)));
        assert!(matches!(result, Err(ForecastError::HorizonTooLong { .. })));
    }

    #[test]
    fn flat_context_repeats_constant_price() {
        let flat: Vec<Candle> = series(40)
            .into_iter()
            .map(|c| Candle {
                open: 50.0,
                high: 50.0,
                low: 50.0,
                close: 50.0,
                ..c
            })
            .collect();
        let forecast =
            tokio_test::block_on(forecaster().predict(request(flat, 10, Some(9)))).unwrap();
        for candle in forecast {
            assert!((candle.close - 50.0).abs() < 1e-9);
        }
    }

    #[test]
    fn vocabulary_tokens_cover_range() {
        let vocabulary = ReturnVocabulary::fit(&[-0.02, 0.0, 0.02], 4);
        assert_eq!(vocabulary.len(), 4);
        assert_eq!(vocabulary.token(-0.02), 0);
        assert_eq!(vocabulary.token(0.02), 3);
        assert_eq!(vocabulary.token(1.0), 3);
        assert!((vocabulary.center(0) - (-0.015)).abs() < 1e-12);
    }

    #[test]
    fn next_distribution_sums_to_one() {
        let vocabulary = ReturnVocabulary::fit(&[-0.01, 0.01, -0.01, 0.01, 0.0], 8);
        for previous in 0..vocabulary.len() {
            let total: f64 = vocabulary.next_distribution(previous).iter().sum();
            assert!((total - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn nucleus_keeps_smallest_prefix_reaching_top_p() {
        let kept = nucleus(&[0.5, 0.3, 0.2], 1.0, 0.75);
        let tokens: Vec<usize> = kept.iter().map(|(t, _)| *t).collect();
        assert_eq!(tokens, vec![0, 1]);
        let total: f64 = kept.iter().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn nucleus_low_temperature_is_greedy() {
        let kept = nucleus(&[0.2, 0.5, 0.3], 0.01, 0.9);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].0, 1);
    }

    #[test]
    fn nucleus_full_mass_keeps_everything() {
        let kept = nucleus(&[0.25, 0.25, 0.25, 0.25], 1.0, 1.0);
        assert_eq!(kept.len(), 4);
    }

    #[test]
    fn single_bucket_uses_return_midpoint() {
        let history = series(64);
        let forecast = tokio_test::block_on(
            forecaster()
                .with_buckets(1)
                .predict(request(history.clone(), 3, Some(5))),
        )
        .unwrap();
        let context = &history[history.len() - 64..];
        let returns: Vec<f64> = context
            .windows(2)
            .map(|pair| (pair[1].close / pair[0].close).ln())
            .collect();
        let min = returns.iter().copied().fold(f64::INFINITY, f64::min);
        let max = returns.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let expected = forecast[0].open * ((min + max) / 2.0).exp();
        assert!((forecast[0].close - expected).abs() < 1e-9);
    }
}

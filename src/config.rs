//! Application configuration loaded from environment variables.
//!
//! Every variable is optional:
//! - `MODEL_NAME` - model variant, default `kronos-small`
//! - `DEVICE` - `auto`, `cpu`, `cuda[:N]` or `mps`, default `auto`
//! - `BIND` / `PORT` - listen address, default `0.0.0.0:5000`
//! - `KRONOS_BACKEND` - `baseline` or `worker`, default `baseline`
//! - `KRONOS_WORKER_CMD` - worker command line, required for `worker`
//! - `KRONOS_MAX_CONTEXT`, `KRONOS_MAX_PRED_LEN` - facade limits
//! - `KRONOS_MIN_LOOKBACK`, `KRONOS_STEPS_PER_HOUR` - request handling
//! - `KRONOS_SIGNAL_HOLD_BAND_PCT`, `KRONOS_SIGNAL_CONFIDENCE_SCALE_PCT`
//!
//! Empty values are treated as unset.

use std::fmt::Display;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::forecast::{BackendKind, Device, ModelInfo, ModelLimits, ModelVariant};
use crate::signal::SignalConfig;

const DEFAULT_PORT: u16 = 5000;
/// Shortest history accepted at the HTTP boundary.
pub const DEFAULT_MIN_LOOKBACK: usize = 400;
/// Shortest context the facade itself accepts.
pub const DEFAULT_MIN_CONTEXT: usize = 32;
/// Five days of 5-minute candles.
pub const DEFAULT_MAX_PRED_LEN: usize = 1440;
pub const DEFAULT_STEPS_PER_HOUR: usize = 12;

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub prediction: PredictionConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

/// Model selection and facade limits.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub variant: ModelVariant,
    pub device: Device,
    pub backend: BackendKind,
    pub worker_cmd: Option<String>,
    pub max_context: usize,
    pub min_context: usize,
    pub max_pred_len: usize,
}

impl ModelConfig {
    /// Configuration for `variant` with every other setting at its default.
    pub fn for_variant(variant: ModelVariant) -> Self {
        Self {
            variant,
            device: Device::Auto,
            backend: BackendKind::Baseline,
            worker_cmd: None,
            max_context: variant.max_context(),
            min_context: DEFAULT_MIN_CONTEXT,
            max_pred_len: DEFAULT_MAX_PRED_LEN,
        }
    }

    pub fn limits(&self) -> ModelLimits {
        ModelLimits {
            min_context: self.min_context,
            max_context: self.max_context,
            max_pred_len: self.max_pred_len,
        }
    }

    pub fn model_info(&self) -> ModelInfo {
        ModelInfo::new(self.variant, self.device, self.backend, self.limits())
    }
}

/// Request handling settings of the HTTP layer.
#[derive(Debug, Clone)]
pub struct PredictionConfig {
    pub min_lookback: usize,
    pub steps_per_hour: usize,
    pub signal: SignalConfig,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            min_lookback: DEFAULT_MIN_LOOKBACK,
            steps_per_hour: DEFAULT_STEPS_PER_HOUR,
            signal: SignalConfig::default(),
        }
    }
}

/// Loads the application configuration from environment variables.
///
/// # Errors
///
/// Returns [`KronosError::Config`](crate::KronosError::Config) if a value
/// does not parse, if the worker backend is selected without
/// `KRONOS_WORKER_CMD`, or if the limits contradict each other.
pub fn fetch_config() -> crate::Result<AppConfig> {
    let bind = parsed_var("BIND")?.unwrap_or(IpAddr::from([0, 0, 0, 0]));
    let port = parsed_var("PORT")?.unwrap_or(DEFAULT_PORT);

    let variant: ModelVariant = parsed_var("MODEL_NAME")?.unwrap_or(ModelVariant::Small);
    let device = parsed_var("DEVICE")?.unwrap_or(Device::Auto);
    let backend = parsed_var("KRONOS_BACKEND")?.unwrap_or(BackendKind::Baseline);
    let worker_cmd = non_empty_var("KRONOS_WORKER_CMD");
    let max_context = parsed_var("KRONOS_MAX_CONTEXT")?.unwrap_or(variant.max_context());
    let max_pred_len = parsed_var("KRONOS_MAX_PRED_LEN")?.unwrap_or(DEFAULT_MAX_PRED_LEN);

    let min_lookback = parsed_var("KRONOS_MIN_LOOKBACK")?.unwrap_or(DEFAULT_MIN_LOOKBACK);
    let steps_per_hour = parsed_var("KRONOS_STEPS_PER_HOUR")?.unwrap_or(DEFAULT_STEPS_PER_HOUR);
    let hold_band_pct: f64 = parsed_var("KRONOS_SIGNAL_HOLD_BAND_PCT")?.unwrap_or(0.0);
    let confidence_scale_pct: f64 =
        parsed_var("KRONOS_SIGNAL_CONFIDENCE_SCALE_PCT")?.unwrap_or(5.0);

    if backend == BackendKind::Worker && worker_cmd.is_none() {
        return Err(config_error(
            "KRONOS_BACKEND is worker but KRONOS_WORKER_CMD is missing",
        ));
    }
    if steps_per_hour == 0 {
        return Err(config_error("KRONOS_STEPS_PER_HOUR must be at least 1"));
    }
    if max_context < DEFAULT_MIN_CONTEXT {
        return Err(config_error(format!(
            "KRONOS_MAX_CONTEXT must be at least {DEFAULT_MIN_CONTEXT}, got {max_context}"
        )));
    }
    if min_lookback < DEFAULT_MIN_CONTEXT {
        return Err(config_error(format!(
            "KRONOS_MIN_LOOKBACK must be at least {DEFAULT_MIN_CONTEXT}, got {min_lookback}"
        )));
    }
    if max_pred_len == 0 {
        return Err(config_error("KRONOS_MAX_PRED_LEN must be at least 1"));
    }
    if !hold_band_pct.is_finite() || hold_band_pct < 0.0 {
        return Err(config_error(format!(
            "KRONOS_SIGNAL_HOLD_BAND_PCT must be non-negative, got {hold_band_pct}"
        )));
    }
    if !confidence_scale_pct.is_finite() || confidence_scale_pct <= 0.0 {
        return Err(config_error(format!(
            "KRONOS_SIGNAL_CONFIDENCE_SCALE_PCT must be positive, got {confidence_scale_pct}"
        )));
    }

    Ok(AppConfig {
        server: ServerConfig { bind, port },
        model: ModelConfig {
            variant,
            device,
            backend,
            worker_cmd,
            max_context,
            min_context: DEFAULT_MIN_CONTEXT,
            max_pred_len,
        },
        prediction: PredictionConfig {
            min_lookback,
            steps_per_hour,
            signal: SignalConfig {
                steps_per_hour,
                hold_band_pct,
                confidence_scale_pct,
                ..SignalConfig::default()
            },
        },
    })
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parses a non-empty environment variable, naming it in the error.
fn parsed_var<T>(name: &str) -> crate::Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    non_empty_var(name)
        .map(|value| {
            value
                .parse()
                .map_err(|e| config_error(format!("{name}='{value}' is invalid: {e}")))
        })
        .transpose()
}

fn config_error(message: impl Into<String>) -> crate::KronosError {
    crate::KronosError::Config(message.into())
}

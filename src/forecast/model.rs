//! Model registry, compute devices, and facade limits.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{ForecastError, ForecastRequest};
use crate::models::ModelDescriptor;
use crate::models::candle::Candle;

/// Hub organization hosting the pretrained weights.
const HUB_ORGANIZATION: &str = "NeoQuasar";

/// Tokenizer shared by every registered variant.
pub const TOKENIZER_REPOSITORY: &str = "NeoQuasar/Kronos-Tokenizer-base";

/// Pretrained Kronos variants the service can load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelVariant {
    #[serde(rename = "kronos-mini")]
    Mini,
    #[serde(rename = "kronos-small")]
    Small,
    #[serde(rename = "kronos-base")]
    Base,
}

impl ModelVariant {
    /// Every registered variant, smallest first.
    pub fn all() -> [ModelVariant; 3] {
        [ModelVariant::Mini, ModelVariant::Small, ModelVariant::Base]
    }

    /// Identifier used in configuration and on the wire.
    pub fn id(&self) -> &'static str {
        match self {
            ModelVariant::Mini => "kronos-mini",
            ModelVariant::Small => "kronos-small",
            ModelVariant::Base => "kronos-base",
        }
    }

    /// Display name as published on the hub.
    pub fn display_name(&self) -> &'static str {
        match self {
            ModelVariant::Mini => "Kronos-mini",
            ModelVariant::Small => "Kronos-small",
            ModelVariant::Base => "Kronos-base",
        }
    }

    /// Hub repository holding the weights, e.g. `NeoQuasar/Kronos-small`.
    pub fn repository(&self) -> String {
        format!("{HUB_ORGANIZATION}/{}", self.display_name())
    }

    pub fn params(&self) -> &'static str {
        match self {
            ModelVariant::Mini => "4.1M",
            ModelVariant::Small => "24.7M",
            ModelVariant::Base => "102.3M",
        }
    }

    /// Longest context the variant was trained with.
    pub fn max_context(&self) -> usize {
        match self {
            ModelVariant::Mini => 2048,
            ModelVariant::Small | ModelVariant::Base => 512,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ModelVariant::Mini => "Lightweight model, suitable for fast prediction",
            ModelVariant::Small => "Small model, balanced performance and speed",
            ModelVariant::Base => "Base model, provides better prediction quality",
        }
    }

    /// Listing entry for `GET /models`.
    pub fn descriptor(&self) -> ModelDescriptor {
        ModelDescriptor {
            id: self.id().to_string(),
            name: self.display_name().to_string(),
            params: self.params().to_string(),
            max_context: self.max_context(),
            description: self.description().to_string(),
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ModelVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ModelVariant::all()
            .into_iter()
            .find(|v| v.id() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = ModelVariant::all().iter().map(|v| v.id()).collect();
                format!("unknown model '{s}', expected one of: {}", known.join(", "))
            })
    }
}

/// Compute device requested for inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Device {
    /// Let the backend pick (GPU when available).
    Auto,
    Cpu,
    Cuda(u32),
    Mps,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Auto => f.write_str("auto"),
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda(index) => write!(f, "cuda:{index}"),
            Device::Mps => f.write_str("mps"),
        }
    }
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_lowercase();
        match value.as_str() {
            "auto" => Ok(Device::Auto),
            "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda(0)),
            "mps" => Ok(Device::Mps),
            other => other
                .strip_prefix("cuda:")
                .and_then(|index| index.parse().ok())
                .map(Device::Cuda)
                .ok_or_else(|| {
                    format!("unknown device '{s}', expected auto, cpu, cuda, cuda:N, or mps")
                }),
        }
    }
}

impl From<Device> for String {
    fn from(device: Device) -> Self {
        device.to_string()
    }
}

impl TryFrom<String> for Device {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Which implementation of the facade serves forecasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Built-in return-bucket sampler.
    Baseline,
    /// External process hosting the pretrained model.
    Worker,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Baseline => f.write_str("baseline"),
            BackendKind::Worker => f.write_str("worker"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "baseline" => Ok(BackendKind::Baseline),
            "worker" => Ok(BackendKind::Worker),
            _ => Err(format!("unknown backend '{s}', expected baseline or worker")),
        }
    }
}

/// Context and horizon limits enforced by the facade on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelLimits {
    /// Fewest history candles the model accepts.
    pub min_context: usize,
    /// History beyond this many candles is truncated (oldest dropped).
    pub max_context: usize,
    /// Longest forecast, in steps.
    pub max_pred_len: usize,
}

impl ModelLimits {
    /// Rejects requests the model cannot serve.
    pub fn check(&self, request: &ForecastRequest) -> Result<(), ForecastError> {
        if request.pred_len == 0 {
            return Err(ForecastError::EmptyHorizon);
        }
        if request.pred_len > self.max_pred_len {
            return Err(ForecastError::HorizonTooLong {
                requested: request.pred_len,
                max: self.max_pred_len,
            });
        }
        if request.history.len() < self.min_context {
            return Err(ForecastError::InsufficientContext {
                have: request.history.len(),
                need: self.min_context,
            });
        }
        request.sampling.validate()
    }

    /// Returns the most recent `max_context` candles of `history`.
    pub fn context<'a>(&self, history: &'a [Candle]) -> &'a [Candle] {
        let start = history.len().saturating_sub(self.max_context);
        &history[start..]
    }
}

/// Static metadata describing the loaded model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub variant: ModelVariant,
    pub repository: String,
    pub tokenizer: String,
    pub device: Device,
    pub backend: BackendKind,
    pub limits: ModelLimits,
}

impl ModelInfo {
    pub fn new(
        variant: ModelVariant,
        device: Device,
        backend: BackendKind,
        limits: ModelLimits,
    ) -> Self {
        Self {
            variant,
            repository: variant.repository(),
            tokenizer: TOKENIZER_REPOSITORY.to_string(),
            device,
            backend,
            limits,
        }
    }
}

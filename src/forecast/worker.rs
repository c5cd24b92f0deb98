//! External model worker over JSON lines.
//!
//! Spawns a process that hosts the pretrained model and bridges its
//! stdin/stdout with the facade. The model name and device are passed as
//! `KRONOS_MODEL` / `KRONOS_DEVICE` environment variables.
//!
//! Worker to service:
//! - `{"type":"ready"}` once the weights are loaded
//! - `{"type":"prediction","id":N,"candles":[{"open":..,"high":..,"low":..,"close":..,"volume":..}]}`
//! - `{"type":"error","id":N,"message":"..."}` (`id` omitted during startup)
//!
//! Service to worker:
//! - `{"type":"predict","id":N,"candles":[..],"future_timestamps":[..],"pred_len":..,"temperature":..,"top_p":..,"sample_count":..}`
//!
//! Lines that are not JSON are logged and otherwise ignored.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use super::{ForecastError, ForecastRequest, Forecaster, ModelInfo};
use crate::models::candle::Candle;

/// How long the worker may take to load weights before startup fails.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(300);

/// JSON message from the worker (stdout).
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WorkerToService {
    Ready,
    Prediction {
        id: u64,
        candles: Vec<WorkerCandle>,
    },
    Error {
        #[serde(default)]
        id: Option<u64>,
        message: String,
    },
}

/// JSON message from the service to the worker (stdin).
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServiceToWorker<'a> {
    Predict {
        id: u64,
        candles: &'a [Candle],
        future_timestamps: &'a [DateTime<Utc>],
        pred_len: usize,
        temperature: f64,
        top_p: f64,
        sample_count: usize,
    },
}

/// Forecast row returned by the worker; timestamps are assigned locally.
#[derive(Debug, Clone, Copy, Deserialize)]
struct WorkerCandle {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl WorkerCandle {
    /// Attaches `timestamp`, rejecting values no market can produce.
    fn into_candle(
        self,
        index: usize,
        timestamp: DateTime<Utc>,
    ) -> Result<Candle, ForecastError> {
        let prices = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ];
        for (field, value) in prices {
            if !value.is_finite() || value <= 0.0 {
                return Err(ForecastError::Backend(format!(
                    "worker candle {index}: invalid {field} {value}"
                )));
            }
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(ForecastError::Backend(format!(
                "worker candle {index}: invalid volume {}",
                self.volume
            )));
        }
        Ok(Candle {
            timestamp,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        })
    }
}

/// Write half plus reply stream, guarded together so one call owns the pipe.
struct WorkerPipe {
    stdin: ChildStdin,
    replies: mpsc::UnboundedReceiver<WorkerToService>,
    next_id: u64,
}

/// Facade implementation that forwards every call to a worker process.
///
/// Calls are serialized: the worker sees one request at a time. Dropping
/// the forecaster kills the child process.
pub struct WorkerForecaster {
    info: ModelInfo,
    pipe: Mutex<WorkerPipe>,
    alive: Arc<AtomicBool>,
    _child: Child,
}

impl WorkerForecaster {
    /// Spawns `command` (split on whitespace) and waits for its ready line.
    ///
    /// # Errors
    ///
    /// Returns [`KronosError::Config`](crate::KronosError::Config) for an
    /// empty command, [`KronosError::Io`](crate::KronosError::Io) if the
    /// process cannot be spawned, and
    /// [`KronosError::Forecast`](crate::KronosError::Forecast) if the worker
    /// reports an error, exits, or times out before becoming ready.
    pub async fn spawn(info: ModelInfo, command: &str) -> crate::Result<Self> {
        let mut parts = command.split_whitespace();
        let program = parts.next().ok_or_else(|| {
            crate::KronosError::Config("worker command is empty".to_string())
        })?;

        let mut child = Command::new(program)
            .args(parts)
            .env("KRONOS_MODEL", info.variant.repository())
            .env("KRONOS_TOKENIZER", &info.tokenizer)
            .env("KRONOS_DEVICE", info.device.to_string())
            .env("KRONOS_MAX_CONTEXT", info.limits.max_context.to_string())
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(ForecastError::Backend("worker pipes unavailable".to_string()).into());
        };

        let alive = Arc::new(AtomicBool::new(true));
        let (tx, mut replies) = mpsc::unbounded_channel();
        spawn_stdout_reader(stdout, tx, Arc::clone(&alive));
        spawn_stderr_reader(stderr);

        let first = tokio::time::timeout(STARTUP_TIMEOUT, replies.recv())
            .await
            .map_err(|_| {
                ForecastError::Backend("worker did not become ready in time".to_string())
            })?;
        match first {
            Some(WorkerToService::Ready) => {
                info!(program, model = %info.variant, "Model worker ready");
            }
            Some(WorkerToService::Error { message, .. }) => {
                let reason = format!("worker failed to start: {message}");
                return Err(ForecastError::Backend(reason).into());
            }
            Some(other) => {
                return Err(ForecastError::Backend(format!(
                    "unexpected worker message before ready: {other:?}"
                ))
                .into());
            }
            None => {
                let reason = "worker exited during startup".to_string();
                return Err(ForecastError::Backend(reason).into());
            }
        }

        Ok(Self {
            info,
            pipe: Mutex::new(WorkerPipe {
                stdin,
                replies,
                next_id: 1,
            }),
            alive,
            _child: child,
        })
    }
}

#[async_trait]
impl Forecaster for WorkerForecaster {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn is_ready(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    async fn predict(&self, request: ForecastRequest) -> Result<Vec<Candle>, ForecastError> {
        self.info.limits.check(&request)?;
        if !self.is_ready() {
            return Err(ForecastError::NotReady);
        }

        let context = self.info.limits.context(&request.history);
        let timestamps = super::future_timestamps(context, request.pred_len)?;

        let mut pipe = self.pipe.lock().await;
        let id = pipe.next_id;
        pipe.next_id += 1;

        let message = ServiceToWorker::Predict {
            id,
            candles: context,
            future_timestamps: &timestamps,
            pred_len: request.pred_len,
            temperature: request.sampling.temperature,
            top_p: request.sampling.top_p,
            sample_count: request.sampling.sample_count,
        };
        let mut json = serde_json::to_string(&message)
            .map_err(|e| ForecastError::Backend(format!("failed to encode request: {e}")))?;
        json.push('\n');
        pipe.stdin
            .write_all(json.as_bytes())
            .await
            .map_err(|e| ForecastError::Backend(format!("stdin write failed: {e}")))?;
        pipe.stdin
            .flush()
            .await
            .map_err(|e| ForecastError::Backend(format!("stdin flush failed: {e}")))?;
        debug!(id, pred_len = request.pred_len, "Sent prediction request to worker");

        loop {
            match pipe.replies.recv().await {
                Some(WorkerToService::Prediction { id: reply_id, candles }) if reply_id == id => {
                    if candles.len() != request.pred_len {
                        return Err(ForecastError::Backend(format!(
                            "worker returned {} candles, expected {}",
                            candles.len(),
                            request.pred_len
                        )));
                    }
                    return timestamps
                        .iter()
                        .zip(candles)
                        .enumerate()
                        .map(|(index, (timestamp, c))| c.into_candle(index, *timestamp))
                        .collect();
                }
                Some(WorkerToService::Error {
                    id: Some(reply_id),
                    message,
                }) if reply_id == id => {
                    return Err(ForecastError::Backend(message));
                }
                // The worker could not tie the failure to a request; only one is in flight.
                Some(WorkerToService::Error { id: None, message }) => {
                    return Err(ForecastError::Backend(message));
                }
                // Replies to abandoned requests.
                Some(stale) => {
                    debug!(id, ?stale, "Discarding stale worker message");
                }
                None => {
                    self.alive.store(false, Ordering::Relaxed);
                    return Err(ForecastError::Backend("worker exited".to_string()));
                }
            }
        }
    }
}

/// Reads stdout from the worker, parses JSON-lines, and forwards replies.
fn spawn_stdout_reader(
    stdout: tokio::process::ChildStdout,
    tx: mpsc::UnboundedSender<WorkerToService>,
    alive: Arc<AtomicBool>,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match serde_json::from_str::<WorkerToService>(&line) {
                Ok(message) => {
                    if tx.send(message).is_err() {
                        break;
                    }
                }
                Err(_) => {
                    // Non-JSON line, pass through to the log
                    info!(target: "kronos_worker", "{line}");
                }
            }
        }
        alive.store(false, Ordering::Relaxed);
        warn!("Model worker stdout closed");
    });
}

/// Forwards worker stderr lines to the log.
fn spawn_stderr_reader(stderr: tokio::process::ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            warn!(target: "kronos_worker", "{line}");
        }
    });
}

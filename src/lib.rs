//! Kronos candlestick forecasting service.
//!
//! Validates OHLCV history, hands it to an autoregressive forecaster and
//! serves predicted candles plus derived BUY/SELL/HOLD signals over HTTP.
//! A typed async client for the same API is included.

pub mod client;
pub mod config;
pub mod error;
pub mod forecast;
pub mod models;
pub mod sample;
pub mod service;
pub mod signal;
pub mod tls;
pub mod validation;

pub use error::{KronosError, Result};

//! Async HTTP client for the forecasting service.

use reqwest::Response;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::Result;
use crate::models::{
    ErrorResponse, HealthResponse, InfoResponse, ModelsResponse, PredictRequest,
    PredictResponse, SignalsResponse,
};

/// Typed client for every endpoint of the service.
#[derive(Debug, Clone)]
pub struct KronosClient {
    http: reqwest::Client,
    base_url: String,
}

impl KronosClient {
    /// Creates a client for `base_url`, e.g. `http://localhost:5000`.
    ///
    /// # Errors
    ///
    /// Returns [`KronosError::Http`](crate::KronosError::Http) if the
    /// underlying HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self::with_http(http, base_url))
    }

    /// Creates a client that verifies the server against `tls_config`.
    ///
    /// # Errors
    ///
    /// Returns [`KronosError::Tls`](crate::KronosError::Tls) if the HTTP
    /// client cannot be built with the given configuration.
    pub fn with_tls(base_url: impl Into<String>, tls_config: rustls::ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .use_preconfigured_tls(tls_config)
            .build()
            .map_err(|e| crate::KronosError::Tls(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_http(http, base_url))
    }

    fn with_http(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let response = self.http.get(self.url("/health")).send().await?;
        decode(response).await
    }

    pub async fn info(&self) -> Result<InfoResponse> {
        let response = self.http.get(self.url("/info")).send().await?;
        decode(response).await
    }

    pub async fn models(&self) -> Result<ModelsResponse> {
        let response = self.http.get(self.url("/models")).send().await?;
        decode(response).await
    }

    /// Requests a candle forecast.
    ///
    /// # Errors
    ///
    /// Returns [`KronosError::Api`](crate::KronosError::Api) when the
    /// service rejects the request, or a transport error.
    pub async fn predict(&self, request: &PredictRequest) -> Result<PredictResponse> {
        debug!(
            candles = request.kline_data.len(),
            pred_hours = request.pred_hours,
            "Sending forecast request"
        );
        let response = self
            .http
            .post(self.url("/predict"))
            .json(request)
            .send()
            .await?;
        decode(response).await
    }

    /// Requests a forecast together with trading signals.
    pub async fn predict_with_signals(&self, request: &PredictRequest) -> Result<SignalsResponse> {
        let response = self
            .http
            .post(self.url("/predict/signals"))
            .json(request)
            .send()
            .await?;
        decode(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

/// Decodes a success body, or turns an error body into `KronosError::Api`.
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let body = response.bytes().await?;

    if !status.is_success() {
        let message = serde_json::from_slice::<ErrorResponse>(&body)
            .map(|e| e.error)
            .unwrap_or_else(|_| String::from_utf8_lossy(&body).into_owned());
        return Err(crate::KronosError::Api {
            status: status.as_u16(),
            message,
        });
    }

    Ok(serde_json::from_slice(&body)?)
}

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use shared::{
    domain::{Courier, ShipmentStatus, TrackingResult},
    protocol::{TrackRequest, UpstreamEnvelope},
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    fallback::fallback,
    normalizer::{normalize, UpstreamPayload},
};

pub const DEFAULT_PROXY_URL: &str = "http://127.0.0.1:8787/api/track";
pub const DEFAULT_API_KEY: &str = "demo-tracking-api-key";
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(20);
pub const UNSUPPORTED_COURIER_SUMMARY: &str = "Courier not supported via API.";

const ERROR_DETAIL_KEYS: [&str; 3] = ["raw_body", "details", "error"];
const MAX_ERROR_DETAIL_CHARS: usize = 100;

#[derive(Debug, Clone)]
pub struct TrackingConfig {
    pub api_key: String,
    pub proxy_url: String,
    /// Deadline for one lookup, covering connect, request and body read.
    pub timeout: Duration,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            api_key: DEFAULT_API_KEY.into(),
            proxy_url: DEFAULT_PROXY_URL.into(),
            timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }
}

#[derive(Debug, Error)]
pub enum LookupFailure {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("lookup cancelled")]
    Cancelled,
    #[error("proxy endpoint not found (HTTP 404) at {0}")]
    EndpointNotFound(String),
    #[error("proxy returned HTTP {status}: {detail}")]
    Http { status: u16, detail: String },
    #[error("response body is not valid JSON: {0}")]
    MalformedBody(String),
    #[error("provider error {code}: {message}")]
    Upstream { code: String, message: String },
}

/// One tracking lookup. Implementations never fail: every error path
/// resolves to a usable [`TrackingResult`].
#[async_trait]
pub trait TrackingLookup: Send + Sync {
    async fn lookup(&self, code: &str, courier: Courier) -> TrackingResult;

    async fn lookup_with_cancel(
        &self,
        code: &str,
        courier: Courier,
        cancel: &CancellationToken,
    ) -> TrackingResult {
        tokio::select! {
            _ = cancel.cancelled() => degraded_result(code, courier, &LookupFailure::Cancelled),
            result = self.lookup(code, courier) => result,
        }
    }
}

pub struct TrackingClient {
    http: Client,
    config: TrackingConfig,
}

impl TrackingClient {
    pub fn new(config: TrackingConfig) -> Self {
        Self::with_http_client(Client::new(), config)
    }

    pub fn with_http_client(http: Client, config: TrackingConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    async fn fetch(&self, request: &TrackRequest) -> Result<UpstreamPayload, LookupFailure> {
        debug!(
            url = %self.config.proxy_url,
            code = %request.tracking_number,
            courier_code = %request.courier_code,
            "calling tracking proxy"
        );
        let response = self
            .http
            .post(&self.config.proxy_url)
            .json(request)
            .send()
            .await?;
        let status = response.status();
        // Read as text first so a non-JSON body becomes a failure, not a crash.
        let text = response.text().await?;
        let parsed = serde_json::from_str::<Value>(&text).ok();

        if status == StatusCode::NOT_FOUND {
            return Err(LookupFailure::EndpointNotFound(self.config.proxy_url.clone()));
        }
        if !status.is_success() {
            return Err(LookupFailure::Http {
                status: status.as_u16(),
                detail: error_detail(parsed.as_ref(), status),
            });
        }

        let value = parsed
            .ok_or_else(|| LookupFailure::MalformedBody(truncate(&text, MAX_ERROR_DETAIL_CHARS)))?;
        let envelope: UpstreamEnvelope = serde_json::from_value(value)
            .map_err(|err| LookupFailure::MalformedBody(err.to_string()))?;

        if !envelope.is_success() {
            return Err(LookupFailure::Upstream {
                code: envelope
                    .meta_code()
                    .map_or_else(|| "none".to_string(), |code| code.to_string()),
                message: envelope.meta_message().unwrap_or("no message").to_string(),
            });
        }

        Ok(UpstreamPayload::from_value(&envelope.data))
    }
}

#[async_trait]
impl TrackingLookup for TrackingClient {
    async fn lookup(&self, code: &str, courier: Courier) -> TrackingResult {
        let Some(provider_code) = courier.provider_code() else {
            info!(code, courier = courier.id(), "courier has no provider mapping");
            return unsupported_courier();
        };

        let request = TrackRequest {
            tracking_number: code.to_string(),
            courier_code: provider_code.to_string(),
            api_key: self.config.api_key.clone(),
        };

        let outcome = match tokio::time::timeout(self.config.timeout, self.fetch(&request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(LookupFailure::Timeout(self.config.timeout)),
        };

        match outcome {
            Ok(payload) => normalize(&payload, code, courier),
            Err(failure) => {
                warn!(code, courier = courier.id(), %failure, "lookup failed; using simulated status");
                degraded_result(code, courier, &failure)
            }
        }
    }
}

pub fn unsupported_courier() -> TrackingResult {
    TrackingResult {
        status: ShipmentStatus::Unknown,
        summary: UNSUPPORTED_COURIER_SUMMARY.to_string(),
        sources: Vec::new(),
        degraded: false,
    }
}

/// Simulated result carrying the real failure reason so the operator can see it.
pub fn degraded_result(code: &str, courier: Courier, failure: &LookupFailure) -> TrackingResult {
    let mut result = fallback(code, courier);
    result.summary.push_str(&format!("\n\n(Lookup failed: {failure})"));
    result
}

fn error_detail(body: Option<&Value>, status: StatusCode) -> String {
    let detail = body
        .and_then(|body| {
            ERROR_DETAIL_KEYS
                .iter()
                .find_map(|key| body.get(key).filter(|value| !value.is_null()))
        })
        .map(|value| match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .map_or_else(|| status.to_string(), str::to_string)
        });
    truncate(&detail, MAX_ERROR_DETAIL_CHARS)
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
#[path = "tests/tracking_tests.rs"]
mod tests;

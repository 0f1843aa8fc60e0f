use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status code the provider puts in `meta.code` for a successful lookup.
pub const UPSTREAM_SUCCESS_CODE: i64 = 200;

/// Body the client posts to the proxy endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRequest {
    pub tracking_number: String,
    pub courier_code: String,
    pub api_key: String,
}

/// Body the proxy forwards to the provider's realtime endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamTrackRequest {
    pub tracking_number: String,
    pub courier_code: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpstreamMeta {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Provider response envelope. `data` is left untyped; its shape is resolved
/// by the client's normalizer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpstreamEnvelope {
    #[serde(default)]
    pub meta: Option<UpstreamMeta>,
    #[serde(default)]
    pub data: Value,
}

impl UpstreamEnvelope {
    pub fn meta_code(&self) -> Option<i64> {
        self.meta.as_ref().and_then(|meta| meta.code)
    }

    pub fn meta_message(&self) -> Option<&str> {
        self.meta.as_ref().and_then(|meta| meta.message.as_deref())
    }

    pub fn is_success(&self) -> bool {
        self.meta_code() == Some(UPSTREAM_SUCCESS_CODE)
    }
}

//! Turns provider payloads into [`TrackingResult`]s.
//!
//! The provider answers with either a single tracking object or an array of
//! them, and has named the status field `delivery_status` or `status`
//! depending on the endpoint version. Both variations are folded into
//! [`UpstreamPayload`] before any status logic runs.

use serde_json::Value;
use shared::domain::{
    provider_tracking_url, Courier, ShipmentStatus, SourceLink, TrackingResult,
};

pub const NO_DATA_SUMMARY: &str = "No data found for this tracking code.";
pub const UPDATING_PLACEHOLDER: &str = "Updating...";
pub const PROVIDER_SOURCE_TITLE: &str = "TrackingMore Realtime";

const STATUS_KEYS: [&str; 2] = ["delivery_status", "status"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamPayload {
    Empty,
    Single(TrackingItem),
    Many(Vec<TrackingItem>),
}

impl UpstreamPayload {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Array(items) => {
                UpstreamPayload::Many(items.iter().map(TrackingItem::from_value).collect())
            }
            Value::Object(_) => UpstreamPayload::Single(TrackingItem::from_value(value)),
            _ => UpstreamPayload::Empty,
        }
    }

    /// The item the summary is built from: the first one for arrays.
    pub fn primary(&self) -> Option<&TrackingItem> {
        match self {
            UpstreamPayload::Empty => None,
            UpstreamPayload::Single(item) => Some(item),
            UpstreamPayload::Many(items) => items.first(),
        }
    }
}

/// Canonical shape of one provider tracking record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackingItem {
    pub status_text: Option<String>,
    pub latest_event: Option<String>,
    pub destination_city: Option<String>,
    pub destination_state: Option<String>,
    pub destination_country: Option<String>,
    pub latest_checkpoint_time: Option<String>,
}

impl TrackingItem {
    pub fn from_value(value: &Value) -> Self {
        Self {
            status_text: STATUS_KEYS.iter().find_map(|key| text_field(value, key)),
            latest_event: text_field(value, "latest_event"),
            destination_city: text_field(value, "destination_city"),
            destination_state: text_field(value, "destination_state"),
            destination_country: text_field(value, "destination_country"),
            latest_checkpoint_time: text_field(value, "latest_checkpoint_time"),
        }
    }

    pub fn status(&self) -> ShipmentStatus {
        self.status_text
            .as_deref()
            .map_or(ShipmentStatus::InTransit, ShipmentStatus::from_upstream)
    }

    pub fn destination(&self) -> Option<String> {
        let parts: Vec<&str> = [
            &self.destination_city,
            &self.destination_state,
            &self.destination_country,
        ]
        .into_iter()
        .filter_map(|part| part.as_deref())
        .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }

    pub fn summary(&self) -> String {
        let mut summary = self
            .latest_event
            .clone()
            .unwrap_or_else(|| UPDATING_PLACEHOLDER.to_string());
        if let Some(destination) = self.destination() {
            summary.push_str("\nDestination: ");
            summary.push_str(&destination);
        }
        if let Some(time) = &self.latest_checkpoint_time {
            summary.push_str(&format!("\n({time})"));
        }
        summary
    }
}

/// Strings are trimmed, numbers and booleans stringified; empty or
/// structured values count as absent.
fn text_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(text) => {
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        }
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

pub fn normalize(payload: &UpstreamPayload, code: &str, _courier: Courier) -> TrackingResult {
    let Some(item) = payload.primary() else {
        return TrackingResult {
            status: ShipmentStatus::Unknown,
            summary: NO_DATA_SUMMARY.to_string(),
            sources: Vec::new(),
            degraded: false,
        };
    };

    TrackingResult {
        status: item.status(),
        summary: item.summary(),
        sources: vec![SourceLink::new(
            PROVIDER_SOURCE_TITLE,
            provider_tracking_url(code),
        )],
        degraded: false,
    }
}

pub fn normalize_value(raw: &Value, code: &str, courier: Courier) -> TrackingResult {
    normalize(&UpstreamPayload::from_value(raw), code, courier)
}

#[cfg(test)]
#[path = "tests/normalizer_tests.rs"]
mod tests;

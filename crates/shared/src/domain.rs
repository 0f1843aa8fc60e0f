use std::{cmp::Ordering, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

const PROVIDER_TRACKING_PAGE: &str = "https://www.trackingmore.com/track/en";
const GENERIC_TRACKING_PAGE: &str = "https://t.17track.net/en#nums=";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    Pending,
    InTransit,
    Delivering,
    Delivered,
    Exception,
    Unknown,
}

impl ShipmentStatus {
    pub const ALL: [ShipmentStatus; 6] = [
        ShipmentStatus::Pending,
        ShipmentStatus::InTransit,
        ShipmentStatus::Delivering,
        ShipmentStatus::Delivered,
        ShipmentStatus::Exception,
        ShipmentStatus::Unknown,
    ];

    /// Higher means the shipment needs operator attention sooner.
    pub fn attention_rank(self) -> u8 {
        match self {
            ShipmentStatus::Exception => 5,
            ShipmentStatus::Delivering => 4,
            ShipmentStatus::InTransit => 3,
            ShipmentStatus::Pending => 2,
            ShipmentStatus::Delivered => 1,
            ShipmentStatus::Unknown => 0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ShipmentStatus::Pending => "Pending",
            ShipmentStatus::InTransit => "In transit",
            ShipmentStatus::Delivering => "Out for delivery",
            ShipmentStatus::Delivered => "Delivered",
            ShipmentStatus::Exception => "Exception",
            ShipmentStatus::Unknown => "Unknown",
        }
    }

    /// Maps a provider status string onto the internal enum.
    ///
    /// Unrecognised values map to `InTransit`: most provider updates are
    /// transit checkpoints that carry no terminal code.
    pub fn from_upstream(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "info_received" => ShipmentStatus::Pending,
            "transit" => ShipmentStatus::InTransit,
            "pickup" => ShipmentStatus::Delivering,
            "delivered" => ShipmentStatus::Delivered,
            "undelivered" | "exception" | "expired" => ShipmentStatus::Exception,
            "notfound" => ShipmentStatus::Unknown,
            _ => ShipmentStatus::InTransit,
        }
    }
}

impl PartialOrd for ShipmentStatus {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ShipmentStatus {
    fn cmp(&self, other: &Self) -> Ordering {
        self.attention_rank().cmp(&other.attention_rank())
    }
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Courier {
    SfExpress,
    Deppon,
    Zto,
    Yto,
    Sto,
    Yunda,
    EmsChina,
    BestExpress,
    Other,
}

struct CourierEntry {
    courier: Courier,
    id: &'static str,
    label: &'static str,
    provider_code: Option<&'static str>,
}

const COURIER_REGISTRY: [CourierEntry; 9] = [
    CourierEntry {
        courier: Courier::SfExpress,
        id: "sf_express",
        label: "SF Express",
        provider_code: Some("sf-express"),
    },
    CourierEntry {
        courier: Courier::Deppon,
        id: "deppon",
        label: "Deppon",
        provider_code: Some("deppon"),
    },
    CourierEntry {
        courier: Courier::Zto,
        id: "zto",
        label: "ZTO Express",
        provider_code: Some("zto-express"),
    },
    CourierEntry {
        courier: Courier::Yto,
        id: "yto",
        label: "YTO Express",
        provider_code: Some("yto"),
    },
    CourierEntry {
        courier: Courier::Sto,
        id: "sto",
        label: "STO Express",
        provider_code: Some("sto"),
    },
    CourierEntry {
        courier: Courier::Yunda,
        id: "yunda",
        label: "Yunda Express",
        provider_code: Some("yunda"),
    },
    CourierEntry {
        courier: Courier::EmsChina,
        id: "ems_china",
        label: "EMS China",
        provider_code: Some("china-ems"),
    },
    CourierEntry {
        courier: Courier::BestExpress,
        id: "best_express",
        label: "Best Express",
        provider_code: Some("bestex"),
    },
    CourierEntry {
        courier: Courier::Other,
        id: "other",
        label: "Other courier",
        provider_code: None,
    },
];

impl Courier {
    pub const ALL: [Courier; 9] = [
        Courier::SfExpress,
        Courier::Deppon,
        Courier::Zto,
        Courier::Yto,
        Courier::Sto,
        Courier::Yunda,
        Courier::EmsChina,
        Courier::BestExpress,
        Courier::Other,
    ];

    fn entry(self) -> &'static CourierEntry {
        // Registry rows are declared in enum order.
        &COURIER_REGISTRY[self as usize]
    }

    pub fn id(self) -> &'static str {
        self.entry().id
    }

    pub fn label(self) -> &'static str {
        self.entry().label
    }

    /// Courier code understood by the tracking provider; `None` means the
    /// courier cannot be looked up through the API.
    pub fn provider_code(self) -> Option<&'static str> {
        self.entry().provider_code
    }

    /// Human-facing tracking page for a parcel with this courier.
    pub fn tracking_url(self, code: &str) -> String {
        match self.provider_code() {
            Some(slug) => format!("{PROVIDER_TRACKING_PAGE}/{code}?express={slug}"),
            None => format!("{GENERIC_TRACKING_PAGE}{code}"),
        }
    }
}

/// Public provider page cited by results built from a live lookup.
pub fn provider_tracking_url(code: &str) -> String {
    format!("{PROVIDER_TRACKING_PAGE}/{code}")
}

impl fmt::Display for Courier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown courier '{0}'")]
pub struct UnknownCourier(pub String);

impl FromStr for Courier {
    type Err = UnknownCourier;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let needle = raw.trim();
        COURIER_REGISTRY
            .iter()
            .find(|entry| {
                entry.id.eq_ignore_ascii_case(needle)
                    || entry.label.eq_ignore_ascii_case(needle)
                    || entry
                        .provider_code
                        .is_some_and(|code| code.eq_ignore_ascii_case(needle))
            })
            .map(|entry| entry.courier)
            .ok_or_else(|| UnknownCourier(raw.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLink {
    pub title: String,
    pub url: String,
}

impl SourceLink {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }
}

/// Outcome of a single lookup, before it is merged into a [`Shipment`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingResult {
    pub status: ShipmentStatus,
    pub summary: String,
    pub sources: Vec<SourceLink>,
    /// Set when the result was simulated locally instead of coming from the provider.
    #[serde(default)]
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shipment {
    pub id: String,
    pub tracking_code: String,
    pub courier: Courier,
    pub status: ShipmentStatus,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub summary: String,
    #[serde(default)]
    pub source_links: Vec<SourceLink>,
    #[serde(default)]
    pub degraded: bool,
}

impl Shipment {
    pub fn new(
        tracking_code: impl Into<String>,
        courier: Courier,
        result: TrackingResult,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tracking_code: tracking_code.into(),
            courier,
            status: result.status,
            last_updated: now,
            created_at: now,
            summary: result.summary,
            source_links: result.sources,
            degraded: result.degraded,
        }
    }

    /// Merges a fresh lookup into the record. `last_updated` never moves backwards.
    pub fn apply(&mut self, result: TrackingResult, now: DateTime<Utc>) {
        self.status = result.status;
        self.summary = result.summary;
        self.source_links = result.sources;
        self.degraded = result.degraded;
        self.last_updated = now.max(self.last_updated).max(self.created_at);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Date,
    Status,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "date" => Ok(SortOrder::Date),
            "status" => Ok(SortOrder::Status),
            other => Err(format!("unknown sort order '{other}' (expected date or status)")),
        }
    }
}

pub fn sort_shipments(shipments: &mut [Shipment], order: SortOrder) {
    match order {
        SortOrder::Date => shipments.sort_by(|a, b| b.last_updated.cmp(&a.last_updated)),
        SortOrder::Status => shipments.sort_by(|a, b| b.status.cmp(&a.status)),
    }
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;

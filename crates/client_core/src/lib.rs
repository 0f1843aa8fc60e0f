//! Client side of the shipment tracker: lookups through the tracking proxy,
//! payload normalization, the simulated fallback and the persisted store.

pub mod config;
pub mod fallback;
pub mod normalizer;
pub mod store;
pub mod tracking;

pub use config::ClientSettings;
pub use fallback::fallback;
pub use normalizer::{normalize, normalize_value, UpstreamPayload};
pub use store::{ShipmentStore, StoreError, StoreResult};
pub use tracking::{LookupFailure, TrackingClient, TrackingConfig, TrackingLookup};

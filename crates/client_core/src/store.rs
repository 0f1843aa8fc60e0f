use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use shared::domain::{sort_shipments, Courier, Shipment, SortOrder};
use storage::Storage;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::tracking::TrackingLookup;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("tracking code must not be empty")]
    EmptyTrackingCode,
    #[error("refresh cancelled before all lookups settled; nothing was saved")]
    Cancelled,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Owns the persisted shipment list. Lookups go through the injected
/// [`TrackingLookup`]; the store is the only writer of the list.
pub struct ShipmentStore {
    storage: Storage,
    tracker: Arc<dyn TrackingLookup>,
}

impl ShipmentStore {
    pub fn new(storage: Storage, tracker: Arc<dyn TrackingLookup>) -> Self {
        Self { storage, tracker }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub async fn list(&self) -> StoreResult<Vec<Shipment>> {
        Ok(self.storage.load_shipments().await?)
    }

    pub async fn list_sorted(&self, order: SortOrder) -> StoreResult<Vec<Shipment>> {
        let mut shipments = self.list().await?;
        sort_shipments(&mut shipments, order);
        Ok(shipments)
    }

    /// Looks the code up once, then records the new shipment at the head of the list.
    pub async fn add(&self, code: &str, courier: Courier) -> StoreResult<Shipment> {
        let code = code.trim();
        if code.is_empty() {
            return Err(StoreError::EmptyTrackingCode);
        }

        let result = self.tracker.lookup(code, courier).await;
        let shipment = Shipment::new(code, courier, result, Utc::now());

        let mut shipments = self.list().await?;
        shipments.insert(0, shipment.clone());
        self.storage.save_shipments(&shipments).await?;

        info!(
            id = %shipment.id,
            code,
            courier = courier.id(),
            status = ?shipment.status,
            degraded = shipment.degraded,
            "shipment added"
        );
        Ok(shipment)
    }

    /// Removes a shipment. Returns `false` when no shipment had that id.
    pub async fn delete(&self, id: &str) -> StoreResult<bool> {
        let mut shipments = self.list().await?;
        let before = shipments.len();
        shipments.retain(|shipment| shipment.id != id);
        if shipments.len() == before {
            return Ok(false);
        }
        self.storage.save_shipments(&shipments).await?;
        info!(id, "shipment deleted");
        Ok(true)
    }

    pub async fn refresh_all(&self) -> StoreResult<Vec<Shipment>> {
        self.refresh_all_with_cancel(&CancellationToken::new())
            .await
    }

    /// Issues one lookup per shipment concurrently and writes the whole list
    /// back only once every lookup has settled. A cancelled batch is discarded.
    pub async fn refresh_all_with_cancel(
        &self,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<Shipment>> {
        let shipments = self.list().await?;
        let lookups = shipments.iter().map(|shipment| {
            self.tracker
                .lookup_with_cancel(&shipment.tracking_code, shipment.courier, cancel)
        });
        let results = join_all(lookups).await;

        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let now = Utc::now();
        let refreshed: Vec<Shipment> = shipments
            .into_iter()
            .zip(results)
            .map(|(mut shipment, result)| {
                shipment.apply(result, now);
                shipment
            })
            .collect();

        self.storage.save_shipments(&refreshed).await?;
        let degraded = refreshed.iter().filter(|s| s.degraded).count();
        info!(count = refreshed.len(), degraded, "shipments refreshed");
        Ok(refreshed)
    }

    pub async fn refresh_one(&self, id: &str) -> StoreResult<Option<Shipment>> {
        let mut shipments = self.list().await?;
        let Some(shipment) = shipments.iter_mut().find(|shipment| shipment.id == id) else {
            return Ok(None);
        };

        let result = self
            .tracker
            .lookup(&shipment.tracking_code, shipment.courier)
            .await;
        shipment.apply(result, Utc::now());
        let updated = shipment.clone();

        self.storage.save_shipments(&shipments).await?;
        Ok(Some(updated))
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;

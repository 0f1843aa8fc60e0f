use super::*;
use chrono::Utc;
use shared::domain::{Courier, ShipmentStatus, TrackingResult};

fn shipment(code: &str) -> Shipment {
    Shipment::new(
        code,
        Courier::SfExpress,
        TrackingResult {
            status: ShipmentStatus::InTransit,
            summary: "moving".into(),
            sources: Vec::new(),
            degraded: false,
        },
        Utc::now(),
    )
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn empty_store_has_no_shipments() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    assert!(storage.load_shipments().await.expect("load").is_empty());
}

#[tokio::test]
async fn saves_and_replaces_shipment_list() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let first = vec![shipment("A1"), shipment("B2")];
    storage.save_shipments(&first).await.expect("save");
    assert_eq!(storage.load_shipments().await.expect("load"), first);

    let second = vec![shipment("C3")];
    storage.save_shipments(&second).await.expect("save");
    let loaded = storage.load_shipments().await.expect("load");
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].tracking_code, "C3");
}

#[tokio::test]
async fn corrupt_shipment_list_is_an_error() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .set_value(SHIPMENTS_KEY, "{not json")
        .await
        .expect("write");
    assert!(storage.load_shipments().await.is_err());
}

#[tokio::test]
async fn api_key_is_trimmed() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    assert_eq!(storage.api_key().await.expect("read"), None);
    storage.save_api_key("  secret-key \n").await.expect("save");
    assert_eq!(
        storage.api_key().await.expect("read").as_deref(),
        Some("secret-key")
    );
}

#[tokio::test]
async fn proxy_url_strips_trailing_slash_and_clears_on_empty() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .save_proxy_url(" https://proxy.example.com/api/track/ ")
        .await
        .expect("save");
    assert_eq!(
        storage.proxy_url().await.expect("read").as_deref(),
        Some("https://proxy.example.com/api/track")
    );

    storage.save_proxy_url("   ").await.expect("clear");
    assert_eq!(storage.proxy_url().await.expect("read"), None);
}

#[tokio::test]
async fn keys_are_independent() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.save_api_key("k").await.expect("key");
    storage.save_shipments(&[shipment("Z9")]).await.expect("save");
    assert!(storage.remove_value(API_KEY_KEY).await.expect("remove"));
    assert!(!storage.remove_value(API_KEY_KEY).await.expect("remove twice"));
    assert_eq!(storage.load_shipments().await.expect("load").len(), 1);
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("tracker.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    storage.save_api_key("persisted").await.expect("save");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );

    let reopened = Storage::new(&database_url).await.expect("reopen");
    assert_eq!(
        reopened.api_key().await.expect("read").as_deref(),
        Some("persisted")
    );
}

#[test]
fn sqlite_path_ignores_memory_urls() {
    assert_eq!(sqlite_path("sqlite::memory:"), None);
    assert_eq!(
        sqlite_path("sqlite://./data/tracker.db?mode=rwc"),
        Some(PathBuf::from("./data/tracker.db"))
    );
}

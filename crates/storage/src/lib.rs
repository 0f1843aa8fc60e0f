use anyhow::{Context, Result};
use shared::domain::Shipment;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

pub const SHIPMENTS_KEY: &str = "shipments";
pub const API_KEY_KEY: &str = "tracking_api_key";
pub const PROXY_URL_KEY: &str = "proxy_url";

/// Client-local key/value store. Holds the shipment list and the two
/// operator overrides (API key, proxy URL) under independent keys.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid sqlite url '{database_url}'"))?
            .create_if_missing(true);
        let mut pool_options = SqlitePoolOptions::new().max_connections(5);
        if is_memory_url(database_url) {
            // Every connection to `sqlite::memory:` opens its own database,
            // so keep exactly one alive for the pool's lifetime.
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_options.connect_with(connect_options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn get_value(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM kv_entries WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to read key '{key}'"))?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    pub async fn set_value(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO kv_entries (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to write key '{key}'"))?;
        Ok(())
    }

    pub async fn remove_value(&self, key: &str) -> Result<bool> {
        let removed = sqlx::query("DELETE FROM kv_entries WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to remove key '{key}'"))?
            .rows_affected();
        Ok(removed > 0)
    }

    pub async fn load_shipments(&self) -> Result<Vec<Shipment>> {
        let Some(raw) = self.get_value(SHIPMENTS_KEY).await? else {
            return Ok(Vec::new());
        };
        serde_json::from_str(&raw).context("stored shipment list is not valid JSON")
    }

    /// Replaces the whole shipment list in a single statement.
    pub async fn save_shipments(&self, shipments: &[Shipment]) -> Result<()> {
        let raw = serde_json::to_string(shipments).context("failed to encode shipment list")?;
        self.set_value(SHIPMENTS_KEY, &raw).await?;
        debug!(count = shipments.len(), "shipment list saved");
        Ok(())
    }

    pub async fn api_key(&self) -> Result<Option<String>> {
        Ok(self
            .get_value(API_KEY_KEY)
            .await?
            .filter(|key| !key.is_empty()))
    }

    pub async fn save_api_key(&self, key: &str) -> Result<()> {
        self.set_value(API_KEY_KEY, key.trim()).await
    }

    /// `None` means "use the built-in default".
    pub async fn proxy_url(&self) -> Result<Option<String>> {
        Ok(self
            .get_value(PROXY_URL_KEY)
            .await?
            .filter(|url| !url.is_empty()))
    }

    /// Stores a trimmed URL without its trailing slash; an empty value clears
    /// the override.
    pub async fn save_proxy_url(&self, url: &str) -> Result<()> {
        let cleaned = normalize_proxy_url(url);
        if cleaned.is_empty() {
            self.remove_value(PROXY_URL_KEY).await?;
        } else {
            self.set_value(PROXY_URL_KEY, &cleaned).await?;
        }
        Ok(())
    }
}

fn normalize_proxy_url(url: &str) -> String {
    let trimmed = url.trim();
    trimmed.strip_suffix('/').unwrap_or(trimmed).to_string()
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_memory_url(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, info};

use super::models::{CacheEntry, Chain, Transaction};
use crate::cache::CacheStore;
use crate::error::StoreError;

/// SQLite-backed cache persistence. Rows are keyed by chain ticker and address
/// and hold the transaction list as JSON.
#[derive(Clone)]
pub struct SqliteStore {
    pub pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens the database and applies pending migrations
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        info!("📊 Opening cache database...");

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await?;

        let store = Self::new(pool);
        store.migrate().await?;

        info!("✓ Cache database initialized");
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        info!("🔄 Running cache migrations...");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Deletes rows older than `cutoff`
    pub async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM history_cache WHERE fetched_at < ?")
            .bind(cutoff.timestamp())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            info!("🧹 Pruned {} stale history rows", result.rows_affected());
        }
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CacheStore for SqliteStore {
    async fn load(&self, chain: Chain, address: &str) -> Result<Option<CacheEntry>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT fetched_at, transactions
            FROM history_cache
            WHERE chain = ? AND address = ?
            "#,
        )
        .bind(chain.symbol())
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let corrupt = |reason: String| StoreError::Corrupt {
            chain: chain.symbol().to_string(),
            address: address.to_string(),
            reason,
        };

        let fetched_at: i64 = row.try_get("fetched_at")?;
        let raw: String = row.try_get("transactions")?;

        let fetched_at = DateTime::<Utc>::from_timestamp(fetched_at, 0)
            .ok_or_else(|| corrupt(format!("fetched_at {} out of range", fetched_at)))?;
        let transactions: Vec<Transaction> =
            serde_json::from_str(&raw).map_err(|e| corrupt(e.to_string()))?;

        debug!("Loaded {} persisted transactions for {}:{}", transactions.len(), chain, address);
        Ok(Some(CacheEntry {
            address: address.to_string(),
            transactions,
            fetched_at,
        }))
    }

    async fn save(&self, chain: Chain, entry: &CacheEntry) -> Result<(), StoreError> {
        let transactions = serde_json::to_string(&entry.transactions).map_err(|e| StoreError::Corrupt {
            chain: chain.symbol().to_string(),
            address: entry.address.clone(),
            reason: e.to_string(),
        })?;

        sqlx::query(
            r#"
            INSERT INTO history_cache (chain, address, fetched_at, transactions)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (chain, address)
            DO UPDATE SET fetched_at = excluded.fetched_at, transactions = excluded.transactions
            "#,
        )
        .bind(chain.symbol())
        .bind(&entry.address)
        .bind(entry.fetched_at.timestamp())
        .bind(transactions)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, chain: Chain, address: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM history_cache WHERE chain = ? AND address = ?")
            .bind(chain.symbol())
            .bind(address)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove_chain(&self, chain: Chain) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM history_cache WHERE chain = ?")
            .bind(chain.symbol())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

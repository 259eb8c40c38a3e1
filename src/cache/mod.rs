pub mod events;
pub mod history_cache;

pub use events::{EventBroadcaster, HistoryEvent};
pub use history_cache::TransactionCache;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::ledger::models::{CacheEntry, Chain};

/// Durable backing for the in-memory cache, keyed by `(chain, address)`
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn load(&self, chain: Chain, address: &str) -> Result<Option<CacheEntry>, StoreError>;

    async fn save(&self, chain: Chain, entry: &CacheEntry) -> Result<(), StoreError>;

    async fn remove(&self, chain: Chain, address: &str) -> Result<(), StoreError>;

    /// Drops every row of one chain
    async fn remove_chain(&self, chain: Chain) -> Result<(), StoreError>;
}

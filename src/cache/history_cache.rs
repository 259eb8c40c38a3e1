use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use super::{CacheStore, EventBroadcaster, HistoryEvent};
use crate::ledger::models::{sort_newest_first, CacheEntry, Chain, Transaction};

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::weeks(52 * 100))
}

/// Address-scoped history for one chain, with a TTL and a merge protocol for
/// optimistic pending records.
///
/// Every mutation replaces a whole entry under the write lock, so readers see
/// either the old or the new entry and never a partial one. Store writes
/// happen before that lock is released, keeping persisted rows in the same
/// order as the in-memory changes.
pub struct TransactionCache {
    chain: Chain,
    ttl: chrono::Duration,
    max_pending: chrono::Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
    store: Option<Arc<dyn CacheStore>>,
    events: EventBroadcaster,
}

impl TransactionCache {
    pub fn new(chain: Chain, ttl: Duration, max_pending: Duration, events: EventBroadcaster) -> Self {
        Self {
            chain,
            ttl: to_chrono(ttl),
            max_pending: to_chrono(max_pending),
            entries: RwLock::new(HashMap::new()),
            store: None,
            events,
        }
    }

    /// Writes every change through to `store`
    pub fn with_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    pub fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    pub async fn get(&self, address: &str) -> Option<CacheEntry> {
        self.get_at(address, Utc::now()).await
    }

    /// The entry for exactly `address`, if it is younger than the TTL
    pub async fn get_at(&self, address: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        let entries = self.entries.read().await;

        match entries.get(address) {
            Some(entry) if entry.address == address && entry.is_fresh_at(now, self.ttl) => {
                debug!("✓ History cache hit: {}:{}", self.chain, address);
                Some(entry.clone())
            }
            Some(_) => {
                debug!("⚠ History cache stale: {}:{}", self.chain, address);
                None
            }
            None => {
                debug!("History cache miss: {}:{}", self.chain, address);
                None
            }
        }
    }

    /// The entry for `address` regardless of age
    pub async fn peek(&self, address: &str) -> Option<CacheEntry> {
        let entries = self.entries.read().await;
        entries
            .get(address)
            .filter(|entry| entry.address == address)
            .cloned()
    }

    pub async fn put(&self, address: &str, transactions: Vec<Transaction>) -> CacheEntry {
        self.put_at(address, transactions, Utc::now()).await
    }

    /// Replaces the entry with a freshly fetched list.
    ///
    /// The fresh list wins for every hash it contains. Local pending records it
    /// does not mention yet are kept in front while younger than the pending
    /// window, and dropped after that.
    pub async fn put_at(&self, address: &str, transactions: Vec<Transaction>, now: DateTime<Utc>) -> CacheEntry {
        let mut seen = HashSet::new();
        let mut fresh: Vec<Transaction> = transactions
            .into_iter()
            .filter(|tx| seen.insert(tx.hash.clone()))
            .collect();
        sort_newest_first(&mut fresh);

        let mut resolved = Vec::new();
        let entry = {
            let mut entries = self.entries.write().await;

            let mut merged = Vec::with_capacity(fresh.len());
            if let Some(previous) = entries.get(address) {
                for tx in previous.transactions.iter().filter(|tx| tx.is_local_pending()) {
                    match fresh.iter().find(|f| f.hash == tx.hash) {
                        Some(update) if update.status.is_final() => {
                            resolved.push((update.hash.clone(), update.status));
                        }
                        Some(_) => {}
                        None if self.pending_is_live(tx, now) => merged.push(tx.clone()),
                        None => {
                            info!("⏱ Dropping pending {} on {}: never showed up", tx.hash, self.chain);
                        }
                    }
                }
            }
            merged.extend(fresh);

            let entry = CacheEntry {
                address: address.to_string(),
                transactions: merged,
                fetched_at: now,
            };
            entries.insert(address.to_string(), entry.clone());
            self.persist(&entry).await;
            entry
        };

        debug!(
            "💾 Cached {} transactions for {}:{}",
            entry.transactions.len(),
            self.chain,
            address
        );

        for (hash, status) in resolved {
            info!("✅ Pending {} on {} resolved as {:?}", hash, self.chain, status);
            self.events.publish(HistoryEvent::PendingResolved {
                chain: self.chain,
                address: address.to_string(),
                hash,
                status,
            });
        }
        self.events.publish(HistoryEvent::CacheUpdated {
            chain: self.chain,
            address: address.to_string(),
            count: entry.transactions.len(),
            fetched_at: entry.fetched_at,
        });

        entry
    }

    pub async fn insert_pending(&self, address: &str, transaction: Transaction) -> CacheEntry {
        self.insert_pending_at(address, transaction, Utc::now()).await
    }

    /// Puts a just-submitted record in front of the cached list without
    /// touching `fetched_at`. A record with the same hash is replaced.
    pub async fn insert_pending_at(&self, address: &str, transaction: Transaction, now: DateTime<Utc>) -> CacheEntry {
        let hash = transaction.hash.clone();

        let entry = {
            let mut entries = self.entries.write().await;

            let entry = match entries.get(address) {
                Some(previous) => {
                    let mut transactions = Vec::with_capacity(previous.transactions.len() + 1);
                    transactions.push(transaction);
                    transactions.extend(previous.transactions.iter().filter(|tx| tx.hash != hash).cloned());
                    CacheEntry {
                        address: previous.address.clone(),
                        transactions,
                        fetched_at: previous.fetched_at,
                    }
                }
                None => CacheEntry {
                    address: address.to_string(),
                    transactions: vec![transaction],
                    fetched_at: now,
                },
            };
            entries.insert(address.to_string(), entry.clone());
            self.persist(&entry).await;
            entry
        };

        info!("⏳ Pending {} added for {}:{}", hash, self.chain, address);
        self.events.publish(HistoryEvent::PendingInserted {
            chain: self.chain,
            address: address.to_string(),
            hash,
        });

        entry
    }

    pub async fn clear(&self, address: &str) {
        let mut entries = self.entries.write().await;
        entries.remove(address);

        if let Some(store) = &self.store {
            if let Err(e) = store.remove(self.chain, address).await {
                error!("Failed to remove cached history for {}:{}: {}", self.chain, address, e);
            }
        }
        drop(entries);
        info!("🔄 History cache cleared for {}:{}", self.chain, address);
    }

    /// Forgets every address on this chain
    pub async fn clear_all(&self) {
        let mut entries = self.entries.write().await;
        entries.clear();

        if let Some(store) = &self.store {
            if let Err(e) = store.remove_chain(self.chain).await {
                error!("Failed to clear cached history for {}: {}", self.chain, e);
            }
        }
        drop(entries);
        info!("🔄 History cache cleared for {}", self.chain);
    }

    pub async fn hydrate(&self, address: &str) -> Option<CacheEntry> {
        self.hydrate_at(address, Utc::now()).await
    }

    /// Loads a persisted entry into memory when it is still fresh. Stale rows
    /// are treated as a cold cache.
    pub async fn hydrate_at(&self, address: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        let store = self.store.as_ref()?;

        let entry = match store.load(self.chain, address).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                error!("Failed to load cached history for {}:{}: {}", self.chain, address, e);
                return None;
            }
        };

        if entry.address != address || !entry.is_fresh_at(now, self.ttl) {
            debug!("Persisted history for {}:{} is stale; ignoring", self.chain, address);
            return None;
        }

        let mut entries = self.entries.write().await;
        // Anything already in memory is at least as recent
        if let Some(current) = entries.get(address) {
            return Some(current.clone());
        }
        entries.insert(address.to_string(), entry.clone());
        info!("📦 Hydrated {} transactions for {}:{}", entry.transactions.len(), self.chain, address);
        Some(entry)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn pending_is_live(&self, tx: &Transaction, now: DateTime<Utc>) -> bool {
        tx.submitted_at
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .map(|submitted| now - submitted < self.max_pending)
            .unwrap_or(false)
    }

    async fn persist(&self, entry: &CacheEntry) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(self.chain, entry).await {
                error!("Failed to persist history for {}:{}: {}", self.chain, entry.address, e);
            }
        }
    }
}

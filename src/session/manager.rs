use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::info;

use super::{ActiveWallet, HistoryView, WalletSession};
use crate::adapters::{AdapterRegistry, ChainAdapter, SubmitParams, TransferIntent};
use crate::cache::{CacheStore, EventBroadcaster, HistoryEvent, TransactionCache};
use crate::config::{HistoryConfig, PollingConfig};
use crate::error::{AppError, AppResult};
use crate::ledger::models::{Chain, Transaction};
use crate::polling::{PollingScheduler, PollingState};
use crate::reconcile::{BlockTimeResolver, ReconcileProfile, Reconciler};

/// Per-chain collaborators shared by every session on that chain
struct ChainContext {
    adapter: Arc<dyn ChainAdapter>,
    reconciler: Reconciler,
    cache: Arc<TransactionCache>,
}

struct RunningSession {
    session: Arc<WalletSession>,
    shutdown: watch::Sender<bool>,
}

/// Owns the single active wallet session and its polling loop
pub struct SessionManager {
    chains: HashMap<Chain, ChainContext>,
    scheduler: Arc<PollingScheduler>,
    history: HistoryConfig,
    events: EventBroadcaster,
    active: watch::Sender<Option<ActiveWallet>>,
    current: Mutex<Option<RunningSession>>,
    /// Held for a whole activate, deactivate, delete or network switch
    lifecycle: tokio::sync::Mutex<()>,
}

impl SessionManager {
    pub fn new(
        registry: &AdapterRegistry,
        store: Option<Arc<dyn CacheStore>>,
        history: HistoryConfig,
        polling: PollingConfig,
    ) -> Self {
        let events = EventBroadcaster::new();
        let resolver = BlockTimeResolver::new(history.block_time_concurrency, history.request_timeout);

        let mut chains = HashMap::new();
        for chain in registry.registered_chains() {
            let Ok(adapter) = registry.get(chain) else {
                continue;
            };

            let mut cache =
                TransactionCache::new(chain, history.cache_ttl, polling.max_pending, events.clone());
            if let Some(store) = &store {
                cache = cache.with_store(store.clone());
            }

            chains.insert(
                chain,
                ChainContext {
                    adapter,
                    reconciler: Reconciler::new(ReconcileProfile::native(chain), resolver.clone()),
                    cache: Arc::new(cache),
                },
            );
        }

        let (active, _) = watch::channel(None);

        Self {
            chains,
            scheduler: Arc::new(PollingScheduler::new(polling)),
            history,
            events,
            active,
            current: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    /// Replaces the reconciliation rules of one chain
    pub fn with_profile(mut self, profile: ReconcileProfile) -> Self {
        if let Some(context) = self.chains.get_mut(&profile.chain) {
            let resolver = BlockTimeResolver::new(self.history.block_time_concurrency, self.history.request_timeout);
            context.reconciler = Reconciler::new(profile, resolver);
        }
        self
    }

    pub fn chains(&self) -> Vec<Chain> {
        let mut chains: Vec<Chain> = self.chains.keys().copied().collect();
        chains.sort();
        chains
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HistoryEvent> {
        self.events.subscribe()
    }

    pub fn polling_state(&self) -> PollingState {
        self.scheduler.state()
    }

    pub fn active_wallet(&self) -> Option<ActiveWallet> {
        self.active.borrow().clone()
    }

    pub fn cache(&self, chain: Chain) -> AppResult<Arc<TransactionCache>> {
        Ok(self.context(chain)?.cache.clone())
    }

    fn context(&self, chain: Chain) -> AppResult<&ChainContext> {
        self.chains.get(&chain).ok_or(AppError::AdapterNotFound(chain))
    }

    /// Makes `(chain, address)` the active wallet. The previous session is
    /// cancelled, persisted history is hydrated and the polling loop starts.
    pub async fn activate(&self, chain: Chain, address: &str) -> AppResult<Arc<WalletSession>> {
        let address = address.trim();
        if address.is_empty() {
            return Err(AppError::InvalidInput("address is required".to_string()));
        }
        let context = self.context(chain)?;
        let wallet = ActiveWallet {
            chain,
            address: address.to_string(),
        };

        let _lifecycle = self.lifecycle.lock().await;
        let existing = self
            .current
            .lock()
            .as_ref()
            .filter(|running| running.session.wallet() == &wallet)
            .map(|running| running.session.clone());
        if let Some(session) = existing {
            return Ok(session);
        }

        self.stop_current();
        self.active.send_replace(Some(wallet.clone()));
        context.cache.hydrate(address).await;

        let session = Arc::new(WalletSession::new(
            wallet,
            context.adapter.clone(),
            context.reconciler.clone(),
            context.cache.clone(),
            self.scheduler.clone(),
            self.history.clone(),
            self.active.subscribe(),
        ));

        let (shutdown, shutdown_rx) = watch::channel(false);
        {
            let session = session.clone();
            let scheduler = self.scheduler.clone();
            tokio::spawn(async move {
                scheduler
                    .run(shutdown_rx, || {
                        let session = session.clone();
                        async move { session.tick().await }
                    })
                    .await;
            });
        }

        *self.current.lock() = Some(RunningSession {
            session: session.clone(),
            shutdown,
        });

        info!("👛 Activated {}:{}", chain, address);
        Ok(session)
    }

    /// Stops the running session, if any, and resets polling
    pub async fn deactivate(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.stop_current();
    }

    fn stop_current(&self) {
        let Some(running) = self.current.lock().take() else {
            return;
        };

        let _ = running.shutdown.send(true);
        self.active.send_replace(None);
        self.scheduler.reset();
        info!("Deactivated {}:{}", running.session.chain(), running.session.address());
    }

    /// The running session for exactly `(chain, address)`
    pub fn session_for(&self, chain: Chain, address: &str) -> AppResult<Arc<WalletSession>> {
        self.current
            .lock()
            .as_ref()
            .filter(|running| running.session.chain() == chain && running.session.address() == address)
            .map(|running| running.session.clone())
            .ok_or_else(|| AppError::InactiveSession {
                chain,
                address: address.to_string(),
            })
    }

    pub async fn history(&self, chain: Chain, address: &str) -> AppResult<HistoryView> {
        let session = self.session_for(chain, address)?;
        Ok(session.get_display_history().await)
    }

    pub async fn on_submitted(
        &self,
        chain: Chain,
        address: &str,
        hash: &str,
        intent: Option<TransferIntent>,
    ) -> AppResult<Transaction> {
        let session = self.session_for(chain, address)?;
        session.on_submitted(hash, intent).await
    }

    pub async fn submit(&self, chain: Chain, address: &str, params: SubmitParams) -> AppResult<Transaction> {
        let session = self.session_for(chain, address)?;
        session.submit(params).await
    }

    /// Forgets a wallet: its session stops and its cached history is removed
    pub async fn delete_wallet(&self, chain: Chain, address: &str) -> AppResult<()> {
        let context = self.context(chain)?;

        let _lifecycle = self.lifecycle.lock().await;
        if self.session_for(chain, address).is_ok() {
            self.stop_current();
        }
        context.cache.clear(address).await;

        info!("🗑 Deleted wallet {}:{}", chain, address);
        Ok(())
    }

    /// Drops every cached history of `chain` and stops a session running on it
    pub async fn switch_network(&self, chain: Chain) -> AppResult<()> {
        let context = self.context(chain)?;

        let _lifecycle = self.lifecycle.lock().await;
        let on_chain = self
            .current
            .lock()
            .as_ref()
            .map(|running| running.session.chain() == chain)
            .unwrap_or(false);
        if on_chain {
            self.stop_current();
        }
        context.cache.clear_all().await;

        info!("🔀 Network switched for {}", chain);
        Ok(())
    }
}

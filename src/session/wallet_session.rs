use chrono::Utc;
use num_bigint::BigUint;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use crate::adapters::{ChainAdapter, SubmitParams, TransferIntent};
use crate::cache::{HistoryEvent, TransactionCache};
use crate::config::HistoryConfig;
use crate::error::{AdapterError, AdapterResult, AppError, AppResult};
use crate::ledger::models::{
    Amount, CacheEntry, Chain, Direction, RawRef, Transaction, TxStatus, UNKNOWN_COUNTERPARTY,
};
use crate::polling::PollingScheduler;
use crate::reconcile::Reconciler;

/// The wallet whose history is being kept current
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActiveWallet {
    pub chain: Chain,
    pub address: String,
}

/// What the history screen should render
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum HistoryView {
    /// First fetch for this address still in flight
    Loading,
    /// Fetch failed and nothing is cached; distinct from an empty history
    Unavailable { reason: String },
    Ready {
        transactions: Vec<Transaction>,
        stale: bool,
        balance: Option<Amount>,
    },
}

/// Refresh pipeline of one active wallet: balance and history reads,
/// reconciliation and the cache write, guarded against wallet switches.
pub struct WalletSession {
    wallet: ActiveWallet,
    adapter: Arc<dyn ChainAdapter>,
    reconciler: Reconciler,
    cache: Arc<TransactionCache>,
    scheduler: Arc<PollingScheduler>,
    config: HistoryConfig,
    active: watch::Receiver<Option<ActiveWallet>>,
    balance: Mutex<Option<BigUint>>,
    last_error: Mutex<Option<String>>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl WalletSession {
    pub fn new(
        wallet: ActiveWallet,
        adapter: Arc<dyn ChainAdapter>,
        reconciler: Reconciler,
        cache: Arc<TransactionCache>,
        scheduler: Arc<PollingScheduler>,
        config: HistoryConfig,
        active: watch::Receiver<Option<ActiveWallet>>,
    ) -> Self {
        Self {
            wallet,
            adapter,
            reconciler,
            cache,
            scheduler,
            config,
            active,
            balance: Mutex::new(None),
            last_error: Mutex::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn wallet(&self) -> &ActiveWallet {
        &self.wallet
    }

    pub fn chain(&self) -> Chain {
        self.wallet.chain
    }

    pub fn address(&self) -> &str {
        &self.wallet.address
    }

    pub fn is_active(&self) -> bool {
        self.active.borrow().as_ref() == Some(&self.wallet)
    }

    pub fn balance(&self) -> Option<Amount> {
        self.balance
            .lock()
            .clone()
            .map(|value| Amount::new(value, &self.reconciler.profile().base))
    }

    /// One scheduler tick. Skipped when a refresh is already running.
    pub async fn tick(&self) {
        let Ok(_guard) = self.refresh_lock.try_lock() else {
            debug!("Refresh already running for {}:{}", self.chain(), self.address());
            return;
        };

        if let Err(e) = self.refresh().await {
            warn!("⚠ Refresh failed for {}:{}: {}", self.chain(), self.address(), e);
        }
    }

    /// Balance and history reads run side by side; a balance failure never
    /// blocks the history write.
    #[instrument(skip(self), fields(chain = %self.wallet.chain, address = %self.wallet.address))]
    pub async fn refresh(&self) -> AppResult<()> {
        let (balance, history) = tokio::join!(self.refresh_balance(), self.refresh_history());

        if let Err(e) = balance {
            warn!("Balance refresh failed: {}", e);
        }

        let current = self.cache.peek(self.address()).await;
        self.scheduler.observe(current.as_ref());

        history
    }

    async fn refresh_balance(&self) -> AdapterResult<()> {
        let balance = tokio::select! {
            result = timeout(self.config.request_timeout, self.adapter.fetch_balance(self.address())) => {
                result.map_err(AdapterError::from)??
            }
            _ = self.until_inactive() => return Ok(()),
        };

        if !self.is_active() {
            return Ok(());
        }

        let changed = {
            let mut current = self.balance.lock();
            let changed = current.as_ref() != Some(&balance);
            *current = Some(balance.clone());
            changed
        };

        if changed {
            self.cache.events().publish(HistoryEvent::BalanceUpdated {
                chain: self.chain(),
                address: self.address().to_string(),
                balance,
            });
        }
        Ok(())
    }

    async fn refresh_history(&self) -> AppResult<()> {
        if self.cache.get(self.address()).await.is_some() {
            return Ok(());
        }

        let fetched = tokio::select! {
            result = self.fetch_and_reconcile() => result,
            _ = self.until_inactive() => {
                debug!("Wallet switched; abandoning fetch for {}", self.address());
                return Ok(());
            }
        };

        let transactions = match fetched {
            Ok(transactions) => transactions,
            Err(e) => {
                *self.last_error.lock() = Some(e.to_string());
                self.cache.events().publish(HistoryEvent::RefreshFailed {
                    chain: self.chain(),
                    address: self.address().to_string(),
                    reason: e.to_string(),
                });
                return Err(e.into());
            }
        };

        // A late response must never land in the cache of an inactive wallet
        if !self.is_active() {
            debug!("Discarding late history for inactive {}", self.address());
            return Ok(());
        }

        self.cache.put(self.address(), transactions).await;
        *self.last_error.lock() = None;
        Ok(())
    }

    async fn fetch_and_reconcile(&self) -> AdapterResult<Vec<Transaction>> {
        let raws = timeout(
            self.config.request_timeout,
            self.adapter
                .fetch_raw_transactions(self.address(), self.config.fetch_limit),
        )
        .await
        .map_err(AdapterError::from)??;

        Ok(self
            .reconciler
            .reconcile_batch(self.adapter.as_ref(), self.address(), &raws)
            .await)
    }

    /// Resolves once this session is no longer the active wallet
    async fn until_inactive(&self) {
        let mut active = self.active.clone();
        loop {
            if active.borrow_and_update().as_ref() != Some(&self.wallet) {
                return;
            }
            if active.changed().await.is_err() {
                return;
            }
        }
    }

    /// Cached history right away, stale or not. A background refresh starts
    /// when the entry is stale or missing.
    pub async fn get_display_history(self: &Arc<Self>) -> HistoryView {
        if let Some(entry) = self.cache.get(self.address()).await {
            return self.ready(entry, false);
        }

        if let Some(entry) = self.cache.peek(self.address()).await {
            self.spawn_refresh();
            return self.ready(entry, true);
        }

        let last_error = self.last_error.lock().clone();
        if let Some(reason) = last_error {
            return HistoryView::Unavailable { reason };
        }

        self.spawn_refresh();
        HistoryView::Loading
    }

    fn ready(&self, entry: CacheEntry, stale: bool) -> HistoryView {
        HistoryView::Ready {
            transactions: entry.transactions,
            stale,
            balance: self.balance(),
        }
    }

    fn spawn_refresh(self: &Arc<Self>) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            session.tick().await;
        });
    }

    /// Records a successful submission: the optimistic pending entry goes into
    /// the cache and polling speeds up until it settles.
    pub async fn on_submitted(&self, hash: &str, intent: Option<TransferIntent>) -> AppResult<Transaction> {
        if hash.trim().is_empty() {
            return Err(AppError::InvalidInput("transaction hash is required".to_string()));
        }

        let now = Utc::now().timestamp();
        let (counterparty, value) = match intent {
            Some(intent) if !intent.recipient.is_empty() => (intent.recipient, intent.amount),
            Some(intent) => (UNKNOWN_COUNTERPARTY.to_string(), intent.amount),
            None => (UNKNOWN_COUNTERPARTY.to_string(), BigUint::default()),
        };

        let pending = Transaction {
            hash: hash.to_string(),
            direction: Direction::Sent,
            counterparty,
            amount: Amount::new(value, &self.reconciler.profile().base),
            status: TxStatus::Pending,
            timestamp: Some(now),
            low_confidence: false,
            submitted_at: Some(now),
            raw: RawRef {
                chain: self.chain(),
                block_height: None,
            },
        };

        self.cache.insert_pending(self.address(), pending.clone()).await;
        self.scheduler.mark_submitted(hash);
        Ok(pending)
    }

    /// Broadcasts pre-signed bytes, then records the pending entry
    pub async fn submit(&self, params: SubmitParams) -> AppResult<Transaction> {
        let intent = params.intent.clone();
        let receipt = timeout(self.config.request_timeout, self.adapter.submit_transaction(params))
            .await
            .map_err(AdapterError::from)??;

        debug!("📤 Submitted {} on {}", receipt.hash, self.chain());
        self.on_submitted(&receipt.hash, intent).await
    }
}

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use crate::config::PollingConfig;
use crate::ledger::models::{CacheEntry, TxStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PollingMode {
    Normal,
    Fast,
}

/// Polling cadence of one wallet session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollingState {
    pub mode: PollingMode,
    pub interval_ms: u64,
    pub has_pending_local: bool,
    pub pending_since: Option<DateTime<Utc>>,
    /// Local submissions still waiting for a final status
    pub pending_hashes: Vec<String>,
}

impl PollingState {
    fn normal(config: &PollingConfig) -> Self {
        Self {
            mode: PollingMode::Normal,
            interval_ms: config.normal_interval.as_millis() as u64,
            has_pending_local: false,
            pending_since: None,
            pending_hashes: Vec::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Two-speed scheduler: Fast while a local submission is unconfirmed, Normal otherwise.
pub struct PollingScheduler {
    config: PollingConfig,
    state: Mutex<PollingState>,
    changed: Notify,
}

impl PollingScheduler {
    pub fn new(config: PollingConfig) -> Self {
        Self {
            state: Mutex::new(PollingState::normal(&config)),
            config,
            changed: Notify::new(),
        }
    }

    pub fn state(&self) -> PollingState {
        self.state.lock().clone()
    }

    pub fn interval(&self) -> Duration {
        self.state.lock().interval()
    }

    pub fn mark_submitted(&self, hash: &str) {
        self.mark_submitted_at(hash, Utc::now())
    }

    /// Switches to Fast. Every submission restarts the pending window.
    pub fn mark_submitted_at(&self, hash: &str, now: DateTime<Utc>) {
        let switched = {
            let mut state = self.state.lock();
            if !state.pending_hashes.iter().any(|h| h == hash) {
                state.pending_hashes.push(hash.to_string());
            }
            state.has_pending_local = true;
            state.pending_since = Some(now);

            let switched = state.mode != PollingMode::Fast;
            state.mode = PollingMode::Fast;
            state.interval_ms = self.config.fast_interval.as_millis() as u64;
            switched
        };

        if switched {
            info!("⚡ Polling switched to fast ({:?}) for pending {}", self.config.fast_interval, hash);
            self.changed.notify_waiters();
        }
    }

    pub fn observe(&self, entry: Option<&CacheEntry>) -> PollingMode {
        self.observe_at(entry, Utc::now())
    }

    /// Re-evaluates the mode against the cache after a tick. Fast ends once no
    /// tracked hash is still Pending in `entry`, or when the pending window runs out.
    pub fn observe_at(&self, entry: Option<&CacheEntry>, now: DateTime<Utc>) -> PollingMode {
        let mut state = self.state.lock();
        if !state.has_pending_local {
            return state.mode;
        }

        let window = chrono::Duration::from_std(self.config.max_pending).ok();
        let timed_out = match (state.pending_since, window) {
            (Some(since), Some(window)) => now - since > window,
            (Some(_), None) => false,
            (None, _) => true,
        };

        if timed_out {
            info!(
                "⏱ Pending window elapsed for {:?}; polling back to normal",
                state.pending_hashes
            );
            *state = PollingState::normal(&self.config);
        } else {
            state.pending_hashes.retain(|hash| {
                entry
                    .and_then(|entry| entry.find(hash))
                    .map(|tx| tx.status == TxStatus::Pending)
                    .unwrap_or(false)
            });

            if state.pending_hashes.is_empty() {
                info!("✅ Local submissions settled; polling back to normal");
                *state = PollingState::normal(&self.config);
            }
        }

        let mode = state.mode;
        drop(state);

        if mode == PollingMode::Normal {
            self.changed.notify_waiters();
        }
        mode
    }

    /// Back to Normal with nothing pending, e.g. on a wallet switch
    pub fn reset(&self) {
        *self.state.lock() = PollingState::normal(&self.config);
        self.changed.notify_waiters();
    }

    /// Calls `tick` right away and then once per current interval until
    /// `shutdown` flips to true or its sender goes away. An interval change
    /// moves the next deadline without firing an extra tick.
    pub async fn run<F, Fut>(&self, mut shutdown: watch::Receiver<bool>, mut tick: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut last_tick = Instant::now();
        tick().await;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let deadline = last_tick + self.interval();
            tokio::select! {
                _ = sleep_until(deadline) => {
                    last_tick = Instant::now();
                    tick().await;
                }
                _ = self.changed.notified() => {
                    debug!("Polling interval changed to {:?}", self.interval());
                }
                result = shutdown.changed() => {
                    if result.is_err() {
                        break;
                    }
                }
            }
        }

        debug!("Polling loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::models::{Amount, AssetProfile, Chain, Direction, RawRef, Transaction};
    use num_bigint::BigUint;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn entry_with(hash: &str, status: TxStatus) -> CacheEntry {
        CacheEntry {
            address: "bc1qwallet".to_string(),
            transactions: vec![Transaction {
                hash: hash.to_string(),
                direction: Direction::Sent,
                counterparty: "bc1qshop".to_string(),
                amount: Amount::new(BigUint::from(1u32), &AssetProfile::native(Chain::Bitcoin)),
                status,
                timestamp: None,
                low_confidence: false,
                submitted_at: Some(at(0).timestamp()),
                raw: RawRef {
                    chain: Chain::Bitcoin,
                    block_height: None,
                },
            }],
            fetched_at: at(0),
        }
    }

    #[test]
    fn test_starts_normal() {
        let scheduler = PollingScheduler::new(PollingConfig::default());
        let state = scheduler.state();
        assert_eq!(state.mode, PollingMode::Normal);
        assert_eq!(state.interval(), Duration::from_secs(30));
        assert!(!state.has_pending_local);
    }

    #[test]
    fn test_fast_until_submission_confirms() {
        let scheduler = PollingScheduler::new(PollingConfig::default());
        scheduler.mark_submitted_at("H", at(0));
        assert_eq!(scheduler.interval(), Duration::from_secs(15));

        let pending = entry_with("H", TxStatus::Pending);
        assert_eq!(scheduler.observe_at(Some(&pending), at(15)), PollingMode::Fast);
        assert_eq!(scheduler.observe_at(Some(&pending), at(30)), PollingMode::Fast);

        let confirmed = entry_with("H", TxStatus::Confirmed);
        assert_eq!(scheduler.observe_at(Some(&confirmed), at(45)), PollingMode::Normal);

        let state = scheduler.state();
        assert_eq!(state.interval(), Duration::from_secs(30));
        assert!(!state.has_pending_local);
        assert!(state.pending_since.is_none());
    }

    #[test]
    fn test_pending_window_timeout() {
        let scheduler = PollingScheduler::new(PollingConfig::default());
        scheduler.mark_submitted_at("H", at(0));

        let pending = entry_with("H", TxStatus::Pending);
        assert_eq!(scheduler.observe_at(Some(&pending), at(300)), PollingMode::Fast);
        assert_eq!(scheduler.observe_at(Some(&pending), at(301)), PollingMode::Normal);
        assert_eq!(scheduler.interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_new_submission_restarts_window() {
        let scheduler = PollingScheduler::new(PollingConfig::default());
        scheduler.mark_submitted_at("H1", at(0));
        scheduler.mark_submitted_at("H2", at(200));

        let mut entry = entry_with("H1", TxStatus::Confirmed);
        entry.transactions.extend(entry_with("H2", TxStatus::Pending).transactions);

        assert_eq!(scheduler.observe_at(Some(&entry), at(400)), PollingMode::Fast);
        assert_eq!(scheduler.state().pending_hashes, vec!["H2".to_string()]);
        assert_eq!(scheduler.observe_at(Some(&entry), at(501)), PollingMode::Normal);
    }

    #[test]
    fn test_missing_entry_ends_fast_mode() {
        let scheduler = PollingScheduler::new(PollingConfig::default());
        scheduler.mark_submitted_at("H", at(0));
        assert_eq!(scheduler.observe_at(None, at(15)), PollingMode::Normal);
    }

    #[tokio::test]
    async fn test_run_ticks_until_shutdown() {
        let scheduler = Arc::new(PollingScheduler::new(PollingConfig {
            normal_interval: Duration::from_millis(20),
            fast_interval: Duration::from_millis(10),
            max_pending: Duration::from_secs(300),
        }));
        let ticks = Arc::new(AtomicUsize::new(0));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = {
            let scheduler = scheduler.clone();
            let ticks = ticks.clone();
            tokio::spawn(async move {
                scheduler
                    .run(shutdown_rx, || {
                        let ticks = ticks.clone();
                        async move {
                            ticks.fetch_add(1, Ordering::SeqCst);
                        }
                    })
                    .await;
            })
        };

        tokio::time::sleep(Duration::from_millis(110)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        let count = ticks.load(Ordering::SeqCst);
        assert!(count >= 3, "expected several ticks, got {}", count);

        let stopped_at = ticks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), stopped_at);
    }
}

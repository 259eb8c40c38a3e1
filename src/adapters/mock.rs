//! Scriptable in-memory adapter for tests.

use async_trait::async_trait;
use num_bigint::BigUint;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::adapters::traits::{ChainAdapter, RawTx, SubmitParams, SubmitReceipt};
use crate::error::{AdapterError, AdapterResult};
use crate::ledger::models::Chain;

pub struct MockAdapter {
    chain: Chain,
    transactions: Mutex<AdapterResult<Vec<RawTx>>>,
    block_times: Mutex<HashMap<u64, AdapterResult<i64>>>,
    balance: Mutex<AdapterResult<BigUint>>,
    submit: Mutex<AdapterResult<SubmitReceipt>>,
    latency: Mutex<Duration>,
    pub fetch_calls: AtomicUsize,
    pub block_time_calls: AtomicUsize,
    pub balance_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MockAdapter {
    pub fn new(chain: Chain) -> Self {
        Self {
            chain,
            transactions: Mutex::new(Ok(Vec::new())),
            block_times: Mutex::new(HashMap::new()),
            balance: Mutex::new(Ok(BigUint::from(0u32))),
            submit: Mutex::new(Ok(SubmitReceipt {
                hash: "submitted".to_string(),
            })),
            latency: Mutex::new(Duration::ZERO),
            fetch_calls: AtomicUsize::new(0),
            block_time_calls: AtomicUsize::new(0),
            balance_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_transactions(self, transactions: Vec<RawTx>) -> Self {
        self.set_transactions(Ok(transactions));
        self
    }

    pub fn with_block_time(self, height: u64, time: i64) -> Self {
        self.block_times.lock().insert(height, Ok(time));
        self
    }

    pub fn with_block_time_error(self, height: u64, error: AdapterError) -> Self {
        self.block_times.lock().insert(height, Err(error));
        self
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock() = latency;
        self
    }

    pub fn with_balance(self, balance: u64) -> Self {
        *self.balance.lock() = Ok(BigUint::from(balance));
        self
    }

    pub fn with_submit_result(self, result: AdapterResult<SubmitReceipt>) -> Self {
        *self.submit.lock() = result;
        self
    }

    pub fn set_transactions(&self, result: AdapterResult<Vec<RawTx>>) {
        *self.transactions.lock() = result;
    }

    async fn simulate_call(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChainAdapter for MockAdapter {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn fetch_raw_transactions(&self, _address: &str, limit: usize) -> AdapterResult<Vec<RawTx>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_call().await;
        self.transactions
            .lock()
            .clone()
            .map(|txs| txs.into_iter().take(limit).collect())
    }

    async fn fetch_block_time(&self, height: u64) -> AdapterResult<i64> {
        self.block_time_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_call().await;
        self.block_times
            .lock()
            .get(&height)
            .cloned()
            .unwrap_or_else(|| Err(AdapterError::NotFound(format!("block {}", height))))
    }

    async fn submit_transaction(&self, _params: SubmitParams) -> AdapterResult<SubmitReceipt> {
        self.submit.lock().clone()
    }

    async fn fetch_balance(&self, _address: &str) -> AdapterResult<BigUint> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        self.balance.lock().clone()
    }
}

use async_trait::async_trait;
use num_bigint::{BigInt, BigUint};
use serde::{Deserialize, Serialize};

use crate::error::AdapterResult;
use crate::ledger::models::Chain;

/// Finality of a raw record as reported by its source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawStatus {
    Final,
    Reverted,
    Unconfirmed,
}

/// Unprocessed transaction as returned by an explorer or RPC endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawTx {
    Utxo(UtxoTx),
    EventLog(EventLogTx),
    ObjectModel(ObjectTx),
}

impl RawTx {
    pub fn hash(&self) -> &str {
        match self {
            RawTx::Utxo(tx) => &tx.hash,
            RawTx::EventLog(tx) => &tx.hash,
            RawTx::ObjectModel(tx) => &tx.hash,
        }
    }

    pub fn block_height(&self) -> Option<u64> {
        match self {
            RawTx::Utxo(tx) => tx.block_height,
            RawTx::EventLog(tx) => tx.block_height,
            RawTx::ObjectModel(tx) => tx.block_height,
        }
    }

    pub fn block_time(&self) -> Option<i64> {
        match self {
            RawTx::Utxo(tx) => tx.block_time,
            RawTx::EventLog(tx) => tx.block_time,
            RawTx::ObjectModel(tx) => tx.block_time,
        }
    }

    pub fn status(&self) -> RawStatus {
        match self {
            RawTx::Utxo(tx) => tx.status,
            RawTx::EventLog(tx) => tx.status,
            RawTx::ObjectModel(tx) => tx.status,
        }
    }
}

/// One input or output of a UTXO transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoPart {
    pub address: Option<String>,
    pub value: BigUint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoTx {
    pub hash: String,
    pub inputs: Vec<UtxoPart>,
    pub outputs: Vec<UtxoPart>,
    pub status: RawStatus,
    pub block_height: Option<u64>,
    pub block_time: Option<i64>,
}

/// A candidate transfer inside an account-model transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    /// Index of the message that emitted the event; `None` for fee/ante events
    pub msg_index: Option<u32>,
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub amount: BigUint,
    pub denom: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLogTx {
    pub hash: String,
    /// Account that signed the transaction, when known
    pub signer: Option<String>,
    pub primary_msg_index: Option<u32>,
    pub events: Vec<TransferEvent>,
    pub status: RawStatus,
    pub block_height: Option<u64>,
    pub block_time: Option<i64>,
}

/// Signed balance change of one owner in one coin type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceChange {
    pub owner: Option<String>,
    pub coin_type: String,
    pub amount: BigInt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectTx {
    pub hash: String,
    pub sender: Option<String>,
    pub balance_changes: Vec<BalanceChange>,
    pub status: RawStatus,
    /// Checkpoint sequence number
    pub block_height: Option<u64>,
    pub block_time: Option<i64>,
}

/// What the user meant to send; recorded on the optimistic pending entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferIntent {
    pub recipient: String,
    #[serde(with = "crate::ledger::models::biguint_string")]
    pub amount: BigUint,
}

#[derive(Debug, Clone)]
pub struct SubmitParams {
    /// Fully signed transaction bytes, ready to broadcast
    pub signed_payload: Vec<u8>,
    pub intent: Option<TransferIntent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub hash: String,
}

/// Per-ledger capability the history engine is built on
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain(&self) -> Chain;

    /// At most `limit` recent records touching `address`, roughly newest first
    async fn fetch_raw_transactions(&self, address: &str, limit: usize) -> AdapterResult<Vec<RawTx>>;

    /// Unix seconds of the block at `height`
    async fn fetch_block_time(&self, height: u64) -> AdapterResult<i64>;

    async fn submit_transaction(&self, params: SubmitParams) -> AdapterResult<SubmitReceipt>;

    /// Spendable balance in the chain's base unit
    async fn fetch_balance(&self, address: &str) -> AdapterResult<BigUint>;
}

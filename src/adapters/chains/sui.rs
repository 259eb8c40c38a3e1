use async_trait::async_trait;
use num_bigint::{BigInt, BigUint};
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use tracing::{debug, warn};

use super::{merge_by_hash, parse_amount, parse_height};
use crate::adapters::http::HttpTransport;
use crate::adapters::traits::{
    BalanceChange, ChainAdapter, ObjectTx, RawStatus, RawTx, SubmitParams, SubmitReceipt,
};
use crate::error::{AdapterError, AdapterResult};
use crate::ledger::models::{AssetProfile, Chain};

/// Sui full node JSON-RPC
pub struct SuiRpcAdapter {
    rpc_url: String,
    http: HttpTransport,
}

#[derive(Debug, Deserialize)]
struct TxBlockPage {
    #[serde(default)]
    data: Vec<SuiTxBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiTxBlock {
    pub digest: String,
    #[serde(default)]
    pub timestamp_ms: Option<String>,
    #[serde(default)]
    pub checkpoint: Option<String>,
    #[serde(default)]
    pub effects: Option<SuiEffects>,
    #[serde(default)]
    pub balance_changes: Vec<SuiBalanceChange>,
    #[serde(default)]
    pub transaction: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct SuiEffects {
    pub status: SuiExecutionStatus,
}

#[derive(Debug, Deserialize)]
pub struct SuiExecutionStatus {
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiBalanceChange {
    pub owner: Value,
    pub coin_type: String,
    pub amount: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Checkpoint {
    timestamp_ms: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Balance {
    total_balance: String,
}

#[derive(Debug, Deserialize)]
struct ExecuteReply {
    digest: String,
}

/// Sui needs the transaction bytes and signatures as separate arguments, so
/// the signed payload is this JSON document encoded as UTF-8
#[derive(Debug, Deserialize)]
struct SignedEnvelope {
    tx_bytes: String,
    signatures: Vec<String>,
}

impl SuiRpcAdapter {
    pub fn new(rpc_url: String, http: HttpTransport) -> Self {
        Self { rpc_url, http }
    }

    async fn query(&self, filter: Value, limit: usize) -> AdapterResult<Vec<RawTx>> {
        let page: TxBlockPage = self
            .http
            .rpc_call(
                &self.rpc_url,
                "suix_queryTransactionBlocks",
                json!([
                    {
                        "filter": filter,
                        "options": {
                            "showBalanceChanges": true,
                            "showEffects": true,
                            "showInput": true
                        }
                    },
                    null,
                    limit,
                    true
                ]),
            )
            .await?;

        Ok(decode_page(page))
    }
}

/// Blocks that fail to decode are skipped, the rest of the page is kept
fn decode_page(page: TxBlockPage) -> Vec<RawTx> {
    let mut raws = Vec::with_capacity(page.data.len());
    for block in page.data {
        let digest = block.digest.clone();
        match block.into_raw() {
            Ok(raw) => raws.push(raw),
            Err(e) => warn!("Skipping undecodable Sui tx {}: {}", digest, e),
        }
    }
    raws
}

impl SuiTxBlock {
    pub fn into_raw(self) -> AdapterResult<RawTx> {
        let status = match self.effects.as_ref().map(|e| e.status.status.as_str()) {
            Some("success") => RawStatus::Final,
            Some(_) => RawStatus::Reverted,
            None => RawStatus::Unconfirmed,
        };

        let mut balance_changes = Vec::with_capacity(self.balance_changes.len());
        for change in self.balance_changes {
            let amount = BigInt::from_str(change.amount.trim()).map_err(|_| {
                AdapterError::Network(format!("malformed balance change: {}", change.amount))
            })?;
            balance_changes.push(BalanceChange {
                owner: change
                    .owner
                    .get("AddressOwner")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                coin_type: change.coin_type,
                amount,
            });
        }

        let sender = self
            .transaction
            .as_ref()
            .and_then(|tx| tx.pointer("/data/sender"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let block_time = self
            .timestamp_ms
            .as_deref()
            .and_then(|ms| ms.trim().parse::<i64>().ok())
            .map(|ms| ms / 1000);

        Ok(RawTx::ObjectModel(ObjectTx {
            hash: self.digest,
            sender,
            balance_changes,
            status,
            block_height: self.checkpoint.as_deref().and_then(parse_height),
            block_time,
        }))
    }
}

#[async_trait]
impl ChainAdapter for SuiRpcAdapter {
    fn chain(&self) -> Chain {
        Chain::Sui
    }

    async fn fetch_raw_transactions(&self, address: &str, limit: usize) -> AdapterResult<Vec<RawTx>> {
        let (sent, received) = futures::try_join!(
            self.query(json!({ "FromAddress": address }), limit),
            self.query(json!({ "ToAddress": address }), limit),
        )?;
        debug!(
            "Sui returned {} sent / {} received transactions for {}",
            sent.len(),
            received.len(),
            address
        );

        Ok(merge_by_hash(sent, received, limit))
    }

    async fn fetch_block_time(&self, height: u64) -> AdapterResult<i64> {
        let checkpoint: Checkpoint = self
            .http
            .rpc_call(&self.rpc_url, "sui_getCheckpoint", json!([height.to_string()]))
            .await?;

        checkpoint
            .timestamp_ms
            .trim()
            .parse::<i64>()
            .map(|ms| ms / 1000)
            .map_err(|_| AdapterError::NotFound(format!("checkpoint {}", height)))
    }

    async fn submit_transaction(&self, params: SubmitParams) -> AdapterResult<SubmitReceipt> {
        let envelope: SignedEnvelope = serde_json::from_slice(&params.signed_payload)
            .map_err(|e| AdapterError::InvalidParams(format!("signed payload is not a Sui envelope: {}", e)))?;

        let reply: ExecuteReply = self
            .http
            .rpc_call(
                &self.rpc_url,
                "sui_executeTransactionBlock",
                json!([
                    envelope.tx_bytes,
                    envelope.signatures,
                    { "showEffects": true },
                    "WaitForLocalExecution"
                ]),
            )
            .await?;

        Ok(SubmitReceipt { hash: reply.digest })
    }

    async fn fetch_balance(&self, address: &str) -> AdapterResult<BigUint> {
        let balance: Balance = self
            .http
            .rpc_call(
                &self.rpc_url,
                "suix_getBalance",
                json!([address, AssetProfile::native(Chain::Sui).denom]),
            )
            .await?;
        parse_amount(&balance.total_balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_block_conversion() {
        let block: SuiTxBlock = serde_json::from_value(json!({
            "digest": "5xDig",
            "timestampMs": "1700000000123",
            "checkpoint": "1234",
            "effects": { "status": { "status": "success" } },
            "balanceChanges": [
                { "owner": { "AddressOwner": "0xwallet" }, "coinType": "0x2::sui::SUI", "amount": "-1002000" },
                { "owner": { "AddressOwner": "0xfriend" }, "coinType": "0x2::sui::SUI", "amount": "1000000" },
                { "owner": { "ObjectOwner": "0xpool" }, "coinType": "0x2::sui::SUI", "amount": "5" }
            ],
            "transaction": { "data": { "sender": "0xwallet" } }
        }))
        .unwrap();

        match block.into_raw().unwrap() {
            RawTx::ObjectModel(tx) => {
                assert_eq!(tx.sender.as_deref(), Some("0xwallet"));
                assert_eq!(tx.block_time, Some(1_700_000_000));
                assert_eq!(tx.block_height, Some(1234));
                assert_eq!(tx.balance_changes[0].amount, BigInt::from(-1_002_000));
                assert_eq!(tx.balance_changes[2].owner, None);
                assert_eq!(tx.status, RawStatus::Final);
            }
            other => panic!("unexpected shape: {:?}", other),
        }
    }

    #[test]
    fn test_failed_execution_is_reverted() {
        let block: SuiTxBlock = serde_json::from_value(json!({
            "digest": "bad",
            "effects": { "status": { "status": "failure", "error": "InsufficientGas" } }
        }))
        .unwrap();

        assert_eq!(block.into_raw().unwrap().status(), RawStatus::Reverted);
    }

    #[test]
    fn test_bad_block_does_not_sink_the_page() {
        let page: TxBlockPage = serde_json::from_value(json!({
            "data": [
                {
                    "digest": "good",
                    "effects": { "status": { "status": "success" } },
                    "balanceChanges": [
                        { "owner": { "AddressOwner": "0xwallet" }, "coinType": "0x2::sui::SUI", "amount": "7" }
                    ]
                },
                {
                    "digest": "broken",
                    "effects": { "status": { "status": "success" } },
                    "balanceChanges": [
                        { "owner": { "AddressOwner": "0xwallet" }, "coinType": "0x2::sui::SUI", "amount": "lots" }
                    ]
                }
            ]
        }))
        .unwrap();

        let raws = decode_page(page);
        assert_eq!(raws.len(), 1);
        assert_eq!(raws[0].hash(), "good");
    }
}

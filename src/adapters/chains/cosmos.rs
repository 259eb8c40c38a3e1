use async_trait::async_trait;
use base64::Engine;
use chrono::DateTime;
use num_bigint::BigUint;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use tracing::{debug, warn};

use super::{merge_by_hash, parse_amount, parse_height};
use crate::adapters::http::{mentions_insufficient_funds, HttpTransport};
use crate::adapters::traits::{
    ChainAdapter, EventLogTx, RawStatus, RawTx, SubmitParams, SubmitReceipt, TransferEvent,
};
use crate::error::{AdapterError, AdapterResult};
use crate::ledger::models::Chain;

/// Cosmos SDK REST (LCD) gateway
pub struct CosmosLcdAdapter {
    base_url: String,
    denom: String,
    http: HttpTransport,
}

#[derive(Debug, Deserialize)]
struct TxSearchReply {
    #[serde(default)]
    tx_responses: Vec<TxResponse>,
}

#[derive(Debug, Deserialize)]
pub struct TxResponse {
    pub txhash: String,
    pub height: String,
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub logs: Vec<AbciLog>,
    #[serde(default)]
    pub events: Vec<AbciEvent>,
    #[serde(default)]
    pub tx: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct AbciLog {
    #[serde(default)]
    pub msg_index: u32,
    #[serde(default)]
    pub events: Vec<AbciEvent>,
}

#[derive(Debug, Deserialize)]
pub struct AbciEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Vec<AbciAttribute>,
}

#[derive(Debug, Deserialize)]
pub struct AbciAttribute {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BlockReply {
    block: BlockBody,
}

#[derive(Debug, Deserialize)]
struct BlockBody {
    header: BlockHeader,
}

#[derive(Debug, Deserialize)]
struct BlockHeader {
    time: String,
}

#[derive(Debug, Deserialize)]
struct BroadcastReply {
    tx_response: BroadcastResponse,
}

#[derive(Debug, Deserialize)]
struct BroadcastResponse {
    txhash: String,
    #[serde(default)]
    code: u32,
    #[serde(default)]
    raw_log: String,
}

#[derive(Debug, Deserialize)]
struct BalanceReply {
    balance: Coin,
}

#[derive(Debug, Deserialize)]
struct Coin {
    amount: String,
}

impl CosmosLcdAdapter {
    pub fn new(base_url: String, denom: String, http: HttpTransport) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            denom,
            http,
        }
    }

    async fn search(&self, condition: String, limit: usize) -> AdapterResult<Vec<RawTx>> {
        let url = format!("{}/cosmos/tx/v1beta1/txs", self.base_url);
        let reply: TxSearchReply = self
            .http
            .get_json_query(
                &url,
                &[
                    ("query", condition),
                    ("pagination.limit", limit.to_string()),
                    ("order_by", "ORDER_BY_DESC".to_string()),
                ],
            )
            .await?;

        let mut raws = Vec::with_capacity(reply.tx_responses.len());
        for response in reply.tx_responses {
            let hash = response.txhash.clone();
            match response.into_raw() {
                Ok(raw) => raws.push(raw),
                Err(e) => warn!("Skipping undecodable Cosmos tx {}: {}", hash, e),
            }
        }
        Ok(raws)
    }
}

impl TxResponse {
    pub fn into_raw(self) -> AdapterResult<RawTx> {
        let status = if self.code == 0 {
            RawStatus::Final
        } else {
            RawStatus::Reverted
        };

        let block_time = DateTime::parse_from_rfc3339(self.timestamp.trim())
            .ok()
            .map(|time| time.timestamp());

        let signer = self.tx.as_ref().and_then(first_message_signer);
        let events = transfer_events(&self.logs, &self.events)?;

        Ok(RawTx::EventLog(EventLogTx {
            hash: self.txhash,
            signer,
            primary_msg_index: Some(0),
            events,
            status,
            block_height: parse_height(&self.height),
            block_time,
        }))
    }
}

/// Transfers emitted by messages come from the per-message logs; newer SDKs
/// leave logs empty and tag top-level events with a `msg_index` attribute
fn transfer_events(logs: &[AbciLog], top_level: &[AbciEvent]) -> AdapterResult<Vec<TransferEvent>> {
    let mut events = Vec::new();

    let from_logs: Vec<_> = logs.iter().filter(|log| !log.events.is_empty()).collect();
    if !from_logs.is_empty() {
        for log in from_logs {
            for event in log.events.iter().filter(|e| e.kind == "transfer") {
                events.extend(split_transfer(event, Some(log.msg_index))?);
            }
        }
        return Ok(events);
    }

    for event in top_level.iter().filter(|e| e.kind == "transfer") {
        let msg_index = event
            .attributes
            .iter()
            .find(|attr| attr.key == "msg_index")
            .and_then(|attr| attr.value.as_deref())
            .and_then(|value| value.parse::<u32>().ok());
        events.extend(split_transfer(event, msg_index)?);
    }
    Ok(events)
}

/// One transfer event may carry several (recipient, sender, amount) groups,
/// and one amount may list several coins
fn split_transfer(event: &AbciEvent, msg_index: Option<u32>) -> AdapterResult<Vec<TransferEvent>> {
    #[derive(Default)]
    struct Group {
        recipient: Option<String>,
        sender: Option<String>,
        amount: Option<String>,
    }

    let mut groups = Vec::new();
    let mut current = Group::default();
    for attr in &event.attributes {
        let value = attr.value.clone();
        let slot = match attr.key.as_str() {
            "recipient" => &mut current.recipient,
            "sender" => &mut current.sender,
            "amount" => &mut current.amount,
            _ => continue,
        };
        if slot.is_some() {
            groups.push(std::mem::take(&mut current));
            match attr.key.as_str() {
                "recipient" => current.recipient = value,
                "sender" => current.sender = value,
                _ => current.amount = value,
            }
        } else {
            *slot = value;
        }
    }
    groups.push(current);

    let mut transfers = Vec::new();
    for group in groups {
        let Some(amount) = group.amount else { continue };
        for coin in amount.split(',').map(str::trim).filter(|c| !c.is_empty()) {
            let (value, denom) = split_coin(coin)?;
            transfers.push(TransferEvent {
                msg_index,
                sender: group.sender.clone(),
                recipient: group.recipient.clone(),
                amount: value,
                denom,
            });
        }
    }
    Ok(transfers)
}

/// "1500uatom" -> (1500, "uatom")
fn split_coin(coin: &str) -> AdapterResult<(BigUint, String)> {
    let digits = coin.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 || digits == coin.len() {
        return Err(AdapterError::Network(format!("malformed coin: {}", coin)));
    }
    let value = BigUint::from_str(&coin[..digits])
        .map_err(|_| AdapterError::Network(format!("malformed coin: {}", coin)))?;
    Ok((value, coin[digits..].to_string()))
}

fn first_message_signer(tx: &Value) -> Option<String> {
    let message = tx.pointer("/body/messages/0")?;
    ["from_address", "sender", "delegator_address", "signer"]
        .iter()
        .find_map(|key| message.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

#[async_trait]
impl ChainAdapter for CosmosLcdAdapter {
    fn chain(&self) -> Chain {
        Chain::Cosmos
    }

    async fn fetch_raw_transactions(&self, address: &str, limit: usize) -> AdapterResult<Vec<RawTx>> {
        let (sent, received) = futures::try_join!(
            self.search(format!("transfer.sender='{}'", address), limit),
            self.search(format!("transfer.recipient='{}'", address), limit),
        )?;
        debug!(
            "Cosmos returned {} sent / {} received transactions for {}",
            sent.len(),
            received.len(),
            address
        );

        Ok(merge_by_hash(sent, received, limit))
    }

    async fn fetch_block_time(&self, height: u64) -> AdapterResult<i64> {
        let url = format!("{}/cosmos/base/tendermint/v1beta1/blocks/{}", self.base_url, height);
        let reply: BlockReply = self.http.get_json(&url).await.map_err(|e| match e {
            // The gateway answers 400 for heights past the chain tip
            AdapterError::InvalidParams(message) => AdapterError::NotFound(message),
            other => other,
        })?;

        DateTime::parse_from_rfc3339(&reply.block.header.time)
            .map(|time| time.timestamp())
            .map_err(|_| AdapterError::NotFound(format!("block {} has no usable time", height)))
    }

    async fn submit_transaction(&self, params: SubmitParams) -> AdapterResult<SubmitReceipt> {
        if params.signed_payload.is_empty() {
            return Err(AdapterError::InvalidParams("empty transaction".to_string()));
        }

        let url = format!("{}/cosmos/tx/v1beta1/txs", self.base_url);
        let body = serde_json::json!({
            "tx_bytes": base64::engine::general_purpose::STANDARD.encode(&params.signed_payload),
            "mode": "BROADCAST_MODE_SYNC",
        });

        let reply: BroadcastReply = self.http.post_json(&url, &body).await?;
        let response = reply.tx_response;
        match response.code {
            0 => Ok(SubmitReceipt {
                hash: response.txhash,
            }),
            _ if mentions_insufficient_funds(&response.raw_log) => {
                Err(AdapterError::InsufficientFunds(response.raw_log))
            }
            code => Err(AdapterError::InvalidParams(format!(
                "broadcast rejected with code {}: {}",
                code, response.raw_log
            ))),
        }
    }

    async fn fetch_balance(&self, address: &str) -> AdapterResult<BigUint> {
        let url = format!("{}/cosmos/bank/v1beta1/balances/{}/by_denom", self.base_url, address);
        let reply: BalanceReply = self
            .http
            .get_json_query(&url, &[("denom", self.denom.clone())])
            .await?;
        parse_amount(&reply.balance.amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(key: &str, value: &str) -> serde_json::Value {
        serde_json::json!({ "key": key, "value": value })
    }

    #[test]
    fn test_logs_with_fee_and_multi_coin_transfer() {
        let response: TxResponse = serde_json::from_value(serde_json::json!({
            "txhash": "ABC123",
            "height": "2000",
            "code": 0,
            "timestamp": "2024-03-01T12:00:00Z",
            "logs": [
                {
                    "msg_index": 0,
                    "events": [
                        {
                            "type": "transfer",
                            "attributes": [
                                attr("recipient", "cosmos1shop"),
                                attr("sender", "cosmos1wallet"),
                                attr("amount", "1500uatom,7ibc/27394FB0")
                            ]
                        },
                        { "type": "message", "attributes": [attr("action", "send")] }
                    ]
                }
            ],
            "tx": { "body": { "messages": [ { "from_address": "cosmos1wallet" } ] } }
        }))
        .unwrap();

        match response.into_raw().unwrap() {
            RawTx::EventLog(tx) => {
                assert_eq!(tx.signer.as_deref(), Some("cosmos1wallet"));
                assert_eq!(tx.events.len(), 2);
                assert_eq!(tx.events[0].denom, "uatom");
                assert_eq!(tx.events[0].amount, BigUint::from(1500u32));
                assert_eq!(tx.events[1].denom, "ibc/27394FB0");
                assert!(tx.events.iter().all(|e| e.msg_index == Some(0)));
                assert_eq!(tx.block_time, Some(1709294400));
                assert_eq!(tx.status, RawStatus::Final);
            }
            other => panic!("unexpected shape: {:?}", other),
        }
    }

    #[test]
    fn test_top_level_events_keep_fee_transfers_unindexed() {
        let response: TxResponse = serde_json::from_value(serde_json::json!({
            "txhash": "DEF456",
            "height": "3000",
            "code": 5,
            "timestamp": "",
            "events": [
                {
                    "type": "transfer",
                    "attributes": [
                        attr("recipient", "cosmos1feecollector"),
                        attr("sender", "cosmos1wallet"),
                        attr("amount", "200uatom")
                    ]
                },
                {
                    "type": "transfer",
                    "attributes": [
                        attr("recipient", "cosmos1friend"),
                        attr("sender", "cosmos1wallet"),
                        attr("amount", "9000uatom"),
                        attr("msg_index", "0")
                    ]
                }
            ]
        }))
        .unwrap();

        match response.into_raw().unwrap() {
            RawTx::EventLog(tx) => {
                assert_eq!(tx.events.len(), 2);
                assert_eq!(tx.events[0].msg_index, None);
                assert_eq!(tx.events[1].msg_index, Some(0));
                assert_eq!(tx.block_time, None);
                assert_eq!(tx.status, RawStatus::Reverted);
            }
            other => panic!("unexpected shape: {:?}", other),
        }
    }

    #[test]
    fn test_repeated_groups_in_one_event() {
        let event: AbciEvent = serde_json::from_value(serde_json::json!({
            "type": "transfer",
            "attributes": [
                attr("recipient", "cosmos1a"),
                attr("sender", "cosmos1wallet"),
                attr("amount", "10uatom"),
                attr("recipient", "cosmos1b"),
                attr("sender", "cosmos1wallet"),
                attr("amount", "20uatom")
            ]
        }))
        .unwrap();

        let transfers = split_transfer(&event, Some(1)).unwrap();
        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[1].recipient.as_deref(), Some("cosmos1b"));
        assert_eq!(transfers[1].amount, BigUint::from(20u32));
    }

    #[test]
    fn test_split_coin_rejects_garbage() {
        assert!(split_coin("uatom").is_err());
        assert!(split_coin("123").is_err());
        assert_eq!(split_coin("5uatom").unwrap().1, "uatom");
    }
}

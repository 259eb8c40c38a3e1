use async_trait::async_trait;
use num_bigint::BigUint;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{non_empty, parse_amount, parse_height};
use crate::adapters::http::{mentions_insufficient_funds, HttpTransport};
use crate::adapters::traits::{
    ChainAdapter, EventLogTx, RawStatus, RawTx, SubmitParams, SubmitReceipt, TransferEvent,
};
use crate::error::{AdapterError, AdapterResult};
use crate::ledger::models::{AssetProfile, Chain};

/// Etherscan-compatible explorer API for EVM chains
pub struct EtherscanAdapter {
    base_url: String,
    api_key: String,
    http: HttpTransport,
}

/// Every Etherscan reply wraps its payload the same way; `result` is a
/// message string when `status` is "0"
#[derive(Debug, Deserialize)]
struct EtherscanReply {
    status: String,
    message: String,
    result: Value,
}

#[derive(Debug, Deserialize)]
pub struct EtherscanTx {
    pub hash: String,
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    pub value: String,
    #[serde(rename = "isError", default)]
    pub is_error: String,
    #[serde(rename = "txreceipt_status", default)]
    pub receipt_status: String,
    #[serde(rename = "blockNumber")]
    pub block_number: String,
    #[serde(rename = "timeStamp", default)]
    pub time_stamp: String,
}

#[derive(Debug, Deserialize)]
struct BlockReward {
    #[serde(rename = "timeStamp")]
    time_stamp: String,
}

impl EtherscanAdapter {
    pub fn new(base_url: String, api_key: String, http: HttpTransport) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            http,
        }
    }

    async fn call(&self, params: Vec<(&str, String)>) -> AdapterResult<Value> {
        let url = format!("{}/api", self.base_url);
        let mut query = params;
        if !self.api_key.is_empty() {
            query.push(("apikey", self.api_key.clone()));
        }

        let reply: EtherscanReply = self.http.get_json_query(&url, &query).await?;
        unwrap_reply(reply)
    }
}

fn unwrap_reply(reply: EtherscanReply) -> AdapterResult<Value> {
    if reply.status == "1" {
        return Ok(reply.result);
    }

    let detail = reply.result.as_str().unwrap_or_default().to_string();
    let lowered = format!("{} {}", reply.message, detail).to_ascii_lowercase();
    if lowered.contains("no transactions found") {
        Ok(Value::Array(Vec::new()))
    } else if lowered.contains("rate limit") {
        Err(AdapterError::RateLimited)
    } else if lowered.contains("invalid") {
        Err(AdapterError::InvalidParams(detail))
    } else {
        Err(AdapterError::Network(format!("{}: {}", reply.message, detail)))
    }
}

impl EtherscanTx {
    pub fn into_raw(self) -> AdapterResult<RawTx> {
        let amount = parse_amount(&self.value)?;
        let from = self.from.to_ascii_lowercase();
        let to = non_empty(self.to).map(|to| to.to_ascii_lowercase());

        let status = if self.is_error == "1" || self.receipt_status == "0" {
            RawStatus::Reverted
        } else {
            RawStatus::Final
        };

        Ok(RawTx::EventLog(EventLogTx {
            hash: self.hash,
            signer: Some(from.clone()),
            primary_msg_index: Some(0),
            events: vec![TransferEvent {
                msg_index: Some(0),
                sender: Some(from),
                recipient: to,
                amount,
                denom: AssetProfile::native(Chain::Ethereum).denom,
            }],
            status,
            block_height: parse_height(&self.block_number),
            block_time: self.time_stamp.trim().parse::<i64>().ok(),
        }))
    }
}

/// One bad record is skipped rather than failing the whole page
fn decode_record(record: Value) -> Option<RawTx> {
    let hash = record
        .get("hash")
        .and_then(Value::as_str)
        .unwrap_or("<no hash>")
        .to_string();

    let decoded = serde_json::from_value::<EtherscanTx>(record)
        .map_err(|e| AdapterError::Network(e.to_string()))
        .and_then(EtherscanTx::into_raw);
    match decoded {
        Ok(raw) => Some(raw),
        Err(e) => {
            warn!("Skipping undecodable Etherscan tx {}: {}", hash, e);
            None
        }
    }
}

#[async_trait]
impl ChainAdapter for EtherscanAdapter {
    fn chain(&self) -> Chain {
        Chain::Ethereum
    }

    async fn fetch_raw_transactions(&self, address: &str, limit: usize) -> AdapterResult<Vec<RawTx>> {
        let result = self
            .call(vec![
                ("module", "account".to_string()),
                ("action", "txlist".to_string()),
                ("address", address.to_string()),
                ("page", "1".to_string()),
                ("offset", limit.to_string()),
                ("sort", "desc".to_string()),
            ])
            .await?;

        let records: Vec<Value> = serde_json::from_value(result)
            .map_err(|e| AdapterError::Network(format!("unexpected txlist shape: {}", e)))?;
        debug!("Etherscan returned {} transactions for {}", records.len(), address);

        Ok(records.into_iter().take(limit).filter_map(decode_record).collect())
    }

    async fn fetch_block_time(&self, height: u64) -> AdapterResult<i64> {
        let result = self
            .call(vec![
                ("module", "block".to_string()),
                ("action", "getblockreward".to_string()),
                ("blockno", height.to_string()),
            ])
            .await
            .map_err(|e| match e {
                AdapterError::Network(message) | AdapterError::InvalidParams(message) => {
                    AdapterError::NotFound(format!("block {}: {}", height, message))
                }
                other => other,
            })?;

        let reward: BlockReward = serde_json::from_value(result)
            .map_err(|_| AdapterError::NotFound(format!("block {}", height)))?;
        reward
            .time_stamp
            .trim()
            .parse::<i64>()
            .map_err(|_| AdapterError::NotFound(format!("block {}", height)))
    }

    async fn submit_transaction(&self, params: SubmitParams) -> AdapterResult<SubmitReceipt> {
        if params.signed_payload.is_empty() {
            return Err(AdapterError::InvalidParams("empty transaction".to_string()));
        }

        // The proxy module answers in JSON-RPC form rather than the usual envelope
        let url = format!("{}/api", self.base_url);
        let mut query = vec![
            ("module", "proxy".to_string()),
            ("action", "eth_sendRawTransaction".to_string()),
            ("hex", format!("0x{}", hex::encode(&params.signed_payload))),
        ];
        if !self.api_key.is_empty() {
            query.push(("apikey", self.api_key.clone()));
        }

        let reply: Value = self.http.get_json_query(&url, &query).await?;
        if let Some(hash) = reply.get("result").and_then(Value::as_str) {
            return Ok(SubmitReceipt {
                hash: hash.to_ascii_lowercase(),
            });
        }

        let message = reply
            .pointer("/error/message")
            .and_then(Value::as_str)
            .unwrap_or("unknown broadcast failure")
            .to_string();
        if mentions_insufficient_funds(&message) {
            Err(AdapterError::InsufficientFunds(message))
        } else {
            Err(AdapterError::InvalidParams(message))
        }
    }

    async fn fetch_balance(&self, address: &str) -> AdapterResult<BigUint> {
        let result = self
            .call(vec![
                ("module", "account".to_string()),
                ("action", "balance".to_string()),
                ("address", address.to_string()),
                ("tag", "latest".to_string()),
            ])
            .await?;

        parse_amount(result.as_str().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_txlist_conversion() {
        let tx: EtherscanTx = serde_json::from_value(serde_json::json!({
            "blockNumber": "19000000",
            "timeStamp": "1705000000",
            "hash": "0xabc",
            "from": "0xAAaA000000000000000000000000000000000001",
            "to": "0xbbbb000000000000000000000000000000000002",
            "value": "1000000000000000000",
            "isError": "0",
            "txreceipt_status": "1"
        }))
        .unwrap();

        match tx.into_raw().unwrap() {
            RawTx::EventLog(raw) => {
                assert_eq!(raw.signer.as_deref(), Some("0xaaaa000000000000000000000000000000000001"));
                assert_eq!(raw.events.len(), 1);
                assert_eq!(raw.events[0].denom, "wei");
                assert_eq!(raw.status, RawStatus::Final);
                assert_eq!(raw.block_height, Some(19_000_000));
                assert_eq!(raw.block_time, Some(1_705_000_000));
            }
            other => panic!("unexpected shape: {:?}", other),
        }
    }

    #[test]
    fn test_reverted_and_contract_creation() {
        let tx: EtherscanTx = serde_json::from_value(serde_json::json!({
            "blockNumber": "1",
            "hash": "0xdef",
            "from": "0x01",
            "to": "",
            "value": "0",
            "isError": "1"
        }))
        .unwrap();

        match tx.into_raw().unwrap() {
            RawTx::EventLog(raw) => {
                assert_eq!(raw.status, RawStatus::Reverted);
                assert_eq!(raw.events[0].recipient, None);
                assert_eq!(raw.block_time, None);
            }
            other => panic!("unexpected shape: {:?}", other),
        }
    }

    #[test]
    fn test_reply_envelope() {
        let empty = EtherscanReply {
            status: "0".to_string(),
            message: "No transactions found".to_string(),
            result: Value::Array(vec![]),
        };
        assert_eq!(unwrap_reply(empty).unwrap(), Value::Array(vec![]));

        let throttled = EtherscanReply {
            status: "0".to_string(),
            message: "NOTOK".to_string(),
            result: Value::String("Max rate limit reached".to_string()),
        };
        assert_eq!(unwrap_reply(throttled), Err(AdapterError::RateLimited));
    }

    #[tokio::test]
    async fn test_bad_record_does_not_sink_the_txlist() {
        let reply = serde_json::json!({
            "status": "1",
            "message": "OK",
            "result": [
                {
                    "blockNumber": "19000000",
                    "timeStamp": "1705000000",
                    "hash": "0xgood",
                    "from": "0xaaaa",
                    "to": "0xbbbb",
                    "value": "5",
                    "isError": "0",
                    "txreceipt_status": "1"
                },
                {
                    "blockNumber": "19000001",
                    "hash": "0xbad",
                    "from": "0xaaaa",
                    "to": "0xbbbb",
                    "value": ""
                },
                { "hash": "0xshapeless" }
            ]
        });
        let app = axum::Router::new().route(
            "/api",
            axum::routing::get(move || {
                let reply = reply.clone();
                async move { axum::Json(reply) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let http = HttpTransport::new(std::time::Duration::from_secs(5), 50).unwrap();
        let adapter = EtherscanAdapter::new(format!("http://{}", address), String::new(), http);

        let raws = adapter.fetch_raw_transactions("0xaaaa", 10).await.unwrap();
        assert_eq!(raws.len(), 1);
        assert_eq!(raws[0].hash(), "0xgood");
    }
}

use async_trait::async_trait;
use num_bigint::BigUint;
use serde::Deserialize;
use tracing::debug;

use crate::adapters::http::HttpTransport;
use crate::adapters::traits::{ChainAdapter, RawStatus, RawTx, SubmitParams, SubmitReceipt, UtxoPart, UtxoTx};
use crate::error::{AdapterError, AdapterResult};
use crate::ledger::models::Chain;

/// Esplora-style UTXO explorer (Blockstream, mempool.space)
pub struct EsploraAdapter {
    base_url: String,
    http: HttpTransport,
}

#[derive(Debug, Deserialize)]
pub struct EsploraTx {
    pub txid: String,
    #[serde(default)]
    pub vin: Vec<EsploraVin>,
    #[serde(default)]
    pub vout: Vec<EsploraVout>,
    pub status: EsploraStatus,
}

#[derive(Debug, Deserialize)]
pub struct EsploraVin {
    pub prevout: Option<EsploraVout>,
}

#[derive(Debug, Deserialize)]
pub struct EsploraVout {
    pub scriptpubkey_address: Option<String>,
    pub value: u64,
}

#[derive(Debug, Deserialize)]
pub struct EsploraStatus {
    pub confirmed: bool,
    pub block_height: Option<u64>,
    pub block_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct EsploraAddress {
    chain_stats: EsploraStats,
    mempool_stats: EsploraStats,
}

#[derive(Debug, Deserialize)]
struct EsploraStats {
    funded_txo_sum: u64,
    spent_txo_sum: u64,
}

#[derive(Debug, Deserialize)]
struct EsploraBlock {
    timestamp: i64,
}

impl EsploraAdapter {
    pub fn new(base_url: String, http: HttpTransport) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }
}

impl From<EsploraTx> for RawTx {
    fn from(tx: EsploraTx) -> Self {
        let inputs = tx
            .vin
            .into_iter()
            .filter_map(|vin| vin.prevout)
            .map(|prev| UtxoPart {
                address: prev.scriptpubkey_address,
                value: BigUint::from(prev.value),
            })
            .collect();

        let outputs = tx
            .vout
            .into_iter()
            .map(|out| UtxoPart {
                address: out.scriptpubkey_address,
                value: BigUint::from(out.value),
            })
            .collect();

        let status = if tx.status.confirmed {
            RawStatus::Final
        } else {
            RawStatus::Unconfirmed
        };

        RawTx::Utxo(UtxoTx {
            hash: tx.txid,
            inputs,
            outputs,
            status,
            block_height: tx.status.block_height,
            block_time: tx.status.block_time,
        })
    }
}

#[async_trait]
impl ChainAdapter for EsploraAdapter {
    fn chain(&self) -> Chain {
        Chain::Bitcoin
    }

    async fn fetch_raw_transactions(&self, address: &str, limit: usize) -> AdapterResult<Vec<RawTx>> {
        let url = format!("{}/address/{}/txs", self.base_url, address);
        let txs: Vec<EsploraTx> = self.http.get_json(&url).await?;
        debug!("Esplora returned {} transactions for {}", txs.len(), address);

        Ok(txs.into_iter().take(limit).map(RawTx::from).collect())
    }

    async fn fetch_block_time(&self, height: u64) -> AdapterResult<i64> {
        let url = format!("{}/block-height/{}", self.base_url, height);
        let block_hash = self.http.get_text(&url).await?;
        let block_hash = block_hash.trim();
        if block_hash.is_empty() {
            return Err(AdapterError::NotFound(format!("block {}", height)));
        }

        let url = format!("{}/block/{}", self.base_url, block_hash);
        let block: EsploraBlock = self.http.get_json(&url).await?;
        Ok(block.timestamp)
    }

    async fn submit_transaction(&self, params: SubmitParams) -> AdapterResult<SubmitReceipt> {
        if params.signed_payload.is_empty() {
            return Err(AdapterError::InvalidParams("empty transaction".to_string()));
        }

        let url = format!("{}/tx", self.base_url);
        let txid = self.http.post_text(&url, hex::encode(&params.signed_payload)).await?;
        Ok(SubmitReceipt {
            hash: txid.trim().to_string(),
        })
    }

    async fn fetch_balance(&self, address: &str) -> AdapterResult<BigUint> {
        let url = format!("{}/address/{}", self.base_url, address);
        let info: EsploraAddress = self.http.get_json(&url).await?;

        let funded = info.chain_stats.funded_txo_sum as u128 + info.mempool_stats.funded_txo_sum as u128;
        let spent = info.chain_stats.spent_txo_sum as u128 + info.mempool_stats.spent_txo_sum as u128;
        Ok(BigUint::from(funded.saturating_sub(spent)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_esplora_tx_conversion() {
        let body = serde_json::json!([
            {
                "txid": "f00d",
                "vin": [
                    { "prevout": { "scriptpubkey_address": "bc1qwallet", "value": 150000 } },
                    { "prevout": null, "is_coinbase": true }
                ],
                "vout": [
                    { "scriptpubkey_address": "bc1qshop", "value": 100000 },
                    { "scriptpubkey_address": "bc1qwallet", "value": 49000 },
                    { "scriptpubkey_type": "op_return", "value": 0 }
                ],
                "status": { "confirmed": true, "block_height": 840000, "block_time": 1713571767 }
            },
            {
                "txid": "beef",
                "vin": [],
                "vout": [],
                "status": { "confirmed": false }
            }
        ]);

        let txs: Vec<EsploraTx> = serde_json::from_value(body).unwrap();
        let raws: Vec<RawTx> = txs.into_iter().map(RawTx::from).collect();

        match &raws[0] {
            RawTx::Utxo(tx) => {
                assert_eq!(tx.inputs.len(), 1);
                assert_eq!(tx.outputs.len(), 3);
                assert_eq!(tx.outputs[2].address, None);
                assert_eq!(tx.status, RawStatus::Final);
                assert_eq!(tx.block_time, Some(1713571767));
            }
            other => panic!("unexpected shape: {:?}", other),
        }

        assert_eq!(raws[1].status(), RawStatus::Unconfirmed);
        assert_eq!(raws[1].block_height(), None);
    }
}

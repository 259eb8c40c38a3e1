use std::collections::HashMap;
use tracing::{debug, instrument, warn};

use super::{events, objects, utxo, Attribution, BlockTimeResolver};
use crate::adapters::{ChainAdapter, RawStatus, RawTx};
use crate::error::ReconcileError;
use crate::ledger::models::{
    sort_newest_first, Amount, AssetProfile, Chain, RawRef, Transaction, TxStatus, UNKNOWN_COUNTERPARTY,
};

/// Chain-specific rules the reconciler needs: the base unit, the assets it
/// knows decimals for and how addresses compare.
#[derive(Debug, Clone)]
pub struct ReconcileProfile {
    pub chain: Chain,
    pub base: AssetProfile,
    pub known_assets: Vec<AssetProfile>,
}

impl ReconcileProfile {
    pub fn native(chain: Chain) -> Self {
        Self::with_base(chain, AssetProfile::native(chain))
    }

    /// Overrides the base unit, e.g. a Cosmos zone whose staking denom is not uatom
    pub fn with_base(chain: Chain, base: AssetProfile) -> Self {
        Self {
            chain,
            known_assets: vec![base.clone()],
            base,
        }
    }

    /// Unknown denominations are shown in their smallest unit
    pub fn decimals_for(&self, denom: &str) -> u8 {
        self.known_assets
            .iter()
            .find(|asset| self.same_coin_type(&asset.denom, denom))
            .map(|asset| asset.decimals)
            .unwrap_or(0)
    }

    pub fn same_address(&self, a: &str, b: &str) -> bool {
        match self.chain {
            Chain::Ethereum | Chain::Sui => a.eq_ignore_ascii_case(b),
            Chain::Bitcoin | Chain::Cosmos => a == b,
        }
    }

    /// Move coin types compare by normalized package address, so `0x2::sui::SUI`
    /// equals its zero-padded form.
    pub fn same_coin_type(&self, a: &str, b: &str) -> bool {
        if self.chain != Chain::Sui {
            return a == b;
        }
        normalize_coin_type(a) == normalize_coin_type(b)
    }
}

fn normalize_coin_type(coin_type: &str) -> String {
    match coin_type.split_once("::") {
        Some((address, rest)) => {
            let hex = address.trim_start_matches("0x").trim_start_matches('0');
            format!("0x{}::{}", hex.to_ascii_lowercase(), rest)
        }
        None => coin_type.to_string(),
    }
}

/// Maps raw adapter records onto canonical transactions for one chain
#[derive(Debug, Clone)]
pub struct Reconciler {
    profile: ReconcileProfile,
    resolver: BlockTimeResolver,
}

impl Reconciler {
    pub fn new(profile: ReconcileProfile, resolver: BlockTimeResolver) -> Self {
        Self { profile, resolver }
    }

    pub fn profile(&self) -> &ReconcileProfile {
        &self.profile
    }

    /// Pure mapping of one record. The same inputs always give the same output.
    pub fn reconcile(
        &self,
        raw: &RawTx,
        wallet: &str,
        block_times: &HashMap<u64, i64>,
    ) -> Result<Transaction, ReconcileError> {
        if raw.hash().trim().is_empty() {
            return Err(ReconcileError::Malformed {
                hash: String::new(),
                reason: "missing transaction hash".to_string(),
            });
        }

        let attribution: Attribution = match raw {
            RawTx::Utxo(tx) => utxo::attribute(tx, wallet, &self.profile)?,
            RawTx::EventLog(tx) => events::attribute(tx, wallet, &self.profile)?,
            RawTx::ObjectModel(tx) => objects::attribute(tx, wallet, &self.profile)?,
        };

        let status = match raw.status() {
            RawStatus::Final => TxStatus::Confirmed,
            RawStatus::Reverted => TxStatus::Failed,
            RawStatus::Unconfirmed => TxStatus::Pending,
        };

        let timestamp = raw
            .block_time()
            .or_else(|| raw.block_height().and_then(|height| block_times.get(&height).copied()));

        let decimals = self.profile.decimals_for(&attribution.denom);

        Ok(Transaction {
            hash: raw.hash().to_string(),
            direction: attribution.direction,
            counterparty: attribution
                .counterparty
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| UNKNOWN_COUNTERPARTY.to_string()),
            amount: Amount::new(attribution.amount, &AssetProfile::new(attribution.denom, decimals)),
            status,
            timestamp,
            low_confidence: attribution.low_confidence,
            submitted_at: None,
            raw: RawRef {
                chain: self.profile.chain,
                block_height: raw.block_height(),
            },
        })
    }

    /// Resolves missing block times, reconciles every record and returns them
    /// newest first. Records that fail to reconcile are left out.
    #[instrument(skip(self, adapter, raws), fields(chain = %self.profile.chain, count = raws.len()))]
    pub async fn reconcile_batch(
        &self,
        adapter: &dyn ChainAdapter,
        wallet: &str,
        raws: &[RawTx],
    ) -> Vec<Transaction> {
        let heights = raws
            .iter()
            .filter(|raw| raw.block_time().is_none())
            .filter_map(RawTx::block_height);
        let block_times = self.resolver.resolve(adapter, heights).await;

        let mut transactions = Vec::with_capacity(raws.len());
        for raw in raws {
            match self.reconcile(raw, wallet, &block_times) {
                Ok(tx) => transactions.push(tx),
                Err(ReconcileError::Unattributed(hash)) => {
                    debug!("Skipping {}: wallet not involved", hash);
                }
                Err(e) => {
                    warn!("Skipping record: {}", e);
                }
            }
        }

        sort_newest_first(&mut transactions);
        transactions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::MockAdapter;
    use crate::adapters::traits::{EventLogTx, TransferEvent, UtxoPart, UtxoTx};
    use crate::ledger::models::Direction;
    use num_bigint::BigUint;
    use std::sync::atomic::Ordering;

    const COSMOS_WALLET: &str = "cosmos1wallet";

    fn transfer(msg_index: Option<u32>, sender: &str, recipient: &str, amount: u64) -> TransferEvent {
        TransferEvent {
            msg_index,
            sender: Some(sender.to_string()),
            recipient: Some(recipient.to_string()),
            amount: BigUint::from(amount),
            denom: "uatom".to_string(),
        }
    }

    fn cosmos_tx(hash: &str, height: u64, block_time: Option<i64>, events: Vec<TransferEvent>) -> RawTx {
        RawTx::EventLog(EventLogTx {
            hash: hash.to_string(),
            signer: Some(COSMOS_WALLET.to_string()),
            primary_msg_index: Some(0),
            events,
            status: RawStatus::Final,
            block_height: Some(height),
            block_time,
        })
    }

    fn btc_receive(hash: &str, height: Option<u64>, block_time: Option<i64>) -> RawTx {
        RawTx::Utxo(UtxoTx {
            hash: hash.to_string(),
            inputs: vec![UtxoPart {
                address: Some("bc1qpayer".to_string()),
                value: BigUint::from(10_000u32),
            }],
            outputs: vec![UtxoPart {
                address: Some("bc1qwallet".to_string()),
                value: BigUint::from(9_000u32),
            }],
            status: RawStatus::Final,
            block_height: height,
            block_time,
        })
    }

    fn reconciler(chain: Chain) -> Reconciler {
        Reconciler::new(ReconcileProfile::native(chain), BlockTimeResolver::default())
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let reconciler = reconciler(Chain::Cosmos);
        let raw = cosmos_tx("A", 5, Some(1_700_000_000), vec![transfer(Some(0), COSMOS_WALLET, "cosmos1b", 10)]);
        let times = HashMap::new();

        let first = reconciler.reconcile(&raw, COSMOS_WALLET, &times).unwrap();
        let second = reconciler.reconcile(&raw, COSMOS_WALLET, &times).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.amount.decimals, 6);
        assert_eq!(first.raw.block_height, Some(5));
    }

    #[test]
    fn test_status_mapping_and_unknown_counterparty() {
        let reconciler = reconciler(Chain::Cosmos);
        let raw = RawTx::EventLog(EventLogTx {
            hash: "B".to_string(),
            signer: Some(COSMOS_WALLET.to_string()),
            primary_msg_index: Some(0),
            events: vec![],
            status: RawStatus::Reverted,
            block_height: None,
            block_time: None,
        });

        let tx = reconciler.reconcile(&raw, COSMOS_WALLET, &HashMap::new()).unwrap();
        assert_eq!(tx.status, TxStatus::Failed);
        assert_eq!(tx.direction, Direction::Sent);
        assert_eq!(tx.counterparty, UNKNOWN_COUNTERPARTY);
        assert_eq!(tx.timestamp, None);
    }

    #[test]
    fn test_missing_hash_is_malformed() {
        let reconciler = reconciler(Chain::Bitcoin);
        let raw = btc_receive("  ", Some(1), Some(1));

        assert!(matches!(
            reconciler.reconcile(&raw, "bc1qwallet", &HashMap::new()),
            Err(ReconcileError::Malformed { .. })
        ));
    }

    #[test]
    fn test_sui_coin_type_normalization() {
        let profile = ReconcileProfile::native(Chain::Sui);
        assert!(profile.same_coin_type(
            "0x0000000000000000000000000000000000000000000000000000000000000002::sui::SUI",
            "0x2::sui::SUI"
        ));
        assert_eq!(profile.decimals_for("0x02::sui::SUI"), 9);
        assert_eq!(profile.decimals_for("0xdba3::usdc::USDC"), 0);
        assert!(profile.same_address("0xABC", "0xabc"));
        assert!(!ReconcileProfile::native(Chain::Cosmos).same_address("cosmos1A", "cosmos1a"));
    }

    #[tokio::test]
    async fn test_multi_event_transaction_picks_primary_transfer() {
        // Fee payment and the user's send both touch the wallet
        let reconciler = reconciler(Chain::Cosmos);
        let adapter = MockAdapter::new(Chain::Cosmos);
        let raws = vec![cosmos_tx(
            "MULTI",
            40,
            Some(1_700_000_100),
            vec![
                transfer(None, COSMOS_WALLET, "cosmos1fees", 2_500),
                transfer(Some(0), COSMOS_WALLET, "cosmos1friend", 1_000_000),
                transfer(Some(1), "cosmos1dex", "cosmos1other", 9_000_000),
            ],
        )];

        let transactions = reconciler.reconcile_batch(&adapter, COSMOS_WALLET, &raws).await;
        assert_eq!(transactions.len(), 1);
        let tx = &transactions[0];
        assert_eq!(tx.direction, Direction::Sent);
        assert_eq!(tx.counterparty, "cosmos1friend");
        assert_eq!(tx.amount.value, BigUint::from(1_000_000u32));
    }

    #[tokio::test]
    async fn test_batch_resolves_missing_times_only() {
        let reconciler = reconciler(Chain::Bitcoin);
        let adapter = MockAdapter::new(Chain::Bitcoin).with_block_time(100, 1_600_000_000);
        let raws = vec![
            btc_receive("has-time", Some(99), Some(1_500_000_000)),
            btc_receive("needs-time", Some(100), None),
            btc_receive("unindexed", Some(101), None),
            btc_receive("mempool", None, None),
        ];

        let transactions = reconciler.reconcile_batch(&adapter, "bc1qwallet", &raws).await;
        assert_eq!(adapter.block_time_calls.load(Ordering::SeqCst), 2);

        let by_hash: HashMap<&str, Option<i64>> =
            transactions.iter().map(|tx| (tx.hash.as_str(), tx.timestamp)).collect();
        assert_eq!(by_hash["has-time"], Some(1_500_000_000));
        assert_eq!(by_hash["needs-time"], Some(1_600_000_000));
        assert_eq!(by_hash["unindexed"], None);
        assert_eq!(by_hash["mempool"], None);

        // Untimed records lead, then newest first
        assert!(transactions[0].timestamp.is_none());
        assert!(transactions[1].timestamp.is_none());
        assert_eq!(transactions[2].hash, "needs-time");
        assert_eq!(transactions[3].hash, "has-time");
    }

    #[tokio::test]
    async fn test_batch_drops_unrelated_records() {
        let reconciler = reconciler(Chain::Cosmos);
        let adapter = MockAdapter::new(Chain::Cosmos);
        let foreign = RawTx::EventLog(EventLogTx {
            hash: "FOREIGN".to_string(),
            signer: Some("cosmos1x".to_string()),
            primary_msg_index: Some(0),
            events: vec![transfer(Some(0), "cosmos1x", "cosmos1y", 5)],
            status: RawStatus::Final,
            block_height: Some(1),
            block_time: Some(1),
        });
        let raws = vec![
            foreign,
            cosmos_tx("MINE", 2, Some(2), vec![transfer(Some(0), "cosmos1x", COSMOS_WALLET, 5)]),
        ];

        let transactions = reconciler.reconcile_batch(&adapter, COSMOS_WALLET, &raws).await;
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].hash, "MINE");
        assert_eq!(transactions[0].direction, Direction::Received);
        for tx in &transactions {
            assert!(matches!(tx.direction, Direction::Sent | Direction::Received));
        }
    }
}

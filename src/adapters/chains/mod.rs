pub mod cosmos;
pub mod esplora;
pub mod etherscan;
pub mod sui;

pub use cosmos::CosmosLcdAdapter;
pub use esplora::EsploraAdapter;
pub use etherscan::EtherscanAdapter;
pub use sui::SuiRpcAdapter;

use num_bigint::BigUint;
use std::collections::HashSet;
use std::str::FromStr;

use crate::adapters::traits::RawTx;
use crate::error::{AdapterError, AdapterResult};

/// Merges the outgoing and incoming query results of one address.
/// Duplicates collapse to the first copy; unmined records sort first.
pub(crate) fn merge_by_hash(outgoing: Vec<RawTx>, incoming: Vec<RawTx>, limit: usize) -> Vec<RawTx> {
    let mut seen = HashSet::new();
    let mut merged: Vec<RawTx> = outgoing
        .into_iter()
        .chain(incoming)
        .filter(|tx| seen.insert(tx.hash().to_string()))
        .collect();

    merged.sort_by(|a, b| {
        let a_key = a.block_height().unwrap_or(u64::MAX);
        let b_key = b.block_height().unwrap_or(u64::MAX);
        b_key.cmp(&a_key)
    });
    merged.truncate(limit);
    merged
}

pub(crate) fn parse_amount(raw: &str) -> AdapterResult<BigUint> {
    BigUint::from_str(raw.trim())
        .map_err(|_| AdapterError::Network(format!("backend returned a non-numeric amount: {}", raw)))
}

pub(crate) fn parse_height(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok()
}

pub(crate) fn non_empty(raw: Option<String>) -> Option<String> {
    raw.filter(|value| !value.trim().is_empty())
}

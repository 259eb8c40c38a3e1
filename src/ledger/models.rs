use chrono::{DateTime, Duration, Utc};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Counterparty sentinel used when the other side of a transfer cannot be resolved
pub const UNKNOWN_COUNTERPARTY: &str = "Unknown";

/// Supported ledgers, one per adapter family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Bitcoin,
    Ethereum,
    Cosmos,
    Sui,
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Chain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Bitcoin => "bitcoin",
            Chain::Ethereum => "ethereum",
            Chain::Cosmos => "cosmos",
            Chain::Sui => "sui",
        }
    }

    /// Ticker used as the persisted cache key prefix
    pub fn symbol(&self) -> &'static str {
        match self {
            Chain::Bitcoin => "BTC",
            Chain::Ethereum => "ETH",
            Chain::Cosmos => "ATOM",
            Chain::Sui => "SUI",
        }
    }

    pub fn all() -> Vec<Chain> {
        vec![Chain::Bitcoin, Chain::Ethereum, Chain::Cosmos, Chain::Sui]
    }
}

impl FromStr for Chain {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bitcoin" | "btc" => Ok(Chain::Bitcoin),
            "ethereum" | "eth" => Ok(Chain::Ethereum),
            "cosmos" | "atom" => Ok(Chain::Cosmos),
            "sui" => Ok(Chain::Sui),
            other => Err(AppError::UnsupportedChain(other.to_string())),
        }
    }
}

/// A denomination and its display decimals
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetProfile {
    pub denom: String,
    pub decimals: u8,
}

impl AssetProfile {
    pub fn new(denom: impl Into<String>, decimals: u8) -> Self {
        Self {
            denom: denom.into(),
            decimals,
        }
    }

    /// Base unit of a chain's native asset
    pub fn native(chain: Chain) -> Self {
        match chain {
            Chain::Bitcoin => Self::new("sat", 8),
            Chain::Ethereum => Self::new("wei", 18),
            Chain::Cosmos => Self::new("uatom", 6),
            Chain::Sui => Self::new("0x2::sui::SUI", 9),
        }
    }
}

/// Amount in a denomination's smallest unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    #[serde(with = "biguint_string")]
    pub value: BigUint,
    pub denom: String,
    pub decimals: u8,
}

impl Amount {
    pub fn new(value: BigUint, profile: &AssetProfile) -> Self {
        Self {
            value,
            denom: profile.denom.clone(),
            decimals: profile.decimals,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TxStatus {
    pub fn is_final(&self) -> bool {
        !matches!(self, TxStatus::Pending)
    }
}

/// Back-reference to the source record, enough to build an explorer link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRef {
    pub chain: Chain,
    pub block_height: Option<u64>,
}

/// Canonical, chain-agnostic transaction record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub direction: Direction,
    pub counterparty: String,
    pub amount: Amount,
    pub status: TxStatus,
    /// Unix seconds; `None` when neither the record nor a block lookup had one
    pub timestamp: Option<i64>,
    /// Set when the amount had to be clamped to zero
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub low_confidence: bool,
    /// Unix seconds of local submission, only on optimistic pending records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<i64>,
    pub raw: RawRef,
}

impl Transaction {
    pub fn is_local_pending(&self) -> bool {
        self.status == TxStatus::Pending && self.submitted_at.is_some()
    }
}

/// Cached history of one address, newest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub address: String,
    pub transactions: Vec<Transaction>,
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_fresh_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.fetched_at <= ttl
    }

    pub fn find(&self, hash: &str) -> Option<&Transaction> {
        self.transactions.iter().find(|tx| tx.hash == hash)
    }
}

/// Orders records newest first. Records without a timestamp have not been
/// indexed yet and go ahead of everything else; ties keep their input order.
pub fn sort_newest_first(transactions: &mut [Transaction]) {
    transactions.sort_by(|a, b| {
        let a_key = a.timestamp.unwrap_or(i64::MAX);
        let b_key = b.timestamp.unwrap_or(i64::MAX);
        b_key.cmp(&a_key)
    });
}

/// Serializes arbitrary-precision amounts as decimal strings
pub mod biguint_string {
    use num_bigint::BigUint;
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        let raw = String::deserialize(deserializer)?;
        BigUint::from_str(&raw).map_err(de::Error::custom)
    }
}

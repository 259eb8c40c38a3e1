use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub bind_address: String,
    pub database_url: String,

    // History engine
    pub cache_ttl_secs: u64,
    pub fetch_limit: usize,
    pub request_timeout_secs: u64,
    pub block_time_concurrency: usize,
    pub requests_per_second: u32,

    // Polling cadence
    pub normal_interval_secs: u64,
    pub fast_interval_secs: u64,
    pub max_pending_secs: u64,

    // Chain backends; an empty URL disables the chain
    pub esplora_url: String,
    pub etherscan_url: String,
    pub etherscan_api_key: String,
    pub cosmos_lcd_url: String,
    pub cosmos_denom: String,
    /// Display decimals of `cosmos_denom`
    pub cosmos_decimals: u8,
    pub sui_rpc_url: String,
}

impl Config {
    /// Defaults overridden by environment variables of the same name, upper-cased
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .set_default("bind_address", "0.0.0.0:8080")?
            .set_default("database_url", "sqlite://wallet-history.db?mode=rwc")?
            .set_default("cache_ttl_secs", 300)?
            .set_default("fetch_limit", 50)?
            .set_default("request_timeout_secs", 15)?
            .set_default("block_time_concurrency", 5)?
            .set_default("requests_per_second", 5)?
            .set_default("normal_interval_secs", 30)?
            .set_default("fast_interval_secs", 15)?
            .set_default("max_pending_secs", 300)?
            .set_default("esplora_url", "https://blockstream.info/api")?
            .set_default("etherscan_url", "https://api.etherscan.io")?
            .set_default("etherscan_api_key", "")?
            .set_default("cosmos_lcd_url", "https://cosmos-rest.publicnode.com")?
            .set_default("cosmos_denom", "uatom")?
            .set_default("cosmos_decimals", 6)?
            .set_default("sui_rpc_url", "https://fullnode.mainnet.sui.io:443")?
            .add_source(config::Environment::default().try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn history(&self) -> HistoryConfig {
        HistoryConfig {
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            fetch_limit: self.fetch_limit,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            block_time_concurrency: self.block_time_concurrency.max(1),
        }
    }

    pub fn polling(&self) -> PollingConfig {
        PollingConfig {
            normal_interval: Duration::from_secs(self.normal_interval_secs),
            fast_interval: Duration::from_secs(self.fast_interval_secs),
            max_pending: Duration::from_secs(self.max_pending_secs),
        }
    }
}

/// Settings for fetching, reconciling and caching history
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    pub cache_ttl: Duration,
    pub fetch_limit: usize,
    pub request_timeout: Duration,
    pub block_time_concurrency: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
            fetch_limit: 50,
            request_timeout: Duration::from_secs(15),
            block_time_concurrency: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollingConfig {
    pub normal_interval: Duration,
    pub fast_interval: Duration,
    /// Longest a local submission keeps the scheduler in fast mode
    pub max_pending: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            normal_interval: Duration::from_secs(30),
            fast_interval: Duration::from_secs(15),
            max_pending: Duration::from_secs(300),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_wallet_behaviour() {
        let history = HistoryConfig::default();
        assert_eq!(history.cache_ttl, Duration::from_secs(300));
        assert_eq!(history.block_time_concurrency, 5);

        let polling = PollingConfig::default();
        assert_eq!(polling.normal_interval, Duration::from_secs(30));
        assert_eq!(polling.fast_interval, Duration::from_secs(15));
        assert_eq!(polling.max_pending, Duration::from_secs(300));
    }
}

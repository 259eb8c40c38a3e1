use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::{
    adapters::{
        chains::{CosmosLcdAdapter, EsploraAdapter, EtherscanAdapter, SuiRpcAdapter},
        http::HttpTransport,
        AdapterRegistry,
    },
    api::handler::AppState,
    cache::CacheStore,
    config::Config,
    error::{AppError, AppResult},
    ledger::{
        models::{AssetProfile, Chain},
        SqliteStore,
    },
    reconcile::ReconcileProfile,
    session::SessionManager,
};

/// How often persisted rows past their TTL are deleted
const PRUNE_INTERVAL: Duration = Duration::from_secs(3600);

/// Largest display precision shown for an asset
const MAX_DECIMALS: u8 = 36;

pub async fn initialize_app_state(config: &Config) -> AppResult<AppState> {
    info!("Initializing application components ...");

    let store = SqliteStore::connect(&config.database_url).await?;

    let registry = build_registry(config)?;
    if registry.registered_chains().is_empty() {
        error!("❌ No chain backends configured; every history request will fail");
    }

    let mut sessions = SessionManager::new(
        &registry,
        Some(Arc::new(store.clone()) as Arc<dyn CacheStore>),
        config.history(),
        config.polling(),
    );
    if let Some(profile) = cosmos_profile(config)? {
        sessions = sessions.with_profile(profile);
    }

    info!("📋 Supported chains:");
    for chain in sessions.chains() {
        info!("   {} ({})", chain, chain.symbol());
    }

    spawn_prune_task(store, config.history().cache_ttl);

    Ok(AppState {
        sessions: Arc::new(sessions),
    })
}

/// Reconciliation rules for a Cosmos zone other than the hub defaults
fn cosmos_profile(config: &Config) -> AppResult<Option<ReconcileProfile>> {
    if config.cosmos_decimals > MAX_DECIMALS {
        return Err(AppError::Config(format!(
            "COSMOS_DECIMALS must be at most {}, got {}",
            MAX_DECIMALS, config.cosmos_decimals
        )));
    }

    let base = AssetProfile::new(config.cosmos_denom.clone(), config.cosmos_decimals);
    if base == AssetProfile::native(Chain::Cosmos) {
        return Ok(None);
    }
    Ok(Some(ReconcileProfile::with_base(Chain::Cosmos, base)))
}

fn build_registry(config: &Config) -> AppResult<AdapterRegistry> {
    let timeout = Duration::from_secs(config.request_timeout_secs);
    let transport = || HttpTransport::new(timeout, config.requests_per_second);
    let mut registry = AdapterRegistry::new();

    info!("⚙️  Initializing chain adapters...");

    if !config.esplora_url.is_empty() {
        registry.register(Arc::new(EsploraAdapter::new(config.esplora_url.clone(), transport()?)));
        info!("✅ Esplora adapter registered: {}", config.esplora_url);
    }

    if !config.etherscan_url.is_empty() {
        registry.register(Arc::new(EtherscanAdapter::new(
            config.etherscan_url.clone(),
            config.etherscan_api_key.clone(),
            transport()?,
        )));
        info!("✅ Etherscan adapter registered: {}", config.etherscan_url);
    }

    if !config.cosmos_lcd_url.is_empty() {
        registry.register(Arc::new(CosmosLcdAdapter::new(
            config.cosmos_lcd_url.clone(),
            config.cosmos_denom.clone(),
            transport()?,
        )));
        info!("✅ Cosmos LCD adapter registered: {}", config.cosmos_lcd_url);
    }

    if !config.sui_rpc_url.is_empty() {
        registry.register(Arc::new(SuiRpcAdapter::new(config.sui_rpc_url.clone(), transport()?)));
        info!("✅ Sui RPC adapter registered: {}", config.sui_rpc_url);
    }

    Ok(registry)
}

fn spawn_prune_task(store: SqliteStore, ttl: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            interval.tick().await;

            let Ok(ttl) = chrono::Duration::from_std(ttl) else {
                return;
            };
            if let Err(e) = store.prune_older_than(Utc::now() - ttl).await {
                error!("Failed to prune cached history: {}", e);
            }
        }
    });
    info!("✅ Cache prune task started (hourly)");
}

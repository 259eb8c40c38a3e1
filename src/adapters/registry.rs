use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::adapters::traits::ChainAdapter;
use crate::error::{AppError, AppResult};
use crate::ledger::models::Chain;

pub struct AdapterRegistry {
    adapters: HashMap<Chain, Arc<dyn ChainAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    pub fn register(&mut self, adapter: Arc<dyn ChainAdapter>) {
        let chain = adapter.chain();
        info!("Registering chain adapter: {}", chain);
        self.adapters.insert(chain, adapter);
    }

    pub fn get(&self, chain: Chain) -> AppResult<Arc<dyn ChainAdapter>> {
        self.adapters
            .get(&chain)
            .cloned()
            .ok_or(AppError::AdapterNotFound(chain))
    }

    pub fn supports(&self, chain: Chain) -> bool {
        self.adapters.contains_key(&chain)
    }

    pub fn registered_chains(&self) -> Vec<Chain> {
        let mut chains: Vec<Chain> = self.adapters.keys().copied().collect();
        chains.sort();
        chains
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

use futures::stream::{self, StreamExt};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::adapters::ChainAdapter;
use crate::error::{AdapterError, AdapterResult};

/// Default number of block lookups in flight at once
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Resolves block heights to timestamps for one reconciliation pass.
///
/// Nothing is remembered between calls: the map returned by [`resolve`]
/// is the whole memo, and it lives only as long as the caller keeps it.
///
/// [`resolve`]: BlockTimeResolver::resolve
#[derive(Debug, Clone)]
pub struct BlockTimeResolver {
    concurrency: usize,
    request_timeout: Duration,
}

impl BlockTimeResolver {
    pub fn new(concurrency: usize, request_timeout: Duration) -> Self {
        Self {
            concurrency: concurrency.max(1),
            request_timeout,
        }
    }

    /// Looks up every distinct height once, at most `concurrency` at a time.
    /// Failed lookups are left out of the map.
    pub async fn resolve<I>(&self, adapter: &dyn ChainAdapter, heights: I) -> HashMap<u64, i64>
    where
        I: IntoIterator<Item = u64>,
    {
        let unique: BTreeSet<u64> = heights.into_iter().collect();
        if unique.is_empty() {
            return HashMap::new();
        }

        let requested = unique.len();
        let results: Vec<(u64, AdapterResult<i64>)> = stream::iter(unique)
            .map(|height| async move {
                let result = match timeout(self.request_timeout, adapter.fetch_block_time(height)).await {
                    Ok(result) => result,
                    Err(elapsed) => Err(AdapterError::from(elapsed)),
                };
                (height, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut times = HashMap::with_capacity(results.len());
        for (height, result) in results {
            match result {
                Ok(time) => {
                    times.insert(height, time);
                }
                Err(AdapterError::NotFound(_)) => {
                    debug!("Block {} not indexed yet; leaving its time unresolved", height);
                }
                Err(e) => {
                    warn!("Block time lookup for {} failed: {}", height, e);
                }
            }
        }

        debug!("Resolved {}/{} block times", times.len(), requested);
        times
    }
}

impl Default for BlockTimeResolver {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY, Duration::from_secs(15))
    }
}

use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::ledger::models::{Chain, TxStatus};

/// Change notification for history consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryEvent {
    CacheUpdated {
        chain: Chain,
        address: String,
        count: usize,
        fetched_at: DateTime<Utc>,
    },
    PendingInserted {
        chain: Chain,
        address: String,
        hash: String,
    },
    /// A local submission showed up in a fetch with a final status
    PendingResolved {
        chain: Chain,
        address: String,
        hash: String,
        status: TxStatus,
    },
    BalanceUpdated {
        chain: Chain,
        address: String,
        #[serde(with = "crate::ledger::models::biguint_string")]
        balance: BigUint,
    },
    RefreshFailed {
        chain: Chain,
        address: String,
        reason: String,
    },
}

impl HistoryEvent {
    pub fn chain(&self) -> Chain {
        match self {
            HistoryEvent::CacheUpdated { chain, .. }
            | HistoryEvent::PendingInserted { chain, .. }
            | HistoryEvent::PendingResolved { chain, .. }
            | HistoryEvent::BalanceUpdated { chain, .. }
            | HistoryEvent::RefreshFailed { chain, .. } => *chain,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            HistoryEvent::CacheUpdated { .. } => "cache_updated",
            HistoryEvent::PendingInserted { .. } => "pending_inserted",
            HistoryEvent::PendingResolved { .. } => "pending_resolved",
            HistoryEvent::BalanceUpdated { .. } => "balance_updated",
            HistoryEvent::RefreshFailed { .. } => "refresh_failed",
        }
    }

    pub fn address(&self) -> &str {
        match self {
            HistoryEvent::CacheUpdated { address, .. }
            | HistoryEvent::PendingInserted { address, .. }
            | HistoryEvent::PendingResolved { address, .. }
            | HistoryEvent::BalanceUpdated { address, .. }
            | HistoryEvent::RefreshFailed { address, .. } => address,
        }
    }
}

/// Broadcast channel capacity
const BROADCAST_CAPACITY: usize = 256;

/// Fans history events out to every subscriber; slow subscribers lag, they never block publishers
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<HistoryEvent>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, event: HistoryEvent) {
        debug!("📡 {} for {}:{}", event.kind(), event.chain(), event.address());
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HistoryEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let broadcaster = EventBroadcaster::new();
        let mut rx = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 1);

        broadcaster.publish(HistoryEvent::PendingInserted {
            chain: Chain::Sui,
            address: "0xabc".to_string(),
            hash: "H".to_string(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.chain(), Chain::Sui);
        assert_eq!(event.address(), "0xabc");
    }

    #[test]
    fn test_event_wire_format() {
        let event = HistoryEvent::BalanceUpdated {
            chain: Chain::Ethereum,
            address: "0xabc".to_string(),
            balance: BigUint::from(10u32).pow(20),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "balance_updated");
        assert_eq!(json["chain"], "ethereum");
        assert_eq!(json["balance"], "100000000000000000000");
    }
}

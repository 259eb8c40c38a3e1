use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::adapters::TransferIntent;
use crate::ledger::models::{Chain, Transaction};
use crate::polling::PollingState;
use crate::session::ActiveWallet;

// ========== REQUEST MODELS ==========

/// Make a wallet the active session
#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    pub chain: Chain,
    pub address: String,
}

/// Record a transaction the client broadcast itself
#[derive(Debug, Deserialize)]
pub struct PendingRequest {
    pub hash: String,
    #[serde(default)]
    pub intent: Option<TransferIntent>,
}

/// Broadcast a signed transaction for the active wallet
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub chain: Chain,
    pub address: String,
    /// Base64 encoded, fully signed transaction bytes
    pub signed_tx_base64: String,
    #[serde(default)]
    pub intent: Option<TransferIntent>,
}

/// Optional filter for the event stream
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    pub chain: Option<Chain>,
    pub address: Option<String>,
}

// ========== RESPONSE MODELS ==========

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub chains: Vec<Chain>,
    pub active_wallet: Option<ActiveWallet>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub chain: Chain,
    pub address: String,
    pub polling: PollingState,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub transaction: Transaction,
    pub polling: PollingState,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

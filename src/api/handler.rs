use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use base64::Engine;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use super::models::*;
use crate::{
    adapters::SubmitParams,
    error::{AppError, AppResult},
    ledger::models::{Chain, Transaction},
    polling::PollingState,
    session::{HistoryView, SessionManager},
};

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
}

fn parse_chain(raw: &str) -> AppResult<Chain> {
    raw.parse()
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    let chains = state.sessions.chains();

    Ok(Json(HealthResponse {
        status: if chains.is_empty() {
            "degraded".to_string()
        } else {
            "healthy".to_string()
        },
        timestamp: Utc::now(),
        chains,
        active_wallet: state.sessions.active_wallet(),
    }))
}

/// POST /session/activate
pub async fn activate_session(
    State(state): State<AppState>,
    Json(request): Json<ActivateRequest>,
) -> AppResult<Json<SessionResponse>> {
    info!("👛 Activating {}:{}", request.chain, request.address);

    let session = state.sessions.activate(request.chain, &request.address).await?;

    Ok(Json(SessionResponse {
        chain: session.chain(),
        address: session.address().to_string(),
        polling: state.sessions.polling_state(),
    }))
}

/// POST /session/deactivate
pub async fn deactivate_session(State(state): State<AppState>) -> Json<MessageResponse> {
    state.sessions.deactivate().await;

    Json(MessageResponse {
        message: "No wallet is active".to_string(),
    })
}

/// GET /history/:chain/:address
pub async fn get_history(
    State(state): State<AppState>,
    Path((chain, address)): Path<(String, String)>,
) -> AppResult<Json<HistoryView>> {
    let chain = parse_chain(&chain)?;
    let view = state.sessions.history(chain, &address).await?;
    Ok(Json(view))
}

/// POST /history/:chain/:address/pending
pub async fn record_pending(
    State(state): State<AppState>,
    Path((chain, address)): Path<(String, String)>,
    Json(request): Json<PendingRequest>,
) -> AppResult<(StatusCode, Json<Transaction>)> {
    let chain = parse_chain(&chain)?;
    let pending = state
        .sessions
        .on_submitted(chain, &address, &request.hash, request.intent)
        .await?;

    Ok((StatusCode::CREATED, Json(pending)))
}

/// POST /transactions/submit
pub async fn submit_transaction(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> AppResult<Json<SubmitResponse>> {
    let signed_payload = base64::engine::general_purpose::STANDARD
        .decode(request.signed_tx_base64.trim())
        .map_err(|e| AppError::InvalidInput(format!("Invalid base64: {}", e)))?;
    if signed_payload.is_empty() {
        return Err(AppError::InvalidInput("signed transaction is empty".to_string()));
    }

    info!("📤 Submitting {} byte transaction on {}", signed_payload.len(), request.chain);

    let transaction = state
        .sessions
        .submit(
            request.chain,
            &request.address,
            SubmitParams {
                signed_payload,
                intent: request.intent,
            },
        )
        .await?;

    Ok(Json(SubmitResponse {
        transaction,
        polling: state.sessions.polling_state(),
    }))
}

/// GET /polling
pub async fn get_polling_state(State(state): State<AppState>) -> Json<PollingState> {
    Json(state.sessions.polling_state())
}

/// DELETE /wallet/:chain/:address
pub async fn delete_wallet(
    State(state): State<AppState>,
    Path((chain, address)): Path<(String, String)>,
) -> AppResult<Json<MessageResponse>> {
    let chain = parse_chain(&chain)?;
    state.sessions.delete_wallet(chain, &address).await?;

    Ok(Json(MessageResponse {
        message: format!("Wallet {} removed from {}", address, chain),
    }))
}

/// POST /network/:chain/switch
pub async fn switch_network(
    State(state): State<AppState>,
    Path(chain): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let chain = parse_chain(&chain)?;
    state.sessions.switch_network(chain).await?;

    Ok(Json(MessageResponse {
        message: format!("Cached history for {} cleared", chain),
    }))
}

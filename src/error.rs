use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sqlx::migrate::MigrateError;
use thiserror::Error;

use crate::ledger::models::Chain;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Chain adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported chain: {0}")]
    UnsupportedChain(String),

    #[error("Adapter not registered for {0}")]
    AdapterNotFound(Chain),

    #[error("No active wallet session for {chain}:{address}")]
    InactiveSession { chain: Chain, address: String },
}

/// Errors surfaced by a chain adapter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// Transport failure or timeout; retried on the next tick only
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited by backend")]
    RateLimited,

    /// Expected for blocks the backend has not indexed yet
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),
}

impl From<reqwest::Error> for AdapterError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            AdapterError::Network(format!("request timed out: {}", error))
        } else if error.is_decode() {
            AdapterError::Network(format!("malformed response body: {}", error))
        } else {
            AdapterError::Network(format!("HTTP request error: {}", error))
        }
    }
}

impl From<tokio::time::error::Elapsed> for AdapterError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        AdapterError::Network("request timed out".to_string())
    }
}

/// Per-record reconciliation failures; the record is skipped, never surfaced
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("Transaction {0} does not involve the wallet")]
    Unattributed(String),

    #[error("Malformed transaction {hash}: {reason}")]
    Malformed { hash: String, reason: String },
}

/// Cache persistence errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] MigrateError),

    #[error("Corrupt cache row for {chain}:{address}: {reason}")]
    Corrupt {
        chain: String,
        address: String,
        reason: String,
    },
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            AppError::Adapter(AdapterError::RateLimited) => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                "Chain backend is throttling requests".to_string(),
                None,
            ),
            AppError::Adapter(AdapterError::Network(message)) => (
                StatusCode::BAD_GATEWAY,
                "NETWORK_ERROR",
                format!("Chain backend unreachable: {}", message),
                None,
            ),
            AppError::Adapter(AdapterError::InvalidParams(message)) => (
                StatusCode::BAD_REQUEST,
                "INVALID_PARAMS",
                message,
                None,
            ),
            AppError::Adapter(AdapterError::InsufficientFunds(message)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "INSUFFICIENT_FUNDS",
                message,
                None,
            ),
            AppError::Adapter(AdapterError::NotFound(what)) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("Not found: {}", what),
                None,
            ),
            AppError::InvalidInput(message) => (
                StatusCode::BAD_REQUEST,
                "INVALID_INPUT",
                message,
                None,
            ),
            AppError::UnsupportedChain(chain) => (
                StatusCode::BAD_REQUEST,
                "UNSUPPORTED_CHAIN",
                format!("Chain {} is not supported", chain),
                Some(serde_json::json!({ "chain": chain })),
            ),
            AppError::AdapterNotFound(chain) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "ADAPTER_NOT_FOUND",
                format!("No adapter configured for {}", chain),
                Some(serde_json::json!({ "chain": chain })),
            ),
            AppError::InactiveSession { chain, address } => (
                StatusCode::CONFLICT,
                "INACTIVE_SESSION",
                "Wallet is not the active session".to_string(),
                Some(serde_json::json!({ "chain": chain, "address": address })),
            ),
            AppError::Store(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORE_ERROR",
                "A cache storage error occurred".to_string(),
                None,
            ),
            AppError::Config(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                message,
                None,
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
            details,
        });

        (status, body).into_response()
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> Self {
        AppError::Store(StoreError::Database(error))
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for adapter calls
pub type AdapterResult<T> = Result<T, AdapterError>;

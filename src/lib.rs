//! Wallet transaction history: per-chain adapters, reconciliation into a
//! canonical record, a TTL cache with optimistic pending entries and an
//! adaptive polling loop per active wallet.

pub mod adapters;
pub mod api;
pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod error;
pub mod ledger;
pub mod polling;
pub mod reconcile;
pub mod server;
pub mod session;

pub use error::{AppError, AppResult};

//! Wallet sessions: the refresh pipeline of the active wallet and the manager
//! that switches it.

pub mod manager;
pub mod wallet_session;

pub use manager::SessionManager;
pub use wallet_session::{ActiveWallet, HistoryView, WalletSession};

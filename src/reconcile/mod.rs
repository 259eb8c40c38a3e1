//! Turns chain-specific raw records into canonical [`Transaction`]s.
//!
//! Each ledger family has its own attribution rules (`utxo`, `events`,
//! `objects`); the [`Reconciler`] applies them record by record, fills in
//! missing timestamps through the [`BlockTimeResolver`] and drops anything
//! that cannot be attributed to the wallet.
//!
//! [`Transaction`]: crate::ledger::models::Transaction

pub mod block_time;
pub mod engine;
mod events;
mod objects;
mod utxo;

pub use block_time::BlockTimeResolver;
pub use engine::{ReconcileProfile, Reconciler};

use num_bigint::BigUint;

use crate::ledger::models::Direction;

/// Who moved what, before status and time are attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Attribution {
    pub direction: Direction,
    pub counterparty: Option<String>,
    pub amount: BigUint,
    pub denom: String,
    pub low_confidence: bool,
}

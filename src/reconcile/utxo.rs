use num_bigint::BigUint;
use num_traits::Zero;

use super::{Attribution, ReconcileProfile};
use crate::adapters::traits::{UtxoPart, UtxoTx};
use crate::error::ReconcileError;
use crate::ledger::models::Direction;

fn owned_by(part: &UtxoPart, wallet: &str, profile: &ReconcileProfile) -> bool {
    part.address
        .as_deref()
        .map(|address| profile.same_address(address, wallet))
        .unwrap_or(false)
}

fn first_foreign_address(parts: &[UtxoPart], wallet: &str, profile: &ReconcileProfile) -> Option<String> {
    parts
        .iter()
        .filter_map(|part| part.address.as_deref())
        .find(|address| !profile.same_address(address, wallet))
        .map(str::to_string)
}

/// Spending wallet inputs makes the record Sent, net of change returned to the
/// wallet; otherwise wallet outputs make it Received.
pub(crate) fn attribute(
    tx: &UtxoTx,
    wallet: &str,
    profile: &ReconcileProfile,
) -> Result<Attribution, ReconcileError> {
    let spent: BigUint = tx
        .inputs
        .iter()
        .filter(|part| owned_by(part, wallet, profile))
        .map(|part| &part.value)
        .sum();
    let returned: BigUint = tx
        .outputs
        .iter()
        .filter(|part| owned_by(part, wallet, profile))
        .map(|part| &part.value)
        .sum();

    if !spent.is_zero() {
        let (amount, low_confidence) = if returned > spent {
            (BigUint::zero(), true)
        } else {
            (&spent - &returned, false)
        };

        return Ok(Attribution {
            direction: Direction::Sent,
            counterparty: first_foreign_address(&tx.outputs, wallet, profile),
            amount,
            denom: profile.base.denom.clone(),
            low_confidence,
        });
    }

    if !returned.is_zero() {
        return Ok(Attribution {
            direction: Direction::Received,
            counterparty: first_foreign_address(&tx.inputs, wallet, profile),
            amount: returned,
            denom: profile.base.denom.clone(),
            low_confidence: false,
        });
    }

    Err(ReconcileError::Unattributed(tx.hash.clone()))
}

use num_bigint::BigUint;

use super::{Attribution, ReconcileProfile};
use crate::adapters::traits::{EventLogTx, TransferEvent};
use crate::error::ReconcileError;
use crate::ledger::models::Direction;

fn involves_wallet(event: &TransferEvent, wallet: &str, profile: &ReconcileProfile) -> bool {
    let matches = |side: &Option<String>| {
        side.as_deref()
            .map(|address| profile.same_address(address, wallet))
            .unwrap_or(false)
    };
    matches(&event.sender) || matches(&event.recipient)
}

/// Picks the event that stands for the user's transfer, first match wins:
/// 1. an event of the primary message that involves the wallet
///    (the base-unit one when that message moved several coins),
/// 2. any wallet event in the base unit,
/// 3. the largest base-unit event.
pub(crate) fn select_event<'a>(
    tx: &'a EventLogTx,
    wallet: &str,
    profile: &ReconcileProfile,
) -> Option<&'a TransferEvent> {
    let base = profile.base.denom.as_str();

    if let Some(primary) = tx.primary_msg_index {
        let mut candidates = tx
            .events
            .iter()
            .filter(|e| e.msg_index == Some(primary) && involves_wallet(e, wallet, profile))
            .peekable();
        if let Some(first) = candidates.peek().copied() {
            return Some(candidates.find(|e| e.denom == base).unwrap_or(first));
        }
    }

    if let Some(event) = tx
        .events
        .iter()
        .find(|e| e.denom == base && involves_wallet(e, wallet, profile))
    {
        return Some(event);
    }

    tx.events
        .iter()
        .filter(|e| e.denom == base)
        .fold(None, |best: Option<&TransferEvent>, e| match best {
            Some(current) if current.amount >= e.amount => Some(current),
            _ => Some(e),
        })
}

pub(crate) fn attribute(
    tx: &EventLogTx,
    wallet: &str,
    profile: &ReconcileProfile,
) -> Result<Attribution, ReconcileError> {
    let is_wallet = |side: Option<&str>| side.map(|a| profile.same_address(a, wallet)).unwrap_or(false);
    let signed_by_wallet = is_wallet(tx.signer.as_deref());

    let Some(event) = select_event(tx, wallet, profile) else {
        // Nothing moved, but the wallet still paid for the transaction
        if signed_by_wallet {
            return Ok(Attribution {
                direction: Direction::Sent,
                counterparty: None,
                amount: BigUint::default(),
                denom: profile.base.denom.clone(),
                low_confidence: false,
            });
        }
        return Err(ReconcileError::Unattributed(tx.hash.clone()));
    };

    // Sender wins over recipient so a self-transfer reads as Sent
    let (direction, counterparty) = if is_wallet(event.sender.as_deref()) {
        (Direction::Sent, event.recipient.clone())
    } else if is_wallet(event.recipient.as_deref()) {
        (Direction::Received, event.sender.clone())
    } else if signed_by_wallet {
        (Direction::Sent, event.recipient.clone())
    } else {
        return Err(ReconcileError::Unattributed(tx.hash.clone()));
    };

    Ok(Attribution {
        direction,
        counterparty,
        amount: event.amount.clone(),
        denom: event.denom.clone(),
        low_confidence: false,
    })
}

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::Zero;

use super::{Attribution, ReconcileProfile};
use crate::adapters::traits::{BalanceChange, ObjectTx};
use crate::error::ReconcileError;
use crate::ledger::models::Direction;

/// Net change per coin type for the wallet
fn wallet_changes(tx: &ObjectTx, wallet: &str, profile: &ReconcileProfile) -> Vec<(String, BigInt)> {
    let mut totals: Vec<(String, BigInt)> = Vec::new();
    for change in tx.balance_changes.iter().filter(|c| is_owner(c, wallet, profile)) {
        match totals
            .iter_mut()
            .find(|(coin, _)| profile.same_coin_type(coin, &change.coin_type))
        {
            Some((_, total)) => *total += &change.amount,
            None => totals.push((change.coin_type.clone(), change.amount.clone())),
        }
    }
    totals
}

fn is_owner(change: &BalanceChange, wallet: &str, profile: &ReconcileProfile) -> bool {
    change
        .owner
        .as_deref()
        .map(|owner| profile.same_address(owner, wallet))
        .unwrap_or(false)
}

/// First other owner whose change in `coin` has the given sign
fn opposite_owner(
    tx: &ObjectTx,
    wallet: &str,
    coin: &str,
    sign: Sign,
    profile: &ReconcileProfile,
) -> Option<String> {
    tx.balance_changes
        .iter()
        .filter(|c| !is_owner(c, wallet, profile) && profile.same_coin_type(&c.coin_type, coin))
        .find(|c| c.amount.sign() == sign)
        .and_then(|c| c.owner.clone())
}

/// The wallet's net base-coin change decides the direction; when the base
/// coin did not move, the largest move in another coin does.
pub(crate) fn attribute(
    tx: &ObjectTx,
    wallet: &str,
    profile: &ReconcileProfile,
) -> Result<Attribution, ReconcileError> {
    let changes = wallet_changes(tx, wallet, profile);
    let base = profile.base.denom.as_str();

    let chosen = changes
        .iter()
        .find(|(coin, amount)| profile.same_coin_type(coin, base) && !amount.is_zero())
        .or_else(|| {
            changes
                .iter()
                .filter(|(_, amount)| !amount.is_zero())
                .fold(None, |best: Option<&(String, BigInt)>, entry| match best {
                    Some(current) if current.1.magnitude() >= entry.1.magnitude() => Some(current),
                    _ => Some(entry),
                })
        });

    let signed_by_wallet = tx
        .sender
        .as_deref()
        .map(|sender| profile.same_address(sender, wallet))
        .unwrap_or(false);

    let Some((coin, change)) = chosen else {
        if signed_by_wallet {
            return Ok(Attribution {
                direction: Direction::Sent,
                counterparty: opposite_owner(tx, wallet, base, Sign::Plus, profile),
                amount: BigUint::zero(),
                denom: profile.base.denom.clone(),
                low_confidence: false,
            });
        }
        return Err(ReconcileError::Unattributed(tx.hash.clone()));
    };

    let amount = change.magnitude().clone();
    if change.sign() == Sign::Minus {
        return Ok(Attribution {
            direction: Direction::Sent,
            counterparty: opposite_owner(tx, wallet, coin, Sign::Plus, profile),
            amount,
            denom: coin.clone(),
            low_confidence: false,
        });
    }

    let counterparty = tx
        .sender
        .clone()
        .filter(|_| !signed_by_wallet)
        .or_else(|| opposite_owner(tx, wallet, coin, Sign::Minus, profile));

    Ok(Attribution {
        direction: Direction::Received,
        counterparty,
        amount,
        denom: coin.clone(),
        low_confidence: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::traits::RawStatus;
    use crate::ledger::models::Chain;

    const WALLET: &str = "0xwallet";
    const SUI: &str = "0x2::sui::SUI";

    fn change(owner: &str, coin: &str, amount: i64) -> BalanceChange {
        BalanceChange {
            owner: Some(owner.to_string()),
            coin_type: coin.to_string(),
            amount: BigInt::from(amount),
        }
    }

    fn tx(sender: &str, balance_changes: Vec<BalanceChange>) -> ObjectTx {
        ObjectTx {
            hash: "D1".to_string(),
            sender: Some(sender.to_string()),
            balance_changes,
            status: RawStatus::Final,
            block_height: Some(77),
            block_time: None,
        }
    }

    #[test]
    fn test_outflow_is_sent_to_gaining_owner() {
        let profile = ReconcileProfile::native(Chain::Sui);
        let raw = tx(WALLET, vec![change(WALLET, SUI, -1_002_000), change("0xfriend", SUI, 1_000_000)]);

        let attribution = attribute(&raw, WALLET, &profile).unwrap();
        assert_eq!(attribution.direction, Direction::Sent);
        assert_eq!(attribution.amount, BigUint::from(1_002_000u32));
        assert_eq!(attribution.counterparty.as_deref(), Some("0xfriend"));
    }

    #[test]
    fn test_inflow_credits_sender() {
        let profile = ReconcileProfile::native(Chain::Sui);
        let raw = tx(
            "0xpayer",
            vec![change("0xpayer", SUI, -2_500), change(WALLET, SUI, 2_000)],
        );

        let attribution = attribute(&raw, WALLET, &profile).unwrap();
        assert_eq!(attribution.direction, Direction::Received);
        assert_eq!(attribution.amount, BigUint::from(2_000u32));
        assert_eq!(attribution.counterparty.as_deref(), Some("0xpayer"));
    }

    #[test]
    fn test_coin_type_address_padding_is_ignored() {
        let profile = ReconcileProfile::native(Chain::Sui);
        let padded = "0x0000000000000000000000000000000000000000000000000000000000000002::sui::SUI";
        let raw = tx("0xpayer", vec![change(WALLET, padded, 10)]);

        let attribution = attribute(&raw, WALLET, &profile).unwrap();
        assert_eq!(attribution.direction, Direction::Received);
        assert_eq!(attribution.amount, BigUint::from(10u32));
    }

    #[test]
    fn test_token_only_movement_uses_token() {
        let profile = ReconcileProfile::native(Chain::Sui);
        let usdc = "0xdba3::usdc::USDC";
        let raw = tx("0xpayer", vec![change(WALLET, usdc, 5_000_000), change("0xpayer", usdc, -5_000_000)]);

        let attribution = attribute(&raw, WALLET, &profile).unwrap();
        assert_eq!(attribution.direction, Direction::Received);
        assert_eq!(attribution.denom, usdc);
    }

    #[test]
    fn test_untouched_wallet_is_unattributed() {
        let profile = ReconcileProfile::native(Chain::Sui);
        let raw = tx("0xa", vec![change("0xa", SUI, -5), change("0xb", SUI, 5)]);

        assert!(matches!(
            attribute(&raw, WALLET, &profile),
            Err(ReconcileError::Unattributed(_))
        ));
    }
}

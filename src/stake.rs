//! Stake arithmetic: nominal/wire conversion and taker capacity.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;

/// Convert a nominal stake to wire units.
///
/// Returns `None` for negative stakes or values that do not fit the wire
/// range after scaling.
pub fn stake_to_wire(nominal: Decimal, stake_unit: u128) -> Option<u128> {
    if nominal < Decimal::ZERO {
        return None;
    }
    let unit = Decimal::from_u128(stake_unit)?;
    (nominal * unit).floor().to_u128()
}

/// Convert a wire stake back to nominal units for display.
pub fn wire_to_stake(wire: u128, stake_unit: u128) -> Decimal {
    let wire = Decimal::from_u128(wire).unwrap_or(Decimal::MAX);
    let unit = Decimal::from_u128(stake_unit).unwrap_or(Decimal::ONE);
    if unit.is_zero() {
        return Decimal::ZERO;
    }
    wire / unit
}

/// Remaining taker capacity of a maker order, in wire stake units.
///
/// A maker staking `S` at implied odds `p` fills takers up to
/// `S * (1 - p) / p`. The multiplication happens before the single integer
/// divide so no precision is lost beyond the final truncation.
pub fn remaining_taker_space(
    remaining_maker_stake: u128,
    maker_odds: u128,
    odds_unit: u128,
) -> Option<u128> {
    if maker_odds == 0 || maker_odds >= odds_unit {
        return None;
    }
    let opposite = odds_unit - maker_odds;
    remaining_maker_stake
        .checked_mul(opposite)
        .map(|product| product / maker_odds)
}

//! Wire-odds arithmetic.
//!
//! The venue quotes implied probabilities as integers in `[0, ODDS_UNIT)`,
//! where `ODDS_UNIT` is a power of ten representing 100%. Posted odds must
//! additionally sit on the venue ladder (multiples of the ladder step).

use rust_decimal::prelude::*;
use rust_decimal::Decimal;

use crate::error::OddsError;

/// Basis-point denominator for premium application.
pub const BPS_UNIT: u128 = 10_000;

/// Convert wire odds to an implied probability for display.
///
/// Lossy by contract; never used for order submission.
pub fn implied_of_wire(odds: u128, odds_unit: u128) -> Decimal {
    let odds = Decimal::from_u128(odds).unwrap_or(Decimal::MAX);
    let unit = Decimal::from_u128(odds_unit).unwrap_or(Decimal::MAX);
    if unit.is_zero() {
        return Decimal::ZERO;
    }
    odds / unit
}

/// Convert an implied probability to wire odds.
///
/// Returns `None` when the probability is outside `[0, 1)` or the product
/// does not fit the wire range.
pub fn wire_of_implied(implied: Decimal, odds_unit: u128) -> Option<u128> {
    if implied < Decimal::ZERO || implied >= Decimal::ONE {
        return None;
    }
    let unit = Decimal::from_u128(odds_unit)?;
    (implied * unit).floor().to_u128()
}

/// Round wire odds down to the nearest ladder multiple.
///
/// Fails when the quantized value leaves the open interval `(0, ODDS_UNIT)`,
/// which would not be a postable price.
pub fn quantize_to_ladder(
    odds: u128,
    ladder_step: u128,
    odds_unit: u128,
) -> Result<u128, OddsError> {
    if ladder_step == 0 {
        return Err(OddsError::OffLadder { odds, step: ladder_step });
    }
    let quantized = odds - odds % ladder_step;
    if quantized == 0 || quantized >= odds_unit {
        return Err(OddsError::OutOfRange {
            odds: quantized,
            unit: odds_unit,
        });
    }
    Ok(quantized)
}

/// Whether an odds value sits on the venue ladder.
pub fn is_on_ladder(odds: u128, ladder_step: u128) -> bool {
    ladder_step != 0 && odds % ladder_step == 0
}

/// Apply a maker premium (discount, in basis points) to a taker quote.
///
/// The result is not yet ladder-quantized.
pub fn apply_premium(taker_odds: u128, premium_bps: u32) -> u128 {
    let keep = BPS_UNIT.saturating_sub(premium_bps as u128);
    // Wire odds are bounded well below u128::MAX / BPS_UNIT, so the product
    // cannot overflow with sane venue constants; saturate rather than wrap.
    taker_odds.saturating_mul(keep) / BPS_UNIT
}

/// Compute the maker odds to post for a taker quote: premium, then ladder.
pub fn premium_maker_odds(
    taker_odds: u128,
    premium_bps: u32,
    ladder_step: u128,
    odds_unit: u128,
) -> Result<u128, OddsError> {
    quantize_to_ladder(apply_premium(taker_odds, premium_bps), ladder_step, odds_unit)
}

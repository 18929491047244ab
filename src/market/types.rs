//! Domain types for two-way betting markets.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Venue market identifier.
pub type MarketId = String;

/// Venue order identifier.
pub type OrderId = String;

/// Locally allocated position identifier.
pub type PositionId = u64;

/// One of the two mutually exclusive outcomes of a market.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// First listed outcome.
    #[strum(serialize = "ONE", serialize = "1", to_string = "one")]
    #[default]
    One,
    /// Second listed outcome.
    #[strum(serialize = "TWO", serialize = "2", to_string = "two")]
    Two,
}

impl Outcome {
    /// Get the opposite outcome.
    pub fn opposite(&self) -> Self {
        match self {
            Outcome::One => Outcome::Two,
            Outcome::Two => Outcome::One,
        }
    }

    /// Bucket index for per-side storage.
    pub fn index(&self) -> usize {
        match self {
            Outcome::One => 0,
            Outcome::Two => 1,
        }
    }
}

/// A resting maker order as mirrored from the venue.
///
/// Monetary and odds fields are integers in their wire scale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MakerOrder {
    /// Venue order id.
    pub order_id: OrderId,
    /// Market the order rests in.
    pub market_id: MarketId,
    /// Maker address that posted the order.
    pub maker: String,
    /// Total stake committed, wire units.
    pub total_stake: u128,
    /// Stake already filled, wire units.
    pub filled_stake: u128,
    /// Maker implied odds, wire units.
    pub odds: u128,
    /// Which outcome the maker is betting.
    pub maker_outcome: Outcome,
    /// Venue update time (milliseconds); monotone per order id.
    pub update_time: i64,
}

impl MakerOrder {
    /// Unfilled maker stake remaining on the book.
    pub fn remaining_stake(&self) -> u128 {
        self.total_stake.saturating_sub(self.filled_stake)
    }
}

/// Lifecycle tag carried on an order delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeltaStatus {
    /// Order is live (new or replacement).
    #[strum(serialize = "active", to_string = "ACTIVE")]
    Active,
    /// Order left the book (cancelled, filled out, expired).
    #[strum(serialize = "inactive", to_string = "INACTIVE")]
    Inactive,
}

/// Incremental order-book update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDelta {
    /// Status after this update.
    pub status: DeltaStatus,
    /// Full order fields at this update.
    pub order: MakerOrder,
}

/// Order as serialized on the wire.
///
/// Big integers arrive as strings; accessors parse them and return `None`
/// on malformed input so callers can drop bad entries without failing the
/// whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireOrder {
    /// Venue order id.
    pub order_id: String,
    /// Market id.
    pub market_id: String,
    /// Maker address.
    pub maker: String,
    /// Total stake as a decimal string in wire units.
    pub total_stake: String,
    /// Filled stake as a decimal string in wire units.
    pub filled_stake: String,
    /// Maker odds as a decimal string in wire units.
    pub odds: String,
    /// Whether the maker bets the first outcome.
    pub maker_betting_outcome_one: bool,
    /// Delta status; absent in snapshots (implicitly active).
    #[serde(default)]
    pub status: Option<String>,
    /// Venue update time in milliseconds.
    #[serde(default)]
    pub update_time: Option<i64>,
}

impl WireOrder {
    /// Parse into a typed maker order.
    pub fn to_order(&self) -> Option<MakerOrder> {
        let total_stake = self.total_stake.parse().ok()?;
        let filled_stake = self.filled_stake.parse().ok()?;
        let odds = self.odds.parse().ok()?;
        if self.order_id.is_empty() || filled_stake > total_stake {
            return None;
        }
        Some(MakerOrder {
            order_id: self.order_id.clone(),
            market_id: self.market_id.clone(),
            maker: self.maker.clone(),
            total_stake,
            filled_stake,
            odds,
            maker_outcome: if self.maker_betting_outcome_one {
                Outcome::One
            } else {
                Outcome::Two
            },
            update_time: self.update_time.unwrap_or(0),
        })
    }

    /// Parse into a typed delta. Missing status means `ACTIVE`.
    pub fn to_delta(&self) -> Option<OrderDelta> {
        let status = match self.status.as_deref() {
            None => DeltaStatus::Active,
            Some(s) => s.parse().ok()?,
        };
        Some(OrderDelta {
            status,
            order: self.to_order()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire_order() -> WireOrder {
        WireOrder {
            order_id: "0xabc".to_string(),
            market_id: "mkt-1".to_string(),
            maker: "0xmaker".to_string(),
            total_stake: "50000000".to_string(),
            filled_stake: "0".to_string(),
            odds: "60000000".to_string(),
            maker_betting_outcome_one: false,
            status: Some("ACTIVE".to_string()),
            update_time: Some(1_700_000_000_000),
        }
    }

    #[test]
    fn outcome_opposite_works() {
        assert_eq!(Outcome::One.opposite(), Outcome::Two);
        assert_eq!(Outcome::Two.opposite(), Outcome::One);
    }

    #[test]
    fn outcome_from_string_works() {
        use std::str::FromStr;
        assert_eq!(Outcome::from_str("one").unwrap(), Outcome::One);
        assert_eq!(Outcome::from_str("TWO").unwrap(), Outcome::Two);
        assert_eq!(Outcome::from_str("1").unwrap(), Outcome::One);
    }

    #[test]
    fn wire_order_parses() {
        let order = wire_order().to_order().unwrap();
        assert_eq!(order.total_stake, 50_000_000);
        assert_eq!(order.odds, 60_000_000);
        assert_eq!(order.maker_outcome, Outcome::Two);
        assert_eq!(order.remaining_stake(), 50_000_000);
    }

    #[test]
    fn wire_order_rejects_malformed_numbers() {
        let mut bad = wire_order();
        bad.odds = "not-a-number".to_string();
        assert!(bad.to_order().is_none());
    }

    #[test]
    fn wire_order_rejects_overfilled() {
        let mut bad = wire_order();
        bad.filled_stake = "60000000".to_string();
        assert!(bad.to_order().is_none());
    }

    #[test]
    fn wire_delta_defaults_to_active() {
        let mut wire = wire_order();
        wire.status = None;
        assert_eq!(wire.to_delta().unwrap().status, DeltaStatus::Active);

        wire.status = Some("INACTIVE".to_string());
        assert_eq!(wire.to_delta().unwrap().status, DeltaStatus::Inactive);

        wire.status = Some("garbage".to_string());
        assert!(wire.to_delta().is_none());
    }
}

//! Position records, operator specs, and lifecycle enums.

use std::collections::HashMap;
use std::time::Instant;

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::OffsetDateTime;

use crate::config::Units;
use crate::error::PositionError;
use crate::market::types::{MarketId, OrderId, Outcome, PositionId};
use crate::stake::stake_to_wire;

/// Position lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Subscribing and fetching the first snapshot.
    #[strum(serialize = "initializing")]
    Initializing,
    /// Quoting normally.
    #[strum(serialize = "active")]
    Active,
    /// Suspended by the risk gate.
    #[strum(serialize = "risk_paused")]
    RiskPaused,
    /// Filled to the completion threshold.
    #[strum(serialize = "completed")]
    Completed,
    /// Closed by the operator.
    #[strum(serialize = "closed")]
    Closed,
}

impl Status {
    /// Whether the lifecycle can no longer advance.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Closed)
    }
}

/// State of the position's maker order at the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// No order outstanding.
    #[strum(serialize = "none")]
    None,
    /// An order is resting at the venue.
    #[strum(serialize = "active")]
    Active,
    /// Last order was cancelled.
    #[strum(serialize = "cancelled")]
    Cancelled,
    /// Last post attempt failed; next event retries.
    #[strum(serialize = "error")]
    Error,
}

/// Operator input declaring a position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSpec {
    /// Market to quote in.
    pub market_id: MarketId,
    /// Outcome to bet as maker.
    pub outcome: Outcome,
    /// Maximum stake, nominal units.
    pub max_stake: Decimal,
    /// Discount below the taker quote, basis points.
    pub premium_bps: u32,
    /// Maximum tolerated vig as an implied-probability fraction.
    pub max_vig: Decimal,
    /// Minimum per-side taker liquidity, nominal units.
    pub min_liquidity: Decimal,
    /// Minimum remaining maker stake for best-odds qualification, nominal.
    #[serde(default)]
    pub min_for_odds: Decimal,
    /// Minimum remaining maker stake for vig qualification, nominal.
    #[serde(default)]
    pub min_for_vig: Decimal,
}

impl PositionSpec {
    /// Check operator input before any state mutation.
    pub fn validate(&self) -> Result<(), String> {
        if self.market_id.is_empty() {
            return Err("market_id is required".to_string());
        }
        if self.max_stake <= Decimal::ZERO {
            return Err("max_stake must be positive".to_string());
        }
        if self.premium_bps > 9_999 {
            return Err("premium_bps must be in [0, 9999]".to_string());
        }
        if self.max_vig < Decimal::ZERO || self.max_vig >= Decimal::ONE {
            return Err("max_vig must be in [0, 1)".to_string());
        }
        if self.min_liquidity < Decimal::ZERO {
            return Err("min_liquidity must be non-negative".to_string());
        }
        if self.min_for_odds < Decimal::ZERO || self.min_for_vig < Decimal::ZERO {
            return Err("qualification floors must be non-negative".to_string());
        }
        Ok(())
    }
}

/// Partial update to an existing position's settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PositionPatch {
    /// New maximum stake, nominal units.
    #[serde(default)]
    pub max_stake: Option<Decimal>,
    /// New premium, basis points.
    #[serde(default)]
    pub premium_bps: Option<u32>,
    /// New vig ceiling.
    #[serde(default)]
    pub max_vig: Option<Decimal>,
    /// New liquidity floor, nominal units.
    #[serde(default)]
    pub min_liquidity: Option<Decimal>,
    /// New best-odds qualification floor, nominal units.
    #[serde(default)]
    pub min_for_odds: Option<Decimal>,
    /// New vig qualification floor, nominal units.
    #[serde(default)]
    pub min_for_vig: Option<Decimal>,
}

/// A declared position with its order state and fill accounting.
///
/// All monetary fields are wire integers; every mutation goes through the
/// position's serializer lane.
#[derive(Debug, Clone)]
pub struct Position {
    /// Local identifier.
    pub id: PositionId,
    /// Market being quoted.
    pub market_id: MarketId,
    /// Outcome bet as maker.
    pub outcome: Outcome,
    /// Maximum stake, wire units.
    pub max_stake: u128,
    /// Total credited fills, wire units; monotone non-decreasing.
    pub filled_stake: u128,
    /// Discount below the taker quote, basis points.
    pub premium_bps: u32,
    /// Vig ceiling, wire odds units.
    pub max_vig: i128,
    /// Per-side liquidity floor, wire stake units.
    pub min_liquidity: u128,
    /// Best-odds qualification floor, wire stake units.
    pub min_for_odds: u128,
    /// Vig qualification floor, wire stake units.
    pub min_for_vig: u128,
    /// Fill level at which the position counts as complete, wire units.
    pub complete_threshold: u128,
    /// Lifecycle.
    pub status: Status,
    /// Venue order state.
    pub order_status: OrderStatus,
    /// Id of the resting order, if any.
    pub active_order_id: Option<OrderId>,
    /// Stake the resting order was posted with, wire units.
    pub active_order_stake: u128,
    /// Fills credited against the resting order, wire units.
    pub active_order_filled: u128,
    /// Maker odds of the last posted order, wire units.
    pub last_posted_odds: Option<u128>,
    /// Whether the risk gate is currently tripped.
    pub risk_breached: bool,
    /// Absolute fill level credited per order id (idempotence).
    pub credited_fills: HashMap<OrderId, u128>,
    /// Last observed best taker quote for our outcome, for display.
    pub last_best_taker_odds: Option<u128>,
    /// Last observed vig, for display.
    pub last_vig: Option<i128>,
    /// Timestamp of the last post/cancel, for rate limiting.
    pub last_order_action: Option<Instant>,
    /// Creation time.
    pub created_at: OffsetDateTime,
    /// Close time, once closed.
    pub closed_at: Option<OffsetDateTime>,
}

impl Position {
    /// Build a position from a validated operator spec.
    pub fn from_spec(
        id: PositionId,
        spec: &PositionSpec,
        units: Units,
        complete_fraction: Decimal,
    ) -> Result<Self, PositionError> {
        spec.validate().map_err(PositionError::InvalidSpec)?;

        let max_stake = stake_to_wire(spec.max_stake, units.stake_unit)
            .ok_or_else(|| PositionError::InvalidSpec("max_stake out of range".to_string()))?;
        if max_stake == 0 {
            return Err(PositionError::InvalidSpec(
                "max_stake rounds to zero wire units".to_string(),
            ));
        }

        let min_liquidity = stake_to_wire(spec.min_liquidity, units.stake_unit)
            .ok_or_else(|| PositionError::InvalidSpec("min_liquidity out of range".to_string()))?;
        let min_for_odds = stake_to_wire(spec.min_for_odds, units.stake_unit)
            .ok_or_else(|| PositionError::InvalidSpec("min_for_odds out of range".to_string()))?;
        let min_for_vig = stake_to_wire(spec.min_for_vig, units.stake_unit)
            .ok_or_else(|| PositionError::InvalidSpec("min_for_vig out of range".to_string()))?;

        let max_vig = vig_to_wire(spec.max_vig, units.odds_unit)
            .ok_or_else(|| PositionError::InvalidSpec("max_vig out of range".to_string()))?;
        let complete_threshold = complete_threshold(max_stake, complete_fraction)
            .ok_or_else(|| PositionError::InvalidSpec("complete_fraction out of range".into()))?;

        Ok(Self {
            id,
            market_id: spec.market_id.clone(),
            outcome: spec.outcome,
            max_stake,
            filled_stake: 0,
            premium_bps: spec.premium_bps,
            max_vig,
            min_liquidity,
            min_for_odds,
            min_for_vig,
            complete_threshold,
            status: Status::Initializing,
            order_status: OrderStatus::None,
            active_order_id: None,
            active_order_stake: 0,
            active_order_filled: 0,
            last_posted_odds: None,
            risk_breached: false,
            credited_fills: HashMap::new(),
            last_best_taker_odds: None,
            last_vig: None,
            last_order_action: None,
            created_at: OffsetDateTime::now_utc(),
            closed_at: None,
        })
    }

    /// Stake still to fill, wire units.
    pub fn remaining_stake(&self) -> u128 {
        self.max_stake.saturating_sub(self.filled_stake)
    }

    /// Whether fills have reached the completion threshold.
    pub fn is_complete(&self) -> bool {
        self.filled_stake >= self.complete_threshold
    }

    /// Unfilled remainder of the resting order, wire units.
    pub fn active_order_remainder(&self) -> u128 {
        self.active_order_stake.saturating_sub(self.active_order_filled)
    }

    /// Apply an operator patch, re-deriving wire-scale bounds.
    pub fn apply_patch(
        &mut self,
        patch: &PositionPatch,
        units: Units,
        complete_fraction: Decimal,
    ) -> Result<(), PositionError> {
        if let Some(max_stake) = patch.max_stake {
            if max_stake <= Decimal::ZERO {
                return Err(PositionError::InvalidSpec(
                    "max_stake must be positive".to_string(),
                ));
            }
            let wire = stake_to_wire(max_stake, units.stake_unit)
                .ok_or_else(|| PositionError::InvalidSpec("max_stake out of range".to_string()))?;
            self.max_stake = wire;
            self.complete_threshold = complete_threshold(wire, complete_fraction)
                .ok_or_else(|| PositionError::InvalidSpec("complete_fraction out of range".into()))?;
        }
        if let Some(premium_bps) = patch.premium_bps {
            if premium_bps > 9_999 {
                return Err(PositionError::InvalidSpec(
                    "premium_bps must be in [0, 9999]".to_string(),
                ));
            }
            self.premium_bps = premium_bps;
        }
        if let Some(max_vig) = patch.max_vig {
            self.max_vig = vig_to_wire(max_vig, units.odds_unit)
                .ok_or_else(|| PositionError::InvalidSpec("max_vig out of range".to_string()))?;
        }
        if let Some(min_liquidity) = patch.min_liquidity {
            self.min_liquidity = stake_to_wire(min_liquidity, units.stake_unit).ok_or_else(|| {
                PositionError::InvalidSpec("min_liquidity out of range".to_string())
            })?;
        }
        if let Some(min_for_odds) = patch.min_for_odds {
            self.min_for_odds = stake_to_wire(min_for_odds, units.stake_unit).ok_or_else(|| {
                PositionError::InvalidSpec("min_for_odds out of range".to_string())
            })?;
        }
        if let Some(min_for_vig) = patch.min_for_vig {
            self.min_for_vig = stake_to_wire(min_for_vig, units.stake_unit)
                .ok_or_else(|| PositionError::InvalidSpec("min_for_vig out of range".to_string()))?;
        }
        Ok(())
    }
}

/// Convert a vig fraction to signed wire odds units.
fn vig_to_wire(vig: Decimal, odds_unit: u128) -> Option<i128> {
    let unit = Decimal::from_u128(odds_unit)?;
    (vig * unit).floor().to_i128()
}

/// Threshold in wire units at which fills count as completion.
fn complete_threshold(max_stake: u128, fraction: Decimal) -> Option<u128> {
    let max = Decimal::from_u128(max_stake)?;
    (max * fraction).floor().to_u128()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const UNITS: Units = Units {
        odds_unit: 100_000_000,
        ladder_step: 250_000,
        stake_unit: 1_000_000,
    };

    fn spec() -> PositionSpec {
        PositionSpec {
            market_id: "mkt-1".to_string(),
            outcome: Outcome::One,
            max_stake: dec!(50),
            premium_bps: 1_000,
            max_vig: dec!(0.10),
            min_liquidity: dec!(10),
            min_for_odds: dec!(1),
            min_for_vig: dec!(1),
        }
    }

    #[test]
    fn spec_validation_rejects_bad_input() {
        let mut s = spec();
        s.max_stake = dec!(0);
        assert!(s.validate().is_err());

        let mut s = spec();
        s.premium_bps = 10_000;
        assert!(s.validate().is_err());

        let mut s = spec();
        s.max_vig = dec!(1);
        assert!(s.validate().is_err());

        let mut s = spec();
        s.market_id = String::new();
        assert!(s.validate().is_err());

        assert!(spec().validate().is_ok());
    }

    #[test]
    fn from_spec_converts_to_wire_scale() {
        let p = Position::from_spec(1, &spec(), UNITS, dec!(0.99)).unwrap();

        assert_eq!(p.max_stake, 50_000_000);
        assert_eq!(p.min_liquidity, 10_000_000);
        assert_eq!(p.max_vig, 10_000_000);
        assert_eq!(p.complete_threshold, 49_500_000);
        assert_eq!(p.status, Status::Initializing);
        assert_eq!(p.order_status, OrderStatus::None);
        assert_eq!(p.remaining_stake(), 50_000_000);
        assert!(!p.is_complete());
    }

    #[test]
    fn completion_uses_the_threshold() {
        let mut p = Position::from_spec(1, &spec(), UNITS, dec!(0.99)).unwrap();
        p.filled_stake = 49_400_000;
        assert!(!p.is_complete());
        p.filled_stake = 49_500_000;
        assert!(p.is_complete());
    }

    #[test]
    fn patch_rederives_wire_bounds() {
        let mut p = Position::from_spec(1, &spec(), UNITS, dec!(0.99)).unwrap();
        let patch = PositionPatch {
            max_stake: Some(dec!(100)),
            premium_bps: Some(500),
            max_vig: Some(dec!(0.05)),
            ..Default::default()
        };

        p.apply_patch(&patch, UNITS, dec!(0.99)).unwrap();
        assert_eq!(p.max_stake, 100_000_000);
        assert_eq!(p.complete_threshold, 99_000_000);
        assert_eq!(p.premium_bps, 500);
        assert_eq!(p.max_vig, 5_000_000);
    }

    #[test]
    fn patch_rejects_bad_values() {
        let mut p = Position::from_spec(1, &spec(), UNITS, dec!(0.99)).unwrap();
        let patch = PositionPatch {
            premium_bps: Some(10_000),
            ..Default::default()
        };
        assert!(p.apply_patch(&patch, UNITS, dec!(0.99)).is_err());
    }

    #[test]
    fn status_terminality() {
        assert!(Status::Completed.is_terminal());
        assert!(Status::Closed.is_terminal());
        assert!(!Status::Active.is_terminal());
        assert!(!Status::RiskPaused.is_terminal());
        assert!(!Status::Initializing.is_terminal());
    }
}

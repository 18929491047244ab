//! Per-market projection of live maker orders with derived metrics.

use std::collections::HashMap;

use tracing::warn;

use crate::market::types::{DeltaStatus, MakerOrder, MarketId, OrderDelta, OrderId, Outcome};
use crate::stake::remaining_taker_space;

/// Derived metrics for one market, indexed by the outcome a taker would bet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BookMetrics {
    /// Best taker quote per outcome; `None` when no maker qualifies.
    pub best_taker_odds: [Option<u128>; 2],
    /// Overround: `bestTakerOdds[one] + bestTakerOdds[two] - 1` in wire
    /// units, defined only when both sides have a vig-qualifying best.
    pub vig: Option<i128>,
    /// Remaining taker capacity per outcome, wire stake units. `None` when
    /// the feeding side holds no orders at all (no signal, as opposed to a
    /// measured zero).
    pub liquidity: [Option<u128>; 2],
}

impl BookMetrics {
    /// Best taker quote for a given outcome.
    pub fn best_for(&self, outcome: Outcome) -> Option<u128> {
        self.best_taker_odds[outcome.index()]
    }
}

/// In-memory mirror of a market's active maker orders.
///
/// Orders enter on `ACTIVE` updates and leave on `INACTIVE`. A monotone
/// update time per order id drops reordered duplicates. Our own orders are
/// stored (the monitor needs them for fill detection) but excluded from
/// every derived metric.
#[derive(Debug)]
pub struct MarketBook {
    market_id: MarketId,
    self_maker: String,
    odds_unit: u128,
    /// Live orders bucketed by the outcome the maker bets.
    sides: [HashMap<OrderId, MakerOrder>; 2],
    /// Last applied update time per order id. Entries survive removal so a
    /// stale `ACTIVE` cannot resurrect a cancelled order; cleared on
    /// snapshot.
    update_times: HashMap<OrderId, i64>,
    /// Count of deltas dropped for violating order invariants.
    dropped: u64,
}

impl MarketBook {
    /// Create an empty mirror for a market.
    pub fn new(market_id: MarketId, self_maker: String, odds_unit: u128) -> Self {
        Self {
            market_id,
            self_maker,
            odds_unit,
            sides: [HashMap::new(), HashMap::new()],
            update_times: HashMap::new(),
            dropped: 0,
        }
    }

    /// The market this mirror projects.
    pub fn market_id(&self) -> &str {
        &self.market_id
    }

    /// Number of live orders across both sides.
    pub fn len(&self) -> usize {
        self.sides[0].len() + self.sides[1].len()
    }

    /// Whether the mirror holds no orders.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count of deltas dropped for violating order invariants.
    pub fn dropped_deltas(&self) -> u64 {
        self.dropped
    }

    /// Look up a live order by id.
    pub fn order(&self, order_id: &str) -> Option<&MakerOrder> {
        self.sides[0]
            .get(order_id)
            .or_else(|| self.sides[1].get(order_id))
    }

    /// Iterate our own live orders.
    pub fn self_orders(&self) -> impl Iterator<Item = &MakerOrder> {
        self.sides
            .iter()
            .flat_map(|side| side.values())
            .filter(move |o| o.maker == self.self_maker)
    }

    /// Replace all entries atomically from a snapshot.
    pub fn apply_snapshot(&mut self, orders: Vec<MakerOrder>) {
        self.sides = [HashMap::new(), HashMap::new()];
        self.update_times.clear();
        for order in orders {
            if !self.order_is_sound(&order) {
                self.dropped += 1;
                continue;
            }
            self.update_times
                .insert(order.order_id.clone(), order.update_time);
            self.sides[order.maker_outcome.index()].insert(order.order_id.clone(), order);
        }
    }

    /// Apply an ordered batch of deltas.
    pub fn apply_deltas(&mut self, deltas: &[OrderDelta]) {
        for delta in deltas {
            self.apply_delta(delta);
        }
    }

    fn apply_delta(&mut self, delta: &OrderDelta) {
        let order = &delta.order;

        // Duplicate-hash and reordered updates carry a stale update time.
        if let Some(&seen) = self.update_times.get(&order.order_id) {
            if order.update_time <= seen {
                return;
            }
        }

        match delta.status {
            DeltaStatus::Active => {
                if !self.order_is_sound(order) {
                    warn!(
                        market = %self.market_id,
                        order_id = %order.order_id,
                        "dropping malformed order delta"
                    );
                    self.dropped += 1;
                    return;
                }
                self.update_times
                    .insert(order.order_id.clone(), order.update_time);
                self.remove_everywhere(&order.order_id);
                self.sides[order.maker_outcome.index()]
                    .insert(order.order_id.clone(), order.clone());
            }
            DeltaStatus::Inactive => {
                self.update_times
                    .insert(order.order_id.clone(), order.update_time);
                self.remove_everywhere(&order.order_id);
            }
        }
    }

    fn remove_everywhere(&mut self, order_id: &str) {
        self.sides[0].remove(order_id);
        self.sides[1].remove(order_id);
    }

    fn order_is_sound(&self, order: &MakerOrder) -> bool {
        order.odds >= 1
            && order.odds < self.odds_unit
            && order.filled_stake <= order.total_stake
            && !order.order_id.is_empty()
    }

    /// Best maker odds among orders betting `maker_outcome` with at least
    /// `min_stake` remaining, ignoring our own.
    fn best_maker_odds(&self, maker_outcome: Outcome, min_stake: u128) -> Option<u128> {
        self.sides[maker_outcome.index()]
            .values()
            .filter(|o| o.maker != self.self_maker)
            .filter(|o| o.remaining_stake() >= min_stake)
            .map(|o| o.odds)
            .max()
    }

    /// Compute derived metrics with the given qualification floors
    /// (wire stake units).
    pub fn metrics(&self, min_for_odds: u128, min_for_vig: u128) -> BookMetrics {
        let mut best_taker_odds = [None; 2];
        let mut liquidity = [None; 2];

        for taker_outcome in [Outcome::One, Outcome::Two] {
            let maker_side = taker_outcome.opposite();

            best_taker_odds[taker_outcome.index()] = self
                .best_maker_odds(maker_side, min_for_odds)
                .map(|maker| self.odds_unit - maker);

            let feeders: Vec<&MakerOrder> = self.sides[maker_side.index()]
                .values()
                .filter(|o| o.maker != self.self_maker)
                .collect();
            if !feeders.is_empty() {
                liquidity[taker_outcome.index()] = Some(
                    feeders
                        .iter()
                        .filter_map(|o| {
                            remaining_taker_space(o.remaining_stake(), o.odds, self.odds_unit)
                        })
                        .sum(),
                );
            }
        }

        let vig = match (
            self.best_maker_odds(Outcome::Two, min_for_vig),
            self.best_maker_odds(Outcome::One, min_for_vig),
        ) {
            (Some(maker_two), Some(maker_one)) => {
                let taker_one = (self.odds_unit - maker_two) as i128;
                let taker_two = (self.odds_unit - maker_one) as i128;
                Some(taker_one + taker_two - self.odds_unit as i128)
            }
            _ => None,
        };

        BookMetrics {
            best_taker_odds,
            vig,
            liquidity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNIT: u128 = 100_000_000;
    const SELF: &str = "0xself";

    fn order(id: &str, maker: &str, outcome: Outcome, odds: u128, stake: u128) -> MakerOrder {
        MakerOrder {
            order_id: id.to_string(),
            market_id: "mkt-1".to_string(),
            maker: maker.to_string(),
            total_stake: stake,
            filled_stake: 0,
            odds,
            maker_outcome: outcome,
            update_time: 1,
        }
    }

    fn delta(status: DeltaStatus, order: MakerOrder) -> OrderDelta {
        OrderDelta { status, order }
    }

    fn book() -> MarketBook {
        MarketBook::new("mkt-1".to_string(), SELF.to_string(), UNIT)
    }

    #[test]
    fn snapshot_populates_side_buckets() {
        let mut book = book();
        book.apply_snapshot(vec![
            order("a", "0xm1", Outcome::Two, 60_000_000, 100_000_000),
            order("b", "0xm2", Outcome::One, 35_000_000, 50_000_000),
        ]);

        assert_eq!(book.len(), 2);
        assert!(book.order("a").is_some());
        assert!(book.order("b").is_some());
    }

    #[test]
    fn snapshot_equals_active_deltas() {
        let orders = vec![
            order("a", "0xm1", Outcome::Two, 60_000_000, 100_000_000),
            order("b", "0xm2", Outcome::One, 35_000_000, 50_000_000),
        ];

        let mut via_snapshot = book();
        via_snapshot.apply_snapshot(orders.clone());

        let mut via_deltas = book();
        via_deltas.apply_deltas(
            &orders
                .into_iter()
                .map(|o| delta(DeltaStatus::Active, o))
                .collect::<Vec<_>>(),
        );

        let snap = via_snapshot.metrics(0, 0);
        let inc = via_deltas.metrics(0, 0);
        assert_eq!(snap, inc);
        assert_eq!(via_snapshot.len(), via_deltas.len());
    }

    #[test]
    fn inactive_delta_removes_order() {
        let mut book = book();
        let o = order("a", "0xm1", Outcome::Two, 60_000_000, 100_000_000);
        book.apply_deltas(&[delta(DeltaStatus::Active, o.clone())]);
        assert_eq!(book.len(), 1);

        let mut gone = o;
        gone.update_time = 2;
        book.apply_deltas(&[delta(DeltaStatus::Inactive, gone)]);
        assert!(book.is_empty());
    }

    #[test]
    fn stale_update_time_is_dropped() {
        let mut book = book();
        let mut o = order("a", "0xm1", Outcome::Two, 60_000_000, 100_000_000);
        o.update_time = 5;
        book.apply_deltas(&[delta(DeltaStatus::Active, o.clone())]);

        // Older replacement must not apply.
        let mut stale = o.clone();
        stale.odds = 55_000_000;
        stale.update_time = 4;
        book.apply_deltas(&[delta(DeltaStatus::Active, stale)]);
        assert_eq!(book.order("a").unwrap().odds, 60_000_000);

        // A stale ACTIVE after removal must not resurrect the order.
        let mut gone = o.clone();
        gone.update_time = 6;
        book.apply_deltas(&[delta(DeltaStatus::Inactive, gone)]);
        let mut resurrect = o;
        resurrect.update_time = 5;
        book.apply_deltas(&[delta(DeltaStatus::Active, resurrect)]);
        assert!(book.is_empty());
    }

    #[test]
    fn replacement_switches_side_bucket() {
        let mut book = book();
        let mut o = order("a", "0xm1", Outcome::Two, 60_000_000, 100_000_000);
        book.apply_deltas(&[delta(DeltaStatus::Active, o.clone())]);

        o.maker_outcome = Outcome::One;
        o.update_time = 2;
        book.apply_deltas(&[delta(DeltaStatus::Active, o)]);

        // The order may live in at most one bucket.
        assert_eq!(book.len(), 1);
        assert_eq!(book.order("a").unwrap().maker_outcome, Outcome::One);
    }

    #[test]
    fn malformed_deltas_increment_counter() {
        let mut book = book();
        let mut bad = order("a", "0xm1", Outcome::Two, UNIT, 100); // odds == unit
        bad.update_time = 1;
        book.apply_deltas(&[delta(DeltaStatus::Active, bad)]);
        assert!(book.is_empty());
        assert_eq!(book.dropped_deltas(), 1);
    }

    #[test]
    fn best_taker_odds_derive_from_opposite_side() {
        let mut book = book();
        book.apply_snapshot(vec![
            order("a", "0xm1", Outcome::Two, 60_000_000, 100_000_000),
            order("b", "0xm2", Outcome::Two, 55_000_000, 100_000_000),
        ]);

        let m = book.metrics(0, 0);
        // Takers betting One hit the best Two-side maker: 1 - 0.60 = 0.40.
        assert_eq!(m.best_for(Outcome::One), Some(40_000_000));
        assert_eq!(m.best_for(Outcome::Two), None);
        assert!(m.vig.is_none());
    }

    #[test]
    fn min_for_odds_excludes_small_orders() {
        let mut book = book();
        book.apply_snapshot(vec![
            order("a", "0xm1", Outcome::Two, 60_000_000, 1_000_000),
            order("b", "0xm2", Outcome::Two, 55_000_000, 100_000_000),
        ]);

        // With a 10-unit floor the 1-unit order at 0.60 no longer qualifies.
        let m = book.metrics(10_000_000, 0);
        assert_eq!(m.best_for(Outcome::One), Some(45_000_000));
    }

    #[test]
    fn self_orders_are_excluded_from_metrics() {
        let mut book = book();
        book.apply_snapshot(vec![
            order("a", SELF, Outcome::Two, 70_000_000, 100_000_000),
            order("b", "0xm1", Outcome::Two, 60_000_000, 100_000_000),
        ]);

        let m = book.metrics(0, 0);
        assert_eq!(m.best_for(Outcome::One), Some(40_000_000));
        // Liquidity for One counts only the other maker: 100 * 0.4 / 0.6.
        assert_eq!(m.liquidity[Outcome::One.index()], Some(66_666_666));
        assert_eq!(book.self_orders().count(), 1);
    }

    #[test]
    fn vig_requires_both_sides() {
        let mut book = book();
        book.apply_snapshot(vec![
            order("a", "0xm1", Outcome::Two, 62_000_000, 100_000_000),
            order("b", "0xm2", Outcome::One, 42_000_000, 100_000_000),
        ]);

        let m = book.metrics(0, 0);
        // taker one = 0.38, taker two = 0.58 -> vig = -0.04
        assert_eq!(m.vig, Some(-4_000_000));

        // Raising the vig floor above one side's stake removes it.
        let m = book.metrics(0, 200_000_000);
        assert!(m.vig.is_none());
    }

    #[test]
    fn partial_fills_reduce_liquidity() {
        let mut book = book();
        let mut o = order("a", "0xm1", Outcome::Two, 50_000_000, 100_000_000);
        o.filled_stake = 40_000_000;
        book.apply_snapshot(vec![o]);

        let m = book.metrics(0, 0);
        // 60 remaining at even odds offers 60 of taker space.
        assert_eq!(m.liquidity[Outcome::One.index()], Some(60_000_000));
        // Nothing feeds takers of Two yet: no signal rather than zero.
        assert_eq!(m.liquidity[Outcome::Two.index()], None);
    }
}

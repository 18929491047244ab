//! Market monitor: glue between the order feed, the mirror, and the
//! position controllers attached to a market.
//!
//! One subscription per market, shared and ref-counted across positions.
//! The mirror is updated before any event is dispatched, so controllers
//! always observe metrics computed from a consistent book state.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, info};

use crate::error::AgentError;
use crate::market::types::{MarketId, OrderId, PositionId};
use crate::mirror::{BookMetrics, MarketBook};
use crate::position::controller::{self, Ctx};
use crate::position::serializer::OpQueue;
use crate::position::types::Position;
use crate::transport::{FeedEvent, FeedSubscription, OrderFeed};

/// Recently-cancelled order map with TTL eviction.
///
/// Fills can arrive for an order after we cancelled it locally; this map
/// keeps the order → position routing alive long enough to credit them.
#[derive(Debug)]
pub struct CancelTracker {
    ttl: Duration,
    map: DashMap<OrderId, (PositionId, Instant)>,
}

impl CancelTracker {
    /// Create a tracker with the given entry TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            map: DashMap::new(),
        }
    }

    /// Record a cancelled order for late-fill routing.
    pub fn track(&self, order_id: OrderId, position_id: PositionId) {
        self.sweep();
        self.map.insert(order_id, (position_id, Instant::now()));
    }

    /// Resolve the position a cancelled order belonged to.
    pub fn lookup(&self, order_id: &str) -> Option<PositionId> {
        let entry = self.map.get(order_id)?;
        let (position_id, tracked_at) = *entry;
        drop(entry);
        if tracked_at.elapsed() > self.ttl {
            self.map.remove(order_id);
            return None;
        }
        Some(position_id)
    }

    /// Whether an order id is currently tracked.
    pub fn contains(&self, order_id: &str) -> bool {
        self.lookup(order_id).is_some()
    }

    /// Number of tracked entries (after sweeping).
    pub fn len(&self) -> usize {
        self.sweep();
        self.map.len()
    }

    /// Whether the tracker is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sweep(&self) {
        let ttl = self.ttl;
        self.map.retain(|_, (_, tracked_at)| tracked_at.elapsed() <= ttl);
    }
}

/// Per-market state shared with the feed handler.
struct MarketShared {
    book: RwLock<MarketBook>,
    attached: Mutex<HashSet<PositionId>>,
    /// Last fill level seen per self order. Only advanced once the fill was
    /// routed to a position, so unmatched fills retry on the next event.
    fills_seen: Mutex<HashMap<OrderId, u128>>,
}

struct MarketEntry {
    shared: Arc<MarketShared>,
    sub: FeedSubscription,
}

/// Monitors markets and dispatches events to attached positions.
pub struct MarketMonitor {
    ctx: Arc<Ctx>,
    queue: Arc<OpQueue>,
    feed: Arc<dyn OrderFeed>,
    self_maker: String,
    markets: DashMap<MarketId, MarketEntry>,
}

impl MarketMonitor {
    /// Create a monitor over the given feed.
    pub fn new(
        ctx: Arc<Ctx>,
        queue: Arc<OpQueue>,
        feed: Arc<dyn OrderFeed>,
        self_maker: String,
    ) -> Self {
        Self {
            ctx,
            queue,
            feed,
            self_maker,
            markets: DashMap::new(),
        }
    }

    /// Attach a position to its market: subscribe (shared), snapshot, and
    /// deliver the first market-data event through the serializer.
    pub async fn attach(&self, position: &Position) -> Result<(), AgentError> {
        let market_id = position.market_id.clone();

        let existing = self.markets.get(&market_id).map(|entry| entry.shared.clone());
        let shared = match existing {
            Some(shared) => shared,
            None => {
                let shared = Arc::new(MarketShared {
                    book: RwLock::new(MarketBook::new(
                        market_id.clone(),
                        self.self_maker.clone(),
                        self.ctx.units.odds_unit,
                    )),
                    attached: Mutex::new(HashSet::new()),
                    fills_seen: Mutex::new(HashMap::new()),
                });

                let handler = self.make_handler(shared.clone());
                let sub = self.feed.subscribe(market_id.clone(), handler).await?;
                info!(market = %market_id, "market subscription opened");

                self.markets.insert(
                    market_id.clone(),
                    MarketEntry {
                        shared: shared.clone(),
                        sub,
                    },
                );
                shared
            }
        };

        let orders = self.feed.fetch_snapshot(&market_id).await?;
        {
            let mut book = shared.book.write().expect("book lock");
            let mut seen = shared.fills_seen.lock().expect("fills lock");
            for order in orders.iter().filter(|o| o.maker == self.self_maker) {
                seen.entry(order.order_id.clone())
                    .or_insert(order.filled_stake);
            }
            book.apply_snapshot(orders);
        }

        shared
            .attached
            .lock()
            .expect("attached lock")
            .insert(position.id);

        let book_metrics = {
            let book = shared.book.read().expect("book lock");
            book.metrics(position.min_for_odds, position.min_for_vig)
        };

        let ctx = self.ctx.clone();
        let position_id = position.id;
        self.queue.submit(position_id, async move {
            controller::on_market_data(&ctx, position_id, book_metrics).await;
        });

        Ok(())
    }

    /// Detach a position; drops the market subscription when nothing is
    /// attached anymore.
    pub fn detach(&self, position_id: PositionId, market_id: &str) {
        let now_empty = match self.markets.get(market_id) {
            Some(entry) => {
                let mut attached = entry.shared.attached.lock().expect("attached lock");
                attached.remove(&position_id);
                attached.is_empty()
            }
            None => return,
        };

        if now_empty {
            if let Some((_, entry)) = self.markets.remove(market_id) {
                entry.sub.unsubscribe();
                info!(market = %market_id, "market subscription dropped");
            }
        }
    }

    /// Current metrics for a market, with the given qualification floors.
    pub fn metrics_for(
        &self,
        market_id: &str,
        min_for_odds: u128,
        min_for_vig: u128,
    ) -> Option<BookMetrics> {
        let entry = self.markets.get(market_id)?;
        let book = entry.shared.book.read().expect("book lock");
        Some(book.metrics(min_for_odds, min_for_vig))
    }

    /// Tear down every subscription.
    pub fn shutdown(&self) {
        let market_ids: Vec<MarketId> = self.markets.iter().map(|e| e.key().clone()).collect();
        for market_id in market_ids {
            if let Some((_, entry)) = self.markets.remove(&market_id) {
                entry.sub.unsubscribe();
            }
        }
    }

    fn make_handler(&self, shared: Arc<MarketShared>) -> crate::transport::FeedHandler {
        let ctx = self.ctx.clone();
        let queue = self.queue.clone();
        let self_maker = self.self_maker.clone();

        Arc::new(move |event: FeedEvent| {
            // 1. Update the mirror and collect new fill levels on our
            //    orders, before anything is dispatched.
            let mut fills: Vec<(OrderId, u128)> = Vec::new();
            match event {
                FeedEvent::Snapshot(orders) => {
                    let mut book = shared.book.write().expect("book lock");
                    {
                        let seen = shared.fills_seen.lock().expect("fills lock");
                        for order in orders.iter().filter(|o| o.maker == self_maker) {
                            let prev = seen.get(&order.order_id).copied().unwrap_or(0);
                            if order.filled_stake > prev {
                                fills.push((order.order_id.clone(), order.filled_stake));
                            }
                        }
                    }
                    book.apply_snapshot(orders);
                }
                FeedEvent::Deltas(deltas) => {
                    {
                        let mut book = shared.book.write().expect("book lock");
                        book.apply_deltas(&deltas);
                    }
                    let seen = shared.fills_seen.lock().expect("fills lock");
                    for delta in deltas.iter().filter(|d| d.order.maker == self_maker) {
                        let prev = seen.get(&delta.order.order_id).copied().unwrap_or(0);
                        if delta.order.filled_stake > prev {
                            fills.push((delta.order.order_id.clone(), delta.order.filled_stake));
                        }
                    }
                }
            }

            let attached: Vec<PositionId> = shared
                .attached
                .lock()
                .expect("attached lock")
                .iter()
                .copied()
                .collect();

            // 2. Route fills on our orders to their positions; a fill for a
            //    locally-cancelled order still resolves via the tracker.
            for (order_id, filled_stake) in fills {
                let target = attached
                    .iter()
                    .copied()
                    .find(|pid| {
                        ctx.store
                            .get(*pid)
                            .map(|p| p.active_order_id.as_deref() == Some(order_id.as_str()))
                            .unwrap_or(false)
                    })
                    .or_else(|| ctx.cancels.lookup(&order_id));

                let Some(position_id) = target else {
                    // Post still in flight on the lane; retry next event.
                    debug!(
                        order_id = %crate::utils::truncate_id(&order_id),
                        "unrouted self fill, deferring"
                    );
                    continue;
                };

                shared
                    .fills_seen
                    .lock()
                    .expect("fills lock")
                    .insert(order_id.clone(), filled_stake);

                let book_metrics = match ctx.store.get(position_id) {
                    Some(p) => {
                        let book = shared.book.read().expect("book lock");
                        book.metrics(p.min_for_odds, p.min_for_vig)
                    }
                    None => continue,
                };

                let ctx = ctx.clone();
                queue.submit(position_id, async move {
                    controller::on_fill(&ctx, position_id, order_id, filled_stake, book_metrics)
                        .await;
                });
            }

            // 3. Recompute metrics and fan a market-data event out to every
            //    attached position.
            for position_id in attached {
                let Some(position) = ctx.store.get(position_id) else {
                    continue;
                };
                let book_metrics = {
                    let book = shared.book.read().expect("book lock");
                    book.metrics(position.min_for_odds, position.min_for_vig)
                };

                let ctx = ctx.clone();
                queue.submit(position_id, async move {
                    controller::on_market_data(&ctx, position_id, book_metrics).await;
                });
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_tracker_round_trip() {
        let tracker = CancelTracker::new(Duration::from_secs(60));
        assert!(tracker.is_empty());

        tracker.track("0xa".to_string(), 7);
        assert_eq!(tracker.lookup("0xa"), Some(7));
        assert!(tracker.contains("0xa"));
        assert_eq!(tracker.lookup("0xb"), None);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn cancel_tracker_expires_entries() {
        let tracker = CancelTracker::new(Duration::from_millis(0));
        tracker.track("0xa".to_string(), 7);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(tracker.lookup("0xa"), None);
        assert!(tracker.is_empty());
    }

    #[test]
    fn cancel_tracker_latest_position_wins() {
        let tracker = CancelTracker::new(Duration::from_secs(60));
        tracker.track("0xa".to_string(), 1);
        tracker.track("0xa".to_string(), 2);
        assert_eq!(tracker.lookup("0xa"), Some(2));
    }
}

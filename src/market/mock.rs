//! Mock exchange for unit and scenario testing.
//!
//! Implements both the order feed and the order gateway seams with
//! scripted book state, injectable delta batches, and recorded calls, so
//! the whole pipeline can be driven without a network.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;

use crate::error::{FeedError, GatewayError};
use crate::gateway::{OrderGateway, PostOrder};
use crate::market::types::{MakerOrder, MarketId, OrderDelta, OrderId};
use crate::transport::{FeedEvent, FeedHandler, FeedSubscription, OrderFeed};

/// Scripted exchange standing in for both transport and gateway.
#[derive(Default)]
pub struct MockExchange {
    /// Scripted book per market, returned by snapshot fetches.
    books: Mutex<HashMap<MarketId, Vec<MakerOrder>>>,
    /// Registered feed handlers per market.
    handlers: Mutex<HashMap<MarketId, Vec<FeedHandler>>>,
    /// Recorded order posts in submission order.
    posts: Mutex<Vec<(OrderId, PostOrder)>>,
    /// Recorded cancel batches.
    cancels: Mutex<Vec<Vec<OrderId>>>,
    /// Orders posted through the gateway and not yet cancelled or completed.
    live_orders: Mutex<HashSet<OrderId>>,
    /// Error to return on the next post, if set.
    fail_next_post: Mutex<Option<GatewayError>>,
    /// Order id sequence.
    next_order: AtomicU64,
}

impl MockExchange {
    /// Create an empty mock exchange.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Replace the scripted book for a market.
    pub fn set_book(&self, market_id: &str, orders: Vec<MakerOrder>) {
        self.books
            .lock()
            .unwrap()
            .insert(market_id.to_string(), orders);
    }

    /// Deliver a delta batch to every subscriber of a market.
    pub fn push_deltas(&self, market_id: &str, deltas: Vec<OrderDelta>) {
        let handlers = self.handlers.lock().unwrap();
        if let Some(subscribers) = handlers.get(market_id) {
            for handler in subscribers {
                handler(FeedEvent::Deltas(deltas.clone()));
            }
        }
    }

    /// Deliver the current scripted book as a snapshot event.
    pub fn push_snapshot(&self, market_id: &str) {
        let orders = self
            .books
            .lock()
            .unwrap()
            .get(market_id)
            .cloned()
            .unwrap_or_default();
        let handlers = self.handlers.lock().unwrap();
        if let Some(subscribers) = handlers.get(market_id) {
            for handler in subscribers {
                handler(FeedEvent::Snapshot(orders.clone()));
            }
        }
    }

    /// All recorded posts.
    pub fn posts(&self) -> Vec<(OrderId, PostOrder)> {
        self.posts.lock().unwrap().clone()
    }

    /// The most recent post, if any.
    pub fn last_post(&self) -> Option<(OrderId, PostOrder)> {
        self.posts.lock().unwrap().last().cloned()
    }

    /// All recorded cancel batches.
    pub fn cancel_batches(&self) -> Vec<Vec<OrderId>> {
        self.cancels.lock().unwrap().clone()
    }

    /// Whether an order posted through the gateway is still live.
    pub fn is_live(&self, order_id: &str) -> bool {
        self.live_orders.lock().unwrap().contains(order_id)
    }

    /// Number of live orders posted through the gateway.
    pub fn live_count(&self) -> usize {
        self.live_orders.lock().unwrap().len()
    }

    /// Mark an order as filled out at the venue; subsequent cancels of it
    /// report zero cancelled.
    pub fn complete_order(&self, order_id: &str) {
        self.live_orders.lock().unwrap().remove(order_id);
    }

    /// Fail the next post with the given error.
    pub fn fail_next_post(&self, error: GatewayError) {
        *self.fail_next_post.lock().unwrap() = Some(error);
    }
}

impl OrderFeed for MockExchange {
    fn fetch_snapshot<'a>(
        &'a self,
        market_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<MakerOrder>, FeedError>> {
        Box::pin(async move {
            Ok(self
                .books
                .lock()
                .unwrap()
                .get(market_id)
                .cloned()
                .unwrap_or_default())
        })
    }

    fn subscribe<'a>(
        &'a self,
        market_id: MarketId,
        handler: FeedHandler,
    ) -> BoxFuture<'a, Result<FeedSubscription, FeedError>> {
        Box::pin(async move {
            self.handlers
                .lock()
                .unwrap()
                .entry(market_id)
                .or_default()
                .push(handler);
            Ok(FeedSubscription::new(
                Arc::new(AtomicBool::new(false)),
                Vec::new(),
            ))
        })
    }
}

impl OrderGateway for MockExchange {
    fn post_maker_order<'a>(
        &'a self,
        order: &'a PostOrder,
    ) -> BoxFuture<'a, Result<OrderId, GatewayError>> {
        Box::pin(async move {
            if let Some(error) = self.fail_next_post.lock().unwrap().take() {
                return Err(error);
            }

            let order_id = format!("0xmock{}", self.next_order.fetch_add(1, Ordering::SeqCst));
            self.posts
                .lock()
                .unwrap()
                .push((order_id.clone(), order.clone()));
            self.live_orders.lock().unwrap().insert(order_id.clone());
            Ok(order_id)
        })
    }

    fn cancel_orders<'a>(
        &'a self,
        order_ids: &'a [OrderId],
    ) -> BoxFuture<'a, Result<u32, GatewayError>> {
        Box::pin(async move {
            self.cancels.lock().unwrap().push(order_ids.to_vec());

            let mut live = self.live_orders.lock().unwrap();
            let mut cancelled = 0u32;
            for order_id in order_ids {
                if live.remove(order_id) {
                    cancelled += 1;
                }
            }
            Ok(cancelled)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::types::Outcome;

    fn post() -> PostOrder {
        PostOrder {
            market_id: "mkt-1".to_string(),
            outcome: Outcome::One,
            stake: 50_000_000,
            odds: 36_000_000,
        }
    }

    #[tokio::test]
    async fn post_and_cancel_round_trip() {
        let venue = MockExchange::new();

        let order_id = venue.post_maker_order(&post()).await.unwrap();
        assert!(venue.is_live(&order_id));
        assert_eq!(venue.posts().len(), 1);

        let cancelled = venue.cancel_orders(&[order_id.clone()]).await.unwrap();
        assert_eq!(cancelled, 1);
        assert!(!venue.is_live(&order_id));

        // Second cancel reports zero, like a venue that already let it go.
        let cancelled = venue.cancel_orders(&[order_id]).await.unwrap();
        assert_eq!(cancelled, 0);
    }

    #[tokio::test]
    async fn completed_orders_cancel_as_zero() {
        let venue = MockExchange::new();
        let order_id = venue.post_maker_order(&post()).await.unwrap();
        venue.complete_order(&order_id);
        assert_eq!(venue.cancel_orders(&[order_id]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_post_is_one_shot() {
        let venue = MockExchange::new();
        venue.fail_next_post(GatewayError::Rejected {
            reason: "market closed".to_string(),
        });

        assert!(venue.post_maker_order(&post()).await.is_err());
        assert!(venue.post_maker_order(&post()).await.is_ok());
    }

    #[tokio::test]
    async fn snapshot_returns_scripted_book() {
        let venue = MockExchange::new();
        assert!(venue.fetch_snapshot("mkt-1").await.unwrap().is_empty());

        venue.set_book(
            "mkt-1",
            vec![MakerOrder {
                order_id: "0xa".to_string(),
                market_id: "mkt-1".to_string(),
                maker: "0xm1".to_string(),
                total_stake: 100_000_000,
                filled_stake: 0,
                odds: 60_000_000,
                maker_outcome: Outcome::Two,
                update_time: 1,
            }],
        );
        assert_eq!(venue.fetch_snapshot("mkt-1").await.unwrap().len(), 1);
    }
}

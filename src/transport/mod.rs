//! Market-data transport: snapshot fetch plus a streaming subscription.
//!
//! The push channel is preferred; when it cannot be established within the
//! configured window the router transparently falls back to snapshot
//! polling with equivalent semantics.

pub mod poll;
pub mod ws;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::FeedError;
use crate::market::types::{MakerOrder, MarketId, OrderDelta};

pub use poll::PollFeed;
pub use ws::{ReconnectConfig, WsFeed};

/// Event delivered to a feed handler, ordered per market.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// Authoritative full state; replaces the mirror.
    Snapshot(Vec<MakerOrder>),
    /// Ordered incremental updates.
    Deltas(Vec<OrderDelta>),
}

/// Handler invoked for every feed event of a subscribed market.
///
/// Handlers run on the transport task and must not block.
pub type FeedHandler = Arc<dyn Fn(FeedEvent) + Send + Sync>;

/// Live subscription to one market's order feed.
///
/// `unsubscribe` is idempotent; dropping the subscription unsubscribes.
pub struct FeedSubscription {
    unsubscribed: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl FeedSubscription {
    /// Create a subscription wrapping the transport tasks.
    pub fn new(unsubscribed: Arc<AtomicBool>, tasks: Vec<JoinHandle<()>>) -> Self {
        Self { unsubscribed, tasks }
    }

    /// Stop delivery. Safe to call more than once.
    pub fn unsubscribe(&self) {
        if !self.unsubscribed.swap(true, Ordering::SeqCst) {
            for task in &self.tasks {
                task.abort();
            }
        }
    }

    /// Whether the subscription has been torn down.
    pub fn is_unsubscribed(&self) -> bool {
        self.unsubscribed.load(Ordering::SeqCst)
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Order feed seam: one-shot snapshot plus streaming subscription.
pub trait OrderFeed: Send + Sync {
    /// Synchronous one-shot read of a market's active maker orders.
    fn fetch_snapshot<'a>(
        &'a self,
        market_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<MakerOrder>, FeedError>>;

    /// Subscribe to a market's order updates.
    fn subscribe<'a>(
        &'a self,
        market_id: MarketId,
        handler: FeedHandler,
    ) -> BoxFuture<'a, Result<FeedSubscription, FeedError>>;
}

/// Feed router: push channel first, polling fallback.
pub struct FeedRouter {
    ws: WsFeed,
    poll: PollFeed,
}

impl FeedRouter {
    /// Build a router over the two transports.
    pub fn new(ws: WsFeed, poll: PollFeed) -> Self {
        Self { ws, poll }
    }
}

impl OrderFeed for FeedRouter {
    fn fetch_snapshot<'a>(
        &'a self,
        market_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<MakerOrder>, FeedError>> {
        self.poll.fetch_snapshot(market_id)
    }

    fn subscribe<'a>(
        &'a self,
        market_id: MarketId,
        handler: FeedHandler,
    ) -> BoxFuture<'a, Result<FeedSubscription, FeedError>> {
        Box::pin(async move {
            match self.ws.subscribe(market_id.clone(), handler.clone()).await {
                Ok(sub) => {
                    info!(market = %market_id, "push channel established");
                    Ok(sub)
                }
                Err(e) => {
                    warn!(
                        market = %market_id,
                        error = %e,
                        "push channel unavailable, falling back to polling"
                    );
                    self.poll.subscribe(market_id, handler).await
                }
            }
        })
    }
}

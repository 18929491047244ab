//! Polling fallback: periodic snapshots with push-equivalent semantics.
//!
//! Every poll delivers the venue's full order set as an authoritative
//! snapshot; the mirror replaces its state atomically, which reconciles
//! both appearances and disappearances between polls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{info, warn};

use crate::error::FeedError;
use crate::market::client::ExchangeClient;
use crate::market::types::{MakerOrder, MarketId};
use crate::metrics;

use super::{FeedEvent, FeedHandler, FeedSubscription, OrderFeed};

/// Polling feed over the exchange REST API.
pub struct PollFeed {
    client: Arc<ExchangeClient>,
    interval: Duration,
}

impl PollFeed {
    /// Create a polling feed with the given snapshot interval.
    pub fn new(client: Arc<ExchangeClient>, interval: Duration) -> Self {
        Self { client, interval }
    }
}

impl OrderFeed for PollFeed {
    fn fetch_snapshot<'a>(
        &'a self,
        market_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<MakerOrder>, FeedError>> {
        Box::pin(self.client.fetch_order_snapshot(market_id))
    }

    fn subscribe<'a>(
        &'a self,
        market_id: MarketId,
        handler: FeedHandler,
    ) -> BoxFuture<'a, Result<FeedSubscription, FeedError>> {
        Box::pin(async move {
            let unsubscribed = Arc::new(AtomicBool::new(false));
            let client = self.client.clone();
            let interval = self.interval;
            let flag = unsubscribed.clone();

            info!(
                market = %market_id,
                interval_s = interval.as_secs(),
                "starting snapshot polling"
            );

            let task = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

                loop {
                    ticker.tick().await;
                    if flag.load(Ordering::SeqCst) {
                        return;
                    }

                    metrics::inc_feed_poll_cycles();
                    match client.fetch_order_snapshot(&market_id).await {
                        Ok(orders) => {
                            metrics::inc_feed_events();
                            handler(FeedEvent::Snapshot(orders));
                        }
                        Err(e) => {
                            warn!(market = %market_id, error = %e, "poll cycle failed");
                        }
                    }
                }
            });

            Ok(FeedSubscription::new(unsubscribed, vec![task]))
        })
    }
}

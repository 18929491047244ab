//! Order gateway: posting and cancelling maker orders at the venue.
//!
//! Transient errors (network, 5xx, rate limits) are retried with
//! exponential backoff; business-rule rejections come back immediately.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{info, instrument, warn};

use crate::config::{Config, Units};
use crate::error::{GatewayError, OddsError};
use crate::market::client::ExchangeClient;
use crate::market::types::{MarketId, OrderId, Outcome};
use crate::metrics;
use crate::odds;

/// A maker order to post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostOrder {
    /// Market to rest in.
    pub market_id: MarketId,
    /// Outcome we are betting as maker.
    pub outcome: Outcome,
    /// Stake, wire units.
    pub stake: u128,
    /// Ladder-valid maker odds, wire units.
    pub odds: u128,
}

/// Order gateway seam.
pub trait OrderGateway: Send + Sync {
    /// Submit a signed maker order; odds must already be ladder-valid.
    fn post_maker_order<'a>(
        &'a self,
        order: &'a PostOrder,
    ) -> BoxFuture<'a, Result<OrderId, GatewayError>>;

    /// Bulk cancellation; returns the venue's cancelled count verbatim.
    fn cancel_orders<'a>(
        &'a self,
        order_ids: &'a [OrderId],
    ) -> BoxFuture<'a, Result<u32, GatewayError>>;
}

/// Live gateway over the exchange REST client.
#[derive(Clone)]
pub struct VenueGateway {
    client: Arc<ExchangeClient>,
    units: Units,
}

impl VenueGateway {
    /// Create a live gateway.
    pub fn new(client: Arc<ExchangeClient>, units: Units) -> Self {
        Self { client, units }
    }

    fn validate_odds(&self, odds_wire: u128) -> Result<(), OddsError> {
        if odds_wire == 0 || odds_wire >= self.units.odds_unit {
            return Err(OddsError::OutOfRange {
                odds: odds_wire,
                unit: self.units.odds_unit,
            });
        }
        if !odds::is_on_ladder(odds_wire, self.units.ladder_step) {
            return Err(OddsError::OffLadder {
                odds: odds_wire,
                step: self.units.ladder_step,
            });
        }
        Ok(())
    }
}

impl OrderGateway for VenueGateway {
    fn post_maker_order<'a>(
        &'a self,
        order: &'a PostOrder,
    ) -> BoxFuture<'a, Result<OrderId, GatewayError>> {
        Box::pin(async move {
            // Off-ladder odds must fail before transmission.
            self.validate_odds(order.odds)?;

            let order_id = self
                .client
                .post_order(&order.market_id, order.outcome, order.stake, order.odds)
                .await?;

            metrics::inc_orders_posted();
            info!(
                market = %order.market_id,
                order_id = %order_id,
                outcome = %order.outcome,
                stake = order.stake as u64,
                odds = order.odds as u64,
                "maker order posted"
            );
            Ok(order_id)
        })
    }

    fn cancel_orders<'a>(
        &'a self,
        order_ids: &'a [OrderId],
    ) -> BoxFuture<'a, Result<u32, GatewayError>> {
        Box::pin(async move {
            if order_ids.is_empty() {
                return Ok(0);
            }

            let cancelled = self.client.cancel_orders(order_ids).await?;
            metrics::inc_orders_cancelled(cancelled as u64);
            info!(
                requested = order_ids.len(),
                cancelled = cancelled,
                "orders cancelled"
            );
            Ok(cancelled)
        })
    }
}

/// Retry policy for transient gateway errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum retry attempts after the first try.
    pub max_retries: u32,
    /// Base delay before the first retry.
    pub base_delay: Duration,
    /// Multiplier between successive delays.
    pub backoff: u32,
}

impl RetryPolicy {
    /// Build a policy from config.
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            backoff: config.retry_backoff.max(1),
        }
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * self.backoff.saturating_pow(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            backoff: 2,
        }
    }
}

/// Gateway wrapper retrying transient errors with exponential backoff.
pub struct Retrying<G> {
    inner: G,
    policy: RetryPolicy,
}

impl<G: OrderGateway> Retrying<G> {
    /// Wrap a gateway with a retry policy.
    pub fn new(inner: G, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    #[instrument(skip(self, op), fields(what = what))]
    async fn with_retries<T, F>(&self, what: &'static str, mut op: F) -> Result<T, GatewayError>
    where
        F: FnMut() -> BoxFuture<'static, Result<T, GatewayError>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay(attempt);
                    warn!(
                        error = %e,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "transient gateway error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl<G: OrderGateway + Clone + 'static> OrderGateway for Retrying<G> {
    fn post_maker_order<'a>(
        &'a self,
        order: &'a PostOrder,
    ) -> BoxFuture<'a, Result<OrderId, GatewayError>> {
        Box::pin(async move {
            let result = self
                .with_retries("post", || {
                    let inner = self.inner.clone();
                    let order = order.clone();
                    Box::pin(async move { inner.post_maker_order(&order).await })
                        as BoxFuture<'static, _>
                })
                .await;
            if result.is_err() {
                metrics::inc_orders_post_failed();
            }
            result
        })
    }

    fn cancel_orders<'a>(
        &'a self,
        order_ids: &'a [OrderId],
    ) -> BoxFuture<'a, Result<u32, GatewayError>> {
        Box::pin(async move {
            self.with_retries("cancel", || {
                let inner = self.inner.clone();
                let ids = order_ids.to_vec();
                Box::pin(async move { inner.cancel_orders(&ids).await }) as BoxFuture<'static, _>
            })
            .await
        })
    }
}

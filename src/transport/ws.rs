//! Push transport over a WebSocket order channel.
//!
//! Features:
//! - Bounded connect window so the router can fall back to polling
//! - Automatic reconnection with exponential backoff
//! - Fresh snapshot delivery after every reconnect

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::error::FeedError;
use crate::market::client::ExchangeClient;
use crate::market::types::{MarketId, WireOrder};
use crate::metrics;

use super::{FeedEvent, FeedHandler, FeedSubscription, OrderFeed};

/// Reconnection configuration for the push channel.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Initial backoff delay in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum backoff delay in seconds.
    pub max_delay_s: u64,
    /// Backoff multiplier.
    pub backoff_multiplier: f64,
    /// Window allowed for the initial connection.
    pub connect_timeout: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            max_delay_s: 30,
            backoff_multiplier: 2.0,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl ReconnectConfig {
    /// Backoff before reconnect attempt `attempt` (zero-based), capped at
    /// the configured maximum.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let cap = Duration::from_secs(self.max_delay_s);
        let factor = self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(self.initial_delay_ms)
            .mul_f64(factor)
            .min(cap)
    }
}

/// Subscription request sent after connecting.
#[derive(Debug, Serialize)]
struct SubscribeMessage {
    /// Message type.
    #[serde(rename = "type")]
    msg_type: String,
    /// Channel to subscribe, `markets/{id}/orders`.
    channel: String,
}

/// Inbound feed message.
#[derive(Debug, Deserialize)]
struct WsMessage {
    /// Event type: "order_update" or "subscribed".
    #[serde(rename = "type")]
    msg_type: Option<String>,
    /// Order updates carried by the message.
    #[serde(default)]
    orders: Vec<WireOrder>,
}

/// Push feed over the exchange WebSocket.
pub struct WsFeed {
    client: Arc<ExchangeClient>,
    reconnect: ReconnectConfig,
}

impl WsFeed {
    /// Create a push feed sharing the REST client (for resnapshots).
    pub fn new(client: Arc<ExchangeClient>, reconnect: ReconnectConfig) -> Self {
        Self { client, reconnect }
    }

    async fn connect_and_subscribe(
        &self,
        market_id: &str,
    ) -> Result<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        FeedError,
    > {
        let url = format!("{}/ws/v1", self.client.ws_url());

        let (mut stream, _) = connect_async(&url)
            .await
            .map_err(|e| FeedError::ConnectFailed(e.to_string()))?;

        let subscribe = SubscribeMessage {
            msg_type: "subscribe".to_string(),
            channel: format!("markets/{}/orders", market_id),
        };
        let msg_json = serde_json::to_string(&subscribe)
            .map_err(|e| FeedError::SendFailed(e.to_string()))?;

        stream
            .send(Message::Text(msg_json))
            .await
            .map_err(|e| FeedError::SendFailed(e.to_string()))?;

        Ok(stream)
    }

    /// Parse a frame into a feed event; `None` for non-order messages.
    fn parse_message(text: &str) -> Option<FeedEvent> {
        let message: WsMessage = match serde_json::from_str(text) {
            Ok(m) => m,
            Err(e) => {
                metrics::inc_feed_deltas_dropped();
                warn!(error = %e, "failed to parse feed message");
                return None;
            }
        };

        if message.msg_type.as_deref() != Some("order_update") {
            return None;
        }

        let mut deltas = Vec::with_capacity(message.orders.len());
        for wire in &message.orders {
            match wire.to_delta() {
                Some(delta) => deltas.push(delta),
                None => {
                    metrics::inc_feed_deltas_dropped();
                    warn!(order_id = %wire.order_id, "dropping malformed order delta");
                }
            }
        }

        if deltas.is_empty() {
            return None;
        }
        Some(FeedEvent::Deltas(deltas))
    }
}

impl OrderFeed for WsFeed {
    fn fetch_snapshot<'a>(
        &'a self,
        market_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<crate::market::types::MakerOrder>, FeedError>> {
        Box::pin(self.client.fetch_order_snapshot(market_id))
    }

    fn subscribe<'a>(
        &'a self,
        market_id: MarketId,
        handler: FeedHandler,
    ) -> BoxFuture<'a, Result<FeedSubscription, FeedError>> {
        Box::pin(async move {
            // The initial connection must land inside the bounded window;
            // otherwise the caller falls back to polling.
            let stream = tokio::time::timeout(
                self.reconnect.connect_timeout,
                self.connect_and_subscribe(&market_id),
            )
            .await
            .map_err(|_| FeedError::ConnectFailed("connect timed out".to_string()))??;

            let unsubscribed = Arc::new(AtomicBool::new(false));
            let client = self.client.clone();
            let reconnect = self.reconnect.clone();
            let flag = unsubscribed.clone();

            let task = tokio::spawn(async move {
                let mut stream = Some(stream);
                let mut attempt = 0u32;

                loop {
                    if flag.load(Ordering::SeqCst) {
                        return;
                    }

                    let mut ws = match stream.take() {
                        Some(ws) => ws,
                        None => {
                            // Reconnect path: back off, re-establish, resync
                            // the mirror with a fresh snapshot.
                            let delay = reconnect.next_delay(attempt);
                            attempt = attempt.saturating_add(1);
                            metrics::inc_feed_reconnects();
                            info!(
                                market = %market_id,
                                delay_ms = delay.as_millis() as u64,
                                "reconnecting push channel"
                            );
                            tokio::time::sleep(delay).await;

                            let feed = WsFeed::new(client.clone(), reconnect.clone());
                            match feed.connect_and_subscribe(&market_id).await {
                                Ok(ws) => {
                                    attempt = 0;
                                    match client.fetch_order_snapshot(&market_id).await {
                                        Ok(orders) => handler(FeedEvent::Snapshot(orders)),
                                        Err(e) => {
                                            warn!(market = %market_id, error = %e, "resnapshot failed");
                                        }
                                    }
                                    ws
                                }
                                Err(e) => {
                                    error!(market = %market_id, error = %e, "reconnect failed");
                                    continue;
                                }
                            }
                        }
                    };

                    // Read until the connection drops.
                    while let Some(msg) = ws.next().await {
                        if flag.load(Ordering::SeqCst) {
                            return;
                        }
                        match msg {
                            Ok(Message::Text(text)) => {
                                metrics::inc_feed_events();
                                if let Some(event) = WsFeed::parse_message(&text) {
                                    handler(event);
                                }
                            }
                            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                                debug!("heartbeat");
                            }
                            Ok(Message::Close(frame)) => {
                                warn!(market = %market_id, frame = ?frame, "push channel closed");
                                break;
                            }
                            Ok(_) => {}
                            Err(e) => {
                                error!(market = %market_id, error = %e, "push channel error");
                                break;
                            }
                        }
                    }
                    // stream is None here; next loop iteration reconnects.
                }
            });

            Ok(FeedSubscription::new(unsubscribed, vec![task]))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_clamps() {
        let config = ReconnectConfig::default();
        assert_eq!(config.next_delay(0), Duration::from_millis(1_000));
        assert_eq!(config.next_delay(1), Duration::from_millis(2_000));
        assert_eq!(config.next_delay(2), Duration::from_millis(4_000));
        assert_eq!(config.next_delay(10), Duration::from_secs(30));
    }

    #[test]
    fn parse_message_extracts_deltas() {
        let text = r#"{
            "type": "order_update",
            "orders": [{
                "orderId": "0xa",
                "marketId": "mkt-1",
                "maker": "0xm1",
                "totalStake": "100000000",
                "filledStake": "0",
                "odds": "60000000",
                "makerBettingOutcomeOne": false,
                "status": "ACTIVE",
                "updateTime": 1
            }]
        }"#;

        let event = WsFeed::parse_message(text).unwrap();
        match event {
            FeedEvent::Deltas(deltas) => {
                assert_eq!(deltas.len(), 1);
                assert_eq!(deltas[0].order.order_id, "0xa");
            }
            _ => panic!("expected deltas"),
        }
    }

    #[test]
    fn parse_message_ignores_acks_and_garbage() {
        assert!(WsFeed::parse_message(r#"{"type":"subscribed"}"#).is_none());
        assert!(WsFeed::parse_message("not json").is_none());
        assert!(WsFeed::parse_message(r#"{"type":"order_update","orders":[]}"#).is_none());
    }

    #[test]
    fn parse_message_drops_malformed_entries_keeps_rest() {
        let text = r#"{
            "type": "order_update",
            "orders": [
                {
                    "orderId": "0xa",
                    "marketId": "mkt-1",
                    "maker": "0xm1",
                    "totalStake": "bogus",
                    "filledStake": "0",
                    "odds": "60000000",
                    "makerBettingOutcomeOne": false
                },
                {
                    "orderId": "0xb",
                    "marketId": "mkt-1",
                    "maker": "0xm1",
                    "totalStake": "100000000",
                    "filledStake": "0",
                    "odds": "60000000",
                    "makerBettingOutcomeOne": false
                }
            ]
        }"#;

        match WsFeed::parse_message(text).unwrap() {
            FeedEvent::Deltas(deltas) => {
                assert_eq!(deltas.len(), 1);
                assert_eq!(deltas[0].order.order_id, "0xb");
            }
            _ => panic!("expected deltas"),
        }
    }
}

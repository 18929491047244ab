//! Exchange REST client.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::Config;
use crate::error::{FeedError, GatewayError};
use crate::market::types::{MakerOrder, Outcome, WireOrder};
use crate::metrics;
use crate::signing::{self, Credentials};

/// REST client for the exchange API.
#[derive(Debug, Clone)]
pub struct ExchangeClient {
    /// HTTP client for API requests.
    http: reqwest::Client,
    /// REST API base URL.
    api_url: String,
    /// WebSocket base URL (handed to the push feed).
    ws_url: String,
    /// Venue credentials.
    creds: Credentials,
}

/// Generic response envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    /// Payload on success.
    data: Option<T>,
    /// Error details on failure.
    error: Option<ApiError>,
}

/// Error body returned by the venue.
#[derive(Debug, Deserialize)]
struct ApiError {
    /// Machine-readable error code.
    code: Option<String>,
    /// Human-readable message.
    message: Option<String>,
}

/// Order post request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct PostOrderBody {
    market_id: String,
    maker_betting_outcome_one: bool,
    stake: String,
    odds: String,
}

/// Order post response payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostOrderData {
    order_id: String,
}

/// Cancel request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct CancelBody<'a> {
    order_ids: &'a [String],
}

/// Cancel response payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelData {
    cancelled_count: u32,
}

impl ExchangeClient {
    /// Create a new client from config with tuned HTTP settings.
    pub fn new(config: &Config) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .connect_timeout(std::time::Duration::from_millis(2_000))
            .tcp_nodelay(true)
            .tcp_keepalive(std::time::Duration::from_secs(30))
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .build()
            .expect("failed to create HTTP client");

        Self {
            http,
            api_url: config.exchange_api_url.trim_end_matches('/').to_string(),
            ws_url: config.exchange_ws_url.trim_end_matches('/').to_string(),
            creds: Credentials {
                maker_address: config.maker_address.clone(),
                session_token: config.session_token.clone(),
                signing_key: config.signing_key.clone(),
            },
        }
    }

    /// Get the HTTP client reference.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// REST API base URL.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// WebSocket base URL.
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Our maker address.
    pub fn maker_address(&self) -> &str {
        &self.creds.maker_address
    }

    /// Fetch the full set of active maker orders for a market.
    #[instrument(skip(self), fields(market = %market_id))]
    pub async fn fetch_order_snapshot(
        &self,
        market_id: &str,
    ) -> Result<Vec<MakerOrder>, FeedError> {
        let _timer = metrics::timer_snapshot_fetch();
        let url = format!("{}/api/v1/orders", self.api_url);

        let response = self
            .http
            .get(&url)
            .query(&[("marketId", market_id)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FeedError::SnapshotFailed {
                market_id: market_id.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let envelope: Envelope<Vec<WireOrder>> =
            response.json().await.map_err(|e| FeedError::SnapshotFailed {
                market_id: market_id.to_string(),
                reason: format!("failed to parse response: {}", e),
            })?;

        let wire = envelope.data.unwrap_or_default();
        let mut orders = Vec::with_capacity(wire.len());
        for entry in &wire {
            match entry.to_order() {
                Some(order) => orders.push(order),
                None => {
                    metrics::inc_feed_deltas_dropped();
                    debug!(order_id = %entry.order_id, "dropping malformed snapshot entry");
                }
            }
        }

        debug!(count = orders.len(), "fetched order snapshot");
        Ok(orders)
    }

    /// Submit a signed maker order. Odds must already be ladder-valid.
    #[instrument(skip(self, outcome, stake, odds), fields(market = %market_id))]
    pub async fn post_order(
        &self,
        market_id: &str,
        outcome: Outcome,
        stake: u128,
        odds: u128,
    ) -> Result<String, GatewayError> {
        let _timer = metrics::timer_order_post();
        let path = "/api/v1/orders/post";
        let body = PostOrderBody {
            market_id: market_id.to_string(),
            maker_betting_outcome_one: outcome == Outcome::One,
            stake: stake.to_string(),
            odds: odds.to_string(),
        };
        let body_json = serde_json::to_string(&body)
            .map_err(|e| GatewayError::Transport(format!("serialize order: {}", e)))?;

        let data: PostOrderData = self.signed_post(path, body_json).await?;
        Ok(data.order_id)
    }

    /// Cancel a batch of orders; returns the venue's cancelled count.
    #[instrument(skip(self), fields(count = order_ids.len()))]
    pub async fn cancel_orders(&self, order_ids: &[String]) -> Result<u32, GatewayError> {
        let _timer = metrics::timer_order_cancel();
        let path = "/api/v1/orders/cancel";
        let body = CancelBody { order_ids };
        let body_json = serde_json::to_string(&body)
            .map_err(|e| GatewayError::Transport(format!("serialize cancel: {}", e)))?;

        let data: CancelData = self.signed_post(path, body_json).await?;
        Ok(data.cancelled_count)
    }

    /// POST a signed JSON body and unwrap the response envelope.
    async fn signed_post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body_json: String,
    ) -> Result<T, GatewayError> {
        let url = format!("{}{}", self.api_url, path);

        let mut request = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .body(body_json.clone());
        for (key, value) in signing::auth_headers(&self.creds, "POST", path, &body_json) {
            request = request.header(&key, &value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Transport(format!("{}", e)))?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after_secs = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(1);
            return Err(GatewayError::RateLimited { retry_after_secs });
        }

        if status.is_server_error() {
            return Err(GatewayError::Transport(format!("HTTP {}", status)));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| GatewayError::Transport(format!("failed to parse response: {}", e)))?;

        if let Some(error) = envelope.error {
            return Err(classify_api_error(error));
        }

        envelope
            .data
            .ok_or_else(|| GatewayError::Transport("empty response envelope".to_string()))
    }
}

/// Map a venue error body onto the gateway taxonomy.
fn classify_api_error(error: ApiError) -> GatewayError {
    let message = error.message.unwrap_or_else(|| "unknown error".to_string());
    match error.code.as_deref() {
        Some("ODDS_OFF_LADDER") | Some("INVALID_ODDS") => GatewayError::InvalidOdds(message),
        Some("RATE_LIMITED") => GatewayError::RateLimited { retry_after_secs: 1 },
        _ => GatewayError::Rejected { reason: message },
    }
}

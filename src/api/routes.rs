//! HTTP API route definitions.

use axum::routing::get;
use axum::Router;

use super::handlers::{
    close_position, create_position, edit_position, get_position, health, list_fixtures,
    list_leagues, list_markets, list_positions, list_sports, ready, status, AppState,
};

/// Create the operator API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Status endpoint
        .route("/api/v1/status", get(status))
        // Operator surface
        .route(
            "/api/v1/positions",
            get(list_positions).post(create_position),
        )
        .route(
            "/api/v1/positions/:id",
            get(get_position).patch(edit_position).delete(close_position),
        )
        // Reference data for the creation flow
        .route("/api/v1/sports", get(list_sports))
        .route("/api/v1/sports/:id/leagues", get(list_leagues))
        .route("/api/v1/leagues/:id/fixtures", get(list_fixtures))
        .route("/api/v1/fixtures/:id/markets", get(list_markets))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::MakerAgent;
    use crate::market::MockExchange;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let config = crate::config::Config {
            exchange_api_url: "https://test".to_string(),
            exchange_ws_url: "wss://test".to_string(),
            maker_address: "0xMAKER0000000000000000000000000000000001".to_string(),
            session_token: "token".to_string(),
            signing_key: "secret".to_string(),
            odds_unit: 100_000_000,
            ladder_step: 250_000,
            stake_unit: 1_000_000,
            complete_fraction: rust_decimal_macros::dec!(0.99),
            recent_cancel_ttl_secs: 60,
            min_order_update_interval_ms: 0,
            poll_interval_secs: 10,
            ws_connect_timeout_secs: 5,
            ws_reconnect_max_delay_secs: 30,
            max_retries: 3,
            retry_base_delay_ms: 1_000,
            retry_backoff: 2,
            port: 8080,
            rust_log: "info".to_string(),
            verbose: false,
        };

        let venue = MockExchange::new();
        let agent = MakerAgent::with_seams(&config, venue.clone(), venue);
        AppState::new(agent, None)
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = create_router(test_state());

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ready_endpoint_reflects_state() {
        let state = test_state();
        let app = create_router(state.clone());
        let response = app
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.set_ready(true);
        let app = create_router(state);
        let response = app
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_position_is_404() {
        let app = create_router(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/positions/42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_spec_is_422_without_mutation() {
        let state = test_state();
        let app = create_router(state.clone());

        let body = serde_json::json!({
            "market_id": "mkt-1",
            "outcome": "one",
            "max_stake": "0",
            "premium_bps": 1000,
            "max_vig": "0.1",
            "min_liquidity": "10"
        });

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/positions")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(state.agent.list_positions().is_empty());
    }

    #[tokio::test]
    async fn refdata_routes_without_client_are_503() {
        let app = create_router(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/sports")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}

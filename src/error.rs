//! Unified error types for the maker agent.

use thiserror::Error;

use crate::market::types::PositionId;

/// Unified error type for the maker agent.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Market-data feed error.
    #[error("feed error: {0}")]
    Feed(#[from] FeedError),

    /// Order gateway error.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Position lifecycle error.
    #[error("position error: {0}")]
    Position(#[from] PositionError),

    /// HTTP request error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wire-odds arithmetic errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OddsError {
    /// Odds value is not a multiple of the ladder step.
    #[error("odds {odds} not on ladder (step {step})")]
    OffLadder {
        /// The offending odds value.
        odds: u128,
        /// The venue ladder step.
        step: u128,
    },

    /// Odds value is outside the open interval (0, ODDS_UNIT).
    #[error("odds {odds} outside (0, {unit})")]
    OutOfRange {
        /// The offending odds value.
        odds: u128,
        /// The venue odds unit (100%).
        unit: u128,
    },
}

/// Market-data feed errors (snapshot fetch and streaming subscription).
#[derive(Error, Debug)]
pub enum FeedError {
    /// Push channel could not be established.
    #[error("feed connection failed: {0}")]
    ConnectFailed(String),

    /// Connection closed unexpectedly.
    #[error("feed connection closed: {0}")]
    ConnectionClosed(String),

    /// Message parsing failed.
    #[error("failed to parse feed message: {0}")]
    Parse(String),

    /// Send failed.
    #[error("failed to send feed message: {0}")]
    SendFailed(String),

    /// Snapshot fetch failed.
    #[error("snapshot fetch failed for market {market_id}: {reason}")]
    SnapshotFailed {
        /// The market whose snapshot failed.
        market_id: String,
        /// Reason for failure.
        reason: String,
    },

    /// Tungstenite error.
    #[error("websocket error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    /// HTTP request failed.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Order gateway errors (posting and cancelling maker orders).
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    /// Odds failed ladder validation, either locally or at the venue.
    #[error("invalid odds: {0}")]
    InvalidOdds(String),

    /// Venue rejected the order on a business rule.
    #[error("order rejected: {reason}")]
    Rejected {
        /// Rejection reason from the venue.
        reason: String,
    },

    /// Venue rate limit hit.
    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Transport-level failure (network, 5xx, timeouts).
    #[error("transport error: {0}")]
    Transport(String),
}

impl GatewayError {
    /// Whether the gateway should retry this error with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::Transport(_) | GatewayError::RateLimited { .. }
        )
    }
}

impl From<OddsError> for GatewayError {
    fn from(e: OddsError) -> Self {
        GatewayError::InvalidOdds(e.to_string())
    }
}

/// Position store and serializer errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PositionError {
    /// No position with this id.
    #[error("position {0} not found")]
    NotFound(PositionId),

    /// Position was deleted while an operation was queued for it.
    #[error("position gone")]
    Gone,

    /// Operator input rejected at creation or edit.
    #[error("invalid position spec: {0}")]
    InvalidSpec(String),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_transient_classification() {
        assert!(GatewayError::Transport("timeout".into()).is_transient());
        assert!(GatewayError::RateLimited { retry_after_secs: 1 }.is_transient());
        assert!(!GatewayError::InvalidOdds("off ladder".into()).is_transient());
        assert!(!GatewayError::Rejected { reason: "closed".into() }.is_transient());
    }

    #[test]
    fn odds_error_converts_to_gateway_error() {
        let err: GatewayError = OddsError::OffLadder { odds: 7, step: 5 }.into();
        assert!(matches!(err, GatewayError::InvalidOdds(_)));
    }
}

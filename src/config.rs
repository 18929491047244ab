//! Application configuration loaded from environment variables.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;

/// Venue wire-format constants, shared across the numeric modules.
#[derive(Debug, Clone, Copy)]
pub struct Units {
    /// Wire integer representing 100% implied probability.
    pub odds_unit: u128,
    /// Ladder step for postable odds, wire units.
    pub ladder_step: u128,
    /// Wire integer representing one nominal stake unit.
    pub stake_unit: u128,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Venue Endpoints ===
    /// REST API base URL.
    #[serde(default = "default_api_url")]
    pub exchange_api_url: String,

    /// WebSocket base URL.
    #[serde(default = "default_ws_url")]
    pub exchange_ws_url: String,

    // === Credentials ===
    /// Our maker address (the `self` id echoed back in order feeds).
    pub maker_address: String,

    /// Venue session token.
    pub session_token: String,

    /// HMAC signing key for order posting and cancellation.
    pub signing_key: String,

    // === Wire Constants ===
    /// Wire integer for 100% implied probability.
    #[serde(default = "default_odds_unit")]
    pub odds_unit: u64,

    /// Odds ladder step in wire units.
    #[serde(default = "default_ladder_step")]
    pub ladder_step: u64,

    /// Wire integer for one nominal stake unit.
    #[serde(default = "default_stake_unit")]
    pub stake_unit: u64,

    // === Strategy Tunables ===
    /// Fill fraction at which a position counts as complete.
    #[serde(default = "default_complete_fraction")]
    pub complete_fraction: Decimal,

    /// How long cancelled order ids stay mapped for late-fill crediting.
    #[serde(default = "default_recent_cancel_ttl")]
    pub recent_cancel_ttl_secs: u64,

    /// Minimum interval between order actions per position, milliseconds.
    #[serde(default = "default_min_order_update_interval")]
    pub min_order_update_interval_ms: u64,

    // === Transport ===
    /// Snapshot polling interval when the push channel is unavailable.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Window allowed for establishing the push channel before falling back.
    #[serde(default = "default_ws_connect_timeout")]
    pub ws_connect_timeout_secs: u64,

    /// Maximum websocket reconnect backoff, seconds.
    #[serde(default = "default_ws_reconnect_max_delay")]
    pub ws_reconnect_max_delay_secs: u64,

    // === Gateway Retries ===
    /// Retry attempts for transient gateway errors.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base retry delay, milliseconds.
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,

    /// Backoff multiplier between retries.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff: u32,

    // === Server Configuration ===
    /// HTTP server port for the operator API.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Enable verbose logging.
    #[serde(default)]
    pub verbose: bool,
}

fn default_api_url() -> String {
    "https://api.sportex.bet".to_string()
}

fn default_ws_url() -> String {
    "wss://stream.sportex.bet".to_string()
}

fn default_odds_unit() -> u64 {
    100_000_000 // 10^8 = 100%
}

fn default_ladder_step() -> u64 {
    250_000 // 0.25%
}

fn default_stake_unit() -> u64 {
    1_000_000
}

fn default_complete_fraction() -> Decimal {
    Decimal::new(99, 2) // 0.99
}

fn default_recent_cancel_ttl() -> u64 {
    60
}

fn default_min_order_update_interval() -> u64 {
    2_500
}

fn default_poll_interval() -> u64 {
    10
}

fn default_ws_connect_timeout() -> u64 {
    5
}

fn default_ws_reconnect_max_delay() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay() -> u64 {
    1_000
}

fn default_retry_backoff() -> u32 {
    2
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if self.maker_address.is_empty() {
            return Err("MAKER_ADDRESS is required".to_string());
        }

        if !self.maker_address.starts_with("0x") {
            return Err("MAKER_ADDRESS must start with 0x".to_string());
        }

        if self.session_token.is_empty() {
            return Err("SESSION_TOKEN is required".to_string());
        }

        if self.signing_key.is_empty() {
            return Err("SIGNING_KEY is required".to_string());
        }

        if self.ladder_step == 0 || self.ladder_step >= self.odds_unit {
            return Err("LADDER_STEP must be positive and below ODDS_UNIT".to_string());
        }

        if self.odds_unit % self.ladder_step != 0 {
            return Err("LADDER_STEP must divide ODDS_UNIT".to_string());
        }

        if self.stake_unit == 0 {
            return Err("STAKE_UNIT must be positive".to_string());
        }

        if self.complete_fraction <= Decimal::ZERO || self.complete_fraction > Decimal::ONE {
            return Err("COMPLETE_FRACTION must be in (0, 1]".to_string());
        }

        Ok(())
    }

    /// Wire-format constants bundle.
    pub fn units(&self) -> Units {
        Units {
            odds_unit: self.odds_unit as u128,
            ladder_step: self.ladder_step as u128,
            stake_unit: self.stake_unit as u128,
        }
    }

    /// Minimum interval between order actions per position.
    pub fn min_order_update_interval(&self) -> Duration {
        Duration::from_millis(self.min_order_update_interval_ms)
    }

    /// TTL for the recently-cancelled order map.
    pub fn recent_cancel_ttl(&self) -> Duration {
        Duration::from_secs(self.recent_cancel_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_config() -> Config {
        Config {
            exchange_api_url: default_api_url(),
            exchange_ws_url: default_ws_url(),
            maker_address: "0xMAKER0000000000000000000000000000000001".to_string(),
            session_token: "token".to_string(),
            signing_key: "secret".to_string(),
            odds_unit: default_odds_unit(),
            ladder_step: default_ladder_step(),
            stake_unit: default_stake_unit(),
            complete_fraction: default_complete_fraction(),
            recent_cancel_ttl_secs: default_recent_cancel_ttl(),
            min_order_update_interval_ms: default_min_order_update_interval(),
            poll_interval_secs: default_poll_interval(),
            ws_connect_timeout_secs: default_ws_connect_timeout(),
            ws_reconnect_max_delay_secs: default_ws_reconnect_max_delay(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay(),
            retry_backoff: default_retry_backoff(),
            port: default_port(),
            rust_log: default_log_level(),
            verbose: false,
        }
    }

    #[test]
    fn default_values_are_sensible() {
        assert_eq!(default_odds_unit() % default_ladder_step(), 0);
        assert_eq!(default_complete_fraction(), dec!(0.99));
        assert_eq!(default_min_order_update_interval(), 2_500);
        assert_eq!(default_recent_cancel_ttl(), 60);
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_credentials() {
        let mut config = test_config();
        config.maker_address = String::new();
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.maker_address = "not-hex".to_string();
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.session_token = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_ladder() {
        let mut config = test_config();
        config.ladder_step = 0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.ladder_step = 333_333;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_complete_fraction() {
        let mut config = test_config();
        config.complete_fraction = dec!(0);
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.complete_fraction = dec!(1.5);
        assert!(config.validate().is_err());
    }
}

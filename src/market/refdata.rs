//! Reference-data lookups: sports, leagues, fixtures, markets.
//!
//! Consumed by the operator's position-creation flow only; the trading core
//! never reads these. Records are kept opaque (id, label, raw payload).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::FeedError;

use super::client::ExchangeClient;

/// Opaque reference-data record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefRecord {
    /// Venue identifier.
    pub id: String,
    /// Display label.
    pub label: String,
    /// Full payload as returned by the venue.
    #[serde(default)]
    pub raw: Value,
}

/// Envelope for reference-data listings.
#[derive(Debug, Deserialize)]
struct Listing {
    #[serde(default)]
    data: Vec<Value>,
}

/// Reference-data client over the exchange REST API.
#[derive(Debug, Clone)]
pub struct ReferenceData {
    client: ExchangeClient,
}

impl ReferenceData {
    /// Create a reference-data client sharing the exchange HTTP client.
    pub fn new(client: ExchangeClient) -> Self {
        Self { client }
    }

    /// List available sports.
    #[instrument(skip(self))]
    pub async fn list_sports(&self) -> Result<Vec<RefRecord>, FeedError> {
        self.list("/api/v1/sports", &[]).await
    }

    /// List leagues for a sport.
    #[instrument(skip(self))]
    pub async fn list_leagues(&self, sport_id: &str) -> Result<Vec<RefRecord>, FeedError> {
        self.list("/api/v1/leagues", &[("sportId", sport_id)]).await
    }

    /// List fixtures for a league.
    #[instrument(skip(self))]
    pub async fn list_fixtures(&self, league_id: &str) -> Result<Vec<RefRecord>, FeedError> {
        self.list("/api/v1/fixtures", &[("leagueId", league_id)])
            .await
    }

    /// List two-way markets for a fixture.
    #[instrument(skip(self))]
    pub async fn list_markets(&self, fixture_id: &str) -> Result<Vec<RefRecord>, FeedError> {
        self.list("/api/v1/markets", &[("fixtureId", fixture_id)])
            .await
    }

    async fn list(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<RefRecord>, FeedError> {
        let url = format!("{}{}", self.client.api_url(), path);

        let response = self.client.http().get(&url).query(query).send().await?;

        if !response.status().is_success() {
            return Err(FeedError::SnapshotFailed {
                market_id: path.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let listing: Listing = response
            .json()
            .await
            .map_err(|e| FeedError::Parse(format!("reference data: {}", e)))?;

        let records = listing
            .data
            .into_iter()
            .filter_map(parse_record)
            .collect::<Vec<_>>();

        debug!(path = path, count = records.len(), "reference data listed");
        Ok(records)
    }
}

/// Pull id and label out of a venue record, keeping the rest opaque.
fn parse_record(raw: Value) -> Option<RefRecord> {
    let id = raw.get("id").and_then(|v| {
        v.as_str()
            .map(|s| s.to_string())
            .or_else(|| v.as_u64().map(|n| n.to_string()))
    })?;

    let label = ["label", "name", "title"]
        .iter()
        .find_map(|key| raw.get(*key).and_then(|v| v.as_str()))
        .unwrap_or(&id)
        .to_string();

    Some(RefRecord { id, label, raw })
}

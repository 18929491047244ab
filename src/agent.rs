//! Process-level agent handle: owns the store, serializer, monitor, and
//! gateway, and exposes the operator surface.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AgentError, PositionError, Result};
use crate::gateway::{OrderGateway, Retrying, RetryPolicy, VenueGateway};
use crate::market::client::ExchangeClient;
use crate::market::types::{OrderId, PositionId};
use crate::monitor::{CancelTracker, MarketMonitor};
use crate::position::controller::{self, Ctx};
use crate::position::serializer::OpQueue;
use crate::position::store::PositionStore;
use crate::position::types::{Position, PositionPatch, PositionSpec, Status};
use crate::transport::{FeedRouter, OrderFeed, PollFeed, ReconnectConfig, WsFeed};

/// Aggregate counters for the status endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgentStats {
    /// Total positions in the store.
    pub positions: usize,
    /// Positions currently quoting.
    pub active: usize,
    /// Positions paused by the risk gate.
    pub risk_paused: usize,
    /// Positions filled to completion.
    pub completed: usize,
}

/// The market-making agent.
pub struct MakerAgent {
    config: Config,
    ctx: Arc<Ctx>,
    queue: Arc<OpQueue>,
    monitor: Arc<MarketMonitor>,
    started_at: OffsetDateTime,
}

impl MakerAgent {
    /// Build the agent with live venue seams.
    pub fn new(config: &Config) -> Result<Arc<Self>> {
        config
            .validate()
            .map_err(|e| AgentError::Position(PositionError::InvalidSpec(e)))?;

        let client = Arc::new(ExchangeClient::new(config));

        let reconnect = ReconnectConfig {
            max_delay_s: config.ws_reconnect_max_delay_secs,
            connect_timeout: Duration::from_secs(config.ws_connect_timeout_secs),
            ..Default::default()
        };
        let ws = WsFeed::new(client.clone(), reconnect);
        let poll = PollFeed::new(
            client.clone(),
            Duration::from_secs(config.poll_interval_secs),
        );
        let feed: Arc<dyn OrderFeed> = Arc::new(FeedRouter::new(ws, poll));

        let gateway: Arc<dyn OrderGateway> = Arc::new(Retrying::new(
            VenueGateway::new(client, config.units()),
            RetryPolicy::from_config(config),
        ));

        Ok(Self::with_seams(config, feed, gateway))
    }

    /// Build the agent over explicit feed and gateway seams (tests inject
    /// a mock venue here).
    pub fn with_seams(
        config: &Config,
        feed: Arc<dyn OrderFeed>,
        gateway: Arc<dyn OrderGateway>,
    ) -> Arc<Self> {
        let store = Arc::new(PositionStore::new());
        let cancels = Arc::new(CancelTracker::new(config.recent_cancel_ttl()));

        let ctx = Arc::new(Ctx {
            store,
            gateway,
            cancels,
            units: config.units(),
            complete_fraction: config.complete_fraction,
            min_order_update_interval: config.min_order_update_interval(),
            zero_cancel_grace: Duration::from_millis(500),
        });

        let queue = Arc::new(OpQueue::new());
        let monitor = Arc::new(MarketMonitor::new(
            ctx.clone(),
            queue.clone(),
            feed,
            config.maker_address.clone(),
        ));

        Arc::new(Self {
            config: config.clone(),
            ctx,
            queue,
            monitor,
            started_at: OffsetDateTime::now_utc(),
        })
    }

    /// Declare a new position: store it, open its lane, attach it to the
    /// market. The controller posts the first order from the initial
    /// market-data event; there is no separate code path.
    pub async fn create_position(&self, spec: PositionSpec) -> Result<Position> {
        let id = self.ctx.store.allocate_id();
        let position = Position::from_spec(
            id,
            &spec,
            self.ctx.units,
            self.config.complete_fraction,
        )
        .map_err(AgentError::Position)?;

        self.ctx.store.insert(position.clone());
        self.queue.open(id);

        if let Err(e) = self.monitor.attach(&position).await {
            // No state mutation survives a failed attach.
            self.queue.close(id);
            self.ctx.store.remove(id);
            return Err(e);
        }

        info!(
            position = id,
            market = %position.market_id,
            outcome = %position.outcome,
            "position created"
        );
        Ok(self.ctx.store.get(id).unwrap_or(position))
    }

    /// Enumerate all positions.
    pub fn list_positions(&self) -> Vec<Position> {
        self.ctx.store.snapshot()
    }

    /// Fetch one position.
    pub fn get_position(&self, id: PositionId) -> Option<Position> {
        self.ctx.store.get(id)
    }

    /// Apply an operator patch through the position's lane and reconcile
    /// the resting order against the new settings.
    pub async fn edit_position(&self, id: PositionId, patch: PositionPatch) -> Result<Position> {
        let position = self
            .ctx
            .store
            .get(id)
            .ok_or(AgentError::Position(PositionError::NotFound(id)))?;

        let metrics =
            self.monitor
                .metrics_for(&position.market_id, position.min_for_odds, position.min_for_vig);

        let ctx = self.ctx.clone();
        let result = self
            .queue
            .run(id, async move { controller::on_edit(&ctx, id, patch, metrics).await })
            .await
            .map_err(AgentError::Position)?;

        result.map_err(AgentError::Position)
    }

    /// Close a position: cancel its order, detach it, drop its lane.
    /// Queued operations resolve with `PositionGone`.
    pub async fn close_position(&self, id: PositionId) -> Result<Position> {
        let position = self
            .ctx
            .store
            .get(id)
            .ok_or(AgentError::Position(PositionError::NotFound(id)))?;
        let market_id = position.market_id.clone();

        let ctx = self.ctx.clone();
        let closed = self
            .queue
            .run(id, async move { controller::on_close(&ctx, id).await })
            .await
            .map_err(AgentError::Position)?
            .map_err(AgentError::Position)?;

        self.monitor.detach(id, &market_id);
        self.queue.close(id);
        Ok(closed)
    }

    /// Cancel every live order, then tear down transport and lanes.
    pub async fn shutdown(&self) {
        info!("shutting down, cancelling live orders");

        let order_ids: Vec<OrderId> = self
            .ctx
            .store
            .snapshot()
            .into_iter()
            .filter_map(|p| p.active_order_id)
            .collect();

        if !order_ids.is_empty() {
            match self.ctx.gateway.cancel_orders(&order_ids).await {
                Ok(cancelled) => {
                    info!(requested = order_ids.len(), cancelled = cancelled, "orders cancelled")
                }
                Err(e) => warn!(error = %e, "shutdown cancel failed"),
            }
        }

        self.monitor.shutdown();
        self.queue.close_all();
    }

    /// Aggregate counters for the status endpoint.
    pub fn stats(&self) -> AgentStats {
        let positions = self.ctx.store.snapshot();
        let mut stats = AgentStats {
            positions: positions.len(),
            ..Default::default()
        };
        for position in &positions {
            match position.status {
                Status::Active | Status::Initializing => stats.active += 1,
                Status::RiskPaused => stats.risk_paused += 1,
                Status::Completed => stats.completed += 1,
                Status::Closed => {}
            }
        }
        stats
    }

    /// Venue wire constants.
    pub fn units(&self) -> crate::config::Units {
        self.ctx.units
    }

    /// Agent start time.
    pub fn started_at(&self) -> OffsetDateTime {
        self.started_at
    }
}

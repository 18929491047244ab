//! Position controller: turns market and fill events into order actions.
//!
//! All handlers run inside the position's serializer lane, so each observes
//! and mutates an atomic view of the position.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::config::Units;
use crate::error::PositionError;
use crate::gateway::{OrderGateway, PostOrder};
use crate::market::types::{OrderId, PositionId};
use crate::metrics;
use crate::mirror::BookMetrics;
use crate::monitor::CancelTracker;
use crate::odds::premium_maker_odds;
use crate::position::store::PositionStore;
use crate::position::types::{OrderStatus, Position, PositionPatch, Status};

/// Shared dependencies for the event handlers.
pub struct Ctx {
    /// Position records.
    pub store: Arc<PositionStore>,
    /// Venue order gateway (already retry-wrapped).
    pub gateway: Arc<dyn OrderGateway>,
    /// Recently-cancelled order map for late-fill crediting.
    pub cancels: Arc<CancelTracker>,
    /// Venue wire constants.
    pub units: Units,
    /// Completion fraction for threshold re-derivation on edits.
    pub complete_fraction: Decimal,
    /// Minimum interval between order actions per position.
    pub min_order_update_interval: Duration,
    /// Grace sleep after a zero-cancelled result before reconciling.
    pub zero_cancel_grace: Duration,
}

/// Handle a market-data event: risk gate, then reprice if needed.
pub async fn on_market_data(ctx: &Ctx, id: PositionId, m: BookMetrics) {
    let Some(position) = ctx.store.get(id) else {
        return;
    };

    ctx.store.modify(id, |p| {
        p.last_best_taker_odds = m.best_for(p.outcome);
        p.last_vig = m.vig;
    });

    let risk = risk_breached(&position, &m);
    if risk != position.risk_breached {
        if risk {
            info!(position = id, vig = ?m.vig, "risk gate tripped, pausing");
            if position.active_order_id.is_some() {
                cancel_active(ctx, id).await;
            }
            ctx.store.modify(id, |p| {
                p.risk_breached = true;
                if !p.status.is_terminal() {
                    p.status = Status::RiskPaused;
                }
            });
            return;
        }

        info!(position = id, "risk gate cleared, resuming");
        ctx.store.modify(id, |p| {
            p.risk_breached = false;
            if p.status == Status::RiskPaused {
                p.status = Status::Active;
            }
        });
    }

    let Some(position) = ctx.store.get(id) else {
        return;
    };
    if position.risk_breached || position.status.is_terminal() {
        return;
    }

    ensure_order_current(ctx, id, &m).await;
}

/// Handle a fill report: credit monotonically, complete or reconcile.
pub async fn on_fill(ctx: &Ctx, id: PositionId, order_id: OrderId, filled_stake: u128, m: BookMetrics) {
    let Some(position) = ctx.store.get(id) else {
        return;
    };
    if position.status == Status::Closed {
        return;
    }

    let credited = position
        .credited_fills
        .get(&order_id)
        .copied()
        .unwrap_or(0);
    if filled_stake > credited {
        let gained = filled_stake - credited;
        ctx.store.modify(id, |p| {
            p.credited_fills.insert(order_id.clone(), filled_stake);
            p.filled_stake = p.filled_stake.saturating_add(gained);
            if p.active_order_id.as_deref() == Some(order_id.as_str()) {
                p.active_order_filled = p.active_order_filled.max(filled_stake);
            }
        });
        metrics::inc_fills_observed();
        info!(
            position = id,
            order_id = %order_id,
            gained = gained as u64,
            "fill credited"
        );
    }

    let Some(position) = ctx.store.get(id) else {
        return;
    };

    if position.is_complete() {
        ctx.store.modify(id, |p| p.status = Status::Completed);
        if position.active_order_id.is_some() {
            cancel_active(ctx, id).await;
        }
        info!(position = id, filled = position.filled_stake as u64, "position completed");
        return;
    }

    if position.risk_breached || position.status.is_terminal() {
        return;
    }

    ensure_order_current(ctx, id, &m).await;
}

/// Handle an operator edit: apply the patch, then reconcile the order.
pub async fn on_edit(
    ctx: &Ctx,
    id: PositionId,
    patch: PositionPatch,
    m: Option<BookMetrics>,
) -> Result<Position, PositionError> {
    let units = ctx.units;
    let fraction = ctx.complete_fraction;
    let applied = ctx
        .store
        .modify(id, |p| p.apply_patch(&patch, units, fraction))
        .ok_or(PositionError::NotFound(id))?;
    applied?;

    if let Some(m) = m {
        // Re-run the full market-data path so new risk bounds take effect.
        on_market_data(ctx, id, m).await;
    }

    ctx.store.get(id).ok_or(PositionError::Gone)
}

/// Handle an operator close: cancel, mark closed, remove from the store.
pub async fn on_close(ctx: &Ctx, id: PositionId) -> Result<Position, PositionError> {
    let position = ctx.store.get(id).ok_or(PositionError::NotFound(id))?;

    if position.active_order_id.is_some() {
        cancel_active(ctx, id).await;
    }

    let mut closed = ctx.store.remove(id).ok_or(PositionError::Gone)?;
    closed.status = Status::Closed;
    closed.closed_at = Some(OffsetDateTime::now_utc());
    info!(position = id, "position closed");
    Ok(closed)
}

/// Whether the market breaches the position's risk bounds.
fn risk_breached(position: &Position, m: &BookMetrics) -> bool {
    let vig_breach = m.vig.map(|v| v > position.max_vig).unwrap_or(false);
    let thin = |liq: Option<u128>| liq.map(|l| l < position.min_liquidity).unwrap_or(false);
    vig_breach || thin(m.liquidity[0]) || thin(m.liquidity[1])
}

/// Make the resting order reflect the current market and remaining stake.
///
/// Posts when there is no order, when the desired odds moved, or when the
/// order's live remainder no longer matches the stake left to fill (late
/// fills credited from cancelled orders shrink it after the fact).
async fn ensure_order_current(ctx: &Ctx, id: PositionId, m: &BookMetrics) {
    let Some(position) = ctx.store.get(id) else {
        return;
    };
    if position.risk_breached || position.status.is_terminal() {
        return;
    }

    let Some(best_taker_odds) = m.best_for(position.outcome) else {
        // No reference price; do not quote blind.
        if position.active_order_id.is_some() {
            cancel_active(ctx, id).await;
        }
        return;
    };

    if let Some(last) = position.last_order_action {
        if last.elapsed() < ctx.min_order_update_interval {
            return;
        }
    }

    let desired = match premium_maker_odds(
        best_taker_odds,
        position.premium_bps,
        ctx.units.ladder_step,
        ctx.units.odds_unit,
    ) {
        Ok(odds) => odds,
        Err(e) => {
            // Quote too small to discount onto the ladder; wait it out.
            debug!(position = id, error = %e, "no postable quote, suppressing");
            return;
        }
    };

    let needs_repost = position.active_order_id.is_none()
        || position.last_posted_odds != Some(desired)
        || position.active_order_remainder() != position.remaining_stake();
    if !needs_repost {
        return;
    }

    if position.active_order_id.is_some() {
        let cancelled = cancel_active(ctx, id).await;
        if cancelled == 0 {
            // Filled or already gone. Give the feed a moment and let the
            // pending fill event reconcile instead of posting blind.
            tokio::time::sleep(ctx.zero_cancel_grace).await;
            return;
        }
    }

    let Some(position) = ctx.store.get(id) else {
        return;
    };
    let remaining = position.remaining_stake();
    if remaining == 0 {
        ctx.store.modify(id, |p| p.status = Status::Completed);
        return;
    }

    let order = PostOrder {
        market_id: position.market_id.clone(),
        outcome: position.outcome,
        stake: remaining,
        odds: desired,
    };

    match ctx.gateway.post_maker_order(&order).await {
        Ok(order_id) => {
            ctx.store.modify(id, |p| {
                p.active_order_id = Some(order_id.clone());
                p.active_order_stake = remaining;
                p.active_order_filled = 0;
                p.last_posted_odds = Some(desired);
                p.order_status = OrderStatus::Active;
                if p.status == Status::Initializing {
                    p.status = Status::Active;
                }
                p.last_order_action = Some(Instant::now());
            });
            debug!(
                position = id,
                order_id = %order_id,
                stake = remaining as u64,
                odds = desired as u64,
                "quote posted"
            );
        }
        Err(e) => {
            warn!(position = id, error = %e, "order post failed");
            ctx.store.modify(id, |p| {
                p.order_status = OrderStatus::Error;
                p.active_order_id = None;
                p.active_order_stake = 0;
                p.active_order_filled = 0;
                p.last_posted_odds = None;
                p.last_order_action = Some(Instant::now());
            });
        }
    }
}

/// Cancel the position's resting order, tracking it for late fills.
///
/// Returns the venue's cancelled count; gateway failures count as zero so
/// the caller reconciles through the fill path.
async fn cancel_active(ctx: &Ctx, id: PositionId) -> u32 {
    let Some(position) = ctx.store.get(id) else {
        return 0;
    };
    let Some(order_id) = position.active_order_id.clone() else {
        return 0;
    };

    // Track before the venue sees the cancel so a racing fill still routes.
    ctx.cancels.track(order_id.clone(), id);

    let result = ctx.gateway.cancel_orders(std::slice::from_ref(&order_id)).await;

    ctx.store.modify(id, |p| {
        if p.active_order_id.as_deref() == Some(order_id.as_str()) {
            p.active_order_id = None;
            p.active_order_stake = 0;
            p.active_order_filled = 0;
            p.last_posted_odds = None;
            p.order_status = OrderStatus::Cancelled;
        }
        p.last_order_action = Some(Instant::now());
    });

    match result {
        Ok(cancelled) => cancelled,
        Err(e) => {
            warn!(position = id, order_id = %order_id, error = %e, "cancel failed");
            0
        }
    }
}

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::{AcceptanceEvent, OrderStatus, RideOrder};
use crate::state::AppState;

/// Arbitrates a single winner among drivers racing to accept an order.
///
/// The per-order lease lock keeps concurrent attempts from hammering the
/// store; the conditional transition's rows-affected result is the
/// correctness backstop and holds even if a lease expires and is stolen
/// mid-attempt.
pub async fn attempt_accept(
    state: &Arc<AppState>,
    driver_id: Uuid,
    order_id: Uuid,
) -> Result<RideOrder, AppError> {
    // Most late attempts die here, without any lock traffic.
    if !state.orders.accept_mark_present(&order_id) {
        return Err(lost(state, &order_id, &driver_id, "mark absent"));
    }

    let Some(_guard) = state
        .locks
        .acquire(order_id, state.config.lock_wait, state.config.lock_lease)
        .await
    else {
        return Err(lost(state, &order_id, &driver_id, "lock wait exhausted"));
    };

    // The fast-path check raced against the lock; check again under it.
    if !state.orders.accept_mark_present(&order_id) {
        return Err(lost(state, &order_id, &driver_id, "mark absent under lock"));
    }

    let accepted_at = Utc::now();
    let rows = state.orders.transition(
        &order_id,
        OrderStatus::AwaitingAccept,
        OrderStatus::Accepted,
        |order| {
            order.driver_id = Some(driver_id);
            order.accepted_at = Some(accepted_at);
        },
    );
    if rows == 0 {
        return Err(lost(state, &order_id, &driver_id, "conditional update"));
    }

    state.orders.remove_accept_mark(&order_id);
    state
        .metrics
        .accept_attempts_total
        .with_label_values(&["won"])
        .inc();

    let _ = state.acceptance_events_tx.send(AcceptanceEvent {
        order_id,
        driver_id,
        accepted_at,
    });

    info!(order_id = %order_id, driver_id = %driver_id, "order accepted");

    state
        .orders
        .get(&order_id)
        .ok_or_else(|| AppError::Internal(format!("order {order_id} vanished after acceptance")))
}

fn lost(state: &AppState, order_id: &Uuid, driver_id: &Uuid, stage: &str) -> AppError {
    state
        .metrics
        .accept_attempts_total
        .with_label_values(&["lost"])
        .inc();
    info!(order_id = %order_id, driver_id = %driver_id, stage, "acceptance attempt lost");
    AppError::OrderUnavailable
}

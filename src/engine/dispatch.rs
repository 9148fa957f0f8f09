use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::notification::OrderNotification;
use crate::models::order::{OrderSnapshot, OrderStatus};
use crate::state::AppState;

/// Registry entry for one order's recurring dispatch task.
pub struct DispatchHandle {
    pub task_id: Uuid,
    cancelled: Arc<AtomicBool>,
}

enum TickOutcome {
    /// The order left AwaitingAccept; the task is done.
    Terminated,
    Notified(usize),
}

/// Registers a recurring dispatch task for the order. Idempotent: if a
/// task is already live for this order id the existing task id is
/// returned and nothing is spawned.
pub fn schedule_dispatch(state: &Arc<AppState>, snapshot: OrderSnapshot) -> Uuid {
    let order_id = snapshot.order_id;

    match state.dispatch_tasks.entry(order_id) {
        Entry::Occupied(existing) => {
            info!(order_id = %order_id, "dispatch task already live; reusing");
            existing.get().task_id
        }
        Entry::Vacant(vacant) => {
            let task_id = Uuid::new_v4();
            let cancelled = Arc::new(AtomicBool::new(false));

            vacant.insert(DispatchHandle {
                task_id,
                cancelled: cancelled.clone(),
            });
            state.metrics.active_dispatch_tasks.inc();

            tokio::spawn(run_dispatch_task(state.clone(), snapshot, cancelled));
            info!(order_id = %order_id, task_id = %task_id, "dispatch task started");

            task_id
        }
    }
}

/// Prevents all future ticks for the order. Safe to call while a tick is
/// in flight: the running tick completes and the task exits on its next
/// wake-up without touching the geo index again.
pub fn cancel_dispatch(state: &AppState, order_id: &Uuid) -> bool {
    match state.dispatch_tasks.remove(order_id) {
        Some((_, handle)) => {
            handle.cancelled.store(true, Ordering::Relaxed);
            state.metrics.active_dispatch_tasks.dec();
            info!(order_id = %order_id, "dispatch task cancelled");
            true
        }
        None => false,
    }
}

async fn run_dispatch_task(
    state: Arc<AppState>,
    snapshot: OrderSnapshot,
    cancelled: Arc<AtomicBool>,
) {
    let order_id = snapshot.order_id;
    let expires_at = Instant::now() + state.config.max_dispatch_age;

    let mut ticker = interval(state.config.tick_interval);
    // A delayed wake-up must produce one catch-up tick, not a burst.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        if cancelled.load(Ordering::Relaxed) {
            break;
        }

        if Instant::now() >= expires_at {
            warn!(order_id = %order_id, "dispatch window exhausted; cancelling order");
            if let Err(err) = state.orders.cancel(&order_id) {
                // Lost the race against an acceptance or manual cancel;
                // either way the task has nothing left to do.
                info!(order_id = %order_id, error = %err, "order resolved before expiry cancel");
            }
            break;
        }

        let started = Instant::now();
        match run_tick(&state, &snapshot) {
            TickOutcome::Terminated => {
                observe_tick(&state, "terminated", started);
                break;
            }
            TickOutcome::Notified(count) => {
                observe_tick(&state, "fanout", started);
                if count > 0 {
                    info!(order_id = %order_id, notified = count, "dispatch tick fanned out");
                }
            }
        }
    }

    // The registry slot may already belong to a newer task for the same
    // order id; only clean up our own entry.
    if state
        .dispatch_tasks
        .remove_if(&order_id, |_, handle| {
            Arc::ptr_eq(&handle.cancelled, &cancelled)
        })
        .is_some()
    {
        state.metrics.active_dispatch_tasks.dec();
    }

    info!(order_id = %order_id, "dispatch task stopped");
}

fn run_tick(state: &AppState, snapshot: &OrderSnapshot) -> TickOutcome {
    let order_id = snapshot.order_id;

    let status = state.orders.status_of(&order_id);
    if status != OrderStatus::AwaitingAccept {
        info!(order_id = %order_id, ?status, "order left awaiting state; stopping dispatch");
        return TickOutcome::Terminated;
    }

    let candidates = state
        .geo
        .query_radius(&snapshot.origin, state.config.search_radius_km);

    let mut notified = 0usize;
    for (driver_id, distance_km) in candidates {
        if !driver_eligible(state, &driver_id, distance_km, snapshot.expected_distance_km) {
            continue;
        }
        if state.dedup.contains(&order_id, &driver_id) {
            continue;
        }

        // Inbox write first: a crash between the two loses at most the
        // dedup mark, never a notification that was recorded as sent.
        let notification = OrderNotification::from_snapshot(snapshot, distance_km);
        state.inboxes.push(driver_id, notification);
        state.dedup.mark(order_id, driver_id);

        state.metrics.notifications_pushed_total.inc();
        notified += 1;
        info!(
            order_id = %order_id,
            driver_id = %driver_id,
            distance_km,
            "order pushed to driver inbox"
        );
    }

    TickOutcome::Notified(notified)
}

fn driver_eligible(
    state: &AppState,
    driver_id: &Uuid,
    distance_km: f64,
    order_distance_km: f64,
) -> bool {
    // Position known but no registered profile: skip rather than guess
    // preferences.
    let Some(driver) = state.drivers.get(driver_id) else {
        return false;
    };
    let prefs = driver.preferences;

    if prefs.acceptance_radius_km != 0.0 && prefs.acceptance_radius_km < distance_km {
        return false;
    }
    if prefs.max_order_distance_km != 0.0 && prefs.max_order_distance_km < order_distance_km {
        return false;
    }

    true
}

fn observe_tick(state: &AppState, outcome: &str, started: Instant) {
    state
        .metrics
        .dispatch_ticks_total
        .with_label_values(&[outcome])
        .inc();
    state
        .metrics
        .tick_latency_seconds
        .with_label_values(&[outcome])
        .observe(started.elapsed().as_secs_f64());
}

use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::GeoPoint;
use crate::models::order::{OrderStatus, RideOrder, StatusLogEntry};

impl OrderStatus {
    /// The single status a forward transition may come from. Cancelled
    /// and NullOrder are terminal branches, not part of the chain.
    pub fn predecessor(self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Accepted => Some(OrderStatus::AwaitingAccept),
            OrderStatus::DriverArrived => Some(OrderStatus::Accepted),
            OrderStatus::CartUpdated => Some(OrderStatus::DriverArrived),
            OrderStatus::ServiceStarted => Some(OrderStatus::CartUpdated),
            OrderStatus::ServiceEnded => Some(OrderStatus::ServiceStarted),
            OrderStatus::Unpaid => Some(OrderStatus::ServiceEnded),
            OrderStatus::Paid => Some(OrderStatus::Unpaid),
            _ => None,
        }
    }
}

pub struct OrderDraft {
    pub start_location: String,
    pub end_location: String,
    pub origin: GeoPoint,
    pub destination: GeoPoint,
    pub expected_distance_km: f64,
    pub expected_amount: f64,
    pub expected_minutes: i64,
    pub favour_fee: f64,
}

/// Authoritative order state. Transitions go through `transition`, whose
/// expected-status guard runs under the store's entry lock; the
/// rows-affected result is the ground truth for every race, including
/// acceptance arbitration.
pub struct OrderStore {
    orders: DashMap<Uuid, RideOrder>,
    status_log: Mutex<Vec<StatusLogEntry>>,
    /// Fast-existence hint for "still biddable"; the persisted status is
    /// authoritative.
    accept_marks: DashMap<Uuid, Instant>,
    accept_window: Duration,
}

impl OrderStore {
    pub fn new(accept_window: Duration) -> Self {
        Self {
            orders: DashMap::new(),
            status_log: Mutex::new(Vec::new()),
            accept_marks: DashMap::new(),
            accept_window,
        }
    }

    pub fn create(&self, draft: OrderDraft) -> RideOrder {
        let order = RideOrder {
            id: Uuid::new_v4(),
            status: OrderStatus::AwaitingAccept,
            start_location: draft.start_location,
            end_location: draft.end_location,
            origin: draft.origin,
            destination: draft.destination,
            expected_distance_km: draft.expected_distance_km,
            expected_amount: draft.expected_amount,
            expected_minutes: draft.expected_minutes,
            favour_fee: draft.favour_fee,
            driver_id: None,
            accepted_at: None,
            created_at: Utc::now(),
        };

        self.orders.insert(order.id, order.clone());
        self.append_log(order.id, OrderStatus::AwaitingAccept);
        self.accept_marks
            .insert(order.id, Instant::now() + self.accept_window);

        order
    }

    pub fn get(&self, order_id: &Uuid) -> Option<RideOrder> {
        self.orders.get(order_id).map(|order| order.clone())
    }

    pub fn status_of(&self, order_id: &Uuid) -> OrderStatus {
        match self.orders.get(order_id) {
            Some(order) => order.status,
            None => OrderStatus::NullOrder,
        }
    }

    /// Conditional update with rows-affected semantics: 1 if the order
    /// existed and still had status `expected` at write time, else 0.
    pub fn transition(
        &self,
        order_id: &Uuid,
        expected: OrderStatus,
        next: OrderStatus,
        apply: impl FnOnce(&mut RideOrder),
    ) -> u64 {
        let Some(mut order) = self.orders.get_mut(order_id) else {
            return 0;
        };
        if order.status != expected {
            return 0;
        }

        order.status = next;
        apply(&mut order);
        drop(order);

        self.append_log(*order_id, next);
        1
    }

    /// Advances the order one step along the forward chain.
    pub fn advance(&self, order_id: &Uuid, next: OrderStatus) -> Result<RideOrder, AppError> {
        let Some(expected) = next.predecessor() else {
            return Err(AppError::BadRequest(format!(
                "{next:?} is not a forward transition"
            )));
        };

        if self.status_of(order_id) == OrderStatus::NullOrder {
            return Err(AppError::NotFound(format!("order {order_id} not found")));
        }

        if self.transition(order_id, expected, next, |_| {}) == 0 {
            return Err(AppError::Conflict(format!(
                "order {order_id} is not in {expected:?}"
            )));
        }

        self.get(order_id)
            .ok_or_else(|| AppError::Internal(format!("order {order_id} vanished")))
    }

    /// Cancellation is legal only while the order awaits acceptance.
    pub fn cancel(&self, order_id: &Uuid) -> Result<RideOrder, AppError> {
        if self.status_of(order_id) == OrderStatus::NullOrder {
            return Err(AppError::NotFound(format!("order {order_id} not found")));
        }

        if self.transition(
            order_id,
            OrderStatus::AwaitingAccept,
            OrderStatus::Cancelled,
            |_| {},
        ) == 0
        {
            return Err(AppError::Conflict(format!(
                "order {order_id} can no longer be cancelled"
            )));
        }

        self.remove_accept_mark(order_id);
        self.get(order_id)
            .ok_or_else(|| AppError::Internal(format!("order {order_id} vanished")))
    }

    pub fn accept_mark_present(&self, order_id: &Uuid) -> bool {
        self.accept_marks
            .get(order_id)
            .is_some_and(|deadline| *deadline > Instant::now())
    }

    pub fn remove_accept_mark(&self, order_id: &Uuid) {
        self.accept_marks.remove(order_id);
    }

    pub fn status_log(&self, order_id: &Uuid) -> Vec<StatusLogEntry> {
        self.status_log
            .lock()
            .expect("status log poisoned")
            .iter()
            .filter(|entry| entry.order_id == *order_id)
            .copied()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.orders.len()
    }

    fn append_log(&self, order_id: Uuid, status: OrderStatus) {
        self.status_log
            .lock()
            .expect("status log poisoned")
            .push(StatusLogEntry {
                order_id,
                status,
                recorded_at: Utc::now(),
            });
    }
}

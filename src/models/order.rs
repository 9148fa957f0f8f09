use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    AwaitingAccept,
    Accepted,
    DriverArrived,
    CartUpdated,
    ServiceStarted,
    ServiceEnded,
    Unpaid,
    Paid,
    Cancelled,
    /// No order record exists under the queried id. Surfaced as a status
    /// so pollers treat "never existed" like any other non-awaiting state.
    NullOrder,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideOrder {
    pub id: Uuid,
    pub status: OrderStatus,
    pub start_location: String,
    pub end_location: String,
    pub origin: GeoPoint,
    pub destination: GeoPoint,
    pub expected_distance_km: f64,
    pub expected_amount: f64,
    pub expected_minutes: i64,
    pub favour_fee: f64,
    pub driver_id: Option<Uuid>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Dispatch parameters frozen at submission time. The recurring task
/// works from this snapshot and never re-reads live order data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub order_id: Uuid,
    pub origin: GeoPoint,
    pub start_location: String,
    pub end_location: String,
    pub expected_distance_km: f64,
    pub expected_amount: f64,
    pub expected_minutes: i64,
    pub favour_fee: f64,
    pub created_at: DateTime<Utc>,
}

impl RideOrder {
    pub fn snapshot(&self) -> OrderSnapshot {
        OrderSnapshot {
            order_id: self.id,
            origin: self.origin,
            start_location: self.start_location.clone(),
            end_location: self.end_location.clone(),
            expected_distance_km: self.expected_distance_km,
            expected_amount: self.expected_amount,
            expected_minutes: self.expected_minutes,
            favour_fee: self.favour_fee,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AcceptanceEvent {
    pub order_id: Uuid,
    pub driver_id: Uuid,
    pub accepted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StatusLogEntry {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub recorded_at: DateTime<Utc>,
}

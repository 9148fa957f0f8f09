use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::OrderSnapshot;

/// Payload pushed into a driver's inbox when an order is dispatched to
/// them. Carries everything the driver client shows before accepting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderNotification {
    pub order_id: Uuid,
    pub start_location: String,
    pub end_location: String,
    pub expected_amount: f64,
    pub expected_distance_km: f64,
    pub expected_minutes: i64,
    pub favour_fee: f64,
    /// Driver-to-origin distance computed at fan-out time.
    pub distance_km: f64,
    pub created_at: DateTime<Utc>,
}

impl OrderNotification {
    pub fn from_snapshot(snapshot: &OrderSnapshot, distance_km: f64) -> Self {
        Self {
            order_id: snapshot.order_id,
            start_location: snapshot.start_location.clone(),
            end_location: snapshot.end_location.clone(),
            expected_amount: snapshot.expected_amount,
            expected_distance_km: snapshot.expected_distance_km,
            expected_minutes: snapshot.expected_minutes,
            favour_fee: snapshot.favour_fee,
            distance_km,
            created_at: snapshot.created_at,
        }
    }
}

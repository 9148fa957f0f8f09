use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Per-driver dispatch preferences. A value of 0 means unlimited.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DriverPreferences {
    pub acceptance_radius_km: f64,
    pub max_order_distance_km: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub preferences: DriverPreferences,
    pub updated_at: DateTime<Utc>,
}

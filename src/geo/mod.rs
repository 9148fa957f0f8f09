use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Live driver positions, keyed by driver id. Last write wins; no
/// history is kept. A driver going offline during a radius query may
/// still appear once in its results, which downstream filtering and
/// inbox TTLs absorb.
#[derive(Default)]
pub struct DriverGeoIndex {
    positions: DashMap<Uuid, GeoPoint>,
    queries_served: AtomicU64,
}

impl DriverGeoIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, driver_id: Uuid, point: GeoPoint) -> Result<(), AppError> {
        validate_point(&point)?;
        self.positions.insert(driver_id, point);
        Ok(())
    }

    pub fn remove(&self, driver_id: &Uuid) {
        self.positions.remove(driver_id);
    }

    /// Drivers within `radius_km` of `center`, ascending by distance.
    /// The boundary is inclusive.
    pub fn query_radius(&self, center: &GeoPoint, radius_km: f64) -> Vec<(Uuid, f64)> {
        self.queries_served.fetch_add(1, Ordering::Relaxed);

        let mut hits: Vec<(Uuid, f64)> = self
            .positions
            .iter()
            .filter_map(|entry| {
                let distance_km = haversine_km(entry.value(), center);
                (distance_km <= radius_km).then_some((*entry.key(), distance_km))
            })
            .collect();

        hits.sort_by(|a, b| a.1.total_cmp(&b.1));
        hits
    }

    pub fn queries_served(&self) -> u64 {
        self.queries_served.load(Ordering::Relaxed)
    }

    pub fn online_count(&self) -> usize {
        self.positions.len()
    }
}

pub fn validate_point(point: &GeoPoint) -> Result<(), AppError> {
    if !point.lat.is_finite() || !point.lng.is_finite() {
        return Err(AppError::BadRequest(
            "coordinates must be finite".to_string(),
        ));
    }

    if !(-90.0..=90.0).contains(&point.lat) || !(-180.0..=180.0).contains(&point.lng) {
        return Err(AppError::BadRequest(format!(
            "coordinates out of range: ({}, {})",
            point.lat, point.lng
        )));
    }

    Ok(())
}

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post, put};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::{Driver, DriverPreferences, GeoPoint};
use crate::models::notification::OrderNotification;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(register_driver))
        .route("/drivers/:id", get(get_driver))
        .route("/drivers/:id/preferences", patch(update_preferences))
        .route(
            "/drivers/:id/location",
            put(update_location).delete(remove_location),
        )
        .route("/drivers/:id/inbox", get(poll_inbox).delete(clear_inbox))
}

#[derive(Deserialize)]
pub struct RegisterDriverRequest {
    pub name: String,
    #[serde(default)]
    pub preferences: DriverPreferences,
}

#[derive(Deserialize)]
pub struct UpdatePreferencesRequest {
    pub preferences: DriverPreferences,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
}

fn validate_preferences(preferences: &DriverPreferences) -> Result<(), AppError> {
    if preferences.acceptance_radius_km < 0.0 || preferences.max_order_distance_km < 0.0 {
        return Err(AppError::BadRequest(
            "preference distances cannot be negative".to_string(),
        ));
    }
    Ok(())
}

async fn register_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    validate_preferences(&payload.preferences)?;

    let driver = Driver {
        id: Uuid::new_v4(),
        name: payload.name,
        preferences: payload.preferences,
        updated_at: Utc::now(),
    };

    state.drivers.insert(driver.id, driver.clone());
    Ok(Json(driver))
}

async fn get_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Driver>, AppError> {
    let driver = state
        .drivers
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

    Ok(Json(driver.value().clone()))
}

async fn update_preferences(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePreferencesRequest>,
) -> Result<Json<Driver>, AppError> {
    validate_preferences(&payload.preferences)?;

    let mut driver = state
        .drivers
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

    driver.preferences = payload.preferences;
    driver.updated_at = Utc::now();

    Ok(Json(driver.clone()))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Driver>, AppError> {
    let mut driver = state
        .drivers
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

    state.geo.upsert(id, payload.location)?;
    driver.updated_at = Utc::now();

    Ok(Json(driver.clone()))
}

async fn remove_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !state.drivers.contains_key(&id) {
        return Err(AppError::NotFound(format!("driver {id} not found")));
    }

    state.geo.remove(&id);
    Ok(StatusCode::NO_CONTENT)
}

async fn poll_inbox(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<OrderNotification>>, AppError> {
    if !state.drivers.contains_key(&id) {
        return Err(AppError::NotFound(format!("driver {id} not found")));
    }

    Ok(Json(state.inboxes.drain(&id)))
}

async fn clear_inbox(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !state.drivers.contains_key(&id) {
        return Err(AppError::NotFound(format!("driver {id} not found")));
    }

    state.inboxes.clear(&id);
    Ok(StatusCode::NO_CONTENT)
}

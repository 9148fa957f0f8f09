use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::accept::attempt_accept;
use crate::engine::dispatch::{cancel_dispatch, schedule_dispatch};
use crate::error::AppError;
use crate::geo::validate_point;
use crate::lifecycle::OrderDraft;
use crate::models::driver::GeoPoint;
use crate::models::order::{OrderStatus, RideOrder, StatusLogEntry};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/status", get(get_order_status))
        .route("/orders/:id/log", get(get_status_log))
        .route("/orders/:id/dispatch", post(submit_dispatch))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/orders/:id/accept", post(accept_order))
        .route("/orders/:id/arrived", post(driver_arrived))
        .route("/orders/:id/cart", post(cart_updated))
        .route("/orders/:id/start", post(start_service))
        .route("/orders/:id/end", post(end_service))
        .route("/orders/:id/unpaid", post(mark_unpaid))
        .route("/orders/:id/paid", post(mark_paid))
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub start_location: String,
    pub end_location: String,
    pub origin: GeoPoint,
    pub destination: GeoPoint,
    pub expected_distance_km: f64,
    pub expected_amount: f64,
    pub expected_minutes: i64,
    #[serde(default)]
    pub favour_fee: f64,
}

#[derive(Serialize)]
pub struct SubmitDispatchResponse {
    pub task_id: Uuid,
    pub order: RideOrder,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<SubmitDispatchResponse>, AppError> {
    if payload.start_location.trim().is_empty() || payload.end_location.trim().is_empty() {
        return Err(AppError::BadRequest(
            "start and end locations cannot be empty".to_string(),
        ));
    }
    validate_point(&payload.origin)?;
    validate_point(&payload.destination)?;
    if payload.expected_distance_km <= 0.0 {
        return Err(AppError::BadRequest(
            "expected distance must be positive".to_string(),
        ));
    }

    let order = state.orders.create(OrderDraft {
        start_location: payload.start_location,
        end_location: payload.end_location,
        origin: payload.origin,
        destination: payload.destination,
        expected_distance_km: payload.expected_distance_km,
        expected_amount: payload.expected_amount,
        expected_minutes: payload.expected_minutes,
        favour_fee: payload.favour_fee,
    });

    let task_id = schedule_dispatch(&state, order.snapshot());

    Ok(Json(SubmitDispatchResponse { task_id, order }))
}

/// Re-submits dispatch for an existing order. A retried submission finds
/// the live task and is a no-op.
async fn submit_dispatch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SubmitDispatchResponse>, AppError> {
    let order = state
        .orders
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

    if order.status != OrderStatus::AwaitingAccept {
        return Err(AppError::Conflict(format!(
            "order {id} is no longer awaiting acceptance"
        )));
    }

    let task_id = schedule_dispatch(&state, order.snapshot());

    Ok(Json(SubmitDispatchResponse { task_id, order }))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RideOrder>, AppError> {
    let order = state
        .orders
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

    Ok(Json(order))
}

#[derive(Serialize)]
struct OrderStatusResponse {
    status: OrderStatus,
}

/// Unknown ids read as NullOrder rather than 404, so status pollers
/// treat "never existed" and "no longer awaiting" uniformly.
async fn get_order_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Json<OrderStatusResponse> {
    Json(OrderStatusResponse {
        status: state.orders.status_of(&id),
    })
}

async fn get_status_log(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Json<Vec<StatusLogEntry>> {
    Json(state.orders.status_log(&id))
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RideOrder>, AppError> {
    let cancelled = state.orders.cancel(&id)?;
    cancel_dispatch(&state, &id);
    Ok(Json(cancelled))
}

#[derive(Deserialize)]
pub struct AcceptOrderRequest {
    pub driver_id: Uuid,
}

async fn accept_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AcceptOrderRequest>,
) -> Result<Json<RideOrder>, AppError> {
    if !state.drivers.contains_key(&payload.driver_id) {
        return Err(AppError::NotFound(format!(
            "driver {} not found",
            payload.driver_id
        )));
    }

    let accepted = attempt_accept(&state, payload.driver_id, id).await?;
    Ok(Json(accepted))
}

async fn driver_arrived(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RideOrder>, AppError> {
    Ok(Json(state.orders.advance(&id, OrderStatus::DriverArrived)?))
}

async fn cart_updated(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RideOrder>, AppError> {
    Ok(Json(state.orders.advance(&id, OrderStatus::CartUpdated)?))
}

async fn start_service(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RideOrder>, AppError> {
    Ok(Json(state.orders.advance(&id, OrderStatus::ServiceStarted)?))
}

async fn end_service(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RideOrder>, AppError> {
    Ok(Json(state.orders.advance(&id, OrderStatus::ServiceEnded)?))
}

async fn mark_unpaid(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RideOrder>, AppError> {
    Ok(Json(state.orders.advance(&id, OrderStatus::Unpaid)?))
}

async fn mark_paid(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RideOrder>, AppError> {
    Ok(Json(state.orders.advance(&id, OrderStatus::Paid)?))
}

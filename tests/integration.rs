use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chauffeur_dispatch::api::rest::router;
use chauffeur_dispatch::config::Config;
use chauffeur_dispatch::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;

// Chengdu city centre, the origin used by every order in these tests.
const ORIGIN_LAT: f64 = 30.5740;
const ORIGIN_LNG: f64 = 104.0730;
// Roughly 1 km north of the origin.
const NEARBY_LAT: f64 = 30.5830;

fn test_config() -> Config {
    Config {
        http_port: 0,
        log_level: "info".to_string(),
        event_buffer_size: 64,
        search_radius_km: 5.0,
        tick_interval: Duration::from_secs(60),
        inbox_ttl: Duration::from_secs(60),
        accept_window: Duration::from_secs(900),
        max_dispatch_age: Duration::from_secs(900),
        lock_wait: Duration::from_millis(100),
        lock_lease: Duration::from_secs(30),
    }
}

fn setup() -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(test_config()));
    (router(state.clone()), state)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn register_driver(app: &axum::Router, name: &str) -> String {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/drivers",
            json!({ "name": name }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    body["id"].as_str().unwrap().to_string()
}

async fn put_location(app: &axum::Router, driver_id: &str, lat: f64, lng: f64) {
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/drivers/{driver_id}/location"),
            json!({ "location": { "lat": lat, "lng": lng } }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

async fn create_order(app: &axum::Router) -> Value {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/orders",
            json!({
                "start_location": "North Gate",
                "end_location": "East Station",
                "origin": { "lat": ORIGIN_LAT, "lng": ORIGIN_LNG },
                "destination": { "lat": 30.6320, "lng": 104.0880 },
                "expected_distance_km": 8.5,
                "expected_amount": 42.0,
                "expected_minutes": 28,
                "favour_fee": 5.0
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["orders"], 0);
    assert_eq!(body["drivers_online"], 0);
    assert_eq!(body["dispatch_tasks"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("active_dispatch_tasks"));
}

#[tokio::test]
async fn register_driver_returns_driver_with_default_preferences() {
    let (app, _state) = setup();
    let response = app
        .oneshot(json_request("POST", "/drivers", json!({ "name": "Wang" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["name"], "Wang");
    assert_eq!(body["preferences"]["acceptance_radius_km"], 0.0);
    assert_eq!(body["preferences"]["max_order_distance_km"], 0.0);
    assert!(!body["id"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn register_driver_empty_name_returns_400() {
    let (app, _state) = setup();
    let response = app
        .oneshot(json_request("POST", "/drivers", json!({ "name": "  " })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn register_driver_negative_preference_returns_400() {
    let (app, _state) = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/drivers",
            json!({
                "name": "Li",
                "preferences": { "acceptance_radius_km": -1.0, "max_order_distance_km": 0.0 }
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_location_for_unknown_driver_returns_404() {
    let (app, _state) = setup();
    let fake_id = "00000000-0000-0000-0000-000000000000";
    let response = app
        .oneshot(json_request(
            "PUT",
            &format!("/drivers/{fake_id}/location"),
            json!({ "location": { "lat": ORIGIN_LAT, "lng": ORIGIN_LNG } }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn update_location_with_invalid_coordinates_returns_400() {
    let (app, _state) = setup();
    let driver_id = register_driver(&app, "Zhao").await;

    let response = app
        .oneshot(json_request(
            "PUT",
            &format!("/drivers/{driver_id}/location"),
            json!({ "location": { "lat": 91.0, "lng": 0.0 } }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_order_returns_awaiting_order_and_task() {
    let (app, state) = setup();
    let body = create_order(&app).await;

    assert_eq!(body["order"]["status"], "AwaitingAccept");
    assert!(body["order"]["driver_id"].is_null());
    assert_eq!(body["order"]["favour_fee"], 5.0);
    assert!(!body["task_id"].as_str().unwrap().is_empty());
    assert_eq!(state.dispatch_tasks.len(), 1);
}

#[tokio::test]
async fn order_status_for_unknown_id_is_null_order() {
    let (app, _state) = setup();
    let fake_id = "00000000-0000-0000-0000-000000000000";
    let response = app
        .oneshot(get_request(&format!("/orders/{fake_id}/status")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "NullOrder");
}

#[tokio::test]
async fn get_nonexistent_order_returns_404() {
    let (app, _state) = setup();
    let fake_id = "00000000-0000-0000-0000-000000000000";
    let response = app
        .oneshot(get_request(&format!("/orders/{fake_id}")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn submit_dispatch_is_idempotent() {
    let (app, state) = setup();
    let body = create_order(&app).await;
    let order_id = body["order"]["id"].as_str().unwrap().to_string();
    let task_id = body["task_id"].as_str().unwrap().to_string();

    let response = app
        .oneshot(empty_request("POST", &format!("/orders/{order_id}/dispatch")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let resubmitted = body_json(response).await;
    assert_eq!(resubmitted["task_id"], task_id.as_str());
    assert_eq!(state.dispatch_tasks.len(), 1);
}

#[tokio::test]
async fn full_dispatch_and_acceptance_flow() {
    let (app, _state) = setup();

    let winner = register_driver(&app, "Wang").await;
    let loser = register_driver(&app, "Li").await;
    put_location(&app, &winner, NEARBY_LAT, ORIGIN_LNG).await;
    put_location(&app, &loser, NEARBY_LAT, ORIGIN_LNG).await;

    let created = create_order(&app).await;
    let order_id = created["order"]["id"].as_str().unwrap().to_string();

    // Let the first dispatch tick run.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let response = app
        .clone()
        .oneshot(get_request(&format!("/drivers/{winner}/inbox")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let inbox = body_json(response).await;
    let notifications = inbox.as_array().unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0]["order_id"], order_id.as_str());
    assert_eq!(notifications[0]["start_location"], "North Gate");
    assert!(notifications[0]["distance_km"].as_f64().unwrap() > 0.0);
    assert!(notifications[0]["distance_km"].as_f64().unwrap() < 1.5);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/orders/{order_id}/accept"),
            json!({ "driver_id": winner }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let accepted = body_json(response).await;
    assert_eq!(accepted["status"], "Accepted");
    assert_eq!(accepted["driver_id"], winner.as_str());

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/orders/{order_id}/accept"),
            json!({ "driver_id": loser }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Cancellation is only legal while awaiting acceptance.
    let response = app
        .clone()
        .oneshot(empty_request("POST", &format!("/orders/{order_id}/cancel")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    for step in ["arrived", "cart", "start", "end", "unpaid", "paid"] {
        let response = app
            .clone()
            .oneshot(empty_request("POST", &format!("/orders/{order_id}/{step}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "step {step}");
    }

    let response = app
        .clone()
        .oneshot(get_request(&format!("/orders/{order_id}")))
        .await
        .unwrap();
    let order = body_json(response).await;
    assert_eq!(order["status"], "Paid");

    let response = app
        .oneshot(get_request(&format!("/orders/{order_id}/log")))
        .await
        .unwrap();
    let log = body_json(response).await;
    assert_eq!(log.as_array().unwrap().len(), 8);
}

#[tokio::test]
async fn forward_transition_out_of_order_returns_409() {
    let (app, _state) = setup();
    let created = create_order(&app).await;
    let order_id = created["order"]["id"].as_str().unwrap().to_string();

    // Still awaiting acceptance; "arrived" requires Accepted.
    let response = app
        .oneshot(empty_request("POST", &format!("/orders/{order_id}/arrived")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn cancelled_order_cannot_be_accepted() {
    let (app, state) = setup();
    let driver_id = register_driver(&app, "Wang").await;

    let created = create_order(&app).await;
    let order_id = created["order"]["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(empty_request("POST", &format!("/orders/{order_id}/cancel")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cancelled = body_json(response).await;
    assert_eq!(cancelled["status"], "Cancelled");
    assert_eq!(state.dispatch_tasks.len(), 0);

    let response = app
        .oneshot(json_request(
            "POST",
            &format!("/orders/{order_id}/accept"),
            json!({ "driver_id": driver_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn clear_inbox_discards_pending_notifications() {
    let (app, _state) = setup();
    let driver_id = register_driver(&app, "Wang").await;
    put_location(&app, &driver_id, NEARBY_LAT, ORIGIN_LNG).await;

    create_order(&app).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let response = app
        .clone()
        .oneshot(empty_request("DELETE", &format!("/drivers/{driver_id}/inbox")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(get_request(&format!("/drivers/{driver_id}/inbox")))
        .await
        .unwrap();
    let inbox = body_json(response).await;
    assert_eq!(inbox.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn offline_driver_is_not_notified() {
    let (app, _state) = setup();
    let driver_id = register_driver(&app, "Wang").await;
    put_location(&app, &driver_id, NEARBY_LAT, ORIGIN_LNG).await;

    let response = app
        .clone()
        .oneshot(empty_request(
            "DELETE",
            &format!("/drivers/{driver_id}/location"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    create_order(&app).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let response = app
        .oneshot(get_request(&format!("/drivers/{driver_id}/inbox")))
        .await
        .unwrap();
    let inbox = body_json(response).await;
    assert_eq!(inbox.as_array().unwrap().len(), 0);
}

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tower::util::ServiceExt; // for `oneshot`

use telemetry_hub::build_router;
use telemetry_hub::core::Hub;
use telemetry_hub::directory::Directory;
use telemetry_hub::handlers::AppState;
use telemetry_hub::store::Store;
use telemetry_hub::SharedState;

async fn test_state() -> SharedState {
    let store = Store::memory().await.unwrap();
    store.migrate().await.unwrap();
    let directory = Directory::new(store.clone(), None, "controller".into());
    let (events, _) = broadcast::channel(64);
    let (forward_tx, _forward_rx) = mpsc::channel(16);
    Arc::new(AppState {
        hub: Hub::new(store, events, forward_tx),
        directory,
    })
}

fn post(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn healthz_ok() {
    let app = build_router(test_state().await);
    let resp = app.oneshot(get("/healthz")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn sensor_post_ok_then_latest_round_trip() {
    let app = build_router(test_state().await);

    let body = json!({
        "device": "ESP32_Node1",
        "sensors": [{"type": "light", "value": 23.7}]
    })
    .to_string();
    let resp = app
        .clone()
        .oneshot(post("/api/sensor", body))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = body_json(resp).await;
    assert_eq!(v["status"], "success");
    assert_eq!(v["message"], "Sensor data received and processed.");

    let resp = app
        .oneshot(get("/api/sensor/light/latest?limit=5"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let rows = body_json(resp).await;
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["device_name"], "ESP32_Node1");
    assert_eq!(rows[0]["value"], 23.7);
}

#[tokio::test]
async fn sensor_post_missing_fields_is_400() {
    let app = build_router(test_state().await);
    let resp = app
        .oneshot(post(
            "/api/sensor",
            json!({"sensors": [{"type": "light", "value": 1.0}]}).to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let v = body_json(resp).await;
    assert_eq!(v["status"], "error");
    assert_eq!(
        v["message"],
        "Missing required sensor data fields (device, sensors)"
    );
}

#[tokio::test]
async fn sensor_post_incomplete_entry_is_400_and_stores_nothing() {
    let app = build_router(test_state().await);
    let resp = app
        .clone()
        .oneshot(post(
            "/api/sensor",
            json!({
                "device": "ESP32",
                "sensors": [{"type": "light", "value": 1.0}, {"type": "humidity"}]
            })
            .to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let v = body_json(resp).await;
    assert_eq!(v["message"], "Each sensor must have 'type' and 'value' fields");

    // The valid first entry must not have been persisted.
    let resp = app
        .oneshot(get("/api/sensor/light/latest"))
        .await
        .unwrap();
    let rows = body_json(resp).await;
    assert_eq!(rows.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn sensor_post_broken_json_is_400() {
    let app = build_router(test_state().await);
    let resp = app
        .oneshot(post("/api/sensor", "{{{nope".into()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let v = body_json(resp).await;
    assert_eq!(v["status"], "error");
}

#[tokio::test]
async fn register_then_reregister_keeps_one_row() {
    let app = build_router(test_state().await);

    let resp = app
        .clone()
        .oneshot(post(
            "/api/register-device",
            json!({"name": "ESP32_Node1", "ip": "192.168.1.100", "type": "controller"})
                .to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = body_json(resp).await;
    assert_eq!(v["status"], "registered");
    assert_eq!(v["message"], "Device ESP32_Node1 registered/updated.");

    let resp = app
        .clone()
        .oneshot(post(
            "/api/register-device",
            json!({"name": "ESP32_Node1", "ip": "192.168.1.101", "type": "controller"})
                .to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app.oneshot(get("/api/devices")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let devices = body_json(resp).await;
    let devices = devices.as_array().unwrap().clone();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0]["name"], "ESP32_Node1");
    assert_eq!(devices[0]["ip"], "192.168.1.101");
    assert_eq!(devices[0]["type"], "controller");
}

#[tokio::test]
async fn register_missing_fields_is_400() {
    let app = build_router(test_state().await);
    let resp = app
        .oneshot(post(
            "/api/register-device",
            json!({"name": "ESP32_Node1", "ip": "192.168.1.100"}).to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let v = body_json(resp).await;
    assert_eq!(v["message"], "Missing required fields (name, ip, type)");
}

#[tokio::test]
async fn latest_for_unknown_type_is_empty() {
    let app = build_router(test_state().await);
    let resp = app.oneshot(get("/api/sensor/pressure/latest")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let rows = body_json(resp).await;
    assert_eq!(rows.as_array().unwrap().len(), 0);
}

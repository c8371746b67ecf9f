use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::Hub;
use crate::directory::Directory;
use crate::error::IngestError;
use crate::store::{Device, ReadingRow};

pub struct AppState {
    pub hub: Hub,
    pub directory: Directory,
}

pub type SharedState = Arc<AppState>;

const DEFAULT_LATEST_LIMIT: i64 = 5;
const MAX_LATEST_LIMIT: i64 = 100;

pub async fn healthz() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

// Bodies are decoded by hand so a broken payload gets the same JSON error
// shape the deployed firmware already expects, instead of axum's rejection.
fn decode(body: &Bytes) -> Result<Value, (StatusCode, Json<Value>)> {
    serde_json::from_slice(body).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"status": "error", "message": format!("Invalid JSON payload: {e}")})),
        )
    })
}

pub async fn post_sensor(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let payload = decode(&body)?;
    match state.hub.ingest(&payload).await {
        Ok(batch) => {
            tracing::info!(
                device = %batch.device,
                count = batch.sensors.len(),
                "sensor batch ingested via http"
            );
            Ok(Json(json!({
                "status": "success",
                "message": "Sensor data received and processed."
            })))
        }
        Err(IngestError::Validation(e)) => {
            tracing::warn!(reason = e.reason.as_str(), "sensor payload rejected");
            Err((
                StatusCode::BAD_REQUEST,
                Json(json!({"status": "error", "message": e.to_string()})),
            ))
        }
        Err(IngestError::Storage(e)) => {
            tracing::error!("sensor batch not stored: {e}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "error",
                    "message": format!("Error processing sensor data: {e}")
                })),
            ))
        }
    }
}

pub async fn register_device(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let payload = decode(&body)?;
    let field = |key: &str| {
        payload
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let (Some(name), Some(ip), Some(device_type)) = (field("name"), field("ip"), field("type"))
    else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "status": "error",
                "message": "Missing required fields (name, ip, type)"
            })),
        ));
    };

    match state.directory.register(&name, &ip, &device_type).await {
        Ok(device) => {
            tracing::info!(name = %device.name, ip = %device.ip, "device registered");
            Ok(Json(json!({
                "status": "registered",
                "message": format!("Device {} registered/updated.", device.name)
            })))
        }
        Err(e) => {
            tracing::error!(name = %name, "device registration failed: {e}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "error",
                    "message": format!("Could not register device: {e}")
                })),
            ))
        }
    }
}

pub async fn list_devices(
    State(state): State<SharedState>,
) -> Result<Json<Vec<Device>>, (StatusCode, Json<Value>)> {
    state.directory.list().await.map(Json).map_err(|e| {
        tracing::error!("device listing failed: {e}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"status": "error", "message": format!("Could not list devices: {e}")})),
        )
    })
}

#[derive(Deserialize)]
pub struct LatestQuery {
    limit: Option<i64>,
}

pub async fn latest_readings(
    State(state): State<SharedState>,
    Path(sensor_type): Path<String>,
    Query(query): Query<LatestQuery>,
) -> Result<Json<Vec<ReadingRow>>, (StatusCode, Json<Value>)> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LATEST_LIMIT)
        .clamp(1, MAX_LATEST_LIMIT);
    state
        .hub
        .latest_readings(&sensor_type, limit)
        .await
        .map(Json)
        .map_err(|e| {
            tracing::error!(sensor_type = %sensor_type, "latest readings query failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"status": "error", "message": format!("Could not read sensor data: {e}")})),
            )
        })
}

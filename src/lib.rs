use axum::{
    Router,
    routing::{get, post},
};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub mod core;
pub mod directory;
pub mod error;
pub mod forward;
pub mod handlers;
pub mod mqtt;
pub mod store;
pub mod types;
pub mod validate;
pub mod ws;

pub use handlers::{AppState, SharedState};

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/api/sensor", post(handlers::post_sensor))
        .route("/api/register-device", post(handlers::register_device))
        .route("/api/devices", get(handlers::list_devices))
        .route(
            "/api/sensor/:sensor_type/latest",
            get(handlers::latest_readings),
        )
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let request_id = req
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http",
                    %request_id,
                    method = %req.method(),
                    uri = %req.uri(),
                )
            }),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

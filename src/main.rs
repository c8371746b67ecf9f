//! Hub entry point: reads env config, connects SQLite and MQTT, spawns the
//! forwarding worker, and serves the HTTP/WebSocket API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use telemetry_hub::build_router;
use telemetry_hub::core::Hub;
use telemetry_hub::directory::Directory;
use telemetry_hub::forward;
use telemetry_hub::handlers::AppState;
use telemetry_hub::mqtt::{MqttAdapter, MqttConfig};
use telemetry_hub::store::Store;

fn read_env(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => default.to_string(),
    }
}

fn read_env_optional(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn mqtt_config() -> MqttConfig {
    let default_host = read_env("MQTT_HOST", "localhost");
    let default_port: u16 = read_env("MQTT_PORT", "1883").parse().unwrap_or(1883);
    let (host, port) = match read_env_optional("MQTT_URL") {
        Some(url) => match Url::parse(&url) {
            Ok(parsed) => {
                let host = parsed.host_str().unwrap_or(&default_host).to_string();
                let port = parsed.port().unwrap_or(default_port);
                (host, port)
            }
            Err(e) => {
                tracing::warn!(
                    "MQTT_URL parse error: {e}; falling back to {}:{}",
                    default_host,
                    default_port
                );
                (default_host.clone(), default_port)
            }
        },
        None => (default_host.clone(), default_port),
    };

    let credentials = match (
        read_env_optional("MQTT_USERNAME"),
        read_env_optional("MQTT_PASSWORD"),
    ) {
        (Some(username), Some(password)) => Some((username, password)),
        (None, None) => None,
        _ => {
            tracing::warn!(
                "MQTT username/password not fully specified; proceeding without credentials"
            );
            None
        }
    };

    MqttConfig {
        host,
        port,
        client_id: read_env("MQTT_CLIENT_ID", "telemetry-hub"),
        credentials,
        sub_topic: read_env("MQTT_SUB_TOPIC", "sensors/data"),
        pub_topic: read_env("MQTT_PUB_TOPIC", "commands/esp32"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let host = read_env("HUB_HOST", "0.0.0.0");
    let port: u16 = read_env("HUB_PORT", "5000").parse().unwrap_or(5000);
    let db_url = read_env("HUB_DB_URL", "sqlite:automation.db?mode=rwc");
    let forward_timeout_ms: u64 = read_env("FORWARD_TIMEOUT_MS", "3000").parse().unwrap_or(3000);

    let store = Store::connect(&db_url).await?;
    store.migrate().await?;
    tracing::info!("database ready at {db_url}");

    let directory = Directory::new(
        store.clone(),
        read_env_optional("FORWARD_BASE_URL"),
        read_env("CONTROLLER_DEVICE_TYPE", "controller"),
    );

    let (events_tx, _) = broadcast::channel(256);
    let (forward_tx, forward_rx) = mpsc::channel(32);

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_millis(forward_timeout_ms))
        .build()?;
    forward::spawn_worker(
        forward_rx,
        directory.clone(),
        events_tx.clone(),
        http_client,
    );

    let state = Arc::new(AppState {
        hub: Hub::new(store, events_tx, forward_tx),
        directory,
    });

    let mqtt = MqttAdapter::connect(mqtt_config(), Arc::clone(&state));

    let app = build_router(Arc::clone(&state));
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("telemetry-hub listening on http://{addr}");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    mqtt.shutdown().await;
    tracing::info!("shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigint = signal(SignalKind::interrupt()).expect("listen SIGINT");
    let mut sigterm = signal(SignalKind::terminate()).expect("listen SIGTERM");
    tokio::select! {
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
    }
    tracing::info!("shutdown signal received");
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    tracing::info!("shutdown signal received");
}

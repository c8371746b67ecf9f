//! MQTT transport: feeds sensor-topic payloads into the hub and republishes
//! accepted LED commands to the command topic. The connection is an owned
//! adapter with an explicit lifecycle, not a process-wide global.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event as MqttEvent, Incoming, MqttOptions, QoS};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use crate::core::Hub;
use crate::error::IngestError;
use crate::handlers::SharedState;
use crate::types::{Event, Severity};

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub credentials: Option<(String, String)>,
    pub sub_topic: String,
    pub pub_topic: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Connecting,
    Connected,
}

pub struct MqttAdapter {
    client: AsyncClient,
    state: watch::Receiver<ConnState>,
}

impl MqttAdapter {
    /// Starts the event loop and the command republisher. The broker may be
    /// down; the adapter keeps retrying in the background.
    pub fn connect(cfg: MqttConfig, shared: SharedState) -> MqttAdapter {
        let mut opts = MqttOptions::new(&cfg.client_id, &cfg.host, cfg.port);
        opts.set_keep_alive(Duration::from_secs(30));
        if let Some((username, password)) = &cfg.credentials {
            opts.set_credentials(username, password);
        }

        let (client, mut eventloop) = AsyncClient::new(opts, 32);
        let (conn_tx, conn_rx) = watch::channel(ConnState::Connecting);

        info!("mqtt -> {}:{} as {}", cfg.host, cfg.port, cfg.client_id);

        {
            let client = client.clone();
            let shared = Arc::clone(&shared);
            let sub_topic = cfg.sub_topic.clone();
            tokio::spawn(async move {
                loop {
                    match eventloop.poll().await {
                        Ok(MqttEvent::Incoming(Incoming::ConnAck(_))) => {
                            info!("mqtt connected");
                            let _ = conn_tx.send(ConnState::Connected);
                            // Re-subscribe on every (re)connect; the broker may
                            // have dropped the session.
                            if let Err(e) = client.subscribe(&sub_topic, QoS::AtLeastOnce).await {
                                error!("subscribe to '{sub_topic}' failed: {e}");
                            } else {
                                info!("subscribed: {sub_topic}");
                            }
                            shared.hub.notify(Severity::Info, "MQTT client connected.");
                        }
                        Ok(MqttEvent::Incoming(Incoming::Publish(p))) => {
                            handle_sensor_message(&shared.hub, &p.topic, &p.payload).await;
                        }
                        Ok(MqttEvent::Incoming(Incoming::Disconnect)) => {
                            warn!("mqtt disconnected");
                            let _ = conn_tx.send(ConnState::Disconnected);
                            shared.hub.notify(Severity::Info, "MQTT client disconnected.");
                        }
                        Ok(other) => trace!("mqtt event: {other:?}"),
                        Err(e) => {
                            error!("mqtt eventloop error: {e}; retrying in 2s");
                            if *conn_tx.borrow() != ConnState::Disconnected {
                                let _ = conn_tx.send(ConnState::Disconnected);
                                shared
                                    .hub
                                    .notify(Severity::Error, format!("MQTT connection failed: {e}"));
                            }
                            tokio::time::sleep(Duration::from_secs(2)).await;
                        }
                    }
                }
            });
        }

        {
            let client = client.clone();
            let conn_rx = conn_rx.clone();
            let pub_topic = cfg.pub_topic.clone();
            let mut events = shared.hub.subscribe();
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(Event::LedUpdate(state)) => {
                            if *conn_rx.borrow() != ConnState::Connected {
                                debug!("mqtt not connected, skipping command publish");
                                shared.hub.notify(
                                    Severity::Info,
                                    "MQTT not connected, LED command sent via HTTP only.",
                                );
                                continue;
                            }
                            let payload = serde_json::to_vec(&state).unwrap_or_default();
                            if let Err(e) = client
                                .publish(&pub_topic, QoS::AtLeastOnce, false, payload)
                                .await
                            {
                                warn!("mqtt publish to '{pub_topic}' failed: {e}");
                                shared.hub.notify(
                                    Severity::Error,
                                    format!("Failed to publish LED command via MQTT: {e}"),
                                );
                            }
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "mqtt republisher lagging, events dropped");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            });
        }

        MqttAdapter {
            client,
            state: conn_rx,
        }
    }

    pub fn connection_state(&self) -> ConnState {
        *self.state.borrow()
    }

    pub async fn shutdown(&self) {
        if let Err(e) = self.client.disconnect().await {
            debug!("mqtt disconnect on shutdown failed: {e}");
        }
    }
}

// A broken message is dropped and the connection stays up.
async fn handle_sensor_message(hub: &Hub, topic: &str, payload: &[u8]) {
    let value: Value = match serde_json::from_slice(payload) {
        Ok(v) => v,
        Err(e) => {
            warn!(%topic, "mqtt payload not valid json: {e}");
            hub.notify(Severity::Error, "MQTT payload not valid JSON.");
            return;
        }
    };
    match hub.ingest(&value).await {
        Ok(batch) => {
            info!(
                device = %batch.device,
                count = batch.sensors.len(),
                "sensor batch ingested via mqtt"
            );
        }
        Err(IngestError::Validation(e)) => {
            warn!(reason = e.reason.as_str(), "mqtt sensor payload rejected");
            hub.notify(Severity::Error, format!("MQTT payload invalid: {e}"));
        }
        Err(IngestError::Storage(e)) => {
            error!("mqtt sensor batch not stored: {e}");
            hub.notify(Severity::Error, format!("Error processing sensor data: {e}"));
        }
    }
}

//! The telemetry hub: single in-process authority for sensor ingestion and
//! LED actuation, invoked identically by the HTTP, MQTT, and WebSocket
//! transports.
//!
//! Guarantees:
//! - a sensor batch is persisted all-or-nothing, then broadcast exactly once
//! - `set_led` calls are applied in arrival order; the persisted state and the
//!   `led_update` broadcast sequence reflect that one order
//! - device forwarding never blocks or rolls back a state mutation

use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::warn;

use crate::error::{HubError, IngestError};
use crate::forward::ForwardIntent;
use crate::store::{ReadingRow, Store};
use crate::types::{Event, LedCommand, LedState, SensorBatch, Severity, ServerMessage};
use crate::validate;

pub struct Hub {
    store: Store,
    events: broadcast::Sender<Event>,
    forward_tx: mpsc::Sender<ForwardIntent>,
    // Serializes actuation: one total order for writes and broadcasts.
    led_lock: Mutex<()>,
}

impl Hub {
    pub fn new(
        store: Store,
        events: broadcast::Sender<Event>,
        forward_tx: mpsc::Sender<ForwardIntent>,
    ) -> Hub {
        Hub {
            store,
            events,
            forward_tx,
            led_lock: Mutex::new(()),
        }
    }

    /// Validates and persists a sensor batch, then broadcasts one
    /// `sensor_update` carrying the whole batch. Nothing is written and
    /// nothing is broadcast unless the entire batch is acceptable.
    pub async fn ingest(&self, payload: &serde_json::Value) -> Result<SensorBatch, IngestError> {
        let batch = validate::validate_batch(payload)?;
        self.store
            .insert_readings(&batch)
            .await
            .map_err(IngestError::Storage)?;
        let _ = self.events.send(Event::SensorUpdate(batch.clone()));
        Ok(batch)
    }

    /// Applies an actuation command: persist, hand the command to the
    /// forwarding worker, broadcast `led_update`. Forwarding is fire-and-forget;
    /// its failure is reported out-of-band and never rolls back the state.
    pub async fn set_led(&self, cmd: LedCommand) -> Result<LedState, HubError> {
        if !cmd.is_valid() {
            return Err(HubError::InvalidCommand);
        }
        let state = LedState {
            led_red: cmd.led_red,
            led_green: cmd.led_green,
        };

        let _serial = self.led_lock.lock().await;
        self.store.set_led_state(&state).await?;
        let dispatch_err = self.forward_tx.try_send(ForwardIntent { state }).err();
        let _ = self.events.send(Event::LedUpdate(state));
        if let Some(e) = dispatch_err {
            warn!("led command not handed to forwarder: {e}");
            self.notify(
                Severity::Error,
                "LED command was not forwarded to the device: dispatch queue unavailable.",
            );
        }
        Ok(state)
    }

    /// Current actuator state; falls back to all-off if storage is
    /// unreachable so a fresh listener can always be seeded.
    pub async fn led_state(&self) -> LedState {
        match self.store.led_state().await {
            Ok(state) => state,
            Err(e) => {
                warn!("failed to read LED state, serving default: {e}");
                LedState::default()
            }
        }
    }

    pub async fn latest_readings(
        &self,
        sensor_type: &str,
        limit: i64,
    ) -> Result<Vec<ReadingRow>, sqlx::Error> {
        self.store.latest_readings(sensor_type, limit).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Broadcasts an operational notice to all listeners.
    pub fn notify(&self, kind: Severity, text: impl Into<String>) {
        let _ = self.events.send(Event::ServerMessage(ServerMessage {
            kind,
            text: text.into(),
        }));
    }
}

use serde::{Deserialize, Serialize};

// Incoming payload for HTTP POST /api/sensor and the MQTT sensor topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorBatch {
    pub device: String,
    pub sensors: Vec<SensorItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorItem {
    #[serde(rename = "type")]
    pub sensor_type: String,
    pub value: f64,
}

/// Persisted LED channel state. Both channels are 0/1 flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedState {
    #[serde(rename = "ledRed")]
    pub led_red: i64,
    #[serde(rename = "ledGreen")]
    pub led_green: i64,
}

// Raw actuation request as decoded off the wire; range-checked by the hub
// before it becomes a LedState.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LedCommand {
    #[serde(rename = "ledRed")]
    pub led_red: i64,
    #[serde(rename = "ledGreen")]
    pub led_green: i64,
}

impl LedCommand {
    pub fn is_valid(&self) -> bool {
        matches!(self.led_red, 0 | 1) && matches!(self.led_green, 0 | 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Error,
}

/// Operational notice relayed to dashboard clients (MQTT connectivity,
/// forwarding failures).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerMessage {
    #[serde(rename = "type")]
    pub kind: Severity,
    pub text: String,
}

/// Everything the hub fans out to subscribed listeners. Serializes as
/// `{"event": "...", "data": {...}}` on the push channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Event {
    SensorUpdate(SensorBatch),
    LedUpdate(LedState),
    ServerMessage(ServerMessage),
}

// Messages dashboard clients may send over the push channel.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    ControlLed(LedCommand),
}

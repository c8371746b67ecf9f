//! Shared shape check for inbound sensor payloads. Every transport goes
//! through here before anything is written, so HTTP and MQTT cannot drift.

use serde_json::Value;

use crate::error::{ValidationError, ValidationReason};
use crate::types::{SensorBatch, SensorItem};

/// Checks a decoded payload against the required batch shape and returns the
/// typed batch. All-or-nothing: any bad entry rejects the whole batch.
pub fn validate_batch(payload: &Value) -> Result<SensorBatch, ValidationError> {
    let obj = payload
        .as_object()
        .ok_or(ValidationError::new(ValidationReason::MalformedPayload))?;

    let device = obj
        .get("device")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(ValidationError::new(ValidationReason::MissingDevice))?;

    let entries = obj
        .get("sensors")
        .and_then(Value::as_array)
        .filter(|a| !a.is_empty())
        .ok_or(ValidationError::new(ValidationReason::MissingSensors))?;

    let mut sensors = Vec::with_capacity(entries.len());
    for entry in entries {
        let map = entry
            .as_object()
            .ok_or(ValidationError::new(ValidationReason::MalformedPayload))?;
        let sensor_type = map
            .get("type")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or(ValidationError::new(ValidationReason::MissingSensorType))?;
        let value = map
            .get("value")
            .and_then(Value::as_f64)
            .ok_or(ValidationError::new(ValidationReason::MissingSensorValue))?;
        sensors.push(SensorItem {
            sensor_type: sensor_type.to_string(),
            value,
        });
    }

    Ok(SensorBatch {
        device: device.to_string(),
        sensors,
    })
}

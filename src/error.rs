use std::fmt;

use serde::Serialize;

/// Machine-readable reason for rejecting a sensor payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationReason {
    MissingDevice,
    MissingSensors,
    MissingSensorType,
    MissingSensorValue,
    MalformedPayload,
}

impl ValidationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationReason::MissingDevice => "missing_device",
            ValidationReason::MissingSensors => "missing_sensors",
            ValidationReason::MissingSensorType => "missing_sensor_type",
            ValidationReason::MissingSensorValue => "missing_sensor_value",
            ValidationReason::MalformedPayload => "malformed_payload",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub reason: ValidationReason,
}

impl ValidationError {
    pub fn new(reason: ValidationReason) -> Self {
        Self { reason }
    }
}

impl fmt::Display for ValidationError {
    // The wording of the device-facing messages is fixed; deployed firmware
    // matches on it.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self.reason {
            ValidationReason::MissingDevice | ValidationReason::MissingSensors => {
                "Missing required sensor data fields (device, sensors)"
            }
            ValidationReason::MissingSensorType | ValidationReason::MissingSensorValue => {
                "Each sensor must have 'type' and 'value' fields"
            }
            ValidationReason::MalformedPayload => "Malformed sensor payload",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for ValidationError {}

/// Failure modes of `Hub::ingest`.
#[derive(Debug)]
pub enum IngestError {
    Validation(ValidationError),
    Storage(sqlx::Error),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Validation(e) => e.fmt(f),
            IngestError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IngestError::Validation(e) => Some(e),
            IngestError::Storage(e) => Some(e),
        }
    }
}

impl From<ValidationError> for IngestError {
    fn from(e: ValidationError) -> Self {
        IngestError::Validation(e)
    }
}

/// Failure modes of `Hub::set_led`.
#[derive(Debug)]
pub enum HubError {
    InvalidCommand,
    Storage(sqlx::Error),
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubError::InvalidCommand => {
                f.write_str("LED command must carry ledRed and ledGreen as 0/1")
            }
            HubError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for HubError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HubError::InvalidCommand => None,
            HubError::Storage(e) => Some(e),
        }
    }
}

impl From<sqlx::Error> for HubError {
    fn from(e: sqlx::Error) -> Self {
        HubError::Storage(e)
    }
}

//! JSON frames exchanged with clients over the socket.
//!
//! Every frame is `{"event": <name>, "data": <object>}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::RelayError;

/// Payload of a `register` event.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
}

/// Payload of a `sensor_data` event. Which fields matter depends on `type`.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorPayload {
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub sensor_state: Option<Value>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    /// Relayed untouched, so any JSON type is accepted.
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub number: Option<Value>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub toaddr: Option<String>,
}

/// How a `sensor_data` event is routed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayKind {
    Reading,
    Sms,
    Push,
    Mail,
}

impl SensorPayload {
    /// Unknown or missing `type` values are plain sensor readings.
    pub fn relay_kind(&self) -> RelayKind {
        match self.kind.as_deref() {
            Some("mail") => RelayKind::Mail,
            Some("sms") => RelayKind::Sms,
            Some("push") => RelayKind::Push,
            _ => RelayKind::Reading,
        }
    }
}

/// Everything the relay engine consumes. `Disconnect` never arrives on the
/// wire; the transport synthesizes it when a socket closes.
#[derive(Clone, Debug)]
pub enum Inbound {
    Register(RegisterPayload),
    SensorData(SensorPayload),
    Disconnect,
}

#[derive(Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
enum ClientFrame {
    Register(RegisterPayload),
    SensorData(SensorPayload),
}

impl Inbound {
    /// Decode a client text frame.
    pub fn parse(raw: &str) -> Result<Self, RelayError> {
        let frame: ClientFrame =
            serde_json::from_str(raw).map_err(|_| RelayError::MalformedEvent)?;
        Ok(match frame {
            ClientFrame::Register(p) => Self::Register(p),
            ClientFrame::SensorData(p) => Self::SensorData(p),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Register(_) => "register",
            Self::SensorData(_) => "sensor_data",
            Self::Disconnect => "disconnect",
        }
    }
}

/// Events emitted to clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Outbound {
    Error {
        message: String,
    },
    Status {
        message: String,
    },
    Sms {
        number: Option<Value>,
        message: Option<Value>,
    },
    Push {
        message: Option<Value>,
    },
    SensorData {
        #[serde(rename = "sensorState")]
        sensor_state: Option<Value>,
    },
}

impl Outbound {
    pub fn error(err: &RelayError) -> Self {
        Self::Error {
            message: err.to_string(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Error { .. } => "error",
            Self::Status { .. } => "status",
            Self::Sms { .. } => "sms",
            Self::Push { .. } => "push",
            Self::SensorData { .. } => "sensor_data",
        }
    }

    pub fn to_frame(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

//! WebSocket Message Types
//!
//! Gateway frames are JSON objects `{"op": int, "d"?: any, "t"?: string}`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::domain::Event;

/// Gateway opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// Event dispatch (server -> client)
    Dispatch = 0,
    /// Heartbeat (client -> server)
    Heartbeat = 1,
    /// Identify (client -> server)
    Identify = 2,
    /// Presence update (reserved)
    Presence = 3,
    /// Resume (reserved)
    Resume = 4,
    /// Reconnect (reserved)
    Reconnect = 5,
    /// Request users (reserved)
    RequestUsers = 6,
    /// Invalidate session (server -> client)
    InvalidateSession = 7,
    /// Hello (server -> client)
    Hello = 8,
    /// Heartbeat ACK (server -> client)
    HeartbeatAck = 9,
}

impl OpCode {
    /// Whether clients are expected to send this opcode
    pub fn is_client_op(self) -> bool {
        matches!(
            self,
            OpCode::Heartbeat
                | OpCode::Identify
                | OpCode::Presence
                | OpCode::Resume
                | OpCode::RequestUsers
        )
    }
}

impl TryFrom<u64> for OpCode {
    type Error = u64;

    fn try_from(op: u64) -> Result<Self, Self::Error> {
        Ok(match op {
            0 => OpCode::Dispatch,
            1 => OpCode::Heartbeat,
            2 => OpCode::Identify,
            3 => OpCode::Presence,
            4 => OpCode::Resume,
            5 => OpCode::Reconnect,
            6 => OpCode::RequestUsers,
            7 => OpCode::InvalidateSession,
            8 => OpCode::Hello,
            9 => OpCode::HeartbeatAck,
            other => return Err(other),
        })
    }
}

/// Gateway close codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CloseCode {
    Normal = 1000,
    UnknownOpcode = 4001,
    BadPayload = 4002,
    NotIdentified = 4003,
    BadToken = 4004,
}

impl CloseCode {
    pub fn code(self) -> u16 {
        self as u16
    }
}

/// Frame-level protocol violations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Frame is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Frame is missing field `{0}`")]
    MissingField(&'static str),

    #[error("Unknown opcode {0}")]
    UnknownOpcode(u64),
}

impl ProtocolError {
    /// Close code the connection is closed with
    pub fn close_code(&self) -> CloseCode {
        match self {
            ProtocolError::InvalidJson(_) | ProtocolError::MissingField(_) => CloseCode::BadPayload,
            ProtocolError::UnknownOpcode(_) => CloseCode::UnknownOpcode,
        }
    }
}

/// Validated incoming frame
#[derive(Debug, Clone, PartialEq)]
pub struct ClientFrame {
    pub op: OpCode,
    pub d: Option<Value>,
}

impl ClientFrame {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
        let Value::Object(mut frame) = value else {
            return Err(ProtocolError::MissingField("op"));
        };

        let op = frame
            .get("op")
            .and_then(Value::as_u64)
            .ok_or(ProtocolError::MissingField("op"))?;
        let op = OpCode::try_from(op).map_err(ProtocolError::UnknownOpcode)?;

        Ok(Self {
            op,
            d: frame.remove("d"),
        })
    }
}

/// Outgoing gateway frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewaySend {
    pub op: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewaySend {
    pub fn hello(heartbeat_interval_ms: u64) -> Self {
        Self {
            op: OpCode::Hello as u8,
            d: Some(json!({ "heartbeat_interval": heartbeat_interval_ms })),
            t: None,
        }
    }

    pub fn heartbeat_ack() -> Self {
        Self {
            op: OpCode::HeartbeatAck as u8,
            d: None,
            t: None,
        }
    }

    pub fn invalidate_session() -> Self {
        Self {
            op: OpCode::InvalidateSession as u8,
            d: None,
            t: None,
        }
    }

    pub fn dispatch(event: &Event) -> Self {
        Self {
            op: OpCode::Dispatch as u8,
            d: Some(Value::Object(Map::clone(event.payload()))),
            t: Some(event.name().to_string()),
        }
    }
}

/// Identify payload (op 2)
#[derive(Debug, Deserialize)]
pub struct IdentifyPayload {
    pub token: String,
}

impl IdentifyPayload {
    pub fn from_data(d: Option<Value>) -> Result<Self, ProtocolError> {
        d.and_then(|d| serde_json::from_value(d).ok())
            .ok_or(ProtocolError::MissingField("d.token"))
    }
}

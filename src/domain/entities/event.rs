//! Gateway events.
//!
//! An event is an immutable, addressed payload produced by write-path code
//! after it commits a state change, and fanned out by the
//! [`EventBus`](crate::presentation::websocket::EventBus).

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

/// Addressing mode of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventScope {
    /// Every connection of every user subscribed to the channel
    Local { channel_id: i64 },
    /// Every connection of every user sharing a channel with the user
    Outer { user_id: i64 },
    /// Every identified connection
    Global,
}

impl EventScope {
    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            EventScope::Local { .. } => "local",
            EventScope::Outer { .. } => "outer",
            EventScope::Global => "global",
        }
    }
}

/// Event construction errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    #[error("{event} payload has no usable `{field}` address")]
    MissingAddress {
        event: &'static str,
        field: &'static str,
    },
}

/// Immutable addressed payload.
#[derive(Clone)]
pub struct Event {
    name: Arc<str>,
    scope: EventScope,
    payload: Arc<Map<String, Value>>,
}

impl Event {
    pub fn new(name: impl Into<Arc<str>>, scope: EventScope, payload: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            scope,
            payload: Arc::new(payload),
        }
    }

    pub fn local(name: impl Into<Arc<str>>, channel_id: i64, payload: Map<String, Value>) -> Self {
        Self::new(name, EventScope::Local { channel_id }, payload)
    }

    pub fn outer(name: impl Into<Arc<str>>, user_id: i64, payload: Map<String, Value>) -> Self {
        Self::new(name, EventScope::Outer { user_id }, payload)
    }

    pub fn global(name: impl Into<Arc<str>>, payload: Map<String, Value>) -> Self {
        Self::new(name, EventScope::Global, payload)
    }

    /// A message was posted; addressed by the payload's `channel_id`.
    pub fn message_create(payload: Map<String, Value>) -> Result<Self, EventError> {
        let channel_id = address(&payload, "MESSAGE_CREATE", "channel_id")?;
        Ok(Self::local("MESSAGE_CREATE", channel_id, payload))
    }

    /// A message was edited; addressed by the payload's `channel_id`.
    pub fn message_update(payload: Map<String, Value>) -> Result<Self, EventError> {
        let channel_id = address(&payload, "MESSAGE_UPDATE", "channel_id")?;
        Ok(Self::local("MESSAGE_UPDATE", channel_id, payload))
    }

    /// A channel changed; addressed by the payload's `id`.
    pub fn channel_update(payload: Map<String, Value>) -> Result<Self, EventError> {
        let channel_id = address(&payload, "CHANNEL_UPDATE", "id")?;
        Ok(Self::local("CHANNEL_UPDATE", channel_id, payload))
    }

    /// A user profile changed; reaches everyone sharing a channel with `id`.
    pub fn user_update(payload: Map<String, Value>) -> Result<Self, EventError> {
        let user_id = address(&payload, "USER_UPDATE", "id")?;
        Ok(Self::outer("USER_UPDATE", user_id, payload))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> EventScope {
        self.scope
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Ids travel either as JSON numbers or as decimal strings.
fn address(
    payload: &Map<String, Value>,
    event: &'static str,
    field: &'static str,
) -> Result<i64, EventError> {
    let id = match payload.get(field) {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    };

    id.ok_or(EventError::MissingAddress { event, field })
}

//! WebSocket Gateway
//!
//! Protocol driver shared by every socket: opens connections, interprets
//! client frames and runs the heartbeat watchdog.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use super::connection::{Connection, ConnectionState, Outbound};
use super::event_bus::{EventBus, GatewayError};
use super::messages::{ClientFrame, CloseCode, GatewaySend, IdentifyPayload, OpCode};
use crate::application::services::{TokenError, TokenService};
use crate::infrastructure::metrics;
use crate::shared::snowflake::IdAllocator;

/// Silence tolerated by the watchdog, as a multiple of the heartbeat interval
const HEARTBEAT_TOLERANCE: f64 = 1.1;

/// Gateway protocol driver
pub struct Gateway {
    bus: Arc<EventBus>,
    tokens: Arc<TokenService>,
    ids: Arc<Mutex<IdAllocator>>,
    heartbeat_interval: Duration,
}

impl Gateway {
    pub fn new(
        bus: Arc<EventBus>,
        tokens: Arc<TokenService>,
        ids: Arc<Mutex<IdAllocator>>,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            bus,
            tokens,
            ids,
            heartbeat_interval,
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Accept a socket: allocate its id, attach it to the bus, queue HELLO
    /// and start its watchdog.
    pub fn open(
        self: &Arc<Self>,
    ) -> Result<(Arc<Connection>, mpsc::UnboundedReceiver<Outbound>), GatewayError> {
        let id = self.ids.lock().gen_id()?;
        let (conn, outbound) = Connection::new(id);
        self.bus.attach(&conn)?;

        let _ = conn.send(GatewaySend::hello(self.heartbeat_interval.as_millis() as u64));
        tokio::spawn(Arc::clone(self).watchdog(conn.clone()));

        tracing::debug!(connection_id = id, "Gateway connection opened");
        Ok((conn, outbound))
    }

    /// Interpret one text frame from the client.
    pub async fn handle_text(&self, conn: &Arc<Connection>, text: &str) {
        // Frames read before the close are discarded
        if conn.is_closed() {
            tracing::trace!(connection_id = conn.id(), "Frame after close ignored");
            return;
        }

        let frame = match ClientFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(connection_id = conn.id(), error = %e, "Protocol violation");
                self.bus.drop_connection(conn, e.close_code());
                return;
            }
        };

        match frame.op {
            OpCode::Heartbeat => {
                conn.touch();
                let _ = conn.send(GatewaySend::heartbeat_ack());
                tracing::trace!(connection_id = conn.id(), "Heartbeat received");
            }
            OpCode::Identify => self.identify(conn, frame.d).await,
            op if op.is_client_op() => {
                tracing::debug!(connection_id = conn.id(), op = op as u8, "Ignoring reserved opcode");
            }
            op => {
                tracing::debug!(
                    connection_id = conn.id(),
                    op = op as u8,
                    "Ignoring server-only opcode sent by client"
                );
            }
        }
    }

    async fn identify(&self, conn: &Arc<Connection>, d: Option<Value>) {
        let payload = match IdentifyPayload::from_data(d) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!(connection_id = conn.id(), error = %e, "Malformed IDENTIFY");
                self.bus.drop_connection(conn, e.close_code());
                return;
            }
        };

        if conn.state() == ConnectionState::Identified {
            tracing::warn!(
                connection_id = conn.id(),
                user_id = ?conn.user_id(),
                "IDENTIFY on an identified connection"
            );
            self.bus.drop_connection(conn, CloseCode::NotIdentified);
            return;
        }

        let token = match self.tokens.authenticate(&payload.token).await {
            Ok(token) => token,
            Err(e) => {
                match &e {
                    TokenError::Store(err) => {
                        tracing::error!(connection_id = conn.id(), error = %err, "Token lookup failed")
                    }
                    _ => tracing::info!(connection_id = conn.id(), error = %e, "IDENTIFY rejected"),
                }
                let _ = conn.send(GatewaySend::invalidate_session());
                self.bus.drop_connection(conn, CloseCode::BadToken);
                return;
            }
        };

        let user_id = token.user_id();
        if let Err(e) = conn.identify(user_id) {
            tracing::debug!(connection_id = conn.id(), user_id, error = %e, "Cannot identify connection");
            return;
        }

        match self.bus.add_listener(conn).await {
            Ok(()) => {
                tracing::info!(connection_id = conn.id(), user_id, "Connection identified");
            }
            Err(GatewayError::Closing) => {
                conn.close(CloseCode::Normal);
            }
            Err(e) => {
                tracing::error!(connection_id = conn.id(), user_id, error = %e, "Failed to register listener");
                self.bus.drop_connection(conn, CloseCode::Normal);
            }
        }
    }

    /// Close the connection once it has been silent for longer than
    /// `heartbeat_interval * 1.1`.
    async fn watchdog(self: Arc<Self>, conn: Arc<Connection>) {
        let limit = self.heartbeat_interval.mul_f64(HEARTBEAT_TOLERANCE);

        loop {
            tokio::select! {
                _ = conn.closed() => return,
                _ = tokio::time::sleep(self.heartbeat_interval) => {}
            }

            let elapsed = conn.heartbeat_elapsed();
            if elapsed > limit {
                tracing::info!(
                    connection_id = conn.id(),
                    user_id = ?conn.user_id(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Heartbeat expired, closing connection"
                );
                metrics::record_heartbeat_timeout();
                self.bus.drop_connection(&conn, CloseCode::Normal);
                return;
            }
        }
    }
}

//! Gateway Connection
//!
//! State of one live socket. Frames are never written to the socket
//! directly: they are queued on the connection's outbound channel and a
//! single writer task drains it, so frames reach the peer in queue order.
//!
//! ```text
//! Anonymous --IDENTIFY ok--> Identified
//!     |                          |
//!     +--------- close ----------+--> Closed
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use super::messages::{CloseCode, GatewaySend};
use crate::domain::Event;
use crate::infrastructure::metrics;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Anonymous,
    Identified,
    Closed,
}

/// Item queued for the socket writer
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Frame(GatewaySend),
    /// Write a close frame, then stop writing
    Close(CloseCode),
}

/// Connection errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection is closed")]
    Closed,

    #[error("Connection is already identified as user {0}")]
    AlreadyIdentified(i64),
}

#[derive(Debug)]
struct Session {
    state: ConnectionState,
    user_id: Option<i64>,
    last_heartbeat: Instant,
}

/// One live gateway socket
#[derive(Debug)]
pub struct Connection {
    id: u64,
    session: Mutex<Session>,
    outbound: mpsc::UnboundedSender<Outbound>,
    closed: watch::Sender<bool>,
}

impl Connection {
    /// Create an anonymous connection and the receiving end of its outbound queue.
    pub fn new(id: u64) -> (Arc<Self>, mpsc::UnboundedReceiver<Outbound>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);

        let conn = Arc::new(Self {
            id,
            session: Mutex::new(Session {
                state: ConnectionState::Anonymous,
                user_id: None,
                last_heartbeat: Instant::now(),
            }),
            outbound,
            closed,
        });
        (conn, rx)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.session.lock().state
    }

    /// Bound user, set once IDENTIFY succeeds. Kept after close.
    pub fn user_id(&self) -> Option<i64> {
        self.session.lock().user_id
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// Record a heartbeat.
    pub fn touch(&self) {
        let mut session = self.session.lock();
        if session.state != ConnectionState::Closed {
            session.last_heartbeat = Instant::now();
        }
    }

    /// Time since the last heartbeat, or since the connection opened.
    pub fn heartbeat_elapsed(&self) -> Duration {
        self.session.lock().last_heartbeat.elapsed()
    }

    /// Anonymous -> Identified.
    pub fn identify(&self, user_id: i64) -> Result<(), ConnectionError> {
        let mut session = self.session.lock();
        match session.state {
            ConnectionState::Anonymous => {
                session.state = ConnectionState::Identified;
                session.user_id = Some(user_id);
                metrics::connection_identified();
                Ok(())
            }
            ConnectionState::Identified => Err(ConnectionError::AlreadyIdentified(
                session.user_id.unwrap_or_default(),
            )),
            ConnectionState::Closed => Err(ConnectionError::Closed),
        }
    }

    /// Queue a frame for the writer.
    pub fn send(&self, frame: GatewaySend) -> Result<(), ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }
        self.outbound
            .send(Outbound::Frame(frame))
            .map_err(|_| ConnectionError::Closed)
    }

    /// Queue a DISPATCH frame for `event`. Fails if the socket writer is gone.
    pub fn deliver(&self, event: &Event) -> Result<(), ConnectionError> {
        self.send(GatewaySend::dispatch(event))
    }

    /// Move to Closed and queue a close frame. Returns false if already closed.
    pub fn close(&self, code: CloseCode) -> bool {
        {
            let mut session = self.session.lock();
            if session.state == ConnectionState::Closed {
                return false;
            }
            session.state = ConnectionState::Closed;
        }

        // The writer may already be gone
        let _ = self.outbound.send(Outbound::Close(code));
        self.closed.send_replace(true);
        metrics::record_close(code.code());

        tracing::debug!(
            connection_id = self.id,
            user_id = ?self.user_id(),
            code = code.code(),
            "Connection closed"
        );
        true
    }

    /// Resolves once the connection is closed.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Resolves once the socket writer has stopped.
    pub async fn drained(&self) {
        self.outbound.closed().await
    }
}

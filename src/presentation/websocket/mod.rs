//! WebSocket Gateway
//!
//! Real-time delivery of events to live WebSocket connections.

pub mod connection;
pub mod event_bus;
pub mod gateway;
pub mod handler;
pub mod messages;

pub use connection::{Connection, ConnectionError, ConnectionState, Outbound};
pub use event_bus::{EventBus, GatewayError};
pub use gateway::Gateway;
pub use handler::ws_handler;
pub use messages::{ClientFrame, CloseCode, GatewaySend, OpCode, ProtocolError};

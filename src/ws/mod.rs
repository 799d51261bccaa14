//! Relay connection: wire protocol, transport and the WebSocket socket

pub mod protocol;
pub mod socket;
pub mod transport;

pub use protocol::{AnimationKind, Direction, NetworkMessage, PositionUpdate};
pub use socket::WsSocketFactory;
pub use transport::{ConnectionState, ReconnectPolicy, TransportError, TransportManager};

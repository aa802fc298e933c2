//! Transports the session layer talks through

pub mod tcp;
pub mod transport;

pub use tcp::{TcpConnector, TcpTransport};
pub use transport::{Connector, Transport, TransportStatus};

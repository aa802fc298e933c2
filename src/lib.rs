//! FeOx-client: pooled, sharded client for FeOx and other Redis-compatible servers
//!
//! This crate manages the connection side of talking to a RESP server: it
//! creates, reuses, repairs and routes sessions so callers never handle raw
//! sockets, retries or per-endpoint settings themselves.
//!
//! # Architecture
//!
//! - [`Session`]: one connection with a two-deep error history, version
//!   detection and a single-retry `execute` primitive
//! - [`SessionPool`]: bucketed, per-bucket-locked reuse of sessions by target
//! - [`Lease`]: RAII handle returning a session to its pool on drop
//! - [`ShardedSession`]: lock-on-first-route client-side sharding
//! - [`NamedRegistry`]: process-wide pools shared by name
//!
//! # Example
//!
//! ```no_run
//! use feox_client::{EndpointConfig, SessionPool};
//!
//! # fn main() -> feox_client::Result<()> {
//! let config = EndpointConfig::new("127.0.0.1", 6379).with_prefix("app:");
//! let mut session = SessionPool::global().acquire(&config);
//! session.set("greeting", "hello")?;
//! assert_eq!(session.get("greeting")?.as_deref(), Some(&b"hello"[..]));
//! # Ok(())
//! # }
//! ```

/// Endpoint settings and configuration files
pub mod config;

/// Error types and result aliases
pub mod error;

/// Name-keyed registry of shared pools
pub mod named_registry;

/// Transport traits and the TCP transport
pub mod network;

/// Session pooling and leases
pub mod pool;

/// Redis protocol (RESP) encoding and reply parsing
pub mod protocol;

/// Single-connection session and typed commands
pub mod session;

/// Client-side sharding over owned sessions
pub mod sharded;

pub use config::{install_defaults, ClientConfig, EndpointConfig};
pub use error::{Error, ErrorKind, Result};
pub use named_registry::{NamedPool, NamedRegistry};
pub use network::{Connector, Transport, TransportStatus};
pub use pool::{Lease, SessionPool};
pub use protocol::RespValue;
pub use session::{Expiry, KeyType, Order, Session, SetCondition, Ttl};
pub use sharded::ShardedSession;

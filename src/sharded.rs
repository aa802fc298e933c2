//! Client-side sharding over a fixed set of sessions.
//!
//! A [`ShardedSession`] owns one [`Session`] per shard endpoint and does not
//! go through the pool. Shards may only be added until the first key is
//! routed; adding one later would move keys that were already written.
//!
//! # Example
//!
//! ```no_run
//! use feox_client::{EndpointConfig, ShardedSession};
//!
//! # fn main() -> feox_client::Result<()> {
//! let mut sharded = ShardedSession::new();
//! sharded.add_shard(EndpointConfig::new("10.0.0.1", 6379))?;
//! sharded.add_shard(EndpointConfig::new("10.0.0.2", 6379))?;
//!
//! sharded.route("user:42")?.set("user:42", "alice")?;
//! # Ok(())
//! # }
//! ```

use crate::config::EndpointConfig;
use crate::error::{Error, Result};
use crate::network::{Connector, TcpConnector};
use crate::pool::shard_index;
use crate::session::Session;
use std::sync::Arc;
use tracing::debug;

pub struct ShardedSession {
    shards: Vec<Session>,
    locked: bool,
    connector: Arc<dyn Connector>,
}

impl ShardedSession {
    pub fn new() -> Self {
        Self::with_connector(Arc::new(TcpConnector))
    }

    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self {
            shards: Vec::new(),
            locked: false,
            connector,
        }
    }

    /// Append a shard. Fails with `ShardsLocked` once any key was routed.
    pub fn add_shard(&mut self, config: EndpointConfig) -> Result<()> {
        if self.locked {
            return Err(Error::ShardsLocked);
        }
        debug!(
            "Adding shard {} at {}:{}",
            self.shards.len(),
            config.host,
            config.port
        );
        self.shards
            .push(Session::with_connector(config, Arc::clone(&self.connector)));
        Ok(())
    }

    /// The session `key` belongs to. Freezes the shard list.
    pub fn route(&mut self, key: impl AsRef<[u8]>) -> Result<&mut Session> {
        if self.shards.is_empty() {
            return Err(Error::NoShards);
        }
        self.locked = true;
        let index = shard_index(key.as_ref(), self.shards.len());
        Ok(&mut self.shards[index])
    }

    /// Index of the shard `key` belongs to, without freezing the list.
    pub fn shard_of(&self, key: impl AsRef<[u8]>) -> Option<usize> {
        if self.shards.is_empty() {
            None
        } else {
            Some(shard_index(key.as_ref(), self.shards.len()))
        }
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn shards(&self) -> &[Session] {
        &self.shards
    }
}

impl Default for ShardedSession {
    fn default() -> Self {
        Self::new()
    }
}

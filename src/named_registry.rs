use crate::config::EndpointConfig;
use crate::error::{Error, Result};
use crate::network::{Connector, TcpConnector};
use crate::pool::{Lease, SessionPool};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::sync::Arc;
use tracing::{debug, info};

static GLOBAL: Lazy<NamedRegistry> = Lazy::new(NamedRegistry::new);

/// A pool plus the shard endpoints it was created with.
pub struct NamedPool {
    name: String,
    endpoints: Vec<EndpointConfig>,
    pool: SessionPool,
}

impl NamedPool {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoints(&self) -> &[EndpointConfig] {
        &self.endpoints
    }

    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    /// Lease a session on the shard `key` maps to.
    pub fn acquire(&self, key: impl AsRef<[u8]>) -> Result<Lease> {
        self.pool.acquire_by_key(key, &self.endpoints)
    }
}

/// Name → pool registry, so separately written modules can share one set of
/// sessions by agreeing on a name.
pub struct NamedRegistry {
    pools: DashMap<String, Arc<NamedPool>>,
    connector: Arc<dyn Connector>,
}

impl NamedRegistry {
    pub fn new() -> Self {
        Self::with_connector(Arc::new(TcpConnector))
    }

    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self {
            pools: DashMap::new(),
            connector,
        }
    }

    /// The registry shared by the whole process.
    pub fn global() -> &'static NamedRegistry {
        &GLOBAL
    }

    /// Create the pool called `name`.
    ///
    /// Calling this again with an identical endpoint list returns the
    /// existing pool. A different list fails with `PoolMismatch`: a name
    /// identifies one configuration for the life of the registry.
    pub fn create(&self, name: &str, endpoints: Vec<EndpointConfig>) -> Result<Arc<NamedPool>> {
        if endpoints.is_empty() {
            return Err(Error::NoEndpoints);
        }
        for endpoint in &endpoints {
            endpoint.validate()?;
        }

        let pool = match self.pools.entry(name.to_string()) {
            Entry::Occupied(existing) => {
                if existing.get().endpoints == endpoints {
                    debug!("Named pool '{}' already exists", name);
                    return Ok(Arc::clone(existing.get()));
                }
                return Err(Error::PoolMismatch(name.to_string()));
            }
            Entry::Vacant(vacant) => {
                let pool = Arc::new(NamedPool {
                    name: name.to_string(),
                    endpoints,
                    pool: SessionPool::with_connector(Arc::clone(&self.connector)),
                });
                vacant.insert(Arc::clone(&pool));
                pool
            }
        };

        // one idle session per shard up front
        for endpoint in pool.endpoints() {
            drop(pool.pool.acquire(endpoint));
        }

        info!(
            "Created named pool '{}' with {} endpoint(s)",
            name,
            pool.endpoints.len()
        );
        Ok(pool)
    }

    /// The pool called `name`. Fails with `UnknownPool` if it was never created.
    pub fn get(&self, name: &str) -> Result<Arc<NamedPool>> {
        self.pools
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::UnknownPool(name.to_string()))
    }

    /// Lease a session from pool `name` on the shard `key` maps to.
    pub fn acquire(&self, name: &str, key: impl AsRef<[u8]>) -> Result<Lease> {
        self.get(name)?.acquire(key)
    }

    pub fn is_created(&self, name: &str) -> bool {
        self.pools.contains_key(name)
    }

    /// Names of all created pools.
    pub fn names(&self) -> Vec<String> {
        self.pools.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

impl Default for NamedRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints() -> Vec<EndpointConfig> {
        vec![
            EndpointConfig::new("127.0.0.1", 7001),
            EndpointConfig::new("127.0.0.1", 7002),
        ]
    }

    #[test]
    fn unknown_names_fail() {
        let registry = NamedRegistry::new();
        assert!(matches!(registry.get("nope"), Err(Error::UnknownPool(name)) if name == "nope"));
        assert!(registry.acquire("nope", "k").is_err());
    }

    #[test]
    fn empty_endpoint_lists_are_rejected() {
        let registry = NamedRegistry::new();
        assert!(matches!(registry.create("grp", Vec::new()), Err(Error::NoEndpoints)));
        assert!(!registry.is_created("grp"));
    }

    #[test]
    fn create_preinitialises_one_session_per_endpoint() {
        let registry = NamedRegistry::new();
        let pool = registry.create("grp", endpoints()).unwrap();
        assert_eq!(pool.pool().session_count(), 2);
        assert_eq!(registry.names(), vec!["grp".to_string()]);
    }
}

//! Process-wide session reuse
//!
//! Sessions are grouped by backend target (host, port, database) into a fixed
//! number of buckets, each behind its own lock. The lock is held only while a
//! bucket is scanned for an idle session or a new one is appended; commands
//! run after it is released.

pub mod lease;

pub use lease::Lease;

use crate::config::{EndpointConfig, Target};
use crate::error::{Error, Result};
use crate::network::{Connector, TcpConnector};
use crate::session::Session;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Number of independently locked buckets.
pub const BUCKET_COUNT: usize = 101;

static GLOBAL: Lazy<SessionPool> = Lazy::new(SessionPool::new);

/// Home of one pooled session. Empty while the session is leased.
pub(crate) struct Slot {
    session: Mutex<Option<Session>>,
}

impl Slot {
    fn claim(&self) -> Option<Session> {
        self.session.lock().take()
    }

    pub(crate) fn release(&self, session: Session) {
        let previous = self.session.lock().replace(session);
        debug_assert!(previous.is_none(), "slot was released twice");
    }
}

type Bucket = HashMap<Target, Vec<Arc<Slot>>>;

pub struct SessionPool {
    buckets: Vec<Mutex<Bucket>>,
    connector: Arc<dyn Connector>,
    sessions: AtomicUsize,
}

impl SessionPool {
    /// Pool whose sessions connect over TCP.
    pub fn new() -> Self {
        Self::with_connector(Arc::new(TcpConnector))
    }

    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self {
            buckets: (0..BUCKET_COUNT).map(|_| Mutex::new(HashMap::new())).collect(),
            connector,
            sessions: AtomicUsize::new(0),
        }
    }

    /// The pool shared by the whole process.
    pub fn global() -> &'static SessionPool {
        &GLOBAL
    }

    /// Bucket that sessions for `config` live in.
    pub fn bucket_index(config: &EndpointConfig) -> usize {
        let mut hasher = DefaultHasher::new();
        config.target().hash(&mut hasher);
        (hasher.finish() % BUCKET_COUNT as u64) as usize
    }

    /// Lease an idle session for `config`'s target, creating one if every
    /// existing session is leased.
    ///
    /// A reused session adopts `config` (database, prefix, timeouts, flags)
    /// before it is handed out. Acquisition itself never fails; a session
    /// that cannot reach its backend reports that on first use.
    pub fn acquire(&self, config: &EndpointConfig) -> Lease {
        let index = Self::bucket_index(config);

        let (slot, mut session, reused) = {
            let mut bucket = self.buckets[index].lock();
            let slots = bucket.entry(config.target()).or_default();

            let idle = slots
                .iter()
                .find_map(|slot| slot.claim().map(|session| (Arc::clone(slot), session)));
            match idle {
                Some((slot, session)) => (slot, session, true),
                None => {
                    let session =
                        Session::with_connector(config.clone(), Arc::clone(&self.connector));
                    let slot = Arc::new(Slot {
                        session: Mutex::new(None),
                    });
                    slots.push(Arc::clone(&slot));
                    (slot, session, false)
                }
            }
        };

        if reused {
            session.update_config(config);
            return Lease::new(slot, session);
        }

        let total = self.sessions.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            "Pool created session {} for {}:{}/{} ({} total)",
            session.id(),
            config.host,
            config.port,
            config.db,
            total
        );
        Lease::new(slot, session)
    }

    /// Lease a session for the endpoint `key` maps to.
    pub fn acquire_by_key(&self, key: impl AsRef<[u8]>, configs: &[EndpointConfig]) -> Result<Lease> {
        if configs.is_empty() {
            return Err(Error::NoEndpoints);
        }
        let index = shard_index(key.as_ref(), configs.len());
        Ok(self.acquire(&configs[index]))
    }

    /// Sessions created so far. The pool never shrinks.
    pub fn session_count(&self) -> usize {
        self.sessions.load(Ordering::Relaxed)
    }
}

impl Default for SessionPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic shard for `key` among `shards` shards.
///
/// # Panics
///
/// If `shards` is zero.
pub fn shard_index(key: &[u8], shards: usize) -> usize {
    assert!(shards > 0, "no shards to route to");
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % shards as u64) as usize
}

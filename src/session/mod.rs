//! One logical connection to one endpoint
//!
//! A [`Session`] owns at most one transport, remembers the last two failure
//! kinds and the detected server version, and exposes [`Session::execute`],
//! the single resilient primitive every typed command in [`commands`] is
//! built on.
//!
//! A session has no internal lock. Exclusive use is guaranteed by the pool
//! and [`Lease`](crate::Lease), or by owning the session outright.

pub mod commands;

use crate::config::EndpointConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::network::{Connector, TcpConnector, Transport, TransportStatus};
use crate::protocol::RespValue;
use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

pub use commands::{Expiry, KeyType, Order, SetCondition, Ttl};

static SESSION_ID: AtomicU64 = AtomicU64::new(1);

const VERSION_FIELD: &str = "redis_version:";

/// Reconnect and raise behaviour for one `execute` call.
#[derive(Debug, Clone, Copy)]
struct Policy {
    reconnect: bool,
    raise: bool,
}

impl Policy {
    /// Used for SELECT, AUTH and version detection issued from inside the
    /// session itself.
    const QUIET: Policy = Policy {
        reconnect: false,
        raise: false,
    };

    fn of(config: &EndpointConfig) -> Self {
        Self {
            reconnect: config.reconnect_on_failure,
            raise: config.raise_on_error,
        }
    }
}

pub struct Session {
    id: u64,
    config: EndpointConfig,
    connector: Arc<dyn Connector>,
    transport: Option<Box<dyn Transport>>,
    available: bool,
    connected: bool,
    reply: Option<RespValue>,
    error: ErrorKind,
    previous_error: ErrorKind,
    transport_message: String,
    version: u32,
}

impl Session {
    /// A session that connects over TCP on first use.
    pub fn new(config: EndpointConfig) -> Self {
        Self::with_connector(config, Arc::new(TcpConnector))
    }

    pub fn with_connector(config: EndpointConfig, connector: Arc<dyn Connector>) -> Self {
        let id = SESSION_ID.fetch_add(1, Ordering::Relaxed);
        debug!("Session {} created for {}:{}", id, config.host, config.port);
        Self {
            id,
            config,
            connector,
            transport: None,
            available: false,
            connected: false,
            reply: None,
            error: ErrorKind::None,
            previous_error: ErrorKind::None,
            transport_message: String::new(),
            version: 0,
        }
    }

    /// Connect now instead of on first use, and detect the server version.
    ///
    /// Returns whether the session is available afterwards. A failed
    /// version detection is recorded as `UnexpectedInfoResult` but does not
    /// make the session unavailable.
    pub fn connect(&mut self) -> bool {
        self.connected = true;
        self.reconnect();
        self.available
    }

    /// Run one request with the configured reconnect and raise policy.
    ///
    /// `request` is handed the live transport and may be called twice: once,
    /// and once more after a single reconnect if the first attempt produced
    /// no reply or left the transport in an error state. On `Ok(true)` the
    /// reply is available from [`reply`](Session::reply) until the next call.
    /// Failures return `Ok(false)`, or `Err(Error::Raised)` when the endpoint
    /// is configured with `raise_on_error`.
    pub fn execute<F>(&mut self, request: F) -> Result<bool>
    where
        F: FnMut(&mut dyn Transport) -> Option<RespValue>,
    {
        self.execute_with(Policy::of(&self.config), request)
    }

    fn execute_with<F>(&mut self, policy: Policy, mut request: F) -> Result<bool>
    where
        F: FnMut(&mut dyn Transport) -> Option<RespValue>,
    {
        if !self.connected {
            self.connect();
        }

        if !self.available {
            if policy.reconnect {
                self.reconnect();
            }
            if !self.available {
                return self.fail(policy);
            }
        }

        self.reply = self.send(&mut request);
        if policy.reconnect && (self.reply.is_none() || !self.transport_status().is_ok()) {
            debug!("Session {}: retrying after reconnect", self.id);
            self.reconnect();
            if !self.available {
                return self.fail(policy);
            }
            self.reply = self.send(&mut request);
        }

        let status = self.transport_status();
        self.record_transport(&status);
        if !status.is_ok() {
            self.available = false;
            return self.fail(policy);
        }

        match self.reply.as_ref().map(RespValue::is_error) {
            None => {
                self.set_error(ErrorKind::ReplyIsNull);
                self.fail(policy)
            }
            Some(true) => {
                self.set_error(ErrorKind::ReplyError);
                self.fail(policy)
            }
            Some(false) => Ok(true),
        }
    }

    fn send<F>(&mut self, request: &mut F) -> Option<RespValue>
    where
        F: FnMut(&mut dyn Transport) -> Option<RespValue>,
    {
        let transport = self.transport.as_deref_mut()?;
        request(transport)
    }

    /// Send `parts` as one command; the reply is borrowed from the session.
    pub fn call(&mut self, parts: &[&[u8]]) -> Result<&RespValue> {
        if self.execute(|transport| transport.send(parts))? {
            match &self.reply {
                Some(reply) => Ok(reply),
                None => Err(Error::Failed(ErrorKind::ReplyIsNull)),
            }
        } else {
            Err(Error::Failed(self.error))
        }
    }

    /// Record a failure detected above the transport and turn it into the
    /// error a typed command returns.
    pub(crate) fn reject(&mut self, kind: ErrorKind) -> Error {
        self.set_error(kind);
        if self.config.raise_on_error {
            Error::Raised {
                kind,
                message: self.error(),
            }
        } else {
            Error::Failed(kind)
        }
    }

    fn fail(&self, policy: Policy) -> Result<bool> {
        let message = self.error();
        warn!("Session {} ({}:{}): {}", self.id, self.config.host, self.config.port, message);
        if policy.raise {
            Err(Error::Raised {
                kind: self.error,
                message,
            })
        } else {
            Ok(false)
        }
    }

    fn reconnect(&mut self) {
        debug!(
            "Session {} connecting to {}:{}",
            self.id, self.config.host, self.config.port
        );
        self.transport = None;
        self.available = false;

        let Some(mut transport) = self.connector.connect(
            &self.config.host,
            self.config.port,
            self.config.connect_timeout(),
        ) else {
            self.transport_message.clear();
            self.set_error(ErrorKind::TransportNull);
            return;
        };

        let status = transport.status();
        transport.set_timeout(self.config.operation_timeout());
        self.transport = Some(transport);
        self.record_transport(&status);
        self.available = status.is_ok();
        if !self.available {
            return;
        }

        if !self.config.credential.is_empty() {
            let credential = self.config.credential.clone();
            if !self.run_quiet(&[b"AUTH", credential.as_bytes()]) {
                warn!("Session {}: AUTH failed: {}", self.id, self.error());
                self.available = false;
                return;
            }
        }
        // a session left on the wrong database must not be used
        if self.config.db != 0 && !self.select(self.config.db) {
            self.available = false;
            return;
        }

        if !self.detect_version() {
            debug!("Session {}: server version unknown", self.id);
        }
    }

    fn select(&mut self, db: u32) -> bool {
        let mut digits = itoa::Buffer::new();
        let db_text = digits.format(db).to_owned();
        let ok = self.run_quiet(&[b"SELECT", db_text.as_bytes()]);
        if !ok {
            warn!("Session {}: SELECT {} failed: {}", self.id, db, self.error());
        }
        ok
    }

    fn run_quiet(&mut self, parts: &[&[u8]]) -> bool {
        matches!(
            self.execute_with(Policy::QUIET, |transport| transport.send(parts)),
            Ok(true)
        )
    }

    /// Ask the server for its version and cache it.
    fn detect_version(&mut self) -> bool {
        if !self.run_quiet(&[b"INFO"]) {
            return false;
        }
        let parsed = self
            .reply
            .as_ref()
            .and_then(RespValue::as_str)
            .and_then(parse_version);
        match parsed {
            Some(version) => {
                debug!("Session {}: server version {}", self.id, version);
                self.version = version;
                true
            }
            None => {
                self.set_error(ErrorKind::UnexpectedInfoResult);
                false
            }
        }
    }

    /// Adopt `config` for a reused session.
    ///
    /// # Panics
    ///
    /// If `config` points at a different host or port.
    pub fn update_config(&mut self, config: &EndpointConfig) {
        assert!(
            config.host == self.config.host && config.port == self.config.port,
            "session {} is bound to {}:{}, not {}:{}",
            self.id,
            self.config.host,
            self.config.port,
            config.host,
            config.port
        );
        if *config == self.config {
            return;
        }

        let db_changed = config.db != self.config.db;
        let timeout_changed = config.operation_timeout_ms != self.config.operation_timeout_ms;
        self.config = config.clone();

        if timeout_changed {
            if let Some(transport) = self.transport.as_deref_mut() {
                transport.set_timeout(config.operation_timeout());
            }
        }
        if db_changed && self.available && !self.select(config.db) {
            // reconnecting will select the right database
            self.available = false;
        }
    }

    fn transport_status(&self) -> TransportStatus {
        match &self.transport {
            Some(transport) => transport.status(),
            None => TransportStatus::ok(),
        }
    }

    fn record_transport(&mut self, status: &TransportStatus) {
        self.transport_message = status.message.clone();
        self.set_error(status.classify());
    }

    fn set_error(&mut self, kind: ErrorKind) {
        if !self.error.is_none() {
            self.previous_error = self.error;
        }
        self.error = kind;
    }

    /// Description of the current error and, when there is one, the previous.
    pub fn error(&self) -> String {
        let reply_text = self.reply.as_ref().and_then(RespValue::error_text);
        let mut text = self.error.describe(&self.transport_message, reply_text);
        if !self.previous_error.is_none() {
            text.push_str(" Previous error: ");
            text.push_str(&self.previous_error.describe(&self.transport_message, None));
        }
        text
    }

    pub fn error_kind(&self) -> ErrorKind {
        self.error
    }

    pub fn previous_error_kind(&self) -> ErrorKind {
        self.previous_error
    }

    /// Server version as `major * 10000 + minor * 100 + patch`, 0 if unknown.
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Reply to the last executed request.
    pub fn reply(&self) -> Option<&RespValue> {
        self.reply.as_ref()
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// `key` with the endpoint prefix prepended.
    pub fn add_prefix<'a>(&self, key: &'a [u8]) -> Cow<'a, [u8]> {
        if self.config.prefix.is_empty() {
            Cow::Borrowed(key)
        } else {
            let mut prefixed = Vec::with_capacity(self.config.prefix.len() + key.len());
            prefixed.extend_from_slice(self.config.prefix.as_bytes());
            prefixed.extend_from_slice(key);
            Cow::Owned(prefixed)
        }
    }

    /// Inverse of [`add_prefix`](Session::add_prefix) for keys returned by
    /// the server.
    pub fn strip_prefix<'a>(&self, key: &'a [u8]) -> &'a [u8] {
        key.strip_prefix(self.config.prefix.as_bytes())
            .unwrap_or(key)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("db", &self.config.db)
            .field("available", &self.available)
            .field("error", &self.error)
            .field("version", &self.version)
            .finish()
    }
}

/// Parse `redis_version:X.Y.Z` out of INFO text.
pub fn parse_version(info: &str) -> Option<u32> {
    let start = info.find(VERSION_FIELD)? + VERSION_FIELD.len();
    let line = info[start..].lines().next()?.trim();

    let mut parts = line.splitn(3, '.');
    let major: u32 = parts.next()?.parse().ok()?;
    let minor: u32 = parts.next()?.parse().ok()?;
    let patch: u32 = parts.next()?.parse().ok()?;
    Some(major * 10000 + minor * 100 + patch)
}

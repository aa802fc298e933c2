use crate::error::{Error, Result};
use crate::named_registry::NamedRegistry;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Environment variable consulted for a credential when the file has none.
pub const PASSWORD_ENV: &str = "FEOX_CLIENT_PASSWORD";

static DEFAULTS: OnceCell<EndpointConfig> = OnceCell::new();

/// Identity and policy for one backend endpoint.
///
/// Equality and hashing cover every field. Pooling only looks at
/// [`target`](EndpointConfig::target); the remaining fields are applied to a
/// reused session in place.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Server host name or IP address
    pub host: String,

    /// Server port
    pub port: u16,

    /// Password sent with AUTH after every connect (empty = no AUTH)
    pub credential: String,

    /// Logical database selected after every connect
    pub db: u32,

    /// Prepended to every key this endpoint sees (empty = none)
    pub prefix: String,

    pub connect_timeout_ms: u32,

    pub operation_timeout_ms: u32,

    /// Reconnect and retry once when a command fails at the transport level
    pub reconnect_on_failure: bool,

    /// Surface failures as `Error::Raised` instead of a `false` return
    pub raise_on_error: bool,
}

/// The part of an [`EndpointConfig`] that picks a distinct backend target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub db: u32,
}

impl EndpointConfig {
    /// Values used when no defaults snapshot was installed.
    pub fn builtin() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            credential: String::new(),
            db: 0,
            prefix: String::new(),
            connect_timeout_ms: 1000,
            operation_timeout_ms: 1000,
            reconnect_on_failure: true,
            raise_on_error: false,
        }
    }

    /// Endpoint at `host:port` with every other field taken from the defaults.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_db(mut self, db: u32) -> Self {
        self.db = db;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = credential.into();
        self
    }

    pub fn with_timeouts(mut self, connect_ms: u32, operation_ms: u32) -> Self {
        self.connect_timeout_ms = connect_ms;
        self.operation_timeout_ms = operation_ms;
        self
    }

    pub fn with_reconnect(mut self, reconnect_on_failure: bool) -> Self {
        self.reconnect_on_failure = reconnect_on_failure;
        self
    }

    pub fn with_raise(mut self, raise_on_error: bool) -> Self {
        self.raise_on_error = raise_on_error;
        self
    }

    pub fn target(&self) -> Target {
        Target {
            host: self.host.clone(),
            port: self.port,
            db: self.db,
        }
    }

    /// `None` when the timeout is zero.
    pub fn connect_timeout(&self) -> Option<Duration> {
        millis(self.connect_timeout_ms)
    }

    /// `None` when the timeout is zero.
    pub fn operation_timeout(&self) -> Option<Duration> {
        millis(self.operation_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::Config("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(Error::Config(format!("port must be > 0 for {}", self.host)));
        }
        Ok(())
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        DEFAULTS.get().cloned().unwrap_or_else(Self::builtin)
    }
}

fn millis(ms: u32) -> Option<Duration> {
    if ms == 0 {
        None
    } else {
        Some(Duration::from_millis(u64::from(ms)))
    }
}

/// Install the process-wide defaults read by `EndpointConfig::default()`.
///
/// Intended to be called once at startup; the snapshot is immutable
/// afterwards and a second call fails.
pub fn install_defaults(defaults: EndpointConfig) -> Result<()> {
    defaults.validate()?;
    DEFAULTS
        .set(defaults)
        .map_err(|_| Error::Config("defaults were already installed".to_string()))
}

/// The installed defaults snapshot, if any.
pub fn installed_defaults() -> Option<&'static EndpointConfig> {
    DEFAULTS.get()
}

/// One endpoint entry of a named pool in a config file.
///
/// Missing fields are filled from the file's `[defaults]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_timeout_ms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect_on_failure: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raise_on_error: Option<bool>,
}

impl EndpointEntry {
    pub fn resolve(&self, defaults: &EndpointConfig) -> EndpointConfig {
        EndpointConfig {
            host: self.host.clone().unwrap_or_else(|| defaults.host.clone()),
            port: self.port.unwrap_or(defaults.port),
            credential: self
                .credential
                .clone()
                .unwrap_or_else(|| defaults.credential.clone()),
            db: self.db.unwrap_or(defaults.db),
            prefix: self.prefix.clone().unwrap_or_else(|| defaults.prefix.clone()),
            connect_timeout_ms: self.connect_timeout_ms.unwrap_or(defaults.connect_timeout_ms),
            operation_timeout_ms: self
                .operation_timeout_ms
                .unwrap_or(defaults.operation_timeout_ms),
            reconnect_on_failure: self
                .reconnect_on_failure
                .unwrap_or(defaults.reconnect_on_failure),
            raise_on_error: self.raise_on_error.unwrap_or(defaults.raise_on_error),
        }
    }
}

/// A named group of shard endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolEntry {
    pub name: String,
    #[serde(default)]
    pub endpoints: Vec<EndpointEntry>,
}

/// Client configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Log level
    pub log_level: String,

    /// Values every endpoint entry falls back to
    pub defaults: EndpointConfig,

    /// Named pools registered at startup
    pub pools: Vec<PoolEntry>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            defaults: EndpointConfig::builtin(),
            pools: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file
    ///
    /// # Example
    ///
    /// ```no_run
    /// use feox_client::ClientConfig;
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let config = ClientConfig::from_file("client.toml")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let mut config: ClientConfig = toml::from_str(&contents)?;

        if config.defaults.credential.is_empty() {
            if let Ok(password) = std::env::var(PASSWORD_ENV) {
                config.defaults.credential = password;
            }
        }

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.defaults.validate()?;

        let mut names = HashSet::new();
        for pool in &self.pools {
            if pool.name.is_empty() {
                anyhow::bail!("pool name must not be empty");
            }
            if !names.insert(pool.name.as_str()) {
                anyhow::bail!("pool '{}' is declared twice", pool.name);
            }
            if pool.endpoints.is_empty() {
                anyhow::bail!("pool '{}' has no endpoints", pool.name);
            }
            for endpoint in self.endpoints(pool) {
                endpoint.validate()?;
            }
        }

        Ok(())
    }

    /// Fully resolved endpoints of one pool entry.
    pub fn endpoints(&self, pool: &PoolEntry) -> Vec<EndpointConfig> {
        pool.endpoints
            .iter()
            .map(|entry| entry.resolve(&self.defaults))
            .collect()
    }

    /// Create every configured pool in `registry`.
    pub fn register(&self, registry: &NamedRegistry) -> Result<()> {
        for pool in &self.pools {
            registry.create(&pool.name, self.endpoints(pool))?;
        }
        Ok(())
    }
}

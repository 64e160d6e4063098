//! Directory configuration.
//!
//! Everything here is deserialized from the `directory` section of the
//! configuration file. Per-operation overlays sit under `searches` and take
//! precedence over the pool-level `basedn` and `scope`.

use std::time::Duration;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::search::{QueryKind, Scope};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DirectoryConfig {
    /// Which directory to talk to
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub pool: PoolConfig,

    /// Default search base for every operation without its own `basedn`
    #[serde(default)]
    pub basedn: Option<String>,

    /// Default search scope for every operation without its own `scope`
    #[serde(default)]
    pub scope: Scope,

    /// Enable password verification against the directory
    #[serde(default)]
    pub authn: bool,

    /// Enable alias expansion of recipients
    #[serde(default)]
    pub aliases: bool,

    /// Enable recipient existence checks
    #[serde(default)]
    pub rcpt_to: bool,

    /// Enable sender authorization checks
    #[serde(default)]
    pub authz: bool,

    /// How a recipient check reacts when the directory cannot be reached
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    #[serde(default)]
    pub searches: Searches,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub enum BackendConfig {
    Ldap(LdapConfig),
    Memory(MemoryConfig),
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::Ldap(LdapConfig::default())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LdapConfig {
    /// Server URL, `ldap://`, `ldaps://` or `ldapi://` (default: `ldap://localhost:389`)
    #[serde(default = "default_url")]
    pub url: String,

    /// DN used to bind pooled connections; anonymous when unset
    #[serde(default)]
    pub bind_dn: Option<String>,

    #[serde(default)]
    pub bind_password: Option<String>,

    /// Upgrade plain connections with StartTLS
    #[serde(default)]
    pub starttls: bool,

    /// Skip certificate verification (testing only)
    #[serde(default)]
    pub allow_invalid_certs: bool,

    /// Connect timeout in seconds (default: 30)
    #[serde(default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for LdapConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            bind_dn: None,
            bind_password: None,
            starttls: false,
            allow_invalid_certs: false,
            connect_timeout_secs: default_timeout_secs(),
        }
    }
}

impl LdapConfig {
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Entries served by the in-memory backend.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub entries: Vec<MemoryEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MemoryEntry {
    pub dn: String,
    #[serde(default)]
    pub attributes: AHashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    /// Maximum number of pooled connections (default: 10)
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// How long a request waits for a free connection (default: 30).
    /// `None` waits until one becomes available.
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: Option<u64>,

    /// How long creating and binding a connection may take (default: 30)
    #[serde(default = "default_timeout_secs")]
    pub create_timeout_secs: u64,

    /// How long the liveness check of an idle connection may take (default: 30)
    #[serde(default = "default_timeout_secs")]
    pub recycle_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            wait_timeout_secs: default_wait_timeout_secs(),
            create_timeout_secs: default_timeout_secs(),
            recycle_timeout_secs: default_timeout_secs(),
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_secs.map(Duration::from_secs)
    }

    #[must_use]
    pub const fn create_timeout(&self) -> Duration {
        Duration::from_secs(self.create_timeout_secs)
    }

    #[must_use]
    pub const fn recycle_timeout(&self) -> Duration {
        Duration::from_secs(self.recycle_timeout_secs)
    }
}

/// Reaction to a recipient lookup that could not be completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum FailurePolicy {
    /// Temporarily reject, so the sender retries later
    #[default]
    SoftDeny,
    /// Let the transaction continue as if the directory had no opinion
    FailOpen,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Searches {
    #[serde(default)]
    pub rcpt_to: SearchOverlay,
    #[serde(default)]
    pub aliases: SearchOverlay,
    #[serde(default)]
    pub authz: SearchOverlay,
    #[serde(default)]
    pub authn: SearchOverlay,
}

impl Searches {
    #[must_use]
    pub const fn overlay(&self, kind: QueryKind) -> &SearchOverlay {
        match kind {
            QueryKind::Existence => &self.rcpt_to,
            QueryKind::Alias => &self.aliases,
            QueryKind::Authorization => &self.authz,
            QueryKind::Authentication => &self.authn,
        }
    }
}

/// Per-operation search settings. Unset fields fall back to pool defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SearchOverlay {
    #[serde(default)]
    pub basedn: Option<String>,

    /// Filter template; `%a` is the address, `%u` the user, `%%` a percent sign
    #[serde(default)]
    pub searchfilter: Option<String>,

    #[serde(default)]
    pub scope: Option<Scope>,

    /// Attribute to read from matching entries
    #[serde(default)]
    pub attribute: Option<String>,

    /// Attribute to read from the entries named by `attribute` when
    /// `attribute_is_dn` is set (default: `mail`)
    #[serde(default)]
    pub subattribute: Option<String>,

    /// Treat the values of `attribute` as DNs to look up
    #[serde(default)]
    pub attribute_is_dn: bool,

    /// Bind DN templates tried in order when authenticating
    #[serde(default)]
    pub dn: Vec<String>,
}

fn default_url() -> String {
    "ldap://localhost:389".to_string()
}

const fn default_max_connections() -> usize {
    10
}

#[allow(clippy::unnecessary_wraps)]
const fn default_wait_timeout_secs() -> Option<u64> {
    Some(30)
}

const fn default_timeout_secs() -> u64 {
    30
}

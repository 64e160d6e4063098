//! Scripted directory backend for exercising the resolvers.
#![allow(dead_code)] // Not every suite uses every knob
//!
//! Searches are answered by an in-memory directory, with per-base delays and
//! injected failures layered on top, and counters for everything the pool
//! and resolvers do.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use ahash::AHashMap;
use async_trait::async_trait;
use mailroom_directory::{
    Directory, DirectoryBackend, DirectoryConfig, DirectoryConnection, DirectoryEntry,
    EntryStream, PoolConfig, SearchFailure, SearchSpec,
    backend::{MemoryBackend, MemoryConnection},
};
use parking_lot::Mutex;

pub const BASE: &str = "dc=example,dc=com";

#[derive(Debug, Default)]
struct Script {
    delays: Mutex<AHashMap<String, Duration>>,
    failures: Mutex<AHashMap<String, SearchFailure>>,
    filters: Mutex<Vec<String>>,
    single_session: AtomicBool,
    refuse_connections: AtomicBool,
    connects: AtomicUsize,
    searches: AtomicUsize,
    forks: AtomicUsize,
    active_searches: AtomicUsize,
    peak_searches: AtomicUsize,
}

/// Backend handle; clones share the same script and counters.
#[derive(Debug, Clone, Default)]
pub struct ScriptedBackend {
    directory: MemoryBackend,
    script: Arc<Script>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, entry: DirectoryEntry) -> Self {
        self.directory.insert(entry);
        self
    }

    /// Delay every search whose base is `base`.
    pub fn with_delay(self, base: &str, delay: Duration) -> Self {
        self.script.delays.lock().insert(base.to_lowercase(), delay);
        self
    }

    /// Fail every search whose base is `base`.
    pub fn with_failure(self, base: &str, failure: SearchFailure) -> Self {
        self.script
            .failures
            .lock()
            .insert(base.to_lowercase(), failure);
        self
    }

    /// Connections cannot be forked; sub-searches run one after another.
    pub fn single_session(self) -> Self {
        self.script.single_session.store(true, Ordering::SeqCst);
        self
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.script.refuse_connections.store(refuse, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.script.connects.load(Ordering::SeqCst)
    }

    pub fn searches(&self) -> usize {
        self.script.searches.load(Ordering::SeqCst)
    }

    pub fn forks(&self) -> usize {
        self.script.forks.load(Ordering::SeqCst)
    }

    /// Most searches observed in flight at the same time.
    pub fn peak_searches(&self) -> usize {
        self.script.peak_searches.load(Ordering::SeqCst)
    }

    /// Filters of every search issued so far, in order.
    pub fn filters(&self) -> Vec<String> {
        self.script.filters.lock().clone()
    }

    pub fn directory(&self, config: DirectoryConfig) -> Directory<Self> {
        Directory::connect(self.clone(), config).expect("pool builds")
    }
}

#[async_trait]
impl DirectoryBackend for ScriptedBackend {
    type Connection = ScriptedConnection;

    async fn connect(&self) -> Result<ScriptedConnection, SearchFailure> {
        if self.script.refuse_connections.load(Ordering::SeqCst) {
            return Err(SearchFailure::Transport("connection refused".to_string()));
        }

        self.script.connects.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedConnection {
            inner: self.directory.connect().await?,
            script: Arc::clone(&self.script),
            broken: false,
        })
    }

    async fn check(&self, _connection: &mut ScriptedConnection) -> Result<(), SearchFailure> {
        Ok(())
    }

    async fn verify_credentials(&self, dn: &str, secret: &str) -> Result<bool, SearchFailure> {
        if let Some(failure) = self.script.failures.lock().get(&dn.to_lowercase()) {
            return Err(failure.clone());
        }
        self.directory.verify_credentials(dn, secret).await
    }
}

pub struct ScriptedConnection {
    inner: MemoryConnection,
    script: Arc<Script>,
    broken: bool,
}

#[async_trait]
impl DirectoryConnection for ScriptedConnection {
    async fn search(&mut self, spec: &SearchSpec) -> Result<Box<dyn EntryStream>, SearchFailure> {
        let script = Arc::clone(&self.script);
        script.searches.fetch_add(1, Ordering::SeqCst);
        script.filters.lock().push(spec.filter.clone());

        let active = script.active_searches.fetch_add(1, Ordering::SeqCst) + 1;
        script.peak_searches.fetch_max(active, Ordering::SeqCst);

        let base = spec.base.to_lowercase();
        let delay = script.delays.lock().get(&base).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = script.failures.lock().get(&base).cloned();
        let result = match failure {
            Some(failure) => {
                if failure.is_transport() {
                    self.broken = true;
                }
                Err(failure)
            }
            None => self.inner.search(spec).await,
        };

        script.active_searches.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn fork(&self) -> Option<Self> {
        if self.script.single_session.load(Ordering::SeqCst) {
            return None;
        }

        self.script.forks.fetch_add(1, Ordering::SeqCst);
        Some(Self {
            inner: self.inner.clone(),
            script: Arc::clone(&self.script),
            broken: false,
        })
    }

    fn is_closed(&mut self) -> bool {
        self.broken
    }
}

/// Configuration with every hook enabled and the test base DN.
pub fn config() -> DirectoryConfig {
    DirectoryConfig {
        basedn: Some(BASE.to_string()),
        rcpt_to: true,
        aliases: true,
        authz: true,
        authn: true,
        pool: PoolConfig {
            max_connections: 4,
            wait_timeout_secs: Some(5),
            ..PoolConfig::default()
        },
        ..DirectoryConfig::default()
    }
}

pub fn user(uid: &str) -> DirectoryEntry {
    DirectoryEntry::new(dn(uid))
        .with("uid", [uid])
        .with("mail", [format!("{uid}@example.com")])
        .with("mailLocalAddress", [format!("{uid}@example.com")])
        .with("userPassword", [format!("{uid}-secret")])
}

pub fn dn(uid: &str) -> String {
    format!("uid={uid},ou=people,{BASE}")
}

/// The people directory used across suites:
/// - `user1`..`user3` are plain mailboxes
/// - `forward@example.com` forwards to `user2@example.com`
/// - `team@example.com` lists the DNs of `user1` and `user2`
pub fn directory() -> ScriptedBackend {
    ScriptedBackend::new()
        .with_entry(DirectoryEntry::new(BASE).with("dc", ["example"]))
        .with_entry(DirectoryEntry::new(format!("ou=people,{BASE}")).with("ou", ["people"]))
        .with_entry(user("user1"))
        .with_entry(user("user2"))
        .with_entry(user("user3"))
        .with_entry(
            DirectoryEntry::new(format!("cn=forward,ou=aliases,{BASE}"))
                .with("mail", ["forward@example.com"])
                .with("mailForwardAddress", ["yes"])
                .with("mailForwardingAddress", ["user2@example.com"]),
        )
        .with_entry(
            DirectoryEntry::new(format!("cn=team,ou=aliases,{BASE}"))
                .with("mail", ["team@example.com"])
                .with("mailForwardAddress", ["yes"])
                .with("mailForwardingAddress", [dn("user1"), dn("user2")]),
        )
}

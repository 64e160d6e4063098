//! Bounded pool of bound directory connections.
//!
//! The pool hands out one connection per request through a
//! [`PooledConnection`] guard. Dropping the guard returns the connection;
//! [`PooledConnection::discard`] removes a connection whose transport broke.
//! Idle connections are checked before reuse and replaced when dead.

use std::{
    ops::{Deref, DerefMut},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use deadpool::{
    Runtime,
    managed::{self, Object, Pool, PoolError, Timeouts},
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    config::PoolConfig,
    connection::{DirectoryBackend, DirectoryConnection},
    error::{DirectoryError, SearchFailure},
};

/// Adapts a [`DirectoryBackend`] to deadpool.
#[derive(Debug)]
pub struct BackendManager<B>(B);

impl<B: DirectoryBackend> managed::Manager for BackendManager<B> {
    type Type = B::Connection;
    type Error = SearchFailure;

    async fn create(&self) -> Result<B::Connection, SearchFailure> {
        let connection = self.0.connect().await;
        if let Err(err) = &connection {
            warn!(error = %err, "Failed to open directory connection");
        }
        connection
    }

    async fn recycle(
        &self,
        connection: &mut B::Connection,
        _: &managed::Metrics,
    ) -> managed::RecycleResult<SearchFailure> {
        if connection.is_closed() {
            debug!("Dropping closed directory connection");
            return Err(managed::RecycleError::Backend(SearchFailure::Transport(
                "connection closed".to_string(),
            )));
        }

        self.0
            .check(connection)
            .await
            .map_err(managed::RecycleError::Backend)
    }
}

#[derive(Debug, Default)]
struct Counters {
    acquired: AtomicU64,
    released: AtomicU64,
    discarded: AtomicU64,
}

/// Point-in-time accounting of a [`DirectoryPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections handed out
    pub acquired: u64,
    /// Connections given back, including discarded ones
    pub released: u64,
    /// Connections removed from the pool after a transport failure
    pub discarded: u64,
    /// Connections currently owned by the pool
    pub size: usize,
    pub max_size: usize,
}

impl PoolStats {
    /// Connections currently borrowed by requests.
    #[must_use]
    pub const fn in_use(&self) -> u64 {
        self.acquired.saturating_sub(self.released)
    }
}

/// Shared handle to the connection pool.
pub struct DirectoryPool<B: DirectoryBackend> {
    inner: Pool<BackendManager<B>>,
    timeouts: Timeouts,
    counters: Arc<Counters>,
    closing: Arc<AtomicBool>,
}

impl<B: DirectoryBackend> Clone for DirectoryPool<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            timeouts: self.timeouts,
            counters: Arc::clone(&self.counters),
            closing: Arc::clone(&self.closing),
        }
    }
}

impl<B: DirectoryBackend> std::fmt::Debug for DirectoryPool<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryPool")
            .field("stats", &self.stats())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl<B: DirectoryBackend> DirectoryPool<B> {
    /// Build a pool over `backend`. Connections are created lazily.
    ///
    /// # Errors
    ///
    /// Fails if the pool cannot be constructed from `config`.
    pub fn new(backend: B, config: &PoolConfig) -> Result<Self, DirectoryError> {
        let mut timeouts = Timeouts::default();
        timeouts.wait = config.wait_timeout();
        timeouts.create = Some(config.create_timeout());
        timeouts.recycle = Some(config.recycle_timeout());

        let inner = Pool::builder(BackendManager(backend))
            .runtime(Runtime::Tokio1)
            .max_size(config.max_connections.max(1))
            .wait_timeout(timeouts.wait)
            .create_timeout(timeouts.create)
            .recycle_timeout(timeouts.recycle)
            .build()
            .map_err(|err| {
                DirectoryError::PoolUnavailable(format!("Failed to build directory pool: {err}"))
            })?;

        debug!(
            max_connections = config.max_connections,
            wait_timeout = ?timeouts.wait,
            "Directory pool ready"
        );

        Ok(Self {
            inner,
            timeouts,
            counters: Arc::default(),
            closing: Arc::default(),
        })
    }

    /// Borrow a connection, waiting at most until `deadline` (or the
    /// configured wait timeout, whichever is sooner).
    ///
    /// # Errors
    ///
    /// [`DirectoryError::PoolUnavailable`] once the pool is closed, and
    /// [`DirectoryError::Connection`] if no connection could be obtained in
    /// time or a new one failed to connect or bind.
    pub async fn acquire(
        &self,
        deadline: Option<Instant>,
    ) -> Result<PooledConnection<B>, DirectoryError> {
        if self.is_closed() {
            return Err(DirectoryError::PoolUnavailable(
                "directory pool is closed".to_string(),
            ));
        }

        let mut timeouts = self.timeouts;
        if let Some(deadline) = deadline {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(DirectoryError::Connection(
                    "deadline elapsed before a connection was acquired".to_string(),
                ));
            }
            timeouts.wait = Some(timeouts.wait.map_or(remaining, |wait| wait.min(remaining)));
        }

        match self.inner.timeout_get(&timeouts).await {
            Ok(object) => {
                self.counters.acquired.fetch_add(1, Ordering::Relaxed);
                Ok(PooledConnection {
                    object,
                    release: Release {
                        counters: Arc::clone(&self.counters),
                    },
                })
            }
            Err(PoolError::Closed) => Err(DirectoryError::PoolUnavailable(
                "directory pool is closed".to_string(),
            )),
            Err(PoolError::Timeout(kind)) => Err(DirectoryError::Connection(format!(
                "timed out acquiring a directory connection ({kind:?})"
            ))),
            Err(PoolError::Backend(err)) => Err(DirectoryError::Connection(err.to_string())),
            Err(err) => Err(DirectoryError::Connection(err.to_string())),
        }
    }

    /// Stop handing out connections. Idle connections are dropped at once,
    /// borrowed ones when they are returned.
    ///
    /// # Errors
    ///
    /// Fails if the pool was already closed.
    pub fn close(&self) -> Result<(), DirectoryError> {
        if self.closing.swap(true, Ordering::AcqRel) {
            return Err(DirectoryError::PoolUnavailable(
                "directory pool already closed".to_string(),
            ));
        }

        self.inner.close();
        info!(stats = ?self.stats(), "Directory pool closed");
        Ok(())
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closing.load(Ordering::Acquire) || self.inner.is_closed()
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let status = self.inner.status();
        PoolStats {
            acquired: self.counters.acquired.load(Ordering::Relaxed),
            released: self.counters.released.load(Ordering::Relaxed),
            discarded: self.counters.discarded.load(Ordering::Relaxed),
            size: status.size,
            max_size: status.max_size,
        }
    }

    /// Check `secret` for `dn` on a connection outside the pool.
    ///
    /// # Errors
    ///
    /// Returns the backend failure if the bind could not be attempted.
    pub async fn verify_credentials(&self, dn: &str, secret: &str) -> Result<bool, SearchFailure> {
        self.inner.manager().0.verify_credentials(dn, secret).await
    }
}

/// Counts the return of a connection when dropped.
struct Release {
    counters: Arc<Counters>,
}

impl Drop for Release {
    fn drop(&mut self) {
        self.counters.released.fetch_add(1, Ordering::Relaxed);
    }
}

/// A connection borrowed from a [`DirectoryPool`], returned on drop.
pub struct PooledConnection<B: DirectoryBackend> {
    // Declared before `release` so the connection is back in the pool before
    // the return is counted.
    object: Object<BackendManager<B>>,
    release: Release,
}

impl<B: DirectoryBackend> PooledConnection<B> {
    /// Remove the connection from the pool instead of returning it.
    pub fn discard(self) {
        let Self { object, release } = self;
        drop(Object::take(object));
        release.counters.discarded.fetch_add(1, Ordering::Relaxed);
        debug!("Discarded broken directory connection");
    }
}

impl<B: DirectoryBackend> Deref for PooledConnection<B> {
    type Target = B::Connection;

    fn deref(&self) -> &B::Connection {
        &self.object
    }
}

impl<B: DirectoryBackend> DerefMut for PooledConnection<B> {
    fn deref_mut(&mut self) -> &mut B::Connection {
        &mut self.object
    }
}

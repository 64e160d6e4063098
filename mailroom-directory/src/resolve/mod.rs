//! Request orchestration.
//!
//! [`Directory`] wires each query to pool acquisition, search, aggregation
//! and completion. Every request completes exactly once, and the borrowed
//! connection goes back to the pool (or is discarded) on every path.

pub mod alias;
pub mod authn;
pub mod authz;
pub mod rcpt;
mod request;

use std::{future::Future, sync::Arc};

use tokio::time::Instant;

pub use self::request::{Completion, Existence, Request, RequestState};
use crate::{
    config::DirectoryConfig,
    connection::DirectoryBackend,
    error::{DirectoryError, SearchFailure},
    pool::{DirectoryPool, PooledConnection},
    search::{self, DEFAULT_SUBATTRIBUTE, QueryKind, SearchConfigBuilder, SearchSpec},
    template::Placeholders,
};

/// Entry point for directory queries.
pub struct Directory<B: DirectoryBackend> {
    pool: Option<DirectoryPool<B>>,
    config: Arc<DirectoryConfig>,
}

impl<B: DirectoryBackend> Clone for Directory<B> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<B: DirectoryBackend> std::fmt::Debug for Directory<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Directory")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl<B: DirectoryBackend> Directory<B> {
    #[must_use]
    pub fn new(pool: DirectoryPool<B>, config: DirectoryConfig) -> Self {
        Self {
            pool: Some(pool),
            config: Arc::new(config),
        }
    }

    /// Build the pool for `backend` from `config.pool` and wrap it.
    ///
    /// # Errors
    ///
    /// Fails if the pool cannot be constructed.
    pub fn connect(backend: B, config: DirectoryConfig) -> Result<Self, DirectoryError> {
        let pool = DirectoryPool::new(backend, &config.pool)?;
        Ok(Self::new(pool, config))
    }

    /// A directory without a pool; every query fails with
    /// [`DirectoryError::PoolUnavailable`].
    #[must_use]
    pub fn unwired(config: DirectoryConfig) -> Self {
        Self {
            pool: None,
            config: Arc::new(config),
        }
    }

    #[must_use]
    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    #[must_use]
    pub const fn pool(&self) -> Option<&DirectoryPool<B>> {
        self.pool.as_ref()
    }

    /// Close the underlying pool.
    ///
    /// # Errors
    ///
    /// Fails if there is no pool or it was already closed.
    pub fn close(&self) -> Result<(), DirectoryError> {
        self.pool
            .as_ref()
            .ok_or_else(unwired)
            .and_then(DirectoryPool::close)
    }

    fn build(
        &self,
        kind: QueryKind,
        placeholders: &Placeholders<'_>,
    ) -> Result<SearchSpec, DirectoryError> {
        SearchConfigBuilder::new(&self.config)
            .build(kind, self.config.searches.overlay(kind), placeholders)
            .map_err(DirectoryError::from)
    }

    async fn acquire(
        &self,
        request: &mut Request,
        deadline: Option<Instant>,
    ) -> Result<(&DirectoryPool<B>, PooledConnection<B>), DirectoryError> {
        let pool = self.pool.as_ref().ok_or_else(unwired)?;
        request.enter(RequestState::PoolAcquire);
        let connection = pool.acquire(deadline).await?;
        request.enter(RequestState::Searching);
        Ok((pool, connection))
    }

    /// Does `address` resolve to at least one entry?
    ///
    /// The completion carries `false` alongside any error; use
    /// [`Completion::existence`] to tell a missing recipient from a failed lookup.
    pub async fn verify_existence(
        &self,
        address: &str,
        deadline: Option<Instant>,
    ) -> Completion<bool> {
        let mut request = Request::new(QueryKind::Existence, address);
        let (_, mut connection) = match self.acquire(&mut request, deadline).await {
            Ok(acquired) => acquired,
            Err(err) => return request.fail(err),
        };

        let result = match self.build(QueryKind::Existence, &Placeholders::new().address(address)) {
            Ok(spec) => within(deadline, rcpt::verify_existence(&mut *connection, &spec))
                .await
                .map_err(|source| protocol(address, source)),
            Err(err) => Err(err),
        };

        request.finish(result, connection)
    }

    /// Expand `address` into its forwarding addresses.
    ///
    /// An empty list means "no alias" and is not an error.
    pub async fn resolve_alias(
        &self,
        address: &str,
        deadline: Option<Instant>,
    ) -> Completion<Vec<String>> {
        let mut request = Request::new(QueryKind::Alias, address);
        let (_, mut connection) = match self.acquire(&mut request, deadline).await {
            Ok(acquired) => acquired,
            Err(err) => return request.fail(err),
        };

        let overlay = self.config.searches.overlay(QueryKind::Alias);
        let indirection = overlay.attribute_is_dn.then(|| {
            overlay
                .subattribute
                .as_deref()
                .filter(|attribute| !attribute.trim().is_empty())
                .unwrap_or(DEFAULT_SUBATTRIBUTE)
        });

        let result = match self.build(QueryKind::Alias, &Placeholders::new().address(address)) {
            Ok(spec) => within(
                deadline,
                alias::resolve_alias(&mut *connection, &spec, indirection, &mut request),
            )
            .await
            .map_err(|source| protocol(address, source)),
            Err(err) => Err(err),
        };

        request.finish(result, connection)
    }

    /// May the authenticated `principal` use `address`?
    pub async fn check_authz(
        &self,
        principal: &str,
        address: &str,
        deadline: Option<Instant>,
    ) -> Completion<bool> {
        let mut request = Request::new(QueryKind::Authorization, principal);
        let (_, mut connection) = match self.acquire(&mut request, deadline).await {
            Ok(acquired) => acquired,
            Err(err) => return request.fail(err),
        };

        let placeholders = Placeholders::new().user(principal).address(address);
        let result = match self.build(QueryKind::Authorization, &placeholders) {
            Ok(spec) => within(deadline, authz::check_authz(&mut *connection, &spec))
                .await
                .map_err(|source| protocol(principal, source)),
            Err(err) => Err(err),
        };

        request.finish(result, connection)
    }

    /// Verify `secret` for `user` by binding to the directory.
    ///
    /// Configured bind DN templates are rendered and tried directly; without
    /// them the user is looked up and each matching entry is tried. An empty
    /// user or secret never authenticates and never touches the pool.
    pub async fn authenticate(
        &self,
        user: &str,
        secret: &str,
        deadline: Option<Instant>,
    ) -> Completion<bool> {
        let request = Request::new(QueryKind::Authentication, user);
        if user.is_empty() || secret.is_empty() {
            return request.complete(false);
        }

        let Some(pool) = self.pool.as_ref() else {
            return request.fail(unwired());
        };
        if pool.is_closed() {
            return request.fail(DirectoryError::PoolUnavailable(
                "directory pool is closed".to_string(),
            ));
        }

        let placeholders = Placeholders::new().user(user);
        let overlay = self.config.searches.overlay(QueryKind::Authentication);

        let (request, dns) = if overlay.dn.is_empty() {
            match self.lookup_bind_dns(request, user, &placeholders, deadline).await {
                Ok(found) => found,
                Err(failed) => return failed,
            }
        } else {
            match search::bind_dns(&overlay.dn, &placeholders) {
                Ok(dns) => (request, dns),
                Err(err) => return request.fail(err.into()),
            }
        };

        let verified = match deadline {
            Some(deadline) => {
                tokio::time::timeout_at(deadline, authn::verify_any(pool, &dns, secret))
                    .await
                    .unwrap_or_else(|_| {
                        Err(DirectoryError::Connection(
                            "deadline elapsed while binding".to_string(),
                        ))
                    })
            }
            None => authn::verify_any(pool, &dns, secret).await,
        };

        match verified {
            Ok(verified) => request.complete(verified),
            Err(err) => request.fail(err),
        }
    }

    /// Search for the entries `user` may bind as. The connection is returned
    /// before any bind is attempted.
    async fn lookup_bind_dns(
        &self,
        mut request: Request,
        user: &str,
        placeholders: &Placeholders<'_>,
        deadline: Option<Instant>,
    ) -> Result<(Request, Vec<String>), Completion<bool>> {
        let (_, mut connection) = match self.acquire(&mut request, deadline).await {
            Ok(acquired) => acquired,
            Err(err) => return Err(request.fail(err)),
        };

        let dns = match self.build(QueryKind::Authentication, placeholders) {
            Ok(spec) => within(deadline, authn::candidate_dns(&mut *connection, &spec))
                .await
                .map_err(|source| protocol(user, source)),
            Err(err) => Err(err),
        };

        match dns {
            Ok(dns) => {
                drop(connection);
                Ok((request, dns))
            }
            Err(err) => Err(request.finish(Err(err), connection)),
        }
    }
}

fn unwired() -> DirectoryError {
    DirectoryError::PoolUnavailable("no directory pool configured".to_string())
}

fn protocol(subject: &str, source: SearchFailure) -> DirectoryError {
    DirectoryError::Protocol {
        subject: subject.to_string(),
        source,
    }
}

/// Bound `search` by `deadline`; running out of time counts as a broken transport.
async fn within<T>(
    deadline: Option<Instant>,
    search: impl Future<Output = Result<T, SearchFailure>>,
) -> Result<T, SearchFailure> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, search)
            .await
            .unwrap_or_else(|_| {
                Err(SearchFailure::Transport(
                    "deadline elapsed during search".to_string(),
                ))
            }),
        None => search.await,
    }
}

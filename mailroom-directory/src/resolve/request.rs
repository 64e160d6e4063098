//! Lifecycle of a single directory request.

use std::time::Instant;

use tracing::{debug, error, trace};

use crate::{
    connection::DirectoryBackend, error::DirectoryError, pool::PooledConnection,
    search::QueryKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    PoolAcquire,
    Searching,
    SubSearching,
    Completed,
    Failed,
}

impl RequestState {
    /// Whether `next` may follow `self`.
    #[must_use]
    pub const fn can_enter(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::PoolAcquire | Self::Completed | Self::Failed)
                | (Self::PoolAcquire, Self::Searching | Self::Failed)
                | (
                    Self::Searching | Self::SubSearching,
                    Self::SubSearching | Self::Completed | Self::Failed
                )
        )
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Tracks one inbound query from acquisition to completion.
///
/// Completing consumes the request, so every request completes exactly once.
#[derive(Debug)]
pub struct Request {
    kind: QueryKind,
    subject: String,
    state: RequestState,
    started: Instant,
}

impl Request {
    pub fn new(kind: QueryKind, subject: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            state: RequestState::Idle,
            started: Instant::now(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> RequestState {
        self.state
    }

    #[must_use]
    pub const fn kind(&self) -> QueryKind {
        self.kind
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn enter(&mut self, next: RequestState) {
        debug_assert!(
            self.state.can_enter(next),
            "invalid request transition {:?} -> {next:?}",
            self.state
        );
        trace!(
            kind = %self.kind,
            subject = %self.subject,
            from = ?self.state,
            to = ?next,
            "Directory request transition"
        );
        self.state = next;
    }

    pub fn complete<T>(mut self, value: T) -> Completion<T> {
        self.enter(RequestState::Completed);
        debug!(
            kind = %self.kind,
            subject = %self.subject,
            elapsed = ?self.started.elapsed(),
            "Directory request completed"
        );
        Completion { value, error: None }
    }

    /// Fail with the negative default of `T` (`false`, an empty list).
    pub fn fail<T: Default>(mut self, error: DirectoryError) -> Completion<T> {
        self.enter(RequestState::Failed);
        error!(
            kind = %self.kind,
            subject = %self.subject,
            elapsed = ?self.started.elapsed(),
            %error,
            "Directory request failed"
        );
        Completion {
            value: T::default(),
            error: Some(error),
        }
    }

    /// Complete with `result`, returning or discarding `connection` first.
    pub fn finish<B: DirectoryBackend, T: Default>(
        self,
        result: Result<T, DirectoryError>,
        connection: PooledConnection<B>,
    ) -> Completion<T> {
        match result {
            Ok(value) => {
                drop(connection);
                self.complete(value)
            }
            Err(error) => {
                if error.is_connection_broken() {
                    connection.discard();
                } else {
                    drop(connection);
                }
                self.fail(error)
            }
        }
    }
}

/// The single outcome of a request: a value, plus the error that replaced
/// the real answer if the request failed.
#[derive(Debug)]
#[must_use]
pub struct Completion<T> {
    pub value: T,
    pub error: Option<DirectoryError>,
}

impl<T> Completion<T> {
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    #[must_use]
    pub const fn error(&self) -> Option<&DirectoryError> {
        self.error.as_ref()
    }

    /// # Errors
    ///
    /// Returns the request's error if it failed.
    pub fn into_result(self) -> Result<T, DirectoryError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.value),
        }
    }
}

/// Outcome of an existence check, distinguishing "no" from "could not tell".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Existence {
    Found,
    Missing,
    /// The directory could not answer; the caller decides whether to defer or fail open.
    Deferred,
}

impl Completion<bool> {
    pub fn existence(&self) -> Existence {
        match (&self.error, self.value) {
            (Some(_), _) => Existence::Deferred,
            (None, true) => Existence::Found,
            (None, false) => Existence::Missing,
        }
    }
}

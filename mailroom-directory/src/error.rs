//! Typed error handling for directory resolution.
//!
//! Two layers are distinguished:
//! - [`SearchFailure`]: what went wrong talking to the directory (a single
//!   search, bind or connection attempt)
//! - [`DirectoryError`]: what the originating request reports to its caller

use std::fmt::{self, Display};

use thiserror::Error;

use crate::template::TemplateError;

/// Failure of a single directory operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchFailure {
    /// The filter could not be parsed (e.g. unbalanced parentheses).
    #[error("Invalid search filter {filter:?}: {reason}")]
    InvalidFilter { filter: String, reason: String },

    /// The search base does not exist.
    #[error("No such object: {0}")]
    NoSuchObject(String),

    /// The search base is not a syntactically valid DN.
    #[error("Invalid DN syntax: {0}")]
    InvalidDn(String),

    /// The directory answered with a non-success result code.
    #[error("Directory returned result code {code}: {message}")]
    Result { code: u32, message: String },

    /// The connection broke, timed out, or could not be established.
    #[error("Directory connection failed: {0}")]
    Transport(String),
}

impl SearchFailure {
    /// Returns `true` if the connection that produced this failure must not be reused.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns `true` if the failure only means "there is no entry there".
    #[must_use]
    pub const fn is_missing_entry(&self) -> bool {
        matches!(self, Self::NoSuchObject(_) | Self::InvalidDn(_))
    }
}

/// Error reported through the completion of a directory request.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// No pool was wired, or it has been closed.
    #[error("Directory pool unavailable: {0}")]
    PoolUnavailable(String),

    /// A connection could not be acquired or bound. Retryable by the caller.
    #[error("Directory connection failed: {0}")]
    Connection(String),

    /// A search issued on behalf of `subject` failed.
    #[error("Directory search for {subject:?} failed: {source}")]
    Protocol {
        subject: String,
        #[source]
        source: SearchFailure,
    },

    /// A configured search template is invalid.
    #[error("Invalid search template: {0}")]
    Template(#[from] TemplateError),
}

impl DirectoryError {
    /// Returns `true` if retrying the same request later may succeed.
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        match self {
            Self::PoolUnavailable(_) | Self::Connection(_) => true,
            Self::Protocol { source, .. } => source.is_transport(),
            Self::Template(_) => false,
        }
    }

    /// Returns `true` if the error stems from the configuration rather than the directory.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Template(_)
                | Self::Protocol {
                    source: SearchFailure::InvalidFilter { .. },
                    ..
                }
        )
    }

    /// Returns `true` if the connection used by the request has to be discarded.
    #[must_use]
    pub const fn is_connection_broken(&self) -> bool {
        matches!(self, Self::Protocol { source, .. } if source.is_transport())
    }
}

/// A DN returned by an alias search that could not be resolved to an address.
///
/// This is logged and skipped, never escalated to a request failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryResolutionWarning {
    pub dn: String,
    pub reason: String,
}

impl EntryResolutionWarning {
    pub fn new(dn: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            reason: reason.into(),
        }
    }
}

impl Display for EntryResolutionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Could not retrieve dn {:?}: {}", self.dn, self.reason)
    }
}

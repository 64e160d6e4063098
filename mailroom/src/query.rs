//! One-shot directory questions.

use std::{fmt, time::Duration};

use mailroom_common::address;
use mailroom_directory::{Completion, Directory, DirectoryBackend, DirectoryError};
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Rcpt { address: String },
    Alias { address: String },
    Authz { principal: String, address: String },
    Authn { user: String, secret: String },
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("{0:?} is not a single mailbox address")]
    InvalidAddress(String),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// What the directory said.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Exists(bool),
    Aliases(Vec<String>),
    Authorized(bool),
    Authenticated(bool),
}

impl Answer {
    /// Whether the answer is a "yes". An empty alias list is a "no".
    #[must_use]
    pub fn is_positive(&self) -> bool {
        match self {
            Self::Exists(yes) | Self::Authorized(yes) | Self::Authenticated(yes) => *yes,
            Self::Aliases(addresses) => !addresses.is_empty(),
        }
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exists(true) => f.write_str("exists"),
            Self::Exists(false) => f.write_str("does not exist"),
            Self::Aliases(addresses) if addresses.is_empty() => f.write_str("no aliases"),
            Self::Aliases(addresses) => f.write_str(&addresses.join("\n")),
            Self::Authorized(true) => f.write_str("authorized"),
            Self::Authorized(false) => f.write_str("not authorized"),
            Self::Authenticated(true) => f.write_str("authenticated"),
            Self::Authenticated(false) => f.write_str("rejected"),
        }
    }
}

fn mailbox(input: &str) -> Result<String, QueryError> {
    address::normalize(input).ok_or_else(|| QueryError::InvalidAddress(input.to_string()))
}

fn settle<T>(completion: Completion<T>) -> Result<T, QueryError> {
    Ok(completion.into_result()?)
}

/// Ask `directory` a single question, giving up once `timeout` has elapsed.
///
/// Unlike the MTA hooks this ignores the per-operation enable switches: the
/// command line always asks.
///
/// # Errors
///
/// Fails on an address that is not a single mailbox, or when the directory
/// could not answer.
pub async fn run<B: DirectoryBackend>(
    directory: &Directory<B>,
    query: &Query,
    timeout: Duration,
) -> Result<Answer, QueryError> {
    let deadline = Some(Instant::now() + timeout);
    debug!(?query, ?timeout, "Querying directory");

    match query {
        Query::Rcpt { address } => {
            let address = mailbox(address)?;
            settle(directory.verify_existence(&address, deadline).await).map(Answer::Exists)
        }
        Query::Alias { address } => {
            let address = mailbox(address)?;
            settle(directory.resolve_alias(&address, deadline).await).map(Answer::Aliases)
        }
        Query::Authz { principal, address } => {
            let address = mailbox(address)?;
            settle(directory.check_authz(principal, &address, deadline).await)
                .map(Answer::Authorized)
        }
        Query::Authn { user, secret } => {
            settle(directory.authenticate(user, secret, deadline).await)
                .map(Answer::Authenticated)
        }
    }
}

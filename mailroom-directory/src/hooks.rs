//! Mapping of directory answers to MTA verdicts.
//!
//! Each hook is gated by its flag in [`DirectoryConfig`](crate::DirectoryConfig);
//! a disabled hook, or one handed an address that does not parse as a single
//! mailbox, has no opinion and returns [`Verdict::Continue`].

use std::time::Duration;

use mailroom_common::{address, status::Status};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    config::FailurePolicy,
    connection::DirectoryBackend,
    resolve::{Directory, Existence},
};

/// An SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: Status,
    pub message: String,
}

impl Reply {
    fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.status, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// No opinion; let the next hook decide.
    Continue,
    Accept(Reply),
    /// Replace the recipient with these addresses.
    Rewrite(Vec<String>),
    Deny(Reply),
    DenySoft(Reply),
}

impl Verdict {
    fn temporary_failure() -> Self {
        Self::DenySoft(Reply::new(
            Status::ActionUnavailable,
            "4.4.3 Directory lookup failed, try again later",
        ))
    }
}

/// Hook entry points backed by a [`Directory`].
pub struct Hooks<B: DirectoryBackend> {
    directory: Directory<B>,
    timeout: Option<Duration>,
}

impl<B: DirectoryBackend> Clone for Hooks<B> {
    fn clone(&self) -> Self {
        Self {
            directory: self.directory.clone(),
            timeout: self.timeout,
        }
    }
}

impl<B: DirectoryBackend> std::fmt::Debug for Hooks<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("directory", &self.directory)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl<B: DirectoryBackend> Hooks<B> {
    #[must_use]
    pub const fn new(directory: Directory<B>) -> Self {
        Self {
            directory,
            timeout: None,
        }
    }

    /// Bound every hook by `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub const fn directory(&self) -> &Directory<B> {
        &self.directory
    }

    fn deadline(&self) -> Option<Instant> {
        self.timeout.map(|timeout| Instant::now() + timeout)
    }

    fn on_deferral(&self) -> Verdict {
        match self.directory.config().failure_policy {
            FailurePolicy::SoftDeny => Verdict::temporary_failure(),
            FailurePolicy::FailOpen => Verdict::Continue,
        }
    }

    /// Rewrite an aliased recipient to its forwarding addresses.
    pub async fn aliases(&self, rcpt: &str) -> Verdict {
        if !self.directory.config().aliases {
            return Verdict::Continue;
        }
        let Some(address) = address::normalize(rcpt) else {
            return Verdict::Continue;
        };

        let completion = self.directory.resolve_alias(&address, self.deadline()).await;
        if let Some(err) = completion.error() {
            warn!(%address, error = %err, "Could not resolve alias");
            return self.on_deferral();
        }

        if completion.value.is_empty() {
            Verdict::Continue
        } else {
            info!(%address, to = ?completion.value, "Rewriting aliased recipient");
            Verdict::Rewrite(completion.value)
        }
    }

    /// Accept recipients that exist in the directory and reject those that do not.
    pub async fn check_rcpt(&self, rcpt: &str) -> Verdict {
        if !self.directory.config().rcpt_to {
            return Verdict::Continue;
        }
        let Some(address) = address::normalize(rcpt) else {
            return Verdict::Continue;
        };

        match self
            .directory
            .verify_existence(&address, self.deadline())
            .await
            .existence()
        {
            Existence::Found => Verdict::Accept(Reply::new(Status::Ok, "2.1.5 Recipient ok")),
            Existence::Missing => {
                debug!(%address, "Unknown recipient");
                Verdict::Deny(Reply::new(
                    Status::MailboxUnavailable,
                    "5.1.1 Mailbox does not exist",
                ))
            }
            Existence::Deferred => self.on_deferral(),
        }
    }

    /// Reject senders the authenticated user may not use.
    ///
    /// Unauthenticated sessions are left to other policies.
    pub async fn check_authz(&self, auth_user: Option<&str>, mail_from: &str) -> Verdict {
        if !self.directory.config().authz {
            return Verdict::Continue;
        }
        let Some(user) = auth_user.filter(|user| !user.is_empty()) else {
            return Verdict::Continue;
        };
        let Some(address) = address::normalize(mail_from) else {
            return Verdict::Continue;
        };

        let completion = self
            .directory
            .check_authz(user, &address, self.deadline())
            .await;

        match completion.into_result() {
            Ok(true) => Verdict::Continue,
            Ok(false) => {
                info!(%user, %address, "Sender not authorized");
                Verdict::Deny(Reply::new(
                    Status::MailboxUnavailable,
                    format!("5.7.1 {user} is not authorized to send as <{address}>"),
                ))
            }
            Err(_) => Verdict::temporary_failure(),
        }
    }

    pub async fn authenticate(&self, user: &str, secret: &str) -> Verdict {
        if !self.directory.config().authn {
            return Verdict::Continue;
        }

        let completion = self
            .directory
            .authenticate(user, secret, self.deadline())
            .await;

        match completion.into_result() {
            Ok(true) => Verdict::Accept(Reply::new(
                Status::AuthSucceeded,
                "2.7.0 Authentication successful",
            )),
            Ok(false) => Verdict::Deny(Reply::new(
                Status::AuthFailed,
                "5.7.8 Authentication credentials invalid",
            )),
            Err(_) => Verdict::DenySoft(Reply::new(
                Status::AuthTemporaryFailure,
                "4.7.0 Temporary authentication failure",
            )),
        }
    }
}

//! Directory-backed resolution for mail servers.
//!
//! A pooled LDAP (or in-memory) client that answers the questions an MTA
//! asks during a transaction:
//!
//! - does a recipient exist ([`Directory::verify_existence`])
//! - where does an alias forward to ([`Directory::resolve_alias`])
//! - may an authenticated user send as an address ([`Directory::check_authz`])
//! - do a user's credentials bind ([`Directory::authenticate`])
//!
//! [`hooks::Hooks`] turns those answers into SMTP verdicts.

pub mod backend;
pub mod config;
mod connection;
mod error;
pub mod hooks;
mod pool;
pub mod resolve;
mod search;
mod template;

pub use self::{
    config::{DirectoryConfig, FailurePolicy, PoolConfig, SearchOverlay},
    connection::{DirectoryBackend, DirectoryConnection, DirectoryEntry, EntryStream, count_entries},
    error::{DirectoryError, EntryResolutionWarning, SearchFailure},
    pool::{BackendManager, DirectoryPool, PoolStats, PooledConnection},
    resolve::{Completion, Directory, Existence, Request, RequestState},
    search::{QueryKind, Scope, SearchConfigBuilder, SearchSpec, bind_dns, parse_filter},
    template::{Escaping, Placeholders, TemplateError, render},
};

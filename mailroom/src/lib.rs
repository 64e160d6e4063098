//! The `mailroom` command line front end.
//!
//! Loads a RON configuration, wires the configured directory backend into a
//! [`Directory`](mailroom_directory::Directory) and answers one question per
//! invocation: does a recipient exist, where does an alias forward to, may a
//! principal send as an address, does a password verify.

pub mod check;
pub mod config;
pub mod query;

pub use check::{CheckReport, check};
pub use config::{CONFIG_ENV, Mailroom};
pub use query::{Answer, Query, QueryError};

//! Shared building blocks for the mailroom crates.
//!
//! - [`address`]: normalisation of envelope addresses before they reach the directory
//! - [`config`]: discovery and loading of RON configuration files
//! - [`logging`]: `tracing` subscriber initialisation
//! - [`status`]: SMTP status codes carried by hook verdicts

pub mod address;
pub mod config;
pub mod logging;
pub mod status;

pub use tracing;

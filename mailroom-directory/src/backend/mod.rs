//! Concrete directory backends.

pub mod ldap;
pub mod memory;

pub use ldap::{LdapBackend, LdapConnection};
pub use memory::{MemoryBackend, MemoryConnection};

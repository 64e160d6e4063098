//! Seams between the resolvers and a concrete directory.

use ahash::AHashMap;
use async_trait::async_trait;

use crate::{error::SearchFailure, search::SearchSpec};

/// An entry returned by a search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub dn: String,
    pub attributes: AHashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: AHashMap::new(),
        }
    }

    #[must_use]
    pub fn with<I, V>(mut self, attribute: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.attributes
            .entry(attribute.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// All values of `attribute`; attribute names compare case-insensitively.
    #[must_use]
    pub fn values(&self, attribute: &str) -> &[String] {
        self.attributes
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
            .map(|(_, values)| values.as_slice())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.values(attribute).first().map(String::as_str)
    }
}

/// The entries of one search, produced incrementally.
#[async_trait]
pub trait EntryStream: Send {
    /// The next entry, or `None` once the search completed successfully.
    async fn next_entry(&mut self) -> Result<Option<DirectoryEntry>, SearchFailure>;
}

/// A bound session with the directory.
#[async_trait]
pub trait DirectoryConnection: Send + Sized + 'static {
    async fn search(&mut self, spec: &SearchSpec) -> Result<Box<dyn EntryStream>, SearchFailure>;

    /// A second handle multiplexed over the same session, if the connection
    /// supports concurrent operations.
    fn fork(&self) -> Option<Self>;

    fn is_closed(&mut self) -> bool;
}

/// Creates and checks connections for the pool.
#[async_trait]
pub trait DirectoryBackend: Send + Sync + 'static {
    type Connection: DirectoryConnection;

    async fn connect(&self) -> Result<Self::Connection, SearchFailure>;

    /// Liveness check run before an idle connection is handed out again.
    async fn check(&self, connection: &mut Self::Connection) -> Result<(), SearchFailure>;

    /// Bind as `dn` with `secret` on a dedicated connection.
    ///
    /// Returns `Ok(false)` when the directory rejects the credentials.
    async fn verify_credentials(&self, dn: &str, secret: &str) -> Result<bool, SearchFailure>;
}

/// Drain `stream`, returning the number of entries seen.
///
/// # Errors
///
/// Returns the first failure reported by the stream.
pub async fn count_entries(stream: &mut dyn EntryStream) -> Result<usize, SearchFailure> {
    let mut count = 0;
    while let Some(entry) = stream.next_entry().await? {
        tracing::trace!(dn = %entry.dn, "Matched entry");
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_case_insensitive() {
        let entry = DirectoryEntry::new("uid=user1,dc=example,dc=com")
            .with("mailForwardingAddress", ["a@example.com", "b@example.com"]);

        assert_eq!(entry.values("mailforwardingaddress").len(), 2);
        assert_eq!(entry.first("MAILFORWARDINGADDRESS"), Some("a@example.com"));
        assert!(entry.values("mail").is_empty());
        assert_eq!(entry.first("mail"), None);
    }

    #[test]
    fn test_with_appends_values() {
        let entry = DirectoryEntry::new("cn=staff,dc=example,dc=com")
            .with("member", ["uid=a,dc=example,dc=com"])
            .with("member", ["uid=b,dc=example,dc=com"]);

        assert_eq!(
            entry.values("member"),
            ["uid=a,dc=example,dc=com", "uid=b,dc=example,dc=com"]
        );
    }
}

//! In-process directory.
//!
//! Entries live in a shared vector behind an `RwLock`. It is intended for
//! development setups and tests; searches are linear scans.

mod dn;
mod filter;

use std::sync::Arc;

use async_trait::async_trait;
use ldap3_proto::proto::LdapFilter;
use parking_lot::RwLock;

use crate::{
    config::MemoryConfig,
    connection::{DirectoryBackend, DirectoryConnection, DirectoryEntry, EntryStream},
    error::SearchFailure,
    search::{DN_ATTRIBUTE, Scope, SearchSpec},
};

/// Attribute holding the plaintext secret checked by binds.
const PASSWORD_ATTRIBUTE: &str = "userPassword";

type Entries = Arc<RwLock<Vec<DirectoryEntry>>>;

#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    entries: Entries,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_config(config: &MemoryConfig) -> Self {
        let backend = Self::new();
        for entry in &config.entries {
            backend.insert(DirectoryEntry {
                dn: entry.dn.clone(),
                attributes: entry.attributes.clone(),
            });
        }
        backend
    }

    /// Add an entry, replacing any existing entry with the same DN.
    pub fn insert(&self, entry: DirectoryEntry) {
        let dn = dn::normalize(&entry.dn);
        let mut entries = self.entries.write();
        entries.retain(|existing| dn::normalize(&existing.dn) != dn);
        entries.push(entry);
    }

    /// Remove the entry at `dn`, returning it if present.
    pub fn remove(&self, dn: &str) -> Option<DirectoryEntry> {
        let dn = dn::normalize(dn);
        let mut entries = self.entries.write();
        let index = entries
            .iter()
            .position(|entry| dn::normalize(&entry.dn) == dn)?;
        Some(entries.remove(index))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DirectoryBackend for MemoryBackend {
    type Connection = MemoryConnection;

    async fn connect(&self) -> Result<MemoryConnection, SearchFailure> {
        Ok(MemoryConnection {
            entries: Arc::clone(&self.entries),
        })
    }

    async fn check(&self, _connection: &mut MemoryConnection) -> Result<(), SearchFailure> {
        Ok(())
    }

    async fn verify_credentials(&self, dn: &str, secret: &str) -> Result<bool, SearchFailure> {
        if secret.is_empty() {
            return Ok(false);
        }

        let dn = dn::normalize(dn);
        let entries = self.entries.read();
        Ok(entries
            .iter()
            .find(|entry| dn::normalize(&entry.dn) == dn)
            .is_some_and(|entry| {
                entry
                    .values(PASSWORD_ATTRIBUTE)
                    .iter()
                    .any(|password| password == secret)
            }))
    }
}

#[derive(Debug, Clone)]
pub struct MemoryConnection {
    entries: Entries,
}

#[async_trait]
impl DirectoryConnection for MemoryConnection {
    async fn search(&mut self, spec: &SearchSpec) -> Result<Box<dyn EntryStream>, SearchFailure> {
        let filter = filter::parse(&spec.filter)?;
        let matched = search(&self.entries.read(), spec, &filter)?;
        Ok(Box::new(MemoryStream {
            entries: matched.into_iter(),
        }))
    }

    fn fork(&self) -> Option<Self> {
        Some(self.clone())
    }

    fn is_closed(&mut self) -> bool {
        false
    }
}

fn search(
    entries: &[DirectoryEntry],
    spec: &SearchSpec,
    filter: &LdapFilter,
) -> Result<Vec<DirectoryEntry>, SearchFailure> {
    let base = dn::normalize(&spec.base);
    if base.is_empty() {
        return Err(SearchFailure::NoSuchObject(spec.base.clone()));
    }

    let mut base_exists = false;
    let mut matched = Vec::new();

    for entry in entries {
        let dn = dn::normalize(&entry.dn);
        let relation = dn::relation(&dn, &base);
        if relation.is_some() {
            base_exists = true;
        }

        let in_scope = match (spec.scope, relation) {
            (_, None) => false,
            (Scope::Base, Some(depth)) => depth == 0,
            (Scope::One, Some(depth)) => depth == 1,
            (Scope::Sub, Some(_)) => true,
        };

        if in_scope && filter::matches(filter, entry) {
            matched.push(project(entry, &spec.attributes));
        }
    }

    // A base with entries below it exists even without an entry of its own.
    let base_missing =
        spec.scope == Scope::Base && matched.is_empty() && !has_entry(entries, &base);
    if !base_exists || base_missing {
        return Err(SearchFailure::NoSuchObject(spec.base.clone()));
    }

    Ok(matched)
}

fn has_entry(entries: &[DirectoryEntry], dn: &str) -> bool {
    entries.iter().any(|entry| dn::normalize(&entry.dn) == dn)
}

/// Keep only the requested attributes.
fn project(entry: &DirectoryEntry, attributes: &[String]) -> DirectoryEntry {
    if attributes.iter().any(|attribute| attribute == "*") {
        return entry.clone();
    }

    DirectoryEntry {
        dn: entry.dn.clone(),
        attributes: entry
            .attributes
            .iter()
            .filter(|(name, _)| {
                attributes.iter().any(|attribute| {
                    attribute != DN_ATTRIBUTE && attribute.eq_ignore_ascii_case(name)
                })
            })
            .map(|(name, values)| (name.clone(), values.clone()))
            .collect(),
    }
}

struct MemoryStream {
    entries: std::vec::IntoIter<DirectoryEntry>,
}

#[async_trait]
impl EntryStream for MemoryStream {
    async fn next_entry(&mut self) -> Result<Option<DirectoryEntry>, SearchFailure> {
        Ok(self.entries.next())
    }
}

//! LDAP backend built on `ldap3`.

use std::collections::HashMap;

use async_trait::async_trait;
use ldap3::{
    Ldap, LdapConnAsync, LdapConnSettings, LdapError, SearchEntry, SearchStream, exop::WhoAmI,
};
use tracing::{debug, trace};

use crate::{
    config::LdapConfig,
    connection::{DirectoryBackend, DirectoryConnection, DirectoryEntry, EntryStream},
    error::SearchFailure,
    search::{Scope, SearchSpec},
};

const RC_NO_SUCH_OBJECT: u32 = 32;
const RC_INVALID_DN_SYNTAX: u32 = 34;
const RC_INVALID_CREDENTIALS: u32 = 49;
const RC_INSUFFICIENT_ACCESS: u32 = 50;

impl From<Scope> for ldap3::Scope {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::Base => Self::Base,
            Scope::One => Self::OneLevel,
            Scope::Sub => Self::Subtree,
        }
    }
}

#[derive(Debug, Clone)]
struct Bind {
    dn: String,
    password: String,
}

pub struct LdapBackend {
    address: String,
    settings: LdapConnSettings,
    bind: Option<Bind>,
}

impl LdapBackend {
    #[must_use]
    pub fn new(config: &LdapConfig) -> Self {
        let settings = LdapConnSettings::new()
            .set_conn_timeout(config.connect_timeout())
            .set_starttls(config.starttls)
            .set_no_tls_verify(config.allow_invalid_certs);

        Self {
            address: config.url.clone(),
            settings,
            bind: config.bind_dn.as_ref().map(|dn| Bind {
                dn: dn.clone(),
                password: config.bind_password.clone().unwrap_or_default(),
            }),
        }
    }

    async fn open(&self) -> Result<Ldap, SearchFailure> {
        let (conn, ldap) = LdapConnAsync::with_settings(self.settings.clone(), &self.address)
            .await
            .map_err(|err| transport(&err))?;

        ldap3::drive!(conn);

        Ok(ldap)
    }
}

impl std::fmt::Debug for LdapBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapBackend")
            .field("address", &self.address)
            .field("bind_dn", &self.bind.as_ref().map(|bind| bind.dn.as_str()))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DirectoryBackend for LdapBackend {
    type Connection = LdapConnection;

    async fn connect(&self) -> Result<LdapConnection, SearchFailure> {
        let mut ldap = self.open().await?;

        if let Some(bind) = &self.bind {
            ldap.simple_bind(&bind.dn, &bind.password)
                .await
                .and_then(ldap3::LdapResult::success)
                .map_err(|err| failure(err, &bind.dn))?;
        }

        debug!(address = %self.address, "Opened directory connection");
        Ok(LdapConnection { ldap })
    }

    async fn check(&self, connection: &mut LdapConnection) -> Result<(), SearchFailure> {
        connection
            .ldap
            .extended(WhoAmI)
            .await
            .map(|_| ())
            .map_err(|err| transport(&err))
    }

    async fn verify_credentials(&self, dn: &str, secret: &str) -> Result<bool, SearchFailure> {
        // An empty password would turn into an unauthenticated bind, which succeeds.
        if secret.is_empty() {
            return Ok(false);
        }

        let mut ldap = self.open().await?;
        let result = ldap
            .simple_bind(dn, secret)
            .await
            .map_err(|err| transport(&err))?;

        if let Err(err) = ldap.unbind().await {
            trace!(error = %err, "Failed to unbind credential check connection");
        }

        match result.rc {
            0 => Ok(true),
            RC_INVALID_CREDENTIALS | RC_INSUFFICIENT_ACCESS => Ok(false),
            _ => result.success().map(|_| false).map_err(|err| failure(err, dn)),
        }
    }
}

/// A pooled, bound LDAP session.
pub struct LdapConnection {
    ldap: Ldap,
}

#[async_trait]
impl DirectoryConnection for LdapConnection {
    async fn search(&mut self, spec: &SearchSpec) -> Result<Box<dyn EntryStream>, SearchFailure> {
        trace!(base = %spec.base, filter = %spec.filter, scope = %spec.scope, "LDAP search");

        let stream = self
            .ldap
            .streaming_search(
                &spec.base,
                spec.scope.into(),
                &spec.filter,
                spec.attributes.clone(),
            )
            .await
            .map_err(|err| search_failure(err, spec))?;

        Ok(Box::new(LdapEntryStream {
            stream,
            spec: spec.clone(),
            done: false,
        }))
    }

    fn fork(&self) -> Option<Self> {
        Some(Self {
            ldap: self.ldap.clone(),
        })
    }

    fn is_closed(&mut self) -> bool {
        self.ldap.is_closed()
    }
}

struct LdapEntryStream {
    stream: SearchStream<'static, String, Vec<String>>,
    spec: SearchSpec,
    done: bool,
}

#[async_trait]
impl EntryStream for LdapEntryStream {
    async fn next_entry(&mut self) -> Result<Option<DirectoryEntry>, SearchFailure> {
        if self.done {
            return Ok(None);
        }

        while let Some(entry) = self
            .stream
            .next()
            .await
            .map_err(|err| search_failure(err, &self.spec))?
        {
            if entry.is_ref() || entry.is_intermediate() {
                continue;
            }

            let SearchEntry { dn, attrs, .. } = SearchEntry::construct(entry);
            return Ok(Some(into_entry(dn, attrs)));
        }

        self.done = true;
        self.stream
            .finish()
            .await
            .success()
            .map(|_| None)
            .map_err(|err| search_failure(err, &self.spec))
    }
}

fn into_entry(dn: String, attrs: HashMap<String, Vec<String>>) -> DirectoryEntry {
    DirectoryEntry {
        dn,
        attributes: attrs.into_iter().collect(),
    }
}

fn search_failure(error: LdapError, spec: &SearchSpec) -> SearchFailure {
    match error {
        LdapError::FilterParsing => SearchFailure::InvalidFilter {
            filter: spec.filter.clone(),
            reason: "filter could not be parsed".to_string(),
        },
        other => failure(other, &spec.base),
    }
}

fn failure(error: LdapError, dn: &str) -> SearchFailure {
    match error {
        LdapError::LdapResult { result } => match result.rc {
            RC_NO_SUCH_OBJECT => SearchFailure::NoSuchObject(dn.to_string()),
            RC_INVALID_DN_SYNTAX => SearchFailure::InvalidDn(dn.to_string()),
            code => SearchFailure::Result {
                code,
                message: result.text,
            },
        },
        other => transport(&other),
    }
}

fn transport(error: &LdapError) -> SearchFailure {
    SearchFailure::Transport(error.to_string())
}

//! Derivation of concrete searches from configuration.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::{
    config::{DirectoryConfig, SearchOverlay},
    error::SearchFailure,
    template::{self, Escaping, Placeholders, TemplateError},
};

/// Attribute requested when only the DN of matching entries matters.
pub const DN_ATTRIBUTE: &str = "dn";

/// Sub-attribute read from entries reached through DN indirection.
pub const DEFAULT_SUBATTRIBUTE: &str = "mail";

/// Filter used for base searches against a known DN.
pub const ANY_OBJECT_FILTER: &str = "(objectclass=*)";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Scope {
    Base,
    #[serde(alias = "OneLevel")]
    One,
    #[default]
    #[serde(alias = "Subtree")]
    Sub,
}

impl Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Base => "base",
            Self::One => "one",
            Self::Sub => "sub",
        })
    }
}

/// The kind of question a search answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Existence,
    Alias,
    Authorization,
    Authentication,
}

impl QueryKind {
    pub const ALL: [Self; 4] = [
        Self::Existence,
        Self::Alias,
        Self::Authorization,
        Self::Authentication,
    ];

    #[must_use]
    pub const fn default_filter(self) -> &'static str {
        match self {
            Self::Existence => "(&(objectclass=*)(mail=%a))",
            Self::Alias => "(&(objectclass=*)(mail=%a)(mailForwardAddress=*))",
            Self::Authorization => "(&(objectclass=*)(uid=%u)(mailLocalAddress=%a))",
            Self::Authentication => "(&(objectclass=*)(uid=%u))",
        }
    }

    #[must_use]
    pub const fn default_attribute(self) -> &'static str {
        match self {
            Self::Alias => "mailForwardingAddress",
            Self::Existence | Self::Authorization | Self::Authentication => DN_ATTRIBUTE,
        }
    }

    /// Placeholders a template of this kind may refer to.
    #[must_use]
    pub const fn placeholders(self) -> &'static [char] {
        match self {
            Self::Existence | Self::Alias => &['a'],
            Self::Authorization => &['u', 'a'],
            Self::Authentication => &['u'],
        }
    }

    /// Name of the configuration section for this kind.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Existence => "rcpt_to",
            Self::Alias => "aliases",
            Self::Authorization => "authz",
            Self::Authentication => "authn",
        }
    }
}

impl Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A fully resolved search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSpec {
    pub base: String,
    pub filter: String,
    pub scope: Scope,
    pub attributes: Vec<String>,
}

impl SearchSpec {
    /// Base-scope search reading `attribute` from the entry at `dn`.
    #[must_use]
    pub fn entry(dn: &str, attribute: &str) -> Self {
        Self {
            base: dn.to_string(),
            filter: ANY_OBJECT_FILTER.to_string(),
            scope: Scope::Base,
            attributes: vec![attribute.to_string()],
        }
    }

    /// Check that the rendered filter parses.
    ///
    /// # Errors
    ///
    /// Returns [`SearchFailure::InvalidFilter`] if it does not.
    pub fn validate_filter(&self) -> Result<(), SearchFailure> {
        parse_filter(&self.filter).map(drop)
    }

    /// The attribute whose values the search is after.
    #[must_use]
    pub fn primary_attribute(&self) -> &str {
        self.attributes
            .first()
            .map_or(DN_ATTRIBUTE, String::as_str)
    }
}

/// Builds [`SearchSpec`]s from per-kind defaults, an operation overlay, and
/// the pool-level defaults.
#[derive(Debug, Clone, Copy)]
pub struct SearchConfigBuilder<'a> {
    basedn: Option<&'a str>,
    scope: Scope,
}

impl<'a> SearchConfigBuilder<'a> {
    #[must_use]
    pub fn new(config: &'a DirectoryConfig) -> Self {
        Self {
            basedn: config.basedn.as_deref(),
            scope: config.scope,
        }
    }

    /// Resolve the search for `kind`.
    ///
    /// Overlay values win over pool defaults, which win over the hardcoded
    /// fallbacks. A missing base DN is logged and the search is still
    /// produced with an empty base.
    ///
    /// Only the placeholders of `kind` are visible to the template.
    ///
    /// # Errors
    ///
    /// Fails if the filter template is malformed or refers to a placeholder
    /// that was not supplied or does not belong to `kind`.
    pub fn build(
        &self,
        kind: QueryKind,
        overlay: &SearchOverlay,
        placeholders: &Placeholders<'_>,
    ) -> Result<SearchSpec, TemplateError> {
        let filter_template = non_empty(overlay.searchfilter.as_deref())
            .unwrap_or_else(|| kind.default_filter());
        let placeholders = placeholders.only(kind.placeholders());
        let filter = template::render(filter_template, &placeholders, Escaping::Filter)?;

        let base = non_empty(overlay.basedn.as_deref())
            .or_else(|| non_empty(self.basedn))
            .unwrap_or_else(|| {
                error!(%kind, "No basedn configured, the search will fail");
                ""
            });

        let attribute = non_empty(overlay.attribute.as_deref())
            .unwrap_or_else(|| kind.default_attribute());

        Ok(SearchSpec {
            base: base.to_string(),
            filter,
            scope: overlay.scope.unwrap_or(self.scope),
            attributes: vec![attribute.to_string()],
        })
    }
}

/// Render the configured bind DN templates for authentication.
///
/// # Errors
///
/// Fails on the first template that does not render.
pub fn bind_dns(
    templates: &[String],
    placeholders: &Placeholders<'_>,
) -> Result<Vec<String>, TemplateError> {
    let placeholders = placeholders.only(QueryKind::Authentication.placeholders());
    templates
        .iter()
        .map(|dn| template::render(dn, &placeholders, Escaping::Dn))
        .collect()
}

/// Parse `filter` with the same parser that encodes it for the wire.
///
/// # Errors
///
/// Returns [`SearchFailure::InvalidFilter`] if the filter is malformed.
pub fn parse_filter(filter: &str) -> Result<ldap3::asn1::Tag, SearchFailure> {
    ldap3::parse_filter(filter).map_err(|()| SearchFailure::InvalidFilter {
        filter: filter.to_string(),
        reason: "filter could not be parsed".to_string(),
    })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn config(basedn: Option<&str>) -> DirectoryConfig {
        DirectoryConfig {
            basedn: basedn.map(str::to_string),
            ..DirectoryConfig::default()
        }
    }

    #[test]
    fn test_alias_defaults() {
        let config = config(Some("dc=example,dc=com"));
        let spec = SearchConfigBuilder::new(&config)
            .build(
                QueryKind::Alias,
                &SearchOverlay::default(),
                &Placeholders::new().address("user1@example.com"),
            )
            .expect("default template renders");

        assert_eq!(
            spec,
            SearchSpec {
                base: "dc=example,dc=com".to_string(),
                filter: "(&(objectclass=*)(mail=user1@example.com)(mailForwardAddress=*))"
                    .to_string(),
                scope: Scope::Sub,
                attributes: vec!["mailForwardingAddress".to_string()],
            }
        );
    }

    #[test]
    fn test_existence_requests_only_dn() {
        let config = config(Some("dc=example,dc=com"));
        let spec = SearchConfigBuilder::new(&config)
            .build(
                QueryKind::Existence,
                &SearchOverlay::default(),
                &Placeholders::new().address("user1@example.com"),
            )
            .expect("default template renders");

        assert_eq!(spec.filter, "(&(objectclass=*)(mail=user1@example.com))");
        assert_eq!(spec.attributes, vec!["dn".to_string()]);
        assert_eq!(spec.primary_attribute(), "dn");
    }

    #[test]
    fn test_overlay_takes_precedence() {
        let mut config = config(Some("dc=example,dc=com"));
        config.scope = Scope::One;

        let overlay = SearchOverlay {
            basedn: Some("ou=aliases,dc=example,dc=com".to_string()),
            searchfilter: Some("(&(objectclass=mailGroup)(cn=%a))".to_string()),
            scope: Some(Scope::Base),
            attribute: Some("member".to_string()),
            ..SearchOverlay::default()
        };

        let spec = SearchConfigBuilder::new(&config)
            .build(
                QueryKind::Alias,
                &overlay,
                &Placeholders::new().address("staff@example.com"),
            )
            .expect("overlay template renders");

        assert_eq!(spec.base, "ou=aliases,dc=example,dc=com");
        assert_eq!(spec.filter, "(&(objectclass=mailGroup)(cn=staff@example.com))");
        assert_eq!(spec.scope, Scope::Base);
        assert_eq!(spec.attributes, vec!["member".to_string()]);
    }

    #[test]
    fn test_pool_scope_used_without_overlay() {
        let mut config = config(Some("dc=example,dc=com"));
        config.scope = Scope::One;

        let spec = SearchConfigBuilder::new(&config)
            .build(
                QueryKind::Existence,
                &SearchOverlay::default(),
                &Placeholders::new().address("a@example.com"),
            )
            .expect("default template renders");

        assert_eq!(spec.scope, Scope::One);
    }

    #[test]
    fn test_missing_basedn_still_builds() {
        let config = config(None);
        let spec = SearchConfigBuilder::new(&config)
            .build(
                QueryKind::Existence,
                &SearchOverlay::default(),
                &Placeholders::new().address("a@example.com"),
            )
            .expect("default template renders");

        assert_eq!(spec.base, "");
    }

    #[test]
    fn test_authz_filter_uses_both_placeholders() {
        let config = config(Some("dc=example,dc=com"));
        let spec = SearchConfigBuilder::new(&config)
            .build(
                QueryKind::Authorization,
                &SearchOverlay::default(),
                &Placeholders::new().user("alice").address("alice@example.com"),
            )
            .expect("default template renders");

        assert_eq!(
            spec.filter,
            "(&(objectclass=*)(uid=alice)(mailLocalAddress=alice@example.com))"
        );
    }

    #[test]
    fn test_malformed_template() {
        let config = config(Some("dc=example,dc=com"));
        let overlay = SearchOverlay {
            searchfilter: Some("(mail=%a)(uid=%u)".to_string()),
            ..SearchOverlay::default()
        };

        let result = SearchConfigBuilder::new(&config).build(
            QueryKind::Existence,
            &overlay,
            &Placeholders::new().address("a@example.com"),
        );

        assert!(matches!(
            result,
            Err(TemplateError::UnknownPlaceholder { placeholder: 'u', .. })
        ));
    }

    #[test]
    fn test_placeholders_are_limited_to_the_kind() {
        let config = config(Some("dc=example,dc=com"));
        let overlay = SearchOverlay {
            searchfilter: Some("(&(uid=%u)(mail=%a))".to_string()),
            ..SearchOverlay::default()
        };

        let result = SearchConfigBuilder::new(&config).build(
            QueryKind::Existence,
            &overlay,
            &Placeholders::new().user("alice").address("alice@example.com"),
        );

        assert!(matches!(
            result,
            Err(TemplateError::UnknownPlaceholder { placeholder: 'u', .. })
        ));
    }

    #[test]
    fn test_bind_dns_only_see_the_user() {
        let placeholders = Placeholders::new().user("alice").address("alice@example.com");

        assert_eq!(
            bind_dns(&["uid=%u,ou=people,dc=example,dc=com".to_string()], &placeholders),
            Ok(vec!["uid=alice,ou=people,dc=example,dc=com".to_string()])
        );
        assert!(matches!(
            bind_dns(&["mail=%a,dc=example,dc=com".to_string()], &placeholders),
            Err(TemplateError::UnknownPlaceholder { placeholder: 'a', .. })
        ));
    }

    #[test]
    fn test_validate_filter() {
        let mut spec = SearchSpec::entry("dc=example,dc=com", "mail");
        spec.filter =
            "(memberOf:1.2.840.113556.1.4.1941:=cn=senders,dc=example,dc=com)".to_string();
        assert_eq!(spec.validate_filter(), Ok(()));

        spec.filter = "(&(uid=alice)".to_string();
        assert!(matches!(
            spec.validate_filter(),
            Err(SearchFailure::InvalidFilter { ref filter, .. }) if filter == "(&(uid=alice)"
        ));
    }

    #[test]
    fn test_entry_search() {
        let spec = SearchSpec::entry("uid=user2,dc=example,dc=com", "mail");

        assert_eq!(spec.scope, Scope::Base);
        assert_eq!(spec.filter, ANY_OBJECT_FILTER);
        assert_eq!(spec.primary_attribute(), "mail");
    }
}

//! Search templates with named placeholders.
//!
//! A template is a filter (or DN) string where `%a` stands for the address
//! under query, `%u` for the user or principal, and `%%` for a literal percent
//! sign. Values are escaped for the context they land in before substitution.

use std::borrow::Cow;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("Placeholder %{placeholder} is not available in template {template:?}")]
    UnknownPlaceholder { placeholder: char, template: String },

    #[error("Template {0:?} ends with a dangling '%'")]
    DanglingPercent(String),
}

/// Escaping rules applied to substituted values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escaping {
    /// RFC 4515 search filter value.
    Filter,
    /// RFC 4514 attribute value inside a DN.
    Dn,
}

/// The values a template may refer to.
#[derive(Debug, Clone, Default)]
pub struct Placeholders<'a> {
    values: Vec<(char, &'a str)>,
}

impl<'a> Placeholders<'a> {
    #[must_use]
    pub const fn new() -> Self {
        Self { values: Vec::new() }
    }

    /// Binds `%a`.
    #[must_use]
    pub fn address(self, address: &'a str) -> Self {
        self.with('a', address)
    }

    /// Binds `%u`.
    #[must_use]
    pub fn user(self, user: &'a str) -> Self {
        self.with('u', user)
    }

    #[must_use]
    pub fn with(mut self, key: char, value: &'a str) -> Self {
        self.values.retain(|(existing, _)| *existing != key);
        self.values.push((key, value));
        self
    }

    /// Keeps only the bindings named in `keys`.
    #[must_use]
    pub fn only(&self, keys: &[char]) -> Self {
        Self {
            values: self
                .values
                .iter()
                .filter(|(key, _)| keys.contains(key))
                .copied()
                .collect(),
        }
    }

    fn get(&self, key: char) -> Option<&'a str> {
        self.values
            .iter()
            .find_map(|(existing, value)| (*existing == key).then_some(*value))
    }
}

/// Substitute every placeholder in `template`.
///
/// # Errors
///
/// Fails if the template names a placeholder without a bound value, or ends
/// in a lone `%`.
pub fn render(
    template: &str,
    placeholders: &Placeholders<'_>,
    escaping: Escaping,
) -> Result<String, TemplateError> {
    let mut rendered = String::with_capacity(template.len());
    let mut chars = template.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            rendered.push(c);
            continue;
        }

        match chars.next() {
            Some('%') => rendered.push('%'),
            Some(key) => {
                let value =
                    placeholders
                        .get(key)
                        .ok_or_else(|| TemplateError::UnknownPlaceholder {
                            placeholder: key,
                            template: template.to_string(),
                        })?;
                rendered.push_str(&escape(value, escaping));
            }
            None => return Err(TemplateError::DanglingPercent(template.to_string())),
        }
    }

    Ok(rendered)
}

fn escape(value: &str, escaping: Escaping) -> Cow<'_, str> {
    match escaping {
        Escaping::Filter => ldap3::ldap_escape(value),
        Escaping::Dn => ldap3::dn_escape(value),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_alias_filter_substitution() {
        let placeholders = Placeholders::new().address("user1@example.com");
        let rendered = render(
            "(&(objectclass=*)(mail=%a)(mailForwardAddress=*))",
            &placeholders,
            Escaping::Filter,
        );

        assert_eq!(
            rendered,
            Ok("(&(objectclass=*)(mail=user1@example.com)(mailForwardAddress=*))".to_string())
        );
    }

    #[test]
    fn test_every_occurrence_is_substituted() {
        let placeholders = Placeholders::new()
            .address("a@example.com")
            .user("alice");
        let rendered = render(
            "(|(mail=%a)(mailAlternateAddress=%a)(uid=%u))",
            &placeholders,
            Escaping::Filter,
        );

        assert_eq!(
            rendered,
            Ok("(|(mail=a@example.com)(mailAlternateAddress=a@example.com)(uid=alice))".to_string())
        );
    }

    #[test]
    fn test_literal_percent() {
        let placeholders = Placeholders::new().user("bob");
        let rendered = render("(description=100%%)(uid=%u)", &placeholders, Escaping::Filter);

        assert_eq!(rendered, Ok("(description=100%)(uid=bob)".to_string()));
    }

    #[test]
    fn test_filter_values_are_escaped() {
        let placeholders = Placeholders::new().address("*)(uid=*");
        let rendered = render("(mail=%a)", &placeholders, Escaping::Filter);

        assert_eq!(rendered, Ok("(mail=\\2a\\29\\28uid=\\2a)".to_string()));
    }

    #[test]
    fn test_dn_values_are_escaped() {
        let placeholders = Placeholders::new().user("a,ou=admins");
        let rendered = render("uid=%u,ou=people,dc=example,dc=com", &placeholders, Escaping::Dn)
            .expect("template renders");

        assert!(!rendered.contains("a,ou=admins"));
        assert!(rendered.contains('\\'));
        assert!(rendered.ends_with(",ou=people,dc=example,dc=com"));
    }

    #[test]
    fn test_unknown_placeholder() {
        let placeholders = Placeholders::new().address("a@example.com");
        let rendered = render("(uid=%u)", &placeholders, Escaping::Filter);

        assert_eq!(
            rendered,
            Err(TemplateError::UnknownPlaceholder {
                placeholder: 'u',
                template: "(uid=%u)".to_string(),
            })
        );
    }

    #[test]
    fn test_dangling_percent() {
        let placeholders = Placeholders::new().address("a@example.com");
        let rendered = render("(mail=%a)%", &placeholders, Escaping::Filter);

        assert_eq!(
            rendered,
            Err(TemplateError::DanglingPercent("(mail=%a)%".to_string()))
        );
    }

    #[test]
    fn test_only_drops_other_bindings() {
        let placeholders = Placeholders::new()
            .address("a@example.com")
            .user("alice")
            .only(&['u']);

        assert_eq!(
            render("(uid=%u)", &placeholders, Escaping::Filter),
            Ok("(uid=alice)".to_string())
        );
        assert!(matches!(
            render("(mail=%a)", &placeholders, Escaping::Filter),
            Err(TemplateError::UnknownPlaceholder { placeholder: 'a', .. })
        ));
    }

    #[test]
    fn test_later_binding_wins() {
        let placeholders = Placeholders::new()
            .address("first@example.com")
            .address("second@example.com");

        assert_eq!(
            render("%a", &placeholders, Escaping::Filter),
            Ok("second@example.com".to_string())
        );
    }
}

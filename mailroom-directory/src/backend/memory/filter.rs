//! Search filters for the in-memory backend.
//!
//! Filter strings go through the same `ldap3` parser that encodes them for a
//! real directory, so both backends accept exactly the same filters. The
//! encoded form is decoded into an [`LdapFilter`] for matching.
//!
//! Attribute names and values compare case-insensitively, which matches the
//! `caseIgnoreMatch` rules of the attributes mail setups usually query.
//! Extensible matches compare by equality whatever the matching rule.

use ldap3::asn1::{Boolean, ExplicitTag, OctetString, Sequence, Tag, TagClass};
use ldap3_proto::proto::{LdapFilter, LdapMatchingRuleAssertion, LdapSubstringFilter};

use super::dn;
use crate::{connection::DirectoryEntry, error::SearchFailure, search};

const AND: u64 = 0;
const OR: u64 = 1;
const NOT: u64 = 2;
const EQUALITY: u64 = 3;
const SUBSTRINGS: u64 = 4;
const GREATER_OR_EQUAL: u64 = 5;
const LESS_OR_EQUAL: u64 = 6;
const PRESENT: u64 = 7;
const APPROX: u64 = 8;
const EXTENSIBLE: u64 = 9;

const SUB_INITIAL: u64 = 0;
const SUB_ANY: u64 = 1;
const SUB_FINAL: u64 = 2;

const RULE_ID: u64 = 1;
const RULE_TYPE: u64 = 2;
const RULE_VALUE: u64 = 3;
const RULE_DN: u64 = 4;

/// Parse a filter string. A bare item without surrounding parentheses is accepted.
///
/// # Errors
///
/// Returns [`SearchFailure::InvalidFilter`] for malformed input, or for
/// values that are not UTF-8 once unescaped.
pub fn parse(input: &str) -> Result<LdapFilter, SearchFailure> {
    let tag = search::parse_filter(input)?;
    decode(tag).map_err(|reason| SearchFailure::InvalidFilter {
        filter: input.to_string(),
        reason: reason.to_string(),
    })
}

fn decode(tag: Tag) -> Result<LdapFilter, &'static str> {
    match tag {
        Tag::Sequence(Sequence {
            class: TagClass::Context,
            id: AND,
            inner,
        }) => decode_all(inner).map(LdapFilter::And),
        Tag::Sequence(Sequence {
            class: TagClass::Context,
            id: OR,
            inner,
        }) => decode_all(inner).map(LdapFilter::Or),
        Tag::ExplicitTag(ExplicitTag {
            class: TagClass::Context,
            id: NOT,
            inner,
        }) => Ok(LdapFilter::Not(Box::new(decode(*inner)?))),
        Tag::OctetString(OctetString {
            class: TagClass::Context,
            id: PRESENT,
            inner,
        }) => text(inner).map(LdapFilter::Present),
        Tag::Sequence(Sequence {
            class: TagClass::Context,
            id: SUBSTRINGS,
            inner,
        }) => substrings(inner),
        Tag::Sequence(Sequence {
            class: TagClass::Context,
            id: EXTENSIBLE,
            inner,
        }) => extensible(inner),
        Tag::Sequence(Sequence {
            class: TagClass::Context,
            id,
            inner,
        }) => {
            let (attribute, value) = assertion(inner)?;
            match id {
                EQUALITY => Ok(LdapFilter::Equality(attribute, value)),
                GREATER_OR_EQUAL => Ok(LdapFilter::GreaterOrEqual(attribute, value)),
                LESS_OR_EQUAL => Ok(LdapFilter::LessOrEqual(attribute, value)),
                APPROX => Ok(LdapFilter::Approx(attribute, value)),
                _ => Err("unknown filter choice"),
            }
        }
        _ => Err("unknown filter choice"),
    }
}

fn decode_all(tags: Vec<Tag>) -> Result<Vec<LdapFilter>, &'static str> {
    tags.into_iter().map(decode).collect()
}

fn text(bytes: Vec<u8>) -> Result<String, &'static str> {
    String::from_utf8(bytes).map_err(|_| "filter value is not UTF-8")
}

fn octets(tag: Tag) -> Result<(u64, String), &'static str> {
    match tag {
        Tag::OctetString(OctetString { id, inner, .. }) => Ok((id, text(inner)?)),
        _ => Err("expected an octet string"),
    }
}

fn assertion(inner: Vec<Tag>) -> Result<(String, String), &'static str> {
    let mut parts = inner.into_iter();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(attribute), Some(value), None) => Ok((octets(attribute)?.1, octets(value)?.1)),
        _ => Err("malformed attribute value assertion"),
    }
}

fn substrings(inner: Vec<Tag>) -> Result<LdapFilter, &'static str> {
    let mut parts = inner.into_iter();
    let (Some(attribute), Some(Tag::Sequence(Sequence { inner: pieces, .. })), None) =
        (parts.next(), parts.next(), parts.next())
    else {
        return Err("malformed substring filter");
    };

    let mut filter = LdapSubstringFilter::default();
    for piece in pieces {
        match octets(piece)? {
            (SUB_INITIAL, value) => filter.initial = Some(value),
            (SUB_ANY, value) => filter.any.push(value),
            (SUB_FINAL, value) => filter.final_ = Some(value),
            _ => return Err("unknown substring choice"),
        }
    }

    Ok(LdapFilter::Substring(octets(attribute)?.1, filter))
}

fn extensible(inner: Vec<Tag>) -> Result<LdapFilter, &'static str> {
    let mut assertion = LdapMatchingRuleAssertion::default();

    for part in inner {
        match part {
            Tag::Boolean(Boolean { id: RULE_DN, inner, .. }) => assertion.dn_attributes = inner,
            part => match octets(part)? {
                (RULE_ID, rule) => assertion.matching_rule = Some(rule),
                (RULE_TYPE, attribute) => assertion.type_ = Some(attribute),
                (RULE_VALUE, value) => assertion.match_value = value,
                _ => return Err("unknown extensible match element"),
            },
        }
    }

    Ok(LdapFilter::Extensible(assertion))
}

/// Whether `entry` satisfies `filter`.
#[must_use]
pub fn matches(filter: &LdapFilter, entry: &DirectoryEntry) -> bool {
    match filter {
        LdapFilter::And(filters) => filters.iter().all(|filter| matches(filter, entry)),
        LdapFilter::Or(filters) => filters.iter().any(|filter| matches(filter, entry)),
        LdapFilter::Not(filter) => !matches(filter, entry),
        LdapFilter::Present(attribute) => {
            attribute.eq_ignore_ascii_case("objectclass") || !entry.values(attribute).is_empty()
        }
        LdapFilter::Equality(attribute, value) | LdapFilter::Approx(attribute, value) => {
            any_value(entry, attribute, |candidate| candidate == value.to_lowercase())
        }
        LdapFilter::GreaterOrEqual(attribute, value) => {
            any_value(entry, attribute, |candidate| candidate >= value.to_lowercase())
        }
        LdapFilter::LessOrEqual(attribute, value) => {
            any_value(entry, attribute, |candidate| candidate <= value.to_lowercase())
        }
        LdapFilter::Substring(attribute, substring) => {
            any_value(entry, attribute, |candidate| {
                substring_matches(&candidate, substring)
            })
        }
        LdapFilter::Extensible(assertion) => extensible_matches(assertion, entry),
    }
}

fn any_value(entry: &DirectoryEntry, attribute: &str, test: impl Fn(String) -> bool) -> bool {
    entry
        .values(attribute)
        .iter()
        .any(|candidate| test(candidate.to_lowercase()))
}

fn extensible_matches(assertion: &LdapMatchingRuleAssertion, entry: &DirectoryEntry) -> bool {
    // Without an attribute type the rule would apply to every attribute.
    let Some(attribute) = assertion.type_.as_deref() else {
        return false;
    };
    let value = assertion.match_value.to_lowercase();

    any_value(entry, attribute, |candidate| candidate == value)
        || (assertion.dn_attributes
            && dn::rdn_values(&entry.dn, attribute).any(|rdn| rdn.to_lowercase() == value))
}

fn substring_matches(value: &str, filter: &LdapSubstringFilter) -> bool {
    let mut rest = value;

    if let Some(initial) = &filter.initial {
        match rest.strip_prefix(initial.to_lowercase().as_str()) {
            Some(remaining) => rest = remaining,
            None => return false,
        }
    }

    for part in &filter.any {
        let part = part.to_lowercase();
        match rest.find(&part) {
            Some(index) => rest = &rest[index + part.len()..],
            None => return false,
        }
    }

    filter
        .final_
        .as_ref()
        .is_none_or(|last| rest.ends_with(&last.to_lowercase()))
}

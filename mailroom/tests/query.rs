//! End-to-end lookups against a memory directory loaded from a config file.
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::{io::Write, time::Duration};

use mailroom::{Answer, Mailroom, Query, QueryError, check, query};
use mailroom_directory::{
    Directory, DirectoryError, backend::MemoryBackend, config::BackendConfig,
};
use pretty_assertions::assert_eq;

const CONFIG: &str = r#"Mailroom (
    directory: (
        backend: Memory((
            entries: [
                (
                    dn: "uid=alice,ou=people,dc=example,dc=com",
                    attributes: {
                        "uid": ["alice"],
                        "mail": ["alice@example.com"],
                        "mailLocalAddress": ["alice@example.com", "postmaster@example.com"],
                        "userPassword": ["wonderland"],
                    },
                ),
                (
                    dn: "uid=bob,ou=people,dc=example,dc=com",
                    attributes: {
                        "uid": ["bob"],
                        "mail": ["bob@example.com"],
                        "userPassword": ["builder"],
                    },
                ),
                (
                    dn: "cn=staff,ou=aliases,dc=example,dc=com",
                    attributes: {
                        "mail": ["staff@example.com"],
                        "mailForwardAddress": ["yes"],
                        "member": [
                            "uid=alice,ou=people,dc=example,dc=com",
                            "uid=bob,ou=people,dc=example,dc=com",
                        ],
                    },
                ),
            ],
        )),
        basedn: Some("dc=example,dc=com"),
        searches: (
            aliases: (attribute: Some("member"), attribute_is_dn: true),
        ),
    ),
)"#;

fn load() -> Mailroom {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();
    Mailroom::load(file.path()).expect("config parses")
}

fn directory() -> Directory<MemoryBackend> {
    let config = load().directory;
    let BackendConfig::Memory(memory) = &config.backend else {
        panic!("expected a memory backend");
    };
    Directory::connect(MemoryBackend::from_config(memory), config.clone()).expect("pool builds")
}

async fn ask(query: Query) -> Result<Answer, QueryError> {
    query::run(&directory(), &query, Duration::from_secs(5)).await
}

#[tokio::test]
async fn test_rcpt() {
    let found = ask(Query::Rcpt {
        address: "<alice@example.com>".to_string(),
    })
    .await
    .unwrap();
    assert_eq!(found, Answer::Exists(true));

    let missing = ask(Query::Rcpt {
        address: "carol@example.com".to_string(),
    })
    .await
    .unwrap();
    assert_eq!(missing, Answer::Exists(false));
    assert!(!missing.is_positive());
}

#[tokio::test]
async fn test_alias_through_member_dns() {
    let answer = ask(Query::Alias {
        address: "staff@example.com".to_string(),
    })
    .await
    .unwrap();

    assert_eq!(
        answer,
        Answer::Aliases(vec![
            "alice@example.com".to_string(),
            "bob@example.com".to_string()
        ])
    );
}

#[tokio::test]
async fn test_authz() {
    let allowed = ask(Query::Authz {
        principal: "alice".to_string(),
        address: "postmaster@example.com".to_string(),
    })
    .await
    .unwrap();
    assert_eq!(allowed, Answer::Authorized(true));

    let denied = ask(Query::Authz {
        principal: "bob".to_string(),
        address: "postmaster@example.com".to_string(),
    })
    .await
    .unwrap();
    assert_eq!(denied, Answer::Authorized(false));
}

#[tokio::test]
async fn test_authn() {
    let accepted = ask(Query::Authn {
        user: "bob".to_string(),
        secret: "builder".to_string(),
    })
    .await
    .unwrap();
    assert_eq!(accepted, Answer::Authenticated(true));

    let rejected = ask(Query::Authn {
        user: "bob".to_string(),
        secret: "wonderland".to_string(),
    })
    .await
    .unwrap();
    assert_eq!(rejected, Answer::Authenticated(false));
}

#[tokio::test]
async fn test_invalid_address_never_reaches_directory() {
    let err = ask(Query::Rcpt {
        address: "a@example.com, b@example.com".to_string(),
    })
    .await
    .unwrap_err();

    assert!(matches!(err, QueryError::InvalidAddress(_)));
}

#[tokio::test]
async fn test_closed_directory_is_an_error() {
    let directory = directory();
    directory.close().unwrap();

    let err = query::run(
        &directory,
        &Query::Rcpt {
            address: "alice@example.com".to_string(),
        },
        Duration::from_secs(5),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        QueryError::Directory(DirectoryError::PoolUnavailable(_))
    ));
}

#[test]
fn test_sample_config_checks_clean() {
    let report = check(&load().directory);

    assert!(report.is_ok(), "{report}");
}

//! Offline validation of a directory configuration.
//!
//! Every search template is rendered with sample values and every resulting
//! filter is parsed, so mistakes surface before the first real lookup does.
//! Each operation only sees its own placeholders, exactly as at lookup time.

use std::fmt;

use mailroom_directory::{
    DirectoryConfig, Placeholders, QueryKind, SearchConfigBuilder, SearchSpec, bind_dns,
};

const SAMPLE_ADDRESS: &str = "postmaster@example.com";
const SAMPLE_USER: &str = "postmaster";

#[derive(Debug, Default)]
pub struct CheckReport {
    /// The search each operation would issue for the sample values
    pub searches: Vec<(QueryKind, SearchSpec)>,
    /// Rendered authentication DN templates
    pub bind_dns: Vec<String>,
    pub problems: Vec<String>,
}

impl CheckReport {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (kind, spec) in &self.searches {
            writeln!(
                f,
                "{kind}: base={:?} scope={} filter={} attributes={}",
                spec.base,
                spec.scope,
                spec.filter,
                spec.attributes.join(",")
            )?;
        }
        for dn in &self.bind_dns {
            writeln!(f, "authn: bind as {dn}")?;
        }
        for problem in &self.problems {
            writeln!(f, "problem: {problem}")?;
        }
        Ok(())
    }
}

/// Render and parse every search `config` describes.
#[must_use]
pub fn check(config: &DirectoryConfig) -> CheckReport {
    let mut report = CheckReport::default();
    let placeholders = Placeholders::new()
        .address(SAMPLE_ADDRESS)
        .user(SAMPLE_USER);

    if config.pool.max_connections == 0 {
        report
            .problems
            .push("pool.max_connections must be at least 1".to_string());
    }

    let builder = SearchConfigBuilder::new(config);
    for kind in QueryKind::ALL {
        match builder.build(kind, config.searches.overlay(kind), &placeholders) {
            Ok(spec) => {
                if spec.base.is_empty() {
                    report.problems.push(format!("{kind}: no basedn configured"));
                }
                if let Err(err) = spec.validate_filter() {
                    report.problems.push(format!("{kind}: {err}"));
                }
                report.searches.push((kind, spec));
            }
            Err(err) => report.problems.push(format!("{kind}: {err}")),
        }
    }

    for template in &config.searches.authn.dn {
        match bind_dns(std::slice::from_ref(template), &placeholders) {
            Ok(dns) => report.bind_dns.extend(dns),
            Err(err) => report.problems.push(format!("authn: {err}")),
        }
    }

    report
}

//! Alias expansion, optionally through DN indirection.

use futures_util::future::join_all;
use tracing::{debug, warn};

use super::request::{Request, RequestState};
use crate::{
    connection::DirectoryConnection,
    error::{EntryResolutionWarning, SearchFailure},
    search::SearchSpec,
};

/// Expand the address in `spec` into forwarding addresses.
///
/// All values of the primary attribute are collected across all entries, in
/// order. With `indirection` set, each value is taken as a DN whose
/// `indirection` attribute holds the address.
///
/// # Errors
///
/// Returns the primary search failure, or the first hard failure of a
/// sub-search in DN order.
pub async fn resolve_alias<C: DirectoryConnection>(
    connection: &mut C,
    spec: &SearchSpec,
    indirection: Option<&str>,
    request: &mut Request,
) -> Result<Vec<String>, SearchFailure> {
    let attribute = spec.primary_attribute();
    let mut raw = Vec::new();

    let mut stream = connection.search(spec).await?;
    while let Some(entry) = stream.next_entry().await? {
        raw.extend(entry.values(attribute).iter().cloned());
    }
    drop(stream);

    debug!(filter = %spec.filter, values = raw.len(), "Alias lookup");

    match indirection {
        Some(subattribute) if !raw.is_empty() => {
            request.enter(RequestState::SubSearching);
            resolve_dns(connection, &raw, subattribute).await
        }
        _ => Ok(raw),
    }
}

/// Look up `attribute` on every DN, keeping DN order.
async fn resolve_dns<C: DirectoryConnection>(
    connection: &mut C,
    dns: &[String],
    attribute: &str,
) -> Result<Vec<String>, SearchFailure> {
    let specs: Vec<SearchSpec> = dns
        .iter()
        .map(|dn| SearchSpec::entry(dn, attribute))
        .collect();

    let forks: Option<Vec<C>> = specs.iter().map(|_| connection.fork()).collect();
    let outcomes = if let Some(mut forks) = forks {
        join_all(
            forks
                .iter_mut()
                .zip(&specs)
                .map(|(fork, spec)| first_value(fork, spec)),
        )
        .await
    } else {
        let mut outcomes = Vec::with_capacity(specs.len());
        for spec in &specs {
            outcomes.push(first_value(connection, spec).await);
        }
        outcomes
    };

    let mut addresses = Vec::with_capacity(outcomes.len());
    for (dn, outcome) in dns.iter().zip(outcomes) {
        match outcome {
            Ok(Some(address)) => addresses.push(address),
            Ok(None) => warn!(
                "{}",
                EntryResolutionWarning::new(dn, format!("entry has no {attribute} value"))
            ),
            Err(err) if err.is_missing_entry() => {
                warn!("{}", EntryResolutionWarning::new(dn, err.to_string()));
            }
            Err(err) => return Err(err),
        }
    }

    Ok(addresses)
}

/// First value of the requested attribute at the base of `spec`.
async fn first_value<C: DirectoryConnection>(
    connection: &mut C,
    spec: &SearchSpec,
) -> Result<Option<String>, SearchFailure> {
    let mut stream = connection.search(spec).await?;
    let mut value = None;

    while let Some(entry) = stream.next_entry().await? {
        if value.is_none() {
            value = entry
                .first(spec.primary_attribute())
                .map(str::to_string);
        }
    }

    Ok(value)
}

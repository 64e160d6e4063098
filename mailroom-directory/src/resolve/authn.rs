//! Password verification by binding as the user.

use tracing::debug;

use crate::{
    connection::{DirectoryBackend, DirectoryConnection},
    error::{DirectoryError, SearchFailure},
    pool::DirectoryPool,
    search::SearchSpec,
};

/// DNs of the entries matching the user lookup in `spec`.
///
/// # Errors
///
/// Returns the search failure.
pub async fn candidate_dns<C: DirectoryConnection>(
    connection: &mut C,
    spec: &SearchSpec,
) -> Result<Vec<String>, SearchFailure> {
    let mut stream = connection.search(spec).await?;
    let mut dns = Vec::new();
    while let Some(entry) = stream.next_entry().await? {
        dns.push(entry.dn);
    }
    Ok(dns)
}

/// Try `secret` against each DN in turn, stopping at the first successful bind.
///
/// # Errors
///
/// A bind that could not be attempted at all fails the whole check with
/// [`DirectoryError::Connection`].
pub async fn verify_any<B: DirectoryBackend>(
    pool: &DirectoryPool<B>,
    dns: &[String],
    secret: &str,
) -> Result<bool, DirectoryError> {
    for dn in dns {
        match pool.verify_credentials(dn, secret).await {
            Ok(true) => {
                debug!(%dn, "Bind succeeded");
                return Ok(true);
            }
            Ok(false) => debug!(%dn, "Bind rejected"),
            Err(err) if err.is_missing_entry() => debug!(%dn, error = %err, "Bind DN missing"),
            Err(err) => {
                return Err(DirectoryError::Connection(format!(
                    "bind as {dn:?} failed: {err}"
                )));
            }
        }
    }

    Ok(false)
}

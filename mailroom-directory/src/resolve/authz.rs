//! Sender authorization.

use tracing::debug;

use crate::{
    connection::{DirectoryConnection, count_entries},
    error::SearchFailure,
    search::SearchSpec,
};

/// Returns `true` if the principal named in `spec` may use the address in it.
///
/// # Errors
///
/// Returns the search failure.
pub async fn check_authz<C: DirectoryConnection>(
    connection: &mut C,
    spec: &SearchSpec,
) -> Result<bool, SearchFailure> {
    let mut stream = connection.search(spec).await?;
    let authorized = count_entries(stream.as_mut()).await? > 0;

    debug!(filter = %spec.filter, authorized, "Authorization lookup");
    Ok(authorized)
}

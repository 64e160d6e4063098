//! Recipient existence.

use tracing::debug;

use crate::{
    connection::{DirectoryConnection, count_entries},
    error::SearchFailure,
    search::SearchSpec,
};

/// Returns `true` if the search yields at least one entry.
///
/// The stream is drained completely so a failure reported after the last
/// entry is not mistaken for an answer.
///
/// # Errors
///
/// Returns the search failure, e.g. a malformed filter or a dropped
/// connection.
pub async fn verify_existence<C: DirectoryConnection>(
    connection: &mut C,
    spec: &SearchSpec,
) -> Result<bool, SearchFailure> {
    let mut stream = connection.search(spec).await?;
    let matched = count_entries(stream.as_mut()).await?;

    debug!(filter = %spec.filter, matched, "Recipient lookup");
    Ok(matched > 0)
}

//! Envelope address normalisation.
//!
//! Hooks receive whatever the SMTP layer captured for `MAIL FROM`/`RCPT TO`,
//! which may still carry angle brackets or surrounding whitespace. The
//! directory only ever sees the bare mailbox.

use mailparse::MailAddr;

/// Reduce an envelope parameter to a single bare mailbox address.
///
/// Returns `None` for empty input, groups and address lists with more than
/// one mailbox.
#[must_use]
pub fn normalize(input: &str) -> Option<String> {
    let trimmed = input.trim();
    let bare = trimmed
        .strip_prefix('<')
        .and_then(|rest| rest.strip_suffix('>'))
        .unwrap_or(trimmed)
        .trim();

    if bare.is_empty() {
        return None;
    }

    let list = mailparse::addrparse(bare).ok()?;
    match list.as_slice() {
        [MailAddr::Single(info)] if !info.addr.is_empty() => Some(info.addr.clone()),
        _ => None,
    }
}
